use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::ConfigError;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Renders `template`, replacing each `{{ .Field }}` with the matching field of `params`.
///
/// Field names are the serialized names of `params`. Strings are inserted verbatim, numbers and
/// booleans in their JSON spelling, `null` as nothing.
pub fn render<P>(template: &str, params: &P) -> Result<String, ConfigError>
where
    P: Serialize + ?Sized,
{
    let fields = match serde_json::to_value(params) {
        Ok(Value::Object(fields)) => fields,
        Ok(other) => return Err(ConfigError::Parameters(format!("got {other}"))),
        Err(e) => return Err(ConfigError::Parameters(e.to_string())),
    };

    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    let mut offset = 0;

    while let Some(open) = rest.find(OPEN) {
        out.push_str(&rest[..open]);

        let body_start = open + OPEN.len();
        let close = rest[body_start..]
            .find(CLOSE)
            .ok_or(ConfigError::Unterminated(offset + open))?;
        let name = field_name(&rest[body_start..body_start + close])?;
        push_field(&mut out, &fields, name)?;

        let consumed = body_start + close + CLOSE.len();
        offset += consumed;
        rest = &rest[consumed..];
    }
    out.push_str(rest);
    Ok(out)
}

fn field_name(body: &str) -> Result<&str, ConfigError> {
    let body = body.trim();
    match body.strip_prefix('.') {
        Some(name)
            if !name.is_empty()
                && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') =>
        {
            Ok(name)
        }
        _ => Err(ConfigError::Malformed(body.to_string())),
    }
}

fn push_field(out: &mut String, fields: &Map<String, Value>, name: &str) -> Result<(), ConfigError> {
    match fields.get(name) {
        None => Err(ConfigError::UnknownField(name.to_string())),
        Some(Value::String(s)) => {
            out.push_str(s);
            Ok(())
        }
        Some(Value::Null) => Ok(()),
        Some(scalar @ (Value::Number(_) | Value::Bool(_))) => {
            out.push_str(&scalar.to_string());
            Ok(())
        }
        Some(Value::Array(_) | Value::Object(_)) => Err(ConfigError::NotScalar(name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::config::ConfigParameters;

    #[test]
    fn renders_parameters() {
        let params = ConfigParameters::new("/root/dir").with_data_size(500);
        assert_eq!(
            render("{{ .DataSize }} + {{ .RootDir }}", &params).unwrap(),
            "500 + /root/dir"
        );
    }

    #[test]
    fn whitespace_inside_braces_is_optional() {
        let params = ConfigParameters::new("/r");
        assert_eq!(render("[{{.RootDir}}]", &params).unwrap(), "[/r]");
    }

    #[test]
    fn text_without_placeholders_is_unchanged() {
        let text = "plugins { plugin dpdk_plugin.so { disable } }";
        assert_eq!(render(text, &ConfigParameters::new("/")).unwrap(), text);
    }

    #[test]
    fn unknown_field_is_rejected() {
        let err = render("{{ .Nope }}", &ConfigParameters::new("/")).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownField(f) if f == "Nope"));
    }

    #[test]
    fn unterminated_placeholder_reports_position() {
        let err = render("abc {{ .RootDir", &ConfigParameters::new("/")).unwrap_err();
        assert!(matches!(err, ConfigError::Unterminated(4)));
    }

    #[test]
    fn placeholder_without_dot_is_malformed() {
        let err = render("{{ RootDir }}", &ConfigParameters::new("/")).unwrap_err();
        assert!(matches!(err, ConfigError::Malformed(b) if b == "RootDir"));
    }

    #[test]
    fn nested_values_are_not_scalars() {
        let mut params = BTreeMap::new();
        params.insert("Nested", vec![1, 2]);
        let err = render("{{ .Nested }}", &params).unwrap_err();
        assert!(matches!(err, ConfigError::NotScalar(f) if f == "Nested"));
    }

    #[test]
    fn parameters_must_be_a_map() {
        let err = render("x", &42).unwrap_err();
        assert!(matches!(err, ConfigError::Parameters(_)));
    }
}
