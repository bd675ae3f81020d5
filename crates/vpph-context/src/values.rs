use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// Typed key-value lookup source of a [`CallContext`](crate::CallContext).
///
/// The key is the Rust type of the value. Bindings form an immutable chain shared between
/// clones; a later binding of the same type shadows the earlier one.
#[derive(Clone, Default)]
pub struct Values {
    head: Option<Arc<Entry>>,
}

struct Entry {
    key: TypeId,
    value: Box<dyn Any + Send + Sync>,
    parent: Option<Arc<Entry>>,
}

impl Values {
    pub fn new() -> Self {
        Self { head: None }
    }

    /// Returns a new chain with `value` bound on top of `self`.
    pub fn with<T>(&self, value: T) -> Self
    where
        T: Any + Send + Sync,
    {
        Self {
            head: Some(Arc::new(Entry {
                key: TypeId::of::<T>(),
                value: Box::new(value),
                parent: self.head.clone(),
            })),
        }
    }

    /// Nearest binding of type `T`.
    pub fn get<T>(&self) -> Option<&T>
    where
        T: Any + Send + Sync,
    {
        let key = TypeId::of::<T>();
        self.entries()
            .find(|entry| entry.key == key)
            .and_then(|entry| {
                let value: &(dyn Any + Send + Sync) = &*entry.value;
                value.downcast_ref::<T>()
            })
    }

    pub fn contains<T>(&self) -> bool
    where
        T: Any + Send + Sync,
    {
        self.get::<T>().is_some()
    }

    /// Number of bindings in the chain, shadowed ones included.
    pub fn len(&self) -> usize {
        self.entries().count()
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    fn entries(&self) -> impl Iterator<Item = &Entry> {
        std::iter::successors(self.head.as_deref(), |entry| entry.parent.as_deref())
    }
}

impl fmt::Debug for Values {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Values").field("len", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::Values;

    #[derive(Debug, PartialEq)]
    struct RequestId(&'static str);

    #[derive(Debug, PartialEq)]
    struct Tenant(u32);

    #[test]
    fn empty_chain_has_no_values() {
        let values = Values::new();
        assert!(values.is_empty());
        assert!(values.get::<RequestId>().is_none());
    }

    #[test]
    fn lookup_by_type() {
        let values = Values::new().with(RequestId("req-1")).with(Tenant(7));
        assert_eq!(values.get::<RequestId>(), Some(&RequestId("req-1")));
        assert_eq!(values.get::<Tenant>(), Some(&Tenant(7)));
        assert!(!values.contains::<String>());
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn later_binding_shadows_earlier() {
        let base = Values::new().with(RequestId("outer"));
        let inner = base.with(RequestId("inner"));

        assert_eq!(inner.get::<RequestId>(), Some(&RequestId("inner")));
        assert_eq!(base.get::<RequestId>(), Some(&RequestId("outer")));
        assert_eq!(inner.len(), 2);
    }
}
