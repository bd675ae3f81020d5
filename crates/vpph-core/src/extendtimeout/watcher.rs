use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

/// Holds back `original`'s cancellation until `window_end`, then forwards it to `derived`.
///
/// Returns as soon as `release` fires, whichever phase it is in.
pub(super) async fn forward_cancellation(
    original: CancellationToken,
    derived: CancellationToken,
    release: CancellationToken,
    window_end: Instant,
) {
    tokio::select! {
        biased;
        _ = release.cancelled() => return,
        _ = sleep_until(window_end) => {}
    }

    tokio::select! {
        biased;
        _ = release.cancelled() => {}
        _ = original.cancelled() => derived.cancel(),
    }
}
