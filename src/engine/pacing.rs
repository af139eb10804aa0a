//! Jittered, cancellable sleeps between worker cycles.

use rand::Rng;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// `base × (1 ± jitter)`, drawn uniformly.
pub fn jittered(base: Duration, jitter: f64) -> Duration {
    jittered_with(base, jitter, &mut rand::rng())
}

pub fn jittered_with<R: Rng + ?Sized>(base: Duration, jitter: f64, rng: &mut R) -> Duration {
    if !(jitter.is_finite() && jitter > 0.0) {
        return base;
    }
    let factor = rng.random_range((1.0 - jitter)..=(1.0 + jitter));
    base.mul_f64(factor.max(0.0))
}

/// Sleep for `duration` unless `token` fires first.
///
/// Returns `true` if the sleep ran to completion, `false` if cancelled.
pub async fn sleep_or_cancel(duration: Duration, token: &CancellationToken) -> bool {
    tokio::select! {
        _ = token.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
