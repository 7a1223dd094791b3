//! Inter-message pacing.
//!
//! WhatsApp sends are spaced by a random delay; back-to-back bursts trip the
//! platform's spam heuristics. The delay sits behind a trait so tests can
//! replace it with a deterministic stub.

use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;

/// Injectable delay between consecutive sends.
#[async_trait]
pub trait Pacer: Send + Sync {
    /// Wait some amount of time within `[min_ms, max_ms)`.
    async fn pause(&self, min_ms: u64, max_ms: u64);
}

/// Sample a delay uniformly from `[min_ms, max_ms)`.
pub fn sample_delay_ms(min_ms: u64, max_ms: u64) -> u64 {
    if min_ms >= max_ms {
        return min_ms;
    }
    rand::rng().random_range(min_ms..max_ms)
}

/// Production pacer: sleeps a uniformly random duration in `[min_ms, max_ms)`.
pub struct RandomPacer;

#[async_trait]
impl Pacer for RandomPacer {
    async fn pause(&self, min_ms: u64, max_ms: u64) {
        let ms = sample_delay_ms(min_ms, max_ms);
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}
