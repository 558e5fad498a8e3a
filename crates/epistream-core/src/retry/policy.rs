use std::time::Duration;

/// Coarse failure class used for retry decisions. Source fetches and chunk
/// uploads map their transport errors onto these (see `classify`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Connect, idle or per-attempt timeout.
    Timeout,
    /// 429 / 503.
    Throttled,
    /// Reset, refused, DNS, short body.
    Connection,
    /// Other 5xx.
    Http5xx(u16),
    /// Everything else: 4xx, missing objects, local disk errors.
    Other,
}

impl ErrorKind {
    /// Worth another attempt after a pause.
    pub fn is_transient(self) -> bool {
        !matches!(self, ErrorKind::Other)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    NoRetry,
    RetryAfter(Duration),
}

/// Bounded attempts with doubling backoff.
///
/// Built from `[retry]` (fetches) or `[relay]` (chunk uploads) in `EpiConfig`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Attempts in total, the first one included.
    pub max_attempts: u32,
    /// Pause after the first failure.
    pub base_delay: Duration,
    /// Ceiling for any single pause.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Pause after failed attempt `attempt` (1-based): `base * 2^(attempt-1)`,
    /// capped at `max_delay`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let doublings = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << doublings)
            .min(self.max_delay)
    }

    /// What to do after attempt `attempt` (1-based) failed with `kind`.
    pub fn decide(&self, attempt: u32, kind: ErrorKind) -> RetryDecision {
        if attempt >= self.max_attempts || !kind.is_transient() {
            RetryDecision::NoRetry
        } else {
            RetryDecision::RetryAfter(self.backoff(attempt))
        }
    }
}
