use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Time source injected where expiry arithmetic happens, so tests can pin `now()`.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock implementation used by the running server.
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

pub fn system_clock() -> Arc<dyn Clock> {
    Arc::new(SystemClock)
}

#[cfg(test)]
pub mod test_support {
    use super::*;

    /// Clock frozen at a fixed instant.
    pub struct FixedClock(pub DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    pub fn fixed(at: DateTime<Utc>) -> Arc<dyn Clock> {
        Arc::new(FixedClock(at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn fixed_clock_returns_pinned_instant() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let clock = test_support::fixed(at);
        assert_eq!(clock.now(), at);
        assert_eq!(clock.now(), at);
    }
}
