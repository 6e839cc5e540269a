use chrono::{DateTime, Utc};
use evalia_application::Clock;

/// Wall-clock time source used by the running services.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
