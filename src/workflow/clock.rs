use chrono::{DateTime, Utc};
use tokio::time::Instant;

/// Source of "now" for process logic.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock driven by the tokio timer.
///
/// The wall-clock reading is taken once at construction; after that time only
/// advances with `tokio::time::Instant`, so a paused runtime (tests) moves
/// this clock and the process timers together.
#[derive(Debug, Clone)]
pub struct TokioClock {
    anchor_instant: Instant,
    anchor_wall: DateTime<Utc>,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            anchor_instant: Instant::now(),
            anchor_wall: Utc::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = Instant::now().saturating_duration_since(self.anchor_instant);
        let elapsed = chrono::Duration::from_std(elapsed).unwrap_or_else(|_| chrono::Duration::zero());
        self.anchor_wall + elapsed
    }
}
