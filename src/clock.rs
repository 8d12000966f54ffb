//! Tick pacing statistics for the headless runner.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

const HISTORY: usize = 60;
/// Shortest pacing interval; a timer cannot run on a zero period.
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Rolling tick timer
///
/// Keeps the last 60 intervals between completed ticks and reports the
/// average rate against a target.
pub struct Clock {
    /// Time of the last completed tick
    last_time: Instant,
    /// Recent tick intervals in seconds
    dt_history: VecDeque<f64>,
    /// Target ticks per second
    target_rate: f64,
}

impl Clock {
    pub fn new(target_rate: f64) -> Self {
        Self {
            last_time: Instant::now(),
            dt_history: VecDeque::with_capacity(HISTORY),
            target_rate,
        }
    }

    /// Records a completed tick.
    pub fn tick(&mut self) {
        let now = Instant::now();
        let dt = now.duration_since(self.last_time).as_secs_f64();
        self.last_time = now;

        self.dt_history.push_back(dt);
        if self.dt_history.len() > HISTORY {
            self.dt_history.pop_front();
        }
    }

    /// Last tick interval in milliseconds
    pub fn dt_millis(&self) -> f64 {
        self.dt_history
            .back()
            .copied()
            .unwrap_or(1.0 / self.target_rate)
            * 1000.0
    }

    /// Average ticks per second over the history; the target until measured.
    pub fn avg_rate(&self) -> f64 {
        if self.dt_history.is_empty() {
            return self.target_rate;
        }
        let avg_dt = self.dt_history.iter().sum::<f64>() / self.dt_history.len() as f64;
        if avg_dt > 0.0 {
            1.0 / avg_dt
        } else {
            self.target_rate
        }
    }

    /// Interval between tick requests needed to hit the target rate.
    pub fn period(&self) -> Duration {
        Duration::try_from_secs_f64(1.0 / self.target_rate)
            .unwrap_or(MIN_PERIOD)
            .max(MIN_PERIOD)
    }
}
