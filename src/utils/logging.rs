use log::{debug, log_enabled, warn, Level};
use std::time::{Duration, Instant};

/// Wall-clock cost of one step, broken down by pipeline stage: the
/// broad-phase pair sweep, the contact update pass, the discrete island
/// solve, and the TOI sub-stepper.
///
/// Marks are cheap enough to take unconditionally; formatting only
/// happens when debug logging is enabled.
#[derive(Debug)]
pub struct StepTimings {
    start: Instant,
    mark: Instant,
    pub pair_sweep: Duration,
    pub contact_update: Duration,
    pub solve: Duration,
    pub toi: Duration,
}

impl StepTimings {
    pub fn begin() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            mark: now,
            pair_sweep: Duration::ZERO,
            contact_update: Duration::ZERO,
            solve: Duration::ZERO,
            toi: Duration::ZERO,
        }
    }

    fn lap(&mut self) -> Duration {
        let now = Instant::now();
        let elapsed = now - self.mark;
        self.mark = now;
        elapsed
    }

    pub fn mark_pair_sweep(&mut self) {
        self.pair_sweep = self.lap();
    }

    pub fn mark_contact_update(&mut self) {
        self.contact_update = self.lap();
    }

    pub fn mark_solve(&mut self) {
        self.solve = self.lap();
    }

    pub fn mark_toi(&mut self) {
        self.toi = self.lap();
    }

    pub fn total(&self) -> Duration {
        self.start.elapsed()
    }

    /// Logs the stage breakdown, and warns when the step cost more wall
    /// clock than the time slice it simulated (the host cannot hold real
    /// time at this rate).
    pub fn report(&self, dt: f32) {
        if log_enabled!(Level::Debug) {
            debug!(
                "step timings: pairs {:?}, contacts {:?}, solve {:?}, toi {:?} (total {:?})",
                self.pair_sweep,
                self.contact_update,
                self.solve,
                self.toi,
                self.total()
            );
        }
        let total = self.total().as_secs_f32();
        if dt > 0.0 && total > dt {
            warn!(
                "step fell behind real time: {:.2} ms spent on a {:.2} ms slice",
                total * 1000.0,
                dt * 1000.0
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn laps_accumulate_into_the_total() {
        let mut timings = StepTimings::begin();
        timings.mark_pair_sweep();
        timings.mark_contact_update();
        timings.mark_solve();
        timings.mark_toi();
        let staged =
            timings.pair_sweep + timings.contact_update + timings.solve + timings.toi;
        assert!(timings.total() >= staged);
    }

    #[test]
    fn unmarked_stages_read_zero() {
        let mut timings = StepTimings::begin();
        timings.mark_pair_sweep();
        assert_eq!(timings.solve, Duration::ZERO);
        assert_eq!(timings.toi, Duration::ZERO);
    }
}
