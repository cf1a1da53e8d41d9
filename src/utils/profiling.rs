use std::time::{Duration, Instant};

/// Per-step timing and population counters for the DEM pipeline.
#[derive(Debug, Default, Clone, Copy)]
pub struct StepProfiler {
    pub broad_phase_time: Duration,
    pub contact_sync_time: Duration,
    pub narrow_phase_time: Duration,
    pub law_time: Duration,
    pub integrator_time: Duration,
    pub factory_time: Duration,
    pub total_step_time: Duration,

    pub particle_count: usize,
    pub contact_count: usize,
    pub real_contact_count: usize,
    pub bound_refreshes: usize,
}

impl StepProfiler {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Logs a per-phase breakdown at `info` level.
    pub fn report(&self) {
        let total_us = self.total_step_time.as_micros() as f64;
        if total_us < 1.0 {
            return;
        }

        let share = |d: Duration| (d.as_micros() as f64 / total_us) * 100.0;
        let ms = |d: Duration| d.as_secs_f64() * 1000.0;

        log::info!(
            "step profile: {} particles, {} contacts ({} real), {} bound refreshes, {:.3} ms total",
            self.particle_count,
            self.contact_count,
            self.real_contact_count,
            self.bound_refreshes,
            ms(self.total_step_time)
        );
        log::info!(
            "  broad {:.3} ms ({:.1}%), sync {:.3} ms ({:.1}%), narrow {:.3} ms ({:.1}%)",
            ms(self.broad_phase_time),
            share(self.broad_phase_time),
            ms(self.contact_sync_time),
            share(self.contact_sync_time),
            ms(self.narrow_phase_time),
            share(self.narrow_phase_time)
        );
        log::info!(
            "  law {:.3} ms ({:.1}%), integrate {:.3} ms ({:.1}%), factories {:.3} ms ({:.1}%)",
            ms(self.law_time),
            share(self.law_time),
            ms(self.integrator_time),
            share(self.integrator_time),
            ms(self.factory_time),
            share(self.factory_time)
        );
    }
}

/// Adds the elapsed time of its scope to a profiler slot.
pub struct PhaseTimer<'a> {
    start: Instant,
    output: &'a mut Duration,
}

impl<'a> PhaseTimer<'a> {
    pub fn new(output: &'a mut Duration) -> Self {
        Self {
            start: Instant::now(),
            output,
        }
    }
}

impl<'a> Drop for PhaseTimer<'a> {
    fn drop(&mut self) {
        *self.output += self.start.elapsed();
    }
}
