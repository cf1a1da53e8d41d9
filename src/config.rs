//! Global configuration constants and the scene-level parameter set.

use serde::{Deserialize, Serialize};

use crate::{
    core::types::{MixingMode, Real, Vec3},
    error::ConfigError,
};

/// Default gravity vector applied to free nodes (Z-up).
pub const DEFAULT_GRAVITY: [Real; 3] = [0.0, 0.0, -9.81];

/// Default timestep safety factor applied to the critical timestep.
pub const DEFAULT_DT_SAFETY: Real = 0.5;

/// Timestep cap used while no stability bound exists (empty or static scene).
pub const DEFAULT_MAX_DT: Real = 1e-3;

/// Broad-phase inflation relative to a particle's equivalent radius.
pub const DEFAULT_BOUND_MARGIN: Real = 0.1;

/// Steps a non-overlapping potential contact survives before deletion.
pub const DEFAULT_RETIRE_GRACE: u32 = 2;

/// Relative tolerance used when checking the step against its stability bound.
pub const TIMESTEP_BOUND_TOLERANCE: Real = 1e-9;

/// Strategy used to choose the step size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum TimestepMode {
    /// `dt = dt_safety * critical`, capped by `max_dt`.
    #[default]
    Adaptive,
    /// User-imposed step; exceeding `dt_safety * critical` is fatal.
    Fixed(Real),
}

/// Scene-wide parameters of the simulation pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    pub dt_safety: Real,
    pub max_dt: Real,
    pub timestep: TimestepMode,
    pub gravity: Vec3,
    /// Cundall local damping applied to contact forces in the integrator.
    pub damping: Real,
    /// Particles sharing any bit of this mask never contact each other.
    pub lone_mask: u32,
    /// Rule combining the friction coefficients of two materials.
    pub friction_mixing: MixingMode,
    pub bound_margin: Real,
    pub retire_grace: u32,
    /// Penetration above which a contact becomes real.
    pub contact_tolerance: Real,
    pub parallel: bool,
    /// Base seed of the factories' placement sampling.
    pub seed: u64,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            dt_safety: DEFAULT_DT_SAFETY,
            max_dt: DEFAULT_MAX_DT,
            timestep: TimestepMode::Adaptive,
            gravity: Vec3::from_array(DEFAULT_GRAVITY),
            damping: 0.0,
            lone_mask: 0,
            friction_mixing: MixingMode::Min,
            bound_margin: DEFAULT_BOUND_MARGIN,
            retire_grace: DEFAULT_RETIRE_GRACE,
            contact_tolerance: 0.0,
            parallel: true,
            seed: 0,
        }
    }
}

impl SceneConfig {
    pub fn with_gravity(mut self, gravity: Vec3) -> Self {
        self.gravity = gravity;
        self
    }

    pub fn with_dt_safety(mut self, dt_safety: Real) -> Self {
        self.dt_safety = dt_safety;
        self
    }

    pub fn with_damping(mut self, damping: Real) -> Self {
        self.damping = damping;
        self
    }

    pub fn with_lone_mask(mut self, lone_mask: u32) -> Self {
        self.lone_mask = lone_mask;
        self
    }

    pub fn with_timestep(mut self, mode: TimestepMode) -> Self {
        self.timestep = mode;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Checks every parameter; called before the scene accepts a step.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.dt_safety > 0.0 && self.dt_safety <= 1.0) {
            return Err(ConfigError::InvalidDtSafety(self.dt_safety));
        }
        if !(self.max_dt.is_finite() && self.max_dt > 0.0) {
            return Err(ConfigError::invalid_config(format!(
                "max_dt must be positive and finite, got {}",
                self.max_dt
            )));
        }
        if let TimestepMode::Fixed(dt) = self.timestep {
            if !(dt.is_finite() && dt > 0.0) {
                return Err(ConfigError::invalid_config(format!(
                    "fixed timestep must be positive and finite, got {dt}"
                )));
            }
        }
        if !self.gravity.is_finite() {
            return Err(ConfigError::invalid_config("gravity must be finite"));
        }
        if !(0.0..1.0).contains(&self.damping) {
            return Err(ConfigError::invalid_config(format!(
                "damping must lie in [0, 1), got {}",
                self.damping
            )));
        }
        if !(self.bound_margin.is_finite() && self.bound_margin >= 0.0) {
            return Err(ConfigError::invalid_config(format!(
                "bound_margin must be non-negative, got {}",
                self.bound_margin
            )));
        }
        if !(self.contact_tolerance.is_finite() && self.contact_tolerance >= 0.0) {
            return Err(ConfigError::invalid_config(format!(
                "contact_tolerance must be non-negative, got {}",
                self.contact_tolerance
            )));
        }
        Ok(())
    }
}
