//! Error taxonomy of the simulation core.
//!
//! Configuration and stability errors are fatal: the scene that produced
//! one refuses further steps and snapshots. Transient conditions (a factory
//! that could not place anything this firing) and degenerate geometry are
//! handled locally and never surface here.

use thiserror::Error;

use crate::{core::shape::ShapeKind, utils::allocator::EntityId};

/// Result alias used across the crate.
pub type DemResult<T> = Result<T, DemError>;

/// Problems in the supplied scene description, detected before or while stepping.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// No narrow-phase routine is registered for this pair of shape kinds.
    #[error("unsupported shape pair in narrow phase: {a:?} + {b:?}")]
    UnsupportedShapePair { a: ShapeKind, b: ShapeKind },

    /// The timestep safety factor must lie in `(0, 1]`.
    #[error("timestep safety factor must satisfy 0 < dt_safety <= 1, got {0}")]
    InvalidDtSafety(f64),

    /// Any other out-of-range scene parameter.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Imposed-motion breakpoints are inconsistent.
    #[error("malformed trajectory: {0}")]
    MalformedTrajectory(String),

    /// Clump membership does not form a valid rigid aggregate.
    #[error("inconsistent clump membership: {0}")]
    InconsistentClump(String),

    /// Material parameters out of physical range.
    #[error("invalid material '{name}': {reason}")]
    InvalidMaterial { name: String, reason: String },

    /// Shape extents out of range.
    #[error("invalid shape: {0}")]
    InvalidShape(String),

    /// Factory parameters out of range.
    #[error("invalid factory '{label}': {reason}")]
    InvalidFactory { label: String, reason: String },

    /// Reference to an entity that does not exist (or was removed).
    #[error("unknown {kind} {id}")]
    UnknownEntity { kind: &'static str, id: EntityId },

    /// A snapshot was requested for a factory driven by a custom generator.
    #[error("factory '{0}' uses a custom generator that cannot be serialized")]
    UnserializableGenerator(String),
}

impl ConfigError {
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig(reason.into())
    }

    pub fn malformed_trajectory(reason: impl Into<String>) -> Self {
        Self::MalformedTrajectory(reason.into())
    }

    pub fn inconsistent_clump(reason: impl Into<String>) -> Self {
        Self::InconsistentClump(reason.into())
    }

    pub fn unknown(kind: &'static str, id: EntityId) -> Self {
        Self::UnknownEntity { kind, id }
    }
}

/// Numerical blow-up detected at a step boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StabilityError {
    /// A node ended the step with a NaN or infinite quantity.
    #[error("non-finite {quantity} on node {node} at step {step}")]
    NonFiniteState {
        node: EntityId,
        quantity: &'static str,
        step: u64,
    },

    /// The step in use exceeds the stability bound.
    #[error("timestep {dt:e} exceeds dt_safety * critical = {limit:e}")]
    TimestepExceedsCritical { dt: f64, limit: f64 },

    /// Two shapes interpenetrate deeper than their extents allow.
    #[error("penetration {depth:e} between particles {a} and {b} exceeds shape extent {limit:e}")]
    ExcessivePenetration {
        a: EntityId,
        b: EntityId,
        depth: f64,
        limit: f64,
    },
}

/// Top-level error of every fallible scene operation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DemError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Stability(#[from] StabilityError),

    /// A previous fatal error left the scene in an unusable state.
    #[error("scene aborted after a fatal error; restore a snapshot to continue")]
    Aborted,
}

impl DemError {
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    pub fn is_stability(&self) -> bool {
        matches!(self, Self::Stability(_))
    }
}
