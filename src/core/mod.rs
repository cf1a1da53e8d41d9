//! Core entity types: materials, shapes, nodes, particles, clumps and imposed motion.

pub mod clump;
pub mod motion;
pub mod node;
pub mod particle;
pub mod shape;
pub mod types;

pub use clump::{Clump, ClumpBuilder};
pub use motion::{InterpolatedMotion, MotionPhase, MotionSample};
pub use node::{BlockedDofs, Motion, Node};
pub use particle::{Particle, ParticleBuilder, ParticleView};
pub use shape::{Shape, ShapeKind};
pub use types::{Mat3, Material, MaterialId, MixingMode, Pose, Quat, Real, Vec3};
