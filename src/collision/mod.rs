//! Collision detection: bounds, filtering, sweep-and-prune, contact records and narrow phase.

pub mod aabb;
pub mod broadphase;
pub mod contact;
pub mod contact_store;
pub mod filter;
pub mod narrowphase;
pub mod shapes;

pub use aabb::Aabb;
pub use broadphase::SweepAndPrune;
pub use contact::{Contact, ContactForce, ContactGeometry, ContactPhys, ContactState, PairKey};
pub use contact_store::{ContactStore, SyncStats};
pub use filter::{CollisionFilter, FilterProxy};
pub use narrowphase::{NarrowPhaseRegistry, Resolution, ResolverFn};
pub use shapes::ShapeUtil;
