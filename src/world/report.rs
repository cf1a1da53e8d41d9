use serde::Serialize;

use crate::{core::types::Real, utils::allocator::EntityId};

/// Summary of one completed step.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StepReport {
    /// Index of the step that was just completed.
    pub step: u64,
    /// Time at the end of the step.
    pub time: Real,
    pub dt: Real,
    pub critical_dt: Option<Real>,
    pub contacts: usize,
    pub real_contacts: usize,
    pub created_contacts: usize,
    pub retired_contacts: usize,
    pub bound_refreshes: usize,
    pub degenerate_contacts: usize,
    /// Particles injected by factories during this step.
    pub spawned: Vec<EntityId>,
    /// Factories whose budget ran out during this step.
    pub exhausted_factories: Vec<EntityId>,
}
