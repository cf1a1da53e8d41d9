use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::{core::types::Real, utils::allocator::EntityId};

/// A completion hook raised by an exhausted factory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookCall {
    pub hook: String,
    pub factory: EntityId,
    pub time: Real,
}

/// Shared queue of raised hooks; clones observe the same queue.
#[derive(Debug, Clone, Default)]
pub struct HookQueue {
    inner: Arc<Mutex<Vec<HookCall>>>,
}

impl HookQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, call: HookCall) {
        self.inner.lock().push(call);
    }

    /// Removes and returns the pending calls in the order they were raised.
    pub fn drain(&self) -> Vec<HookCall> {
        std::mem::take(&mut *self.inner.lock())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}
