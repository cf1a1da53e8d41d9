use crate::utils::allocator::EntityId;

/// The attributes of a particle that decide whether it may touch another.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterProxy {
    pub id: EntityId,
    pub mask: u32,
    pub clump: Option<EntityId>,
    /// Attached to a node integrated from forces.
    pub dynamic: bool,
}

/// Scene-wide contact filtering rule.
///
/// Two particles may contact when their masks intersect, the intersection
/// shares no bit with `lone_mask`, they are distinct, they are not members
/// of the same clump and at least one of them is dynamic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CollisionFilter {
    pub lone_mask: u32,
}

impl CollisionFilter {
    pub fn new(lone_mask: u32) -> Self {
        Self { lone_mask }
    }

    pub fn masks_allow(&self, a: u32, b: u32) -> bool {
        let common = a & b;
        common != 0 && common & self.lone_mask == 0
    }

    pub fn may_contact(&self, a: &FilterProxy, b: &FilterProxy) -> bool {
        if a.id == b.id || !self.masks_allow(a.mask, b.mask) {
            return false;
        }
        if matches!((a.clump, b.clump), (Some(ca), Some(cb)) if ca == cb) {
            return false;
        }
        a.dynamic || b.dynamic
    }
}
