use std::collections::{BTreeMap, BTreeSet};

use log::debug;
use serde::{Deserialize, Serialize};

use super::{aabb::Aabb, contact::PairKey};
use crate::{core::types::Real, utils::allocator::EntityId};

/// Above this share of freshly inserted endpoints, an axis is re-sorted from
/// scratch instead of by insertion.
const REBUILD_FRACTION: f64 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct Endpoint {
    value: Real,
    owner: EntityId,
    is_min: bool,
}

impl Endpoint {
    /// Sort order along an axis; at equal values minima come first so that
    /// touching closed intervals count as overlapping.
    fn precedes(&self, other: &Endpoint) -> bool {
        self.value < other.value || (self.value == other.value && self.is_min && !other.is_min)
    }
}

/// Incremental sweep-and-prune over inflated particle bounds.
///
/// Each axis keeps its endpoints sorted; swaps found by insertion sort add
/// or remove overlapping pairs. Bounds are inflated by a margin and only
/// refreshed when the tight bounds escape them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SweepAndPrune {
    axes: [Vec<Endpoint>; 3],
    bounds: BTreeMap<EntityId, Aabb>,
    pairs: BTreeSet<PairKey>,
    pending_inserts: usize,
    dirty: bool,
}

impl SweepAndPrune {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.bounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bounds.is_empty()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.bounds.contains_key(&id)
    }

    /// Inflated bounds currently stored for `id`.
    pub fn bounds(&self, id: EntityId) -> Option<&Aabb> {
        self.bounds.get(&id)
    }

    pub fn insert(&mut self, id: EntityId, tight: Aabb, margin: Real) {
        if self.bounds.contains_key(&id) {
            self.remove(id);
        }
        let inflated = tight.inflate(margin);
        self.bounds.insert(id, inflated);
        for (axis, endpoints) in self.axes.iter_mut().enumerate() {
            endpoints.push(Endpoint {
                value: inflated.min[axis],
                owner: id,
                is_min: true,
            });
            endpoints.push(Endpoint {
                value: inflated.max[axis],
                owner: id,
                is_min: false,
            });
        }
        self.pending_inserts += 1;
        self.dirty = true;
    }

    pub fn remove(&mut self, id: EntityId) -> bool {
        if self.bounds.remove(&id).is_none() {
            return false;
        }
        for endpoints in &mut self.axes {
            endpoints.retain(|e| e.owner != id);
        }
        self.pairs.retain(|pair| !pair.involves(id));
        true
    }

    /// Checks the tight bounds of `id` against its inflated bounds, refreshing
    /// them when escaped. Returns whether a refresh happened.
    pub fn update(&mut self, id: EntityId, tight: Aabb, margin: Real) -> bool {
        match self.bounds.get_mut(&id) {
            Some(current) if current.contains(&tight) => false,
            Some(current) => {
                *current = tight.inflate(margin);
                self.dirty = true;
                true
            }
            None => {
                self.insert(id, tight, margin);
                true
            }
        }
    }

    /// Re-sorts the axes after inserts or refreshes, updating the pair set.
    pub fn update_pairs(&mut self) {
        if !self.dirty {
            return;
        }
        let total = self.bounds.len().max(1);
        if self.pending_inserts as f64 > REBUILD_FRACTION * total as f64 {
            self.rebuild();
        } else {
            self.refresh_endpoint_values();
            for axis in 0..3 {
                self.sort_axis(axis);
            }
        }
        self.pending_inserts = 0;
        self.dirty = false;
    }

    /// Overlapping pairs accepted by `filter`, in ascending key order.
    pub fn candidates(&self, mut filter: impl FnMut(&PairKey) -> bool) -> Vec<PairKey> {
        self.pairs.iter().copied().filter(|pair| filter(pair)).collect()
    }

    pub fn is_overlapping(&self, pair: &PairKey) -> bool {
        self.pairs.contains(pair)
    }

    pub fn pair_count(&self) -> usize {
        self.pairs.len()
    }

    /// Ids whose inflated bounds overlap `query`.
    pub fn query(&self, query: &Aabb) -> Vec<EntityId> {
        self.bounds
            .iter()
            .filter(|(_, b)| b.overlaps(query))
            .map(|(id, _)| *id)
            .collect()
    }

    fn refresh_endpoint_values(&mut self) {
        let Self { axes, bounds, .. } = self;
        for (axis, endpoints) in axes.iter_mut().enumerate() {
            for endpoint in endpoints.iter_mut() {
                if let Some(b) = bounds.get(&endpoint.owner) {
                    endpoint.value = if endpoint.is_min {
                        b.min[axis]
                    } else {
                        b.max[axis]
                    };
                }
            }
        }
    }

    fn sort_axis(&mut self, axis: usize) {
        let Self {
            axes,
            bounds,
            pairs,
            ..
        } = self;
        let endpoints = &mut axes[axis];
        for i in 1..endpoints.len() {
            let mut j = i;
            while j > 0 && endpoints[j].precedes(&endpoints[j - 1]) {
                let moving = endpoints[j];
                let passed = endpoints[j - 1];
                if moving.owner != passed.owner {
                    let key = PairKey::new(moving.owner, passed.owner);
                    if moving.is_min && !passed.is_min {
                        let overlap = match (bounds.get(&moving.owner), bounds.get(&passed.owner)) {
                            (Some(a), Some(b)) => a.overlaps(b),
                            _ => false,
                        };
                        if overlap {
                            pairs.insert(key);
                        }
                    } else if !moving.is_min && passed.is_min {
                        pairs.remove(&key);
                    }
                }
                endpoints.swap(j, j - 1);
                j -= 1;
            }
        }
    }

    /// Full re-sort and sweep, used after large insert batches.
    fn rebuild(&mut self) {
        self.refresh_endpoint_values();
        for endpoints in &mut self.axes {
            endpoints.sort_by(|a, b| {
                if a.precedes(b) {
                    std::cmp::Ordering::Less
                } else if b.precedes(a) {
                    std::cmp::Ordering::Greater
                } else {
                    std::cmp::Ordering::Equal
                }
            });
        }

        self.pairs.clear();
        let mut active: Vec<EntityId> = Vec::new();
        for endpoint in &self.axes[0] {
            if endpoint.is_min {
                let Some(own) = self.bounds.get(&endpoint.owner) else {
                    continue;
                };
                for other in &active {
                    if let Some(b) = self.bounds.get(other) {
                        if own.overlaps(b) {
                            self.pairs.insert(PairKey::new(endpoint.owner, *other));
                        }
                    }
                }
                active.push(endpoint.owner);
            } else {
                active.retain(|id| *id != endpoint.owner);
            }
        }
        debug!(
            "sweep-and-prune rebuilt: {} proxies, {} overlapping pairs",
            self.bounds.len(),
            self.pairs.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Vec3;

    fn cube(center: Vec3, half: Real) -> Aabb {
        Aabb::around(center, Vec3::splat(half))
    }

    fn id(index: u32) -> EntityId {
        EntityId::from_index(index)
    }

    #[test]
    fn detects_overlap_after_motion() {
        let mut sap = SweepAndPrune::new();
        sap.insert(id(0), cube(Vec3::ZERO, 1.0), 0.0);
        sap.insert(id(1), cube(Vec3::new(5.0, 0.0, 0.0), 1.0), 0.0);
        sap.update_pairs();
        assert_eq!(sap.pair_count(), 0);

        assert!(sap.update(id(1), cube(Vec3::new(1.5, 0.0, 0.0), 1.0), 0.0));
        sap.update_pairs();
        assert!(sap.is_overlapping(&PairKey::new(id(0), id(1))));

        sap.update(id(1), cube(Vec3::new(4.0, 0.0, 0.0), 1.0), 0.0);
        sap.update_pairs();
        assert_eq!(sap.pair_count(), 0);
    }

    #[test]
    fn inflated_bounds_absorb_small_motion() {
        let mut sap = SweepAndPrune::new();
        sap.insert(id(0), cube(Vec3::ZERO, 1.0), 0.5);
        assert!(!sap.update(id(0), cube(Vec3::new(0.2, 0.0, 0.0), 1.0), 0.5));
        assert!(sap.update(id(0), cube(Vec3::new(0.7, 0.0, 0.0), 1.0), 0.5));
    }

    #[test]
    fn incremental_and_rebuilt_pairs_agree() {
        let centers: Vec<Vec3> = (0..40)
            .map(|i| {
                let t = i as Real;
                Vec3::new((t * 0.37).sin() * 3.0, (t * 0.71).cos() * 3.0, (t * 0.13).sin())
            })
            .collect();

        let mut incremental = SweepAndPrune::new();
        for (i, c) in centers.iter().enumerate() {
            incremental.insert(id(i as u32), cube(*c, 0.4), 0.0);
            incremental.update_pairs();
        }

        let mut brute = BTreeSet::new();
        for i in 0..centers.len() {
            for j in (i + 1)..centers.len() {
                if cube(centers[i], 0.4).overlaps(&cube(centers[j], 0.4)) {
                    brute.insert(PairKey::new(id(i as u32), id(j as u32)));
                }
            }
        }
        let found: BTreeSet<_> = incremental.candidates(|_| true).into_iter().collect();
        assert_eq!(found, brute);

        let mut batch = SweepAndPrune::new();
        for (i, c) in centers.iter().enumerate() {
            batch.insert(id(i as u32), cube(*c, 0.4), 0.0);
        }
        batch.update_pairs();
        let rebuilt: BTreeSet<_> = batch.candidates(|_| true).into_iter().collect();
        assert_eq!(rebuilt, brute);
    }

    #[test]
    fn removal_drops_pairs() {
        let mut sap = SweepAndPrune::new();
        sap.insert(id(0), cube(Vec3::ZERO, 1.0), 0.0);
        sap.insert(id(1), cube(Vec3::new(0.5, 0.0, 0.0), 1.0), 0.0);
        sap.update_pairs();
        assert_eq!(sap.pair_count(), 1);
        assert!(sap.remove(id(1)));
        assert_eq!(sap.pair_count(), 0);
        assert!(!sap.contains(id(1)));
    }
}
