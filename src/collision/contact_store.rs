use std::collections::{HashMap, HashSet};

use log::debug;
use serde::{Deserialize, Serialize};

use super::contact::{Contact, PairKey};
use crate::utils::allocator::{Arena, EntityId};

/// Outcome of one synchronization against the broad-phase candidates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub created: usize,
    pub demoted: usize,
    pub retired: usize,
}

/// Arena of contact records plus a pair index enforcing one contact per pair.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContactStore {
    contacts: Arena<Contact>,
    #[serde(skip)]
    index: HashMap<PairKey, EntityId>,
}

impl ContactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the pair index from the arena (after deserialization).
    pub fn rebuild_index(&mut self) {
        self.index = self
            .contacts
            .iter_with_ids()
            .map(|(id, contact)| (contact.pair, id))
            .collect();
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    pub fn real_count(&self) -> usize {
        self.contacts.iter().filter(|c| c.is_real()).count()
    }

    pub fn get(&self, pair: PairKey) -> Option<&Contact> {
        self.index.get(&pair).and_then(|id| self.contacts.get(*id))
    }

    pub fn get_by_id(&self, id: EntityId) -> Option<&Contact> {
        self.contacts.get(id)
    }

    pub fn id_of(&self, pair: PairKey) -> Option<EntityId> {
        self.index.get(&pair).copied()
    }

    /// Returns the contact for `pair`, creating a potential one if absent.
    pub fn ensure(&mut self, pair: PairKey, step: u64) -> (EntityId, bool) {
        if let Some(id) = self.index.get(&pair) {
            return (*id, false);
        }
        let id = self.contacts.insert_with(|id| {
            let mut contact = Contact::new(pair, step);
            contact.id = id;
            contact
        });
        self.index.insert(pair, id);
        (id, true)
    }

    /// Creates contacts for new candidates and ages the ones no longer reported.
    ///
    /// A contact missing from the candidates is demoted immediately (its
    /// inflated bounds no longer overlap, so the shapes cannot touch) and is
    /// deleted once it has been missing for more than `grace` consecutive steps.
    pub fn sync(&mut self, candidates: &[PairKey], step: u64, grace: u32) -> SyncStats {
        let mut stats = SyncStats::default();
        let mut seen = HashSet::with_capacity(candidates.len());
        for pair in candidates {
            let (id, created) = self.ensure(*pair, step);
            if created {
                stats.created += 1;
            }
            if let Some(contact) = self.contacts.get_mut(id) {
                contact.missed_steps = 0;
            }
            seen.insert(id);
        }

        let mut retire = Vec::new();
        for (id, contact) in self.contacts_with_ids_mut() {
            if seen.contains(&id) {
                continue;
            }
            contact.missed_steps = contact.missed_steps.saturating_add(1);
            if contact.is_real() {
                contact.demote();
                stats.demoted += 1;
            }
            contact.geometry = None;
            if contact.missed_steps > grace {
                retire.push(id);
            }
        }
        for id in retire {
            if let Some(contact) = self.contacts.remove(id) {
                self.index.remove(&contact.pair);
                stats.retired += 1;
            }
        }

        if stats.created + stats.retired > 0 {
            debug!(
                "contact store: +{} created, -{} retired, {} demoted, {} live",
                stats.created,
                stats.retired,
                stats.demoted,
                self.contacts.len()
            );
        }
        stats
    }

    /// Deletes every contact touching `particle`.
    pub fn remove_involving(&mut self, particle: EntityId) -> usize {
        let doomed: Vec<EntityId> = self
            .contacts
            .iter_with_ids()
            .filter(|(_, c)| c.pair.involves(particle))
            .map(|(id, _)| id)
            .collect();
        for id in &doomed {
            if let Some(contact) = self.contacts.remove(*id) {
                self.index.remove(&contact.pair);
            }
        }
        doomed.len()
    }

    pub fn clear(&mut self) {
        self.contacts = Arena::new();
        self.index.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Contact> + '_ {
        self.contacts.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Contact> + '_ {
        self.contacts.iter_mut()
    }

    pub fn arena_mut(&mut self) -> &mut Arena<Contact> {
        &mut self.contacts
    }

    pub fn arena(&self) -> &Arena<Contact> {
        &self.contacts
    }

    fn contacts_with_ids_mut(&mut self) -> impl Iterator<Item = (EntityId, &mut Contact)> + '_ {
        self.contacts.iter_mut().map(|contact| (contact.id, contact))
    }
}
