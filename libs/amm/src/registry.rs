//! Tick arena and identity map
//!
//! Ticks live in a `Vec` indexed by [`TickId`] and are never removed; an
//! emptied tick keeps its id and simply drops out of [`TickRegistry::active_ids`].

use crate::errors::{Result, SphereError};
use crate::tick::{Geometry, Tick, TickId};
use serde::{Deserialize, Serialize};
use sphere_config::TickIdentity;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Identity a deposit resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TickKey {
    /// Deposit radius, absent under [`TickIdentity::PlaneOnly`]
    pub radius: Option<u128>,
    pub plane_constant: u128,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickRegistry {
    identity: TickIdentity,
    asset_count: usize,
    ticks: Vec<Tick>,
    keys: HashMap<TickKey, TickId>,
    /// Every tick that has ever been listed, in listing order
    listed: Vec<TickId>,
    seen: HashSet<TickId>,
}

impl TickRegistry {
    pub fn new(identity: TickIdentity, asset_count: usize) -> Self {
        Self {
            identity,
            asset_count,
            ticks: Vec::new(),
            keys: HashMap::new(),
            listed: Vec::new(),
            seen: HashSet::new(),
        }
    }

    pub fn identity(&self) -> TickIdentity {
        self.identity
    }

    pub fn key_for(&self, radius: u128, plane_constant: u128) -> TickKey {
        TickKey {
            radius: match self.identity {
                TickIdentity::RadiusAndPlane => Some(radius),
                TickIdentity::PlaneOnly => None,
            },
            plane_constant,
        }
    }

    pub fn lookup(&self, radius: u128, plane_constant: u128) -> Option<TickId> {
        self.keys.get(&self.key_for(radius, plane_constant)).copied()
    }

    /// Resolve a deposit to its tick, creating the tick if the identity is new.
    ///
    /// A new tick's plane constant is validated against `prospective_radius`,
    /// the radius the tick will have once the deposit lands.
    pub fn get_or_create(
        &mut self,
        geometry: &Geometry,
        radius: u128,
        plane_constant: u128,
        prospective_radius: u128,
    ) -> Result<TickId> {
        let key = self.key_for(radius, plane_constant);
        if let Some(&id) = self.keys.get(&key) {
            self.mark_listed(id);
            return Ok(id);
        }

        geometry.validate_plane_constant(plane_constant, prospective_radius)?;

        let next = u32::try_from(self.ticks.len() + 1)
            .map_err(|_| SphereError::Overflow("tick id"))?;
        let id = TickId(next);
        self.ticks
            .push(Tick::new(id, plane_constant, self.asset_count));
        self.keys.insert(key, id);
        self.mark_listed(id);

        debug!(tick = %id, plane_constant, radius, "created tick");
        Ok(id)
    }

    fn mark_listed(&mut self, id: TickId) {
        if self.seen.insert(id) {
            self.listed.push(id);
        }
    }

    fn index(&self, id: TickId) -> Result<usize> {
        let index = (id.0 as usize)
            .checked_sub(1)
            .ok_or(SphereError::TickNotFound(id))?;
        if index >= self.ticks.len() {
            return Err(SphereError::TickNotFound(id));
        }
        Ok(index)
    }

    pub fn get(&self, id: TickId) -> Result<&Tick> {
        let index = self.index(id)?;
        Ok(&self.ticks[index])
    }

    pub fn get_mut(&mut self, id: TickId) -> Result<&mut Tick> {
        let index = self.index(id)?;
        Ok(&mut self.ticks[index])
    }

    /// Listed ticks that currently hold reserves
    pub fn active_ids(&self) -> Vec<TickId> {
        self.listed
            .iter()
            .copied()
            .filter(|&id| self.get(id).map(Tick::is_active).unwrap_or(false))
            .collect()
    }

    pub fn listed_ids(&self) -> &[TickId] {
        &self.listed
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tick> {
        self.ticks.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Tick> {
        self.ticks.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }
}
