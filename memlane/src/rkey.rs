//! Remote memory keys and their per-endpoint resolution cache.
//!
//! Resolving a key against an endpoint picks the endpoint's configured RMA
//! lane and snapshots the lane-level key plus the SHORT fast-path limit.
//! The snapshot is cached inside the key, tagged with the endpoint's
//! configuration generation; changing the endpoint's lane bumps the
//! generation and invalidates every cached entry.

use std::cell::Cell;

use crate::endpoint::EndpointInner;
use crate::error::{Error, Result};

/// Resolved view of a remote key for one endpoint configuration.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RkeyCache {
    pub(crate) cfg_generation: u64,
    pub(crate) lane: usize,
    pub(crate) lane_rkey: u64,
    pub(crate) max_put_short: usize,
}

/// Opaque key granting access to a remote memory region.
///
/// How keys are exchanged between peers is out of scope; callers construct
/// one from whatever raw value their control plane delivered.
#[derive(Debug)]
pub struct RemoteKey {
    raw: u64,
    cache: Cell<Option<RkeyCache>>,
}

impl RemoteKey {
    /// Wrap a raw key value.
    pub fn new(raw: u64) -> Self {
        Self {
            raw,
            cache: Cell::new(None),
        }
    }

    /// The raw key value.
    pub fn raw(&self) -> u64 {
        self.raw
    }

    /// Resolve against `ep`, reusing the cached entry while the endpoint
    /// configuration generation matches.
    pub(crate) fn resolve(&self, ep: &EndpointInner) -> Result<RkeyCache> {
        let generation = ep.cfg_generation.get();
        if let Some(cached) = self.cache.get() {
            if cached.cfg_generation == generation {
                return Ok(cached);
            }
        }
        let lane = ep.rma_lane.get();
        let lane_obj = ep.lanes.get(lane).ok_or(Error::NoLane(lane))?;
        let entry = RkeyCache {
            cfg_generation: generation,
            lane,
            lane_rkey: self.raw,
            max_put_short: lane_obj.caps().max_put_short,
        };
        self.cache.set(Some(entry));
        Ok(entry)
    }
}
