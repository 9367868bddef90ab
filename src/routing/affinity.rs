//! Device-to-router affinity learned from uplink traffic

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::time::Instant;

use crate::message::{DevAddr, RouterId};

/// Default time a router stays a downlink candidate after hearing a device
pub const DEFAULT_AFFINITY_FRESHNESS: Duration = Duration::from_secs(600);

#[derive(Debug, Clone)]
struct Sighting {
    router_id: RouterId,
    seen_at: Instant,
}

/// Which routers recently heard which devices
#[derive(Debug)]
pub struct AffinityTable {
    /// Sightings per device, most recent first
    devices: RwLock<HashMap<DevAddr, Vec<Sighting>>>,
    freshness: Duration,
}

impl AffinityTable {
    pub fn new(freshness: Duration) -> Self {
        Self {
            devices: RwLock::new(HashMap::new()),
            freshness,
        }
    }

    /// Record that `router_id` heard `dev_addr` at `seen_at`
    pub fn record(&self, dev_addr: DevAddr, router_id: &RouterId, seen_at: Instant) {
        let mut devices = self.devices.write();
        let sightings = devices.entry(dev_addr).or_default();

        if let Some(pos) = sightings.iter().position(|s| &s.router_id == router_id) {
            let mut sighting = sightings.remove(pos);
            if seen_at > sighting.seen_at {
                sighting.seen_at = seen_at;
            }
            sightings.push(sighting);
        } else {
            sightings.push(Sighting {
                router_id: router_id.clone(),
                seen_at,
            });
        }
        sightings.sort_by(|a, b| b.seen_at.cmp(&a.seen_at));
    }

    /// Routers that heard the device within the freshness window, most recent first
    pub fn routers(&self, dev_addr: DevAddr) -> Vec<RouterId> {
        let now = Instant::now();

        self.devices
            .read()
            .get(&dev_addr)
            .map(|sightings| {
                sightings
                    .iter()
                    .filter(|s| now.duration_since(s.seen_at) <= self.freshness)
                    .map(|s| s.router_id.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Forget a router entirely
    pub fn forget_router(&self, router_id: &RouterId) {
        let mut devices = self.devices.write();
        for sightings in devices.values_mut() {
            sightings.retain(|s| &s.router_id != router_id);
        }
        devices.retain(|_, sightings| !sightings.is_empty());
    }

    /// Drop stale sightings; returns how many devices were forgotten
    pub fn purge(&self) -> usize {
        let now = Instant::now();
        let mut devices = self.devices.write();
        let before = devices.len();

        for sightings in devices.values_mut() {
            sightings.retain(|s| now.duration_since(s.seen_at) <= self.freshness);
        }
        devices.retain(|_, sightings| !sightings.is_empty());

        before - devices.len()
    }

    /// Number of devices with at least one sighting
    pub fn len(&self) -> usize {
        self.devices.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
