//! Next-hop resolution bookkeeping.
//!
//! Tracks the routes whose intents are waiting for the link-layer address
//! of their next hop, and caches the addresses learned from host events.
//! The resolver holds no lock of its own: it is owned by the route
//! processor together with the RIB, so both are mutated inside the same
//! critical section.

use crate::types::Route;
use sdnip_types::{IpAddress, MacAddress};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Default)]
pub struct NextHopResolver {
    /// Routes waiting on each next hop.
    pending: HashMap<IpAddress, HashSet<Route>>,
    /// Best-effort IP to MAC cache.
    cache: HashMap<IpAddress, MacAddress>,
}

impl NextHopResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cached_mac(&self, ip: &IpAddress) -> Option<MacAddress> {
        self.cache.get(ip).copied()
    }

    /// Records a resolved address, returning the previously cached one.
    pub fn learn(&mut self, ip: IpAddress, mac: MacAddress) -> Option<MacAddress> {
        self.cache.insert(ip, mac)
    }

    /// Forgets the address of a removed host.
    pub fn forget(&mut self, ip: &IpAddress) -> Option<MacAddress> {
        self.cache.remove(ip)
    }

    /// Parks `route` until its next hop resolves.
    pub fn defer(&mut self, route: Route) {
        self.pending.entry(route.next_hop).or_default().insert(route);
    }

    /// Drops a parked route. Returns true if it was pending.
    pub fn cancel(&mut self, route: &Route) -> bool {
        let Some(routes) = self.pending.get_mut(&route.next_hop) else {
            return false;
        };
        let removed = routes.remove(route);
        if routes.is_empty() {
            self.pending.remove(&route.next_hop);
        }
        removed
    }

    /// Removes and returns every route waiting on `ip`.
    pub fn take_pending(&mut self, ip: &IpAddress) -> Vec<Route> {
        let mut routes: Vec<Route> = self
            .pending
            .remove(ip)
            .map(|set| set.into_iter().collect())
            .unwrap_or_default();
        routes.sort();
        routes
    }

    pub fn is_pending(&self, route: &Route) -> bool {
        self.pending
            .get(&route.next_hop)
            .is_some_and(|routes| routes.contains(route))
    }

    pub fn pending_count(&self) -> usize {
        self.pending.values().map(HashSet::len).sum()
    }
}
