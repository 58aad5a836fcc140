//! Routing Information Base.
//!
//! One [`RouteTable`] per IP version holds the single best route for each
//! prefix. Lookups are exact-match on the prefix; longest-prefix-match is
//! recovered later through intent priorities.

use crate::types::Route;
use sdnip_types::{IpPrefix, IpVersion};
use std::collections::HashMap;
use tracing::warn;

/// Fixed-length binary key of a prefix within one IP version.
///
/// The prefix length is part of the key, so `10.0.0.0/8` and
/// `10.0.0.0/16` never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RouteTableKey {
    prefix_len: u8,
    bits: u128,
}

impl From<&IpPrefix> for RouteTableKey {
    fn from(prefix: &IpPrefix) -> Self {
        Self {
            prefix_len: prefix.prefix_len(),
            bits: prefix.network_bits(),
        }
    }
}

/// Exact-match prefix store for a single IP version.
#[derive(Debug)]
pub struct RouteTable {
    version: IpVersion,
    routes: HashMap<RouteTableKey, Route>,
}

impl RouteTable {
    pub fn new(version: IpVersion) -> Self {
        Self {
            version,
            routes: HashMap::new(),
        }
    }

    pub fn version(&self) -> IpVersion {
        self.version
    }

    fn accepts(&self, prefix: &IpPrefix) -> bool {
        if prefix.version() != self.version {
            warn!(
                prefix = %prefix,
                table = %self.version,
                "Prefix does not belong to this route table"
            );
            return false;
        }
        true
    }

    pub fn find(&self, prefix: &IpPrefix) -> Option<&Route> {
        if prefix.version() != self.version {
            return None;
        }
        self.routes.get(&RouteTableKey::from(prefix))
    }

    /// Stores `route` as the best route for its prefix and returns the route
    /// it replaced.
    pub fn insert(&mut self, route: Route) -> Option<Route> {
        if !self.accepts(&route.prefix) {
            return None;
        }
        self.routes.insert(RouteTableKey::from(&route.prefix), route)
    }

    /// Returns true if a route was removed.
    pub fn remove(&mut self, prefix: &IpPrefix) -> bool {
        if prefix.version() != self.version {
            return false;
        }
        self.routes.remove(&RouteTableKey::from(prefix)).is_some()
    }

    /// Snapshot of every stored route.
    pub fn routes(&self) -> Vec<Route> {
        self.routes.values().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Route tables for both IP versions.
#[derive(Debug)]
pub struct Rib {
    v4: RouteTable,
    v6: RouteTable,
}

impl Default for Rib {
    fn default() -> Self {
        Self {
            v4: RouteTable::new(IpVersion::V4),
            v6: RouteTable::new(IpVersion::V6),
        }
    }
}

impl Rib {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(&self, version: IpVersion) -> &RouteTable {
        match version {
            IpVersion::V4 => &self.v4,
            IpVersion::V6 => &self.v6,
        }
    }

    fn table_mut(&mut self, version: IpVersion) -> &mut RouteTable {
        match version {
            IpVersion::V4 => &mut self.v4,
            IpVersion::V6 => &mut self.v6,
        }
    }

    pub fn find(&self, prefix: &IpPrefix) -> Option<&Route> {
        self.table(prefix.version()).find(prefix)
    }

    pub fn insert(&mut self, route: Route) -> Option<Route> {
        self.table_mut(route.prefix.version()).insert(route)
    }

    pub fn remove(&mut self, prefix: &IpPrefix) -> bool {
        self.table_mut(prefix.version()).remove(prefix)
    }

    /// All routes, IPv4 first.
    pub fn routes(&self) -> Vec<Route> {
        let mut routes = self.v4.routes();
        routes.extend(self.v6.routes());
        routes
    }

    pub fn len(&self) -> usize {
        self.v4.len() + self.v6.len()
    }

    pub fn is_empty(&self) -> bool {
        self.v4.is_empty() && self.v6.is_empty()
    }
}
