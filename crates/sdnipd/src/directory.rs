//! In-process interface, peer and host directories.
//!
//! These back the collaborator traits in [`crate::services`] when sdnipd
//! runs standalone: interfaces and peers come from the configuration file,
//! hosts are learned from address resolution events.

use crate::config::SdnIpConfig;
use crate::services::{HostService, InterfaceService, PeerService};
use crate::types::{BgpPeer, ConnectPoint, Interface};
use parking_lot::{Mutex, RwLock};
use sdnip_types::{IpAddress, MacAddress};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// Configured border interfaces and BGP peers.
#[derive(Debug, Default)]
pub struct InterfaceDirectory {
    interfaces: RwLock<Vec<Interface>>,
    peers: RwLock<HashMap<IpAddress, BgpPeer>>,
}

impl InterfaceDirectory {
    pub fn new(interfaces: Vec<Interface>, peers: Vec<BgpPeer>) -> Self {
        Self {
            interfaces: RwLock::new(interfaces),
            peers: RwLock::new(
                peers
                    .into_iter()
                    .map(|peer| (peer.ip_address, peer))
                    .collect(),
            ),
        }
    }

    pub fn from_config(config: &SdnIpConfig) -> Self {
        Self::new(config.interfaces(), config.bgp_peers())
    }

    /// Adds or replaces the interface at the same connect point.
    pub fn add_interface(&self, interface: Interface) {
        let mut interfaces = self.interfaces.write();
        debug!(name = %interface.name, connect_point = %interface.connect_point, "Adding interface");
        match interfaces
            .iter_mut()
            .find(|intf| intf.connect_point == interface.connect_point)
        {
            Some(existing) => *existing = interface,
            None => interfaces.push(interface),
        }
    }

    /// Returns the removed interface, if any.
    pub fn remove_interface(&self, connect_point: &ConnectPoint) -> Option<Interface> {
        let mut interfaces = self.interfaces.write();
        let pos = interfaces
            .iter()
            .position(|intf| &intf.connect_point == connect_point)?;
        debug!(connect_point = %connect_point, "Removing interface");
        Some(interfaces.remove(pos))
    }

    pub fn add_peer(&self, peer: BgpPeer) {
        self.peers.write().insert(peer.ip_address, peer);
    }

    pub fn peers(&self) -> Vec<BgpPeer> {
        let mut peers: Vec<BgpPeer> = self.peers.read().values().cloned().collect();
        peers.sort_by_key(|peer| peer.ip_address);
        peers
    }
}

impl InterfaceService for InterfaceDirectory {
    fn interfaces(&self) -> Vec<Interface> {
        self.interfaces.read().clone()
    }

    fn interface(&self, connect_point: &ConnectPoint) -> Option<Interface> {
        self.interfaces
            .read()
            .iter()
            .find(|intf| &intf.connect_point == connect_point)
            .cloned()
    }

    fn matching_interface(&self, ip: &IpAddress) -> Option<Interface> {
        let interfaces = self.interfaces.read();
        let mut best: Option<(u8, &Interface)> = None;
        for intf in interfaces.iter() {
            let Some(len) = intf.longest_match(ip) else {
                continue;
            };
            // First configured interface wins a tie
            if best.map_or(true, |(best_len, _)| len > best_len) {
                best = Some((len, intf));
            }
        }
        best.map(|(_, intf)| intf.clone())
    }
}

impl PeerService for InterfaceDirectory {
    fn peer(&self, ip: &IpAddress) -> Option<BgpPeer> {
        self.peers.read().get(ip).cloned()
    }
}

#[derive(Debug, Default)]
struct HostTableInner {
    hosts: HashMap<IpAddress, MacAddress>,
    monitored: BTreeSet<IpAddress>,
}

/// Known hosts and the addresses the control plane asked to resolve.
#[derive(Debug, Default)]
pub struct HostTable {
    inner: Mutex<HostTableInner>,
}

impl HostTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a host; returns the previously known MAC.
    pub fn add_host(&self, ip: IpAddress, mac: MacAddress) -> Option<MacAddress> {
        self.inner.lock().hosts.insert(ip, mac)
    }

    pub fn remove_host(&self, ip: &IpAddress) -> Option<MacAddress> {
        self.inner.lock().hosts.remove(ip)
    }

    pub fn is_monitored(&self, ip: &IpAddress) -> bool {
        self.inner.lock().monitored.contains(ip)
    }

    /// Addresses resolution was requested for, in address order.
    pub fn monitored(&self) -> Vec<IpAddress> {
        self.inner.lock().monitored.iter().copied().collect()
    }
}

impl HostService for HostTable {
    fn start_monitoring_ip(&self, ip: &IpAddress) {
        if self.inner.lock().monitored.insert(*ip) {
            debug!(ip = %ip, "Monitoring host");
        }
    }

    fn mac_of(&self, ip: &IpAddress) -> Option<MacAddress> {
        self.inner.lock().hosts.get(ip).copied()
    }
}
