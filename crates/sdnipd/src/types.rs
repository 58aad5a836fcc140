//! Core types for the route pipeline.

use sdnip_types::{IpAddress, IpPrefix, MacAddress, ParseError, VlanId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of the application that owns a set of intents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicationId(String);

impl ApplicationId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A best route for a prefix as learned from the routing feed.
///
/// An unspecified next hop (`0.0.0.0` / `::`) marks a route originated by
/// the local BGP speaker; such routes are kept in the RIB but never produce
/// intents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Route {
    pub prefix: IpPrefix,
    pub next_hop: IpAddress,
}

impl Route {
    pub fn new(prefix: IpPrefix, next_hop: IpAddress) -> Self {
        Self { prefix, next_hop }
    }

    /// Returns true if the route was originated locally.
    pub fn is_local(&self) -> bool {
        self.next_hop.is_unspecified()
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} via {}", self.prefix, self.next_hop)
    }
}

/// Kind of a route update.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RouteUpdateKind {
    /// Add or replace the best route for the prefix
    Update,
    /// Remove the route for the prefix
    Delete,
    /// A kind the feed could not classify; skipped by the pipeline
    Unrecognized(String),
}

impl From<&str> for RouteUpdateKind {
    fn from(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "UPDATE" => Self::Update,
            "DELETE" => Self::Delete,
            _ => Self::Unrecognized(s.to_string()),
        }
    }
}

impl fmt::Display for RouteUpdateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Update => write!(f, "UPDATE"),
            Self::Delete => write!(f, "DELETE"),
            Self::Unrecognized(kind) => write!(f, "{}", kind),
        }
    }
}

/// A single update from the routing feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteUpdate {
    pub kind: RouteUpdateKind,
    pub route: Route,
}

impl RouteUpdate {
    pub fn update(route: Route) -> Self {
        Self {
            kind: RouteUpdateKind::Update,
            route,
        }
    }

    pub fn delete(route: Route) -> Self {
        Self {
            kind: RouteUpdateKind::Delete,
            route,
        }
    }
}

/// A switch port where traffic enters or leaves the SDN network.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectPoint {
    pub device_id: String,
    pub port: u32,
}

impl ConnectPoint {
    pub fn new(device_id: impl Into<String>, port: u32) -> Self {
        Self {
            device_id: device_id.into(),
            port,
        }
    }
}

impl fmt::Display for ConnectPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.device_id, self.port)
    }
}

/// An address configured on an interface together with its subnet.
///
/// Written as `"192.168.1.254/24"` in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InterfaceIpAddress {
    pub ip_address: IpAddress,
    pub subnet: IpPrefix,
}

impl FromStr for InterfaceIpAddress {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, _) = s
            .rsplit_once('/')
            .ok_or_else(|| ParseError::InvalidIpPrefix(s.to_string()))?;
        Ok(Self {
            ip_address: addr.parse()?,
            subnet: s.parse()?,
        })
    }
}

impl TryFrom<String> for InterfaceIpAddress {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<InterfaceIpAddress> for String {
    fn from(addr: InterfaceIpAddress) -> String {
        format!("{}/{}", addr.ip_address, addr.subnet.prefix_len())
    }
}

/// A border interface of the SDN network facing external routers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    pub name: String,
    pub connect_point: ConnectPoint,
    pub ip_addresses: Vec<InterfaceIpAddress>,
    pub mac: MacAddress,
    pub vlan: Option<VlanId>,
}

impl Interface {
    /// Length of the longest configured subnet containing `ip`.
    pub fn longest_match(&self, ip: &IpAddress) -> Option<u8> {
        self.ip_addresses
            .iter()
            .filter(|addr| addr.subnet.contains(*ip))
            .map(|addr| addr.subnet.prefix_len())
            .max()
    }
}

/// An external BGP peer and the attachment point it is reached through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BgpPeer {
    pub ip_address: IpAddress,
    pub connect_point: ConnectPoint,
    pub interface_name: Option<String>,
}

/// Address a BGP speaker uses on the subnet behind one border interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeakerAddress {
    pub connect_point: ConnectPoint,
    pub ip_address: IpAddress,
}

/// A BGP speaker attached to the fabric. Its sessions with external peers
/// are carried by point-to-point intents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BgpSpeaker {
    pub name: String,
    pub connect_point: ConnectPoint,
    pub mac: MacAddress,
    pub addresses: Vec<SpeakerAddress>,
}

impl BgpSpeaker {
    /// Address the speaker uses towards `peer`: the one configured for the
    /// peer's attachment point, in the peer's address family.
    pub fn address_towards(&self, peer: &BgpPeer) -> Option<IpAddress> {
        self.addresses
            .iter()
            .find(|addr| {
                addr.connect_point == peer.connect_point
                    && addr.ip_address.version() == peer.ip_address.version()
            })
            .map(|addr| addr.ip_address)
    }
}
