//! Forwarding intents.
//!
//! An intent is an immutable, declarative forwarding directive: traffic
//! matching a selector and entering at any ingress point is treated and
//! delivered to the egress point. Updates replace the intent stored under
//! the same [`IntentKey`]; intents are never mutated in place.

use crate::types::{ApplicationId, ConnectPoint};
use sdnip_types::{IpPrefix, IpVersion, MacAddress, VlanId};
use std::collections::BTreeSet;
use std::fmt;

/// Stable identity of an intent within an application.
///
/// Route intents are keyed by their prefix so that a route replacement
/// reuses the key of the intent it supersedes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IntentKey(String);

impl IntentKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Key of the route intent for `prefix`.
    pub fn for_prefix(prefix: &IpPrefix) -> Self {
        Self(prefix.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IntentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ethernet type matched by a selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EthType {
    Ipv4,
    Ipv6,
}

impl From<IpVersion> for EthType {
    fn from(version: IpVersion) -> Self {
        match version {
            IpVersion::V4 => EthType::Ipv4,
            IpVersion::V6 => EthType::Ipv6,
        }
    }
}

/// IP protocols matched by peer connectivity intents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IpProtocol {
    Tcp,
    Icmp,
    Icmpv6,
}

impl IpProtocol {
    /// The ICMP flavour of `version`.
    pub const fn icmp(version: IpVersion) -> Self {
        match version {
            IpVersion::V4 => IpProtocol::Icmp,
            IpVersion::V6 => IpProtocol::Icmpv6,
        }
    }
}

/// Match criteria of an intent. `None` fields match anything.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrafficSelector {
    pub eth_type: EthType,
    pub ip_proto: Option<IpProtocol>,
    pub ip_src: Option<IpPrefix>,
    pub ip_dst: Option<IpPrefix>,
    pub tcp_src: Option<u16>,
    pub tcp_dst: Option<u16>,
}

impl TrafficSelector {
    /// Matches every packet of `eth_type`.
    pub const fn new(eth_type: EthType) -> Self {
        Self {
            eth_type,
            ip_proto: None,
            ip_src: None,
            ip_dst: None,
            tcp_src: None,
            tcp_dst: None,
        }
    }
}

/// VLAN rewrite applied at the egress side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VlanEdit {
    /// Strip the tag; the egress interface is untagged.
    Pop,
    /// Set (pushing if absent) the egress interface's tag.
    Set(VlanId),
}

/// Actions applied to matching traffic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct TrafficTreatment {
    pub eth_dst: Option<MacAddress>,
    pub vlan: Option<VlanEdit>,
}

/// A connect point with an optional VLAN filter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FilteredConnectPoint {
    pub connect_point: ConnectPoint,
    pub vlan: Option<VlanId>,
}

impl FilteredConnectPoint {
    pub fn new(connect_point: ConnectPoint, vlan: Option<VlanId>) -> Self {
        Self {
            connect_point,
            vlan,
        }
    }
}

impl fmt::Display for FilteredConnectPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.vlan {
            Some(vlan) => write!(f, "{}[vlan {}]", self.connect_point, vlan),
            None => write!(f, "{}", self.connect_point),
        }
    }
}

/// Shape of the connectivity an intent describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntentKind {
    /// Route intent: every other border port towards one egress port
    MultiPointToSinglePoint,
    /// Peer connectivity between the BGP speaker and a peer
    PointToPoint,
}

/// A forwarding intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Intent {
    pub key: IntentKey,
    pub app_id: ApplicationId,
    pub kind: IntentKind,
    pub selector: TrafficSelector,
    pub treatment: TrafficTreatment,
    pub ingress_points: BTreeSet<FilteredConnectPoint>,
    pub egress_point: FilteredConnectPoint,
    pub priority: u32,
}

impl Intent {
    /// Returns true if both intents express the same forwarding behaviour.
    ///
    /// Keys are ignored: two intents stored under the same key can still
    /// differ in content, and that difference is what reconciliation acts
    /// on.
    pub fn same_content(&self, other: &Intent) -> bool {
        self.app_id == other.app_id
            && self.kind == other.kind
            && self.selector == other.selector
            && self.treatment == other.treatment
            && self.ingress_points == other.ingress_points
            && self.egress_point == other.egress_point
            && self.priority == other.priority
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} ingress -> {}, priority {})",
            self.key,
            self.ingress_points.len(),
            self.egress_point,
            self.priority
        )
    }
}

/// Lifecycle state of an intent in the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntentState {
    Installing,
    Installed,
    Withdrawing,
    Withdrawn,
    Failed,
}

impl IntentState {
    /// Returns true if the store is removing or has removed the intent.
    pub fn is_withdrawn(&self) -> bool {
        matches!(self, IntentState::Withdrawing | IntentState::Withdrawn)
    }
}
