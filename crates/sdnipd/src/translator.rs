//! Route to intent translation.
//!
//! A resolved route becomes a multipoint-to-single-point intent: traffic
//! for the prefix entering at any border interface is rewritten to the next
//! hop's MAC address and delivered to the interface facing the next hop.

use crate::config::IntentConfig;
use crate::error::{Result, SdnIpError};
use crate::intent::{
    EthType, FilteredConnectPoint, Intent, IntentKey, IntentKind, TrafficSelector,
    TrafficTreatment, VlanEdit,
};
use crate::services::{InterfaceService, PeerService};
use crate::types::{ApplicationId, Interface};
use sdnip_types::{IpAddress, IpPrefix, MacAddress};
use std::collections::BTreeSet;
use tracing::debug;

/// Builds route intents. Holds no mutable state.
#[derive(Debug, Clone)]
pub struct IntentTranslator {
    app_id: ApplicationId,
    priority_multiplier: u32,
    priority_offset: u32,
}

impl IntentTranslator {
    pub fn new(app_id: ApplicationId, config: &IntentConfig) -> Self {
        Self {
            app_id,
            priority_multiplier: config.priority_multiplier,
            priority_offset: config.priority_offset,
        }
    }

    pub fn app_id(&self) -> &ApplicationId {
        &self.app_id
    }

    /// Longer prefixes always win over shorter ones.
    ///
    /// Saturates at `u32::MAX`; [`IntentConfig::max_priority`] is checked at
    /// configuration time so a validated config never reaches it.
    pub fn priority(&self, prefix: &IpPrefix) -> u32 {
        u32::from(prefix.prefix_len())
            .saturating_mul(self.priority_multiplier)
            .saturating_add(self.priority_offset)
    }

    /// Finds the interface facing `next_hop`.
    ///
    /// Known BGP peers are located through their configured attachment
    /// point; any other next hop through the longest subnet match.
    pub fn egress_interface(
        &self,
        next_hop: &IpAddress,
        interfaces: &dyn InterfaceService,
        peers: &dyn PeerService,
    ) -> Option<Interface> {
        match peers.peer(next_hop) {
            Some(peer) => {
                debug!(next_hop = %next_hop, "Route to peer");
                interfaces.interface(&peer.connect_point)
            }
            None => {
                debug!(next_hop = %next_hop, "Route to non-peer");
                interfaces.matching_interface(next_hop)
            }
        }
    }

    /// Translates a resolved route into an intent.
    ///
    /// Fails with [`SdnIpError::NoEgressInterface`] when no configured
    /// interface reaches the next hop.
    pub fn translate(
        &self,
        prefix: &IpPrefix,
        next_hop: &IpAddress,
        next_hop_mac: MacAddress,
        interfaces: &dyn InterfaceService,
        peers: &dyn PeerService,
    ) -> Result<Intent> {
        let egress = self
            .egress_interface(next_hop, interfaces, peers)
            .ok_or(SdnIpError::NoEgressInterface(*next_hop))?;

        let ingress_points: BTreeSet<FilteredConnectPoint> = interfaces
            .interfaces()
            .into_iter()
            .filter(|intf| intf.connect_point != egress.connect_point)
            .map(|intf| FilteredConnectPoint::new(intf.connect_point, intf.vlan))
            .collect();

        let selector = TrafficSelector {
            ip_dst: (!prefix.is_default()).then_some(*prefix),
            ..TrafficSelector::new(EthType::from(prefix.version()))
        };

        let vlan_differs = ingress_points.iter().any(|point| point.vlan != egress.vlan);
        let treatment = TrafficTreatment {
            eth_dst: Some(next_hop_mac),
            vlan: match (vlan_differs, egress.vlan) {
                (false, _) => None,
                (true, None) => Some(VlanEdit::Pop),
                (true, Some(vlan)) => Some(VlanEdit::Set(vlan)),
            },
        };

        debug!(
            prefix = %prefix,
            mac = %next_hop_mac,
            egress = %egress.connect_point,
            "Built route intent"
        );

        Ok(Intent {
            key: IntentKey::for_prefix(prefix),
            app_id: self.app_id.clone(),
            kind: IntentKind::MultiPointToSinglePoint,
            selector,
            treatment,
            ingress_points,
            egress_point: FilteredConnectPoint::new(egress.connect_point, egress.vlan),
            priority: self.priority(prefix),
        })
    }
}
