//! BGP peer connectivity.
//!
//! BGP sessions between the fabric's speakers and the external peers are
//! carried by point-to-point intents: TCP to and from port 179 plus ICMP,
//! in both directions, for every speaker and peer pair that share a border
//! interface.

use crate::config::IntentConfig;
use crate::intent::{
    EthType, FilteredConnectPoint, Intent, IntentKey, IntentKind, IpProtocol, TrafficSelector,
    TrafficTreatment,
};
use crate::services::InterfaceService;
use crate::types::{ApplicationId, BgpPeer, BgpSpeaker, ConnectPoint};
use sdnip_types::{IpAddress, IpPrefix};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

pub const BGP_PORT: u16 = 179;

/// One direction of a speaker/peer path.
struct Path<'a> {
    src: IpAddress,
    dst: IpAddress,
    ingress: &'a ConnectPoint,
    egress: &'a ConnectPoint,
}

/// Builds the point-to-point intents for BGP sessions.
#[derive(Debug, Clone)]
pub struct PeerConnectivity {
    app_id: ApplicationId,
    priority: u32,
}

impl PeerConnectivity {
    pub fn new(app_id: ApplicationId, config: &IntentConfig) -> Self {
        Self {
            app_id,
            priority: config.priority_offset,
        }
    }

    /// Intents for every speaker and peer pair.
    ///
    /// Peers whose attachment point is not a known interface, and speakers
    /// with no address on a peer's interface, are skipped.
    pub fn intents(
        &self,
        speakers: &[BgpSpeaker],
        peers: &[BgpPeer],
        interfaces: &dyn InterfaceService,
    ) -> Vec<Intent> {
        let mut intents = Vec::new();
        for peer in peers {
            let Some(interface) = interfaces.interface(&peer.connect_point) else {
                warn!(peer = %peer.ip_address, connect_point = %peer.connect_point, "No interface for BGP peer");
                continue;
            };
            for speaker in speakers {
                let Some(speaker_ip) = speaker.address_towards(peer) else {
                    warn!(
                        speaker = %speaker.name,
                        peer = %peer.ip_address,
                        "BGP speaker has no address on the peer's interface"
                    );
                    continue;
                };
                debug!(speaker = %speaker.name, peer = %peer.ip_address, "Connecting BGP speaker to peer");
                let outbound = Path {
                    src: speaker_ip,
                    dst: peer.ip_address,
                    ingress: &speaker.connect_point,
                    egress: &interface.connect_point,
                };
                let inbound = Path {
                    src: peer.ip_address,
                    dst: speaker_ip,
                    ingress: &interface.connect_point,
                    egress: &speaker.connect_point,
                };
                for path in [&outbound, &inbound] {
                    self.bgp_intents(path, &mut intents);
                }
                for path in [&outbound, &inbound] {
                    intents.push(self.icmp_intent(path));
                }
            }
        }
        info!(
            speakers = speakers.len(),
            peers = peers.len(),
            intents = intents.len(),
            "Built BGP peer connectivity"
        );
        intents
    }

    fn bgp_intents(&self, path: &Path<'_>, intents: &mut Vec<Intent>) {
        let tcp = TrafficSelector {
            ip_proto: Some(IpProtocol::Tcp),
            ..self.selector(path)
        };
        intents.push(self.intent(
            format!("bgp:{}->{}:dst", path.src, path.dst),
            TrafficSelector {
                tcp_dst: Some(BGP_PORT),
                ..tcp.clone()
            },
            path,
        ));
        intents.push(self.intent(
            format!("bgp:{}->{}:src", path.src, path.dst),
            TrafficSelector {
                tcp_src: Some(BGP_PORT),
                ..tcp
            },
            path,
        ));
    }

    fn icmp_intent(&self, path: &Path<'_>) -> Intent {
        self.intent(
            format!("icmp:{}->{}", path.src, path.dst),
            TrafficSelector {
                ip_proto: Some(IpProtocol::icmp(path.src.version())),
                ..self.selector(path)
            },
            path,
        )
    }

    fn selector(&self, path: &Path<'_>) -> TrafficSelector {
        TrafficSelector {
            ip_src: Some(IpPrefix::host(path.src)),
            ip_dst: Some(IpPrefix::host(path.dst)),
            ..TrafficSelector::new(EthType::from(path.src.version()))
        }
    }

    fn intent(&self, key: String, selector: TrafficSelector, path: &Path<'_>) -> Intent {
        Intent {
            key: IntentKey::new(key),
            app_id: self.app_id.clone(),
            kind: IntentKind::PointToPoint,
            selector,
            treatment: TrafficTreatment::default(),
            ingress_points: BTreeSet::from([FilteredConnectPoint::new(path.ingress.clone(), None)]),
            egress_point: FilteredConnectPoint::new(path.egress.clone(), None),
            priority: self.priority,
        }
    }
}
