//! SDN-IP routing control plane
//!
//! Turns BGP-learned routes into network-wide forwarding intents and keeps
//! them in sync with a distributed intent store, with exactly one instance
//! of a cluster writing at a time.
//!
//! # Architecture
//!
//! ```text
//!  routing feed ──┐
//!  host events  ──┼──▶ RouteProcessor ──▶ IntentSynchronizer ──▶ intent store
//!  topology     ──┘    (RIB, pending,     (desired set,
//!                       address cache)     leadership)
//!                                               ▲
//!  leadership signal ───────────────────────────┘
//! ```
//!
//! - [`rib`]: exact-match route tables, one per IP version
//! - [`resolver`]: routes waiting on next-hop MAC resolution
//! - [`translator`]: route to multipoint-to-single-point intent
//! - [`processor`]: the single-writer route pipeline
//! - [`peer`]: point-to-point intents for BGP sessions
//! - [`synchronizer`]: leader-gated reconciliation with the store
//! - [`router`]: facade wiring the pieces together

pub mod config;
pub mod directory;
pub mod error;
pub mod intent;
pub mod leadership;
pub mod peer;
pub mod processor;
pub mod resolver;
pub mod rib;
pub mod router;
pub mod services;
pub mod store;
pub mod synchronizer;
pub mod translator;
pub mod types;

pub use config::{
    BgpPeerConfig, BgpSpeakerConfig, IntentConfig, InterfaceConfig, SdnIpConfig,
    SpeakerAddressConfig,
};
pub use directory::{HostTable, InterfaceDirectory};
pub use error::{Result, SdnIpError};
pub use intent::{
    EthType, FilteredConnectPoint, Intent, IntentKey, IntentKind, IntentState, IpProtocol,
    TrafficSelector, TrafficTreatment, VlanEdit,
};
pub use leadership::{Leadership, LeadershipState};
pub use peer::PeerConnectivity;
pub use processor::{IntentDiff, RouteProcessor, RouterEvent, RouterSnapshot, RouterState};
pub use resolver::NextHopResolver;
pub use rib::{Rib, RouteTable};
pub use router::{Router, RouterServices};
pub use services::{HostService, IntentStore, InterfaceService, PeerService};
pub use store::{MemoryIntentStore, StoreCall};
pub use synchronizer::{IntentSynchronizer, ReconcilePlan};
pub use translator::IntentTranslator;
pub use types::{
    ApplicationId, BgpPeer, BgpSpeaker, ConnectPoint, Interface, InterfaceIpAddress, Route,
    RouteUpdate, RouteUpdateKind, SpeakerAddress,
};
