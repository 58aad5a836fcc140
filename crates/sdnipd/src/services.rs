//! Contracts of the collaborators this control plane consumes.
//!
//! The routing feed, host tracking, interface configuration, remote intent
//! store and leadership election all live outside this crate. They are
//! reached through the narrow traits below so that any implementation (or a
//! test double) can be plugged in.

use crate::error::Result;
use crate::intent::{Intent, IntentKey, IntentState};
use crate::types::{ApplicationId, BgpPeer, ConnectPoint, Interface};
use async_trait::async_trait;
use sdnip_types::{IpAddress, MacAddress};

/// Host and address resolution service.
pub trait HostService: Send + Sync {
    /// Asks the service to resolve `ip` and report it through a host event.
    fn start_monitoring_ip(&self, ip: &IpAddress);

    /// Currently known link-layer address of `ip`, if any.
    fn mac_of(&self, ip: &IpAddress) -> Option<MacAddress>;
}

/// Read-only view of the configured border interfaces.
pub trait InterfaceService: Send + Sync {
    fn interfaces(&self) -> Vec<Interface>;

    fn interface(&self, connect_point: &ConnectPoint) -> Option<Interface>;

    /// Interface whose configured subnet contains `ip`, preferring the
    /// longest matching subnet.
    fn matching_interface(&self, ip: &IpAddress) -> Option<Interface>;
}

/// Configured BGP peers.
pub trait PeerService: Send + Sync {
    fn peer(&self, ip: &IpAddress) -> Option<BgpPeer>;
}

/// The distributed intent store.
///
/// Operations are assumed idempotent and eventually consistent. Submitting
/// an intent under an existing key replaces the stored intent.
#[async_trait]
pub trait IntentStore: Send + Sync {
    async fn intents_for_app(&self, app_id: &ApplicationId) -> Result<Vec<Intent>>;

    /// Lifecycle state of a stored intent; `None` if the store has no record.
    async fn state(&self, app_id: &ApplicationId, key: &IntentKey) -> Result<Option<IntentState>>;

    async fn submit(&self, intent: &Intent) -> Result<()>;

    async fn withdraw(&self, intent: &Intent) -> Result<()>;
}
