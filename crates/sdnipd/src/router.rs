//! Control-plane facade.
//!
//! Wires the route processor to the intent synchronizer and exposes the
//! entry points external collaborators call: the routing feed, host
//! events, topology changes and the leadership signal.

use crate::config::{IntentConfig, SdnIpConfig};
use crate::error::{Result, SdnIpError};
use crate::intent::Intent;
use crate::leadership::LeadershipState;
use crate::peer::PeerConnectivity;
use crate::processor::{RouteProcessor, RouterEvent, RouterSnapshot, RouterState};
use crate::services::{HostService, IntentStore, InterfaceService, PeerService};
use crate::synchronizer::IntentSynchronizer;
use crate::translator::IntentTranslator;
use crate::types::{ApplicationId, Route, RouteUpdate};
use parking_lot::Mutex;
use sdnip_types::{IpAddress, MacAddress};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

const PROCESSOR: &str = "route processor";

/// External services the router consumes.
#[derive(Clone)]
pub struct RouterServices {
    pub hosts: Arc<dyn HostService>,
    pub interfaces: Arc<dyn InterfaceService>,
    pub peers: Arc<dyn PeerService>,
    pub store: Arc<dyn IntentStore>,
}

pub struct Router {
    events: mpsc::UnboundedSender<RouterEvent>,
    synchronizer: Arc<IntentSynchronizer>,
    cancel: CancellationToken,
    processor: Mutex<Option<JoinHandle<()>>>,
}

impl Router {
    /// Starts the route processor and the intent synchronizer on the current
    /// runtime. The router starts as a follower.
    pub fn start(app_id: ApplicationId, intents: &IntentConfig, services: RouterServices) -> Self {
        let cancel = CancellationToken::new();
        let synchronizer = Arc::new(IntentSynchronizer::start(
            app_id.clone(),
            services.store,
            cancel.child_token(),
        ));

        let state = RouterState::new(
            IntentTranslator::new(app_id.clone(), intents),
            services.hosts,
            services.interfaces,
            services.peers,
        );
        let (events, rx) = mpsc::unbounded_channel();
        let processor =
            RouteProcessor::new(state, Arc::clone(&synchronizer)).spawn(rx, cancel.child_token());

        info!(app_id = %app_id, "SDN-IP router started");
        Self {
            events,
            synchronizer,
            cancel,
            processor: Mutex::new(Some(processor)),
        }
    }

    /// Starts the router and submits the BGP peer connectivity intents
    /// derived from the configured speakers and peers.
    pub fn from_config(config: &SdnIpConfig, services: RouterServices) -> Self {
        let interfaces = Arc::clone(&services.interfaces);
        let router = Self::start(config.app_id(), &config.intents, services);
        let peering = PeerConnectivity::new(config.app_id(), &config.intents).intents(
            &config.bgp_speakers(),
            &config.bgp_peers(),
            interfaces.as_ref(),
        );
        if !peering.is_empty() {
            router.submit_peer_intents(peering);
        }
        router
    }

    fn send(&self, event: RouterEvent) -> Result<()> {
        self.events
            .send(event)
            .map_err(|_| SdnIpError::ChannelClosed(PROCESSOR))
    }

    /// Routing feed entry point. Batches are applied in call order.
    pub fn update(&self, updates: Vec<RouteUpdate>) -> Result<()> {
        if updates.is_empty() {
            return Ok(());
        }
        self.send(RouterEvent::Routes(updates))
    }

    /// Address resolution event.
    pub fn host_updated(&self, ip: IpAddress, mac: MacAddress) -> Result<()> {
        self.send(RouterEvent::HostUpdated { ip, mac })
    }

    pub fn host_removed(&self, ip: IpAddress) -> Result<()> {
        self.send(RouterEvent::HostRemoved(ip))
    }

    /// Interface directory change notification.
    pub fn interfaces_changed(&self) -> Result<()> {
        self.send(RouterEvent::InterfacesChanged)
    }

    /// Leadership signal from the election service.
    pub fn leader_changed(&self, is_leader: bool) {
        self.synchronizer.on_leadership_changed(is_leader);
    }

    pub fn submit_peer_intents(&self, intents: Vec<Intent>) {
        self.synchronizer.submit_peer_intents(intents);
    }

    pub fn leadership(&self) -> LeadershipState {
        self.synchronizer.leadership()
    }

    pub fn synchronizer(&self) -> &IntentSynchronizer {
        &self.synchronizer
    }

    async fn snapshot(&self) -> Result<RouterSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(RouterEvent::Snapshot(reply))?;
        rx.await.map_err(|_| SdnIpError::ChannelClosed(PROCESSOR))
    }

    /// Every route in the RIB, IPv4 first.
    pub async fn routes(&self) -> Result<Vec<Route>> {
        Ok(self.snapshot().await?.routes)
    }

    /// Number of routes waiting on next-hop resolution.
    pub async fn pending_routes(&self) -> Result<usize> {
        Ok(self.snapshot().await?.pending)
    }

    /// Waits until every event sent so far has reached the intent store
    /// (or been buffered, when not leader).
    pub async fn flush(&self) -> Result<()> {
        self.snapshot().await?;
        self.synchronizer.flush().await
    }

    /// Withdraws this application's intents if leader and forgets the
    /// desired set.
    pub async fn remove_all(&self) -> Result<()> {
        self.synchronizer.remove_all().await
    }

    /// Stops both workers immediately; queued events are discarded.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let processor = self.processor.lock().take();
        if let Some(processor) = processor {
            if let Err(e) = processor.await {
                warn!(error = %e, "Route processor failed");
            }
        }
        self.synchronizer.shutdown().await;
        info!("SDN-IP router stopped");
    }
}
