//! Route update pipeline.
//!
//! [`RouterState`] owns the RIB together with the pending-resolution set and
//! the address cache. It is driven by a single [`RouteProcessor`] task, so
//! route batches, host events and topology events each mutate all three
//! structures as one unit and never observe each other half-applied.
//!
//! Each event produces an [`IntentDiff`] that is handed to the intent
//! synchronizer in one call.

use crate::error::SdnIpError;
use crate::intent::{Intent, IntentKey};
use crate::resolver::NextHopResolver;
use crate::rib::Rib;
use crate::services::{HostService, InterfaceService, PeerService};
use crate::synchronizer::IntentSynchronizer;
use crate::translator::IntentTranslator;
use crate::types::{Route, RouteUpdate, RouteUpdateKind};
use sdnip_types::{IpAddress, IpPrefix, MacAddress};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Intent changes produced by one event.
///
/// Applying every withdrawal and then every submission has the same effect
/// as applying the changes in the order they were made.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntentDiff {
    pub withdraw: BTreeSet<IntentKey>,
    pub submit: BTreeMap<IntentKey, Intent>,
}

impl IntentDiff {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn withdraw(&mut self, key: IntentKey) {
        self.submit.remove(&key);
        self.withdraw.insert(key);
    }

    pub fn submit(&mut self, intent: Intent) {
        self.submit.insert(intent.key.clone(), intent);
    }

    pub fn is_empty(&self) -> bool {
        self.withdraw.is_empty() && self.submit.is_empty()
    }

    /// Submissions and withdrawals, in key order.
    pub fn into_parts(self) -> (Vec<Intent>, Vec<IntentKey>) {
        (
            self.submit.into_values().collect(),
            self.withdraw.into_iter().collect(),
        )
    }
}

/// RIB, pending resolutions and address cache, plus the read-only
/// collaborators needed to turn routes into intents.
pub struct RouterState {
    rib: Rib,
    resolver: NextHopResolver,
    /// Prefixes with a route intent, and the MAC it rewrites to
    installed: HashMap<IpPrefix, MacAddress>,
    translator: IntentTranslator,
    hosts: Arc<dyn HostService>,
    interfaces: Arc<dyn InterfaceService>,
    peers: Arc<dyn PeerService>,
}

impl RouterState {
    pub fn new(
        translator: IntentTranslator,
        hosts: Arc<dyn HostService>,
        interfaces: Arc<dyn InterfaceService>,
        peers: Arc<dyn PeerService>,
    ) -> Self {
        Self {
            rib: Rib::new(),
            resolver: NextHopResolver::new(),
            installed: HashMap::new(),
            translator,
            hosts,
            interfaces,
            peers,
        }
    }

    pub fn rib(&self) -> &Rib {
        &self.rib
    }

    pub fn resolver(&self) -> &NextHopResolver {
        &self.resolver
    }

    /// Applies a batch of route updates in order.
    #[instrument(skip(self, updates), fields(count = updates.len()))]
    pub fn apply_updates(&mut self, updates: Vec<RouteUpdate>) -> IntentDiff {
        let mut diff = IntentDiff::new();
        for update in updates {
            match update.kind {
                RouteUpdateKind::Update => self.apply_update(update.route, &mut diff),
                RouteUpdateKind::Delete => self.apply_delete(update.route, &mut diff),
                RouteUpdateKind::Unrecognized(kind) => {
                    let err = SdnIpError::UnknownUpdateKind(kind);
                    error!(route = %update.route, error = %err, "Skipping route update");
                }
            }
        }
        diff
    }

    fn apply_update(&mut self, route: Route, diff: &mut IntentDiff) {
        debug!(route = %route, "Route update");

        if let Some(previous) = self.rib.insert(route) {
            if previous.next_hop == route.next_hop {
                debug!(route = %route, "Next hop unchanged");
                return;
            }
            self.resolver.cancel(&previous);
            if !previous.is_local() {
                self.uninstall(&previous.prefix, diff);
            }
        }

        if route.is_local() {
            debug!(prefix = %route.prefix, "Locally originated route, no intent");
            return;
        }

        self.hosts.start_monitoring_ip(&route.next_hop);
        match self.resolve(&route.next_hop) {
            Some(mac) => self.install(&route, mac, diff),
            None => {
                debug!(route = %route, "Next hop unresolved, deferring");
                self.resolver.defer(route);
            }
        }
    }

    fn apply_delete(&mut self, route: Route, diff: &mut IntentDiff) {
        debug!(route = %route, "Route delete");

        if let Some(current) = self.rib.find(&route.prefix).copied() {
            self.resolver.cancel(&current);
        }
        if self.rib.remove(&route.prefix) {
            self.uninstall(&route.prefix, diff);
        }
        self.resolver.cancel(&route);
    }

    /// MAC of `ip` from the cache, falling back to the host service.
    fn resolve(&mut self, ip: &IpAddress) -> Option<MacAddress> {
        if let Some(mac) = self.resolver.cached_mac(ip) {
            return Some(mac);
        }
        let mac = self.hosts.mac_of(ip)?;
        self.resolver.learn(*ip, mac);
        Some(mac)
    }

    fn install(&mut self, route: &Route, mac: MacAddress, diff: &mut IntentDiff) {
        match self.translator.translate(
            &route.prefix,
            &route.next_hop,
            mac,
            self.interfaces.as_ref(),
            self.peers.as_ref(),
        ) {
            Ok(intent) => {
                self.installed.insert(route.prefix, mac);
                diff.submit(intent);
            }
            Err(e) => warn!(route = %route, error = %e, "Cannot build route intent"),
        }
    }

    fn uninstall(&mut self, prefix: &IpPrefix, diff: &mut IntentDiff) {
        self.installed.remove(prefix);
        diff.withdraw(IntentKey::for_prefix(prefix));
    }

    /// Handles resolution of `ip` to `mac`.
    ///
    /// Routes waiting on `ip` get their intents, provided the RIB still
    /// points them at `ip`. If `ip` was already known under another MAC the
    /// installed routes through it are rebuilt.
    #[instrument(skip(self))]
    pub fn host_updated(&mut self, ip: IpAddress, mac: MacAddress) -> IntentDiff {
        let mut diff = IntentDiff::new();
        let previous = self.resolver.learn(ip, mac);

        for pending in self.resolver.take_pending(&ip) {
            match self.rib.find(&pending.prefix).copied() {
                Some(current) if current.next_hop == ip => self.install(&current, mac, &mut diff),
                _ => debug!(route = %pending, "Route changed while resolving, dropping"),
            }
        }

        if previous.is_some_and(|old| old != mac) {
            info!(ip = %ip, mac = %mac, "Next hop MAC changed, rebuilding routes");
            for route in self.rib.routes() {
                if route.next_hop == ip {
                    self.install(&route, mac, &mut diff);
                }
            }
        }

        diff
    }

    /// Forgets the cached address of a removed host. Installed intents
    /// stay until their routes change.
    #[instrument(skip(self))]
    pub fn host_removed(&mut self, ip: IpAddress) {
        if self.resolver.forget(&ip).is_some() {
            debug!(ip = %ip, "Host removed");
        }
    }

    /// Rebuilds every route intent against the current interfaces.
    ///
    /// Intents whose egress interface disappeared are withdrawn, whether or
    /// not the next hop's MAC is still cached. Others are rebuilt with the
    /// cached MAC, the host service's, or the one they were installed with.
    #[instrument(skip(self))]
    pub fn interfaces_changed(&mut self) -> IntentDiff {
        let mut diff = IntentDiff::new();
        for route in self.rib.routes() {
            if route.is_local() || self.resolver.is_pending(&route) {
                continue;
            }
            let egress = self.translator.egress_interface(
                &route.next_hop,
                self.interfaces.as_ref(),
                self.peers.as_ref(),
            );
            if egress.is_none() {
                if self.installed.contains_key(&route.prefix) {
                    warn!(route = %route, "Egress interface gone, withdrawing route intent");
                    self.uninstall(&route.prefix, &mut diff);
                }
                continue;
            }
            let mac = self
                .resolve(&route.next_hop)
                .or_else(|| self.installed.get(&route.prefix).copied());
            match mac {
                Some(mac) => self.install(&route, mac, &mut diff),
                None => debug!(route = %route, "Next hop MAC unknown, not rebuilding"),
            }
        }
        diff
    }
}

/// RIB contents at one point of the event stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouterSnapshot {
    pub routes: Vec<Route>,
    pub pending: usize,
}

/// Work accepted by the route processor.
#[derive(Debug)]
pub enum RouterEvent {
    Routes(Vec<RouteUpdate>),
    HostUpdated { ip: IpAddress, mac: MacAddress },
    HostRemoved(IpAddress),
    InterfacesChanged,
    /// Replies once every earlier event has been applied
    Snapshot(oneshot::Sender<RouterSnapshot>),
}

/// Single worker draining [`RouterEvent`]s into [`RouterState`].
pub struct RouteProcessor {
    state: RouterState,
    synchronizer: Arc<IntentSynchronizer>,
}

impl RouteProcessor {
    pub fn new(state: RouterState, synchronizer: Arc<IntentSynchronizer>) -> Self {
        Self {
            state,
            synchronizer,
        }
    }

    /// Spawns the processor. Events still queued at cancellation are dropped.
    pub fn spawn(
        self,
        events: mpsc::UnboundedReceiver<RouterEvent>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(events, cancel))
    }

    async fn run(mut self, mut events: mpsc::UnboundedReceiver<RouterEvent>, cancel: CancellationToken) {
        info!("Route processor started");
        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            self.handle(event);
        }
        info!("Route processor stopped");
    }

    fn handle(&mut self, event: RouterEvent) {
        let diff = match event {
            RouterEvent::Routes(updates) => self.state.apply_updates(updates),
            RouterEvent::HostUpdated { ip, mac } => self.state.host_updated(ip, mac),
            RouterEvent::HostRemoved(ip) => {
                self.state.host_removed(ip);
                return;
            }
            RouterEvent::InterfacesChanged => self.state.interfaces_changed(),
            RouterEvent::Snapshot(reply) => {
                let mut routes = self.state.rib().routes();
                routes.sort();
                let _ = reply.send(RouterSnapshot {
                    routes,
                    pending: self.state.resolver().pending_count(),
                });
                return;
            }
        };

        if diff.is_empty() {
            return;
        }
        debug!(
            submit = diff.submit.len(),
            withdraw = diff.withdraw.len(),
            "Emitting intent diff"
        );
        let (submits, withdraws) = diff.into_parts();
        self.synchronizer.update_route_intents(submits, withdraws);
    }
}
