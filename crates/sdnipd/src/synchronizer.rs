//! Intent synchronization with the distributed intent store.
//!
//! Every instance keeps the full desired intent set, but only the leader
//! writes it to the shared store. On each leadership grant the desired set
//! is reconciled against the store; only after that pass completes without
//! the grant being revoked does the instance forward live updates.
//!
//! Store I/O happens on a single worker task. The route pipeline only takes
//! the state lock and queues work, so it never waits on the store.

use crate::error::{Result, SdnIpError};
use crate::intent::{Intent, IntentKey, IntentKind, IntentState};
use crate::leadership::{Leadership, LeadershipState};
use crate::services::IntentStore;
use crate::types::ApplicationId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

const WORKER: &str = "intent synchronizer";

#[derive(Debug, Clone)]
enum StoreOp {
    Submit(Intent),
    Withdraw(Intent),
}

impl StoreOp {
    fn key(&self) -> &IntentKey {
        match self {
            StoreOp::Submit(intent) | StoreOp::Withdraw(intent) => &intent.key,
        }
    }

    async fn execute(&self, store: &dyn IntentStore) -> Result<()> {
        match self {
            StoreOp::Submit(intent) => store.submit(intent).await,
            StoreOp::Withdraw(intent) => store.withdraw(intent).await,
        }
    }
}

enum Command {
    /// A live update, valid only while the epoch it was queued under leads
    Forward { epoch: u64, op: StoreOp },
    RemoveAll(oneshot::Sender<Result<()>>),
    Flush(oneshot::Sender<()>),
}

#[derive(Debug, Default)]
struct SyncState {
    desired: HashMap<IntentKey, Intent>,
    leadership: Leadership,
    /// Latest change per key made while reconciling; replayed before the
    /// instance starts forwarding.
    dirty: HashMap<IntentKey, StoreOp>,
}

impl SyncState {
    fn submit(&mut self, intent: Intent, commands: &mpsc::UnboundedSender<Command>) {
        if self
            .desired
            .get(&intent.key)
            .is_some_and(|current| current.same_content(&intent))
        {
            debug!(key = %intent.key, "Intent unchanged, skipping");
            return;
        }
        debug!(key = %intent.key, "Submitting intent");
        self.desired.insert(intent.key.clone(), intent.clone());
        self.record(StoreOp::Submit(intent), commands);
    }

    fn withdraw(&mut self, key: &IntentKey, commands: &mpsc::UnboundedSender<Command>) {
        let Some(intent) = self.desired.remove(key) else {
            return;
        };
        debug!(key = %key, "Withdrawing intent");
        self.record(StoreOp::Withdraw(intent), commands);
    }

    fn record(&mut self, op: StoreOp, commands: &mpsc::UnboundedSender<Command>) {
        match self.leadership.state() {
            LeadershipState::Leader => {
                let epoch = self.leadership.epoch();
                if commands.send(Command::Forward { epoch, op }).is_err() {
                    debug!("Synchronizer worker stopped, change kept locally");
                }
            }
            LeadershipState::Electing => {
                self.dirty.insert(op.key().clone(), op);
            }
            LeadershipState::Follower => {}
        }
    }
}

/// Store changes needed to make the remote intents match the desired set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    pub submit: Vec<Intent>,
    pub withdraw: Vec<Intent>,
}

impl ReconcilePlan {
    /// Diffs `desired` against the remote intents and their lifecycle states.
    ///
    /// A desired intent is (re)submitted unless the store holds one with the
    /// same content that is neither withdrawn nor unknown to it. A remote
    /// intent that is not desired is withdrawn unless already withdrawn.
    pub fn compute(
        desired: &HashMap<IntentKey, Intent>,
        remote: Vec<(Intent, Option<IntentState>)>,
    ) -> Self {
        let mut remote: HashMap<IntentKey, (Intent, Option<IntentState>)> = remote
            .into_iter()
            .map(|(intent, state)| (intent.key.clone(), (intent, state)))
            .collect();

        let mut plan = ReconcilePlan::default();
        for (key, intent) in desired {
            let in_sync = remote.remove(key).is_some_and(|(current, state)| {
                current.same_content(intent) && state.is_some_and(|s| !s.is_withdrawn())
            });
            if !in_sync {
                plan.submit.push(intent.clone());
            }
        }
        for (intent, state) in remote.into_values() {
            if state.is_some_and(|s| !s.is_withdrawn()) {
                plan.withdraw.push(intent);
            }
        }

        plan.submit.sort_by(|a, b| a.key.cmp(&b.key));
        plan.withdraw.sort_by(|a, b| a.key.cmp(&b.key));
        plan
    }

    pub fn is_empty(&self) -> bool {
        self.submit.is_empty() && self.withdraw.is_empty()
    }
}

struct Shared {
    app_id: ApplicationId,
    store: Arc<dyn IntentStore>,
    state: Mutex<SyncState>,
    reconcile_requested: Notify,
    commands: mpsc::UnboundedSender<Command>,
    leadership_tx: watch::Sender<LeadershipState>,
    cancel: CancellationToken,
}

impl Shared {
    fn still_electing(&self, epoch: u64) -> bool {
        let electing = self.state.lock().leadership.is_electing(epoch);
        if !electing {
            info!(epoch, "Leadership changed during reconciliation, aborting");
        }
        electing
    }

    async fn remote_snapshot(&self) -> Result<Vec<(Intent, Option<IntentState>)>> {
        let intents = self.store.intents_for_app(&self.app_id).await?;
        let mut snapshot = Vec::with_capacity(intents.len());
        for intent in intents {
            let state = self.store.state(&self.app_id, &intent.key).await?;
            snapshot.push((intent, state));
        }
        Ok(snapshot)
    }

    /// Applies `ops` while `epoch` is still electing. Returns the number of
    /// failed operations, or `None` if leadership changed.
    async fn apply_while_electing(&self, epoch: u64, ops: &[StoreOp]) -> Option<usize> {
        let mut failures = 0;
        for op in ops {
            if !self.still_electing(epoch) {
                return None;
            }
            if let Err(e) = op.execute(self.store.as_ref()).await {
                warn!(key = %op.key(), error = %e, "Intent store operation failed during reconciliation");
                failures += 1;
            }
        }
        self.still_electing(epoch).then_some(failures)
    }

    #[instrument(skip(self), fields(app_id = %self.app_id))]
    async fn reconcile(&self) {
        let (epoch, acquisitions, desired) = {
            let mut state = self.state.lock();
            if state.leadership.state() != LeadershipState::Electing {
                debug!("Not electing, skipping reconciliation");
                return;
            }
            state.dirty.clear();
            (
                state.leadership.epoch(),
                state.leadership.acquisitions(),
                state.desired.clone(),
            )
        };

        let remote = match self.remote_snapshot().await {
            Ok(remote) => remote,
            Err(e) => {
                warn!(epoch, error = %e, "Failed to read intents from store, reconciliation aborted");
                return;
            }
        };

        let plan = ReconcilePlan::compute(&desired, remote);
        info!(
            epoch,
            acquisitions,
            desired = desired.len(),
            submit = plan.submit.len(),
            withdraw = plan.withdraw.len(),
            "Reconciling intents"
        );

        let withdrawals: Vec<StoreOp> = plan.withdraw.into_iter().map(StoreOp::Withdraw).collect();
        let Some(mut failures) = self.apply_while_electing(epoch, &withdrawals).await else {
            return;
        };
        let submissions: Vec<StoreOp> = plan.submit.into_iter().map(StoreOp::Submit).collect();
        let Some(failed) = self.apply_while_electing(epoch, &submissions).await else {
            return;
        };
        failures += failed;

        // Changes made by the route pipeline while the pass ran
        loop {
            let pending: Vec<StoreOp> = {
                let mut state = self.state.lock();
                if !state.leadership.is_electing(epoch) {
                    info!(epoch, "Leadership changed during reconciliation, aborting");
                    return;
                }
                if state.dirty.is_empty() {
                    state.leadership.activate(epoch);
                    self.leadership_tx.send_replace(LeadershipState::Leader);
                    break;
                }
                let mut ops: Vec<StoreOp> = state.dirty.drain().map(|(_, op)| op).collect();
                ops.sort_by(|a, b| a.key().cmp(b.key()));
                ops
            };
            debug!(epoch, count = pending.len(), "Replaying changes made during reconciliation");
            let Some(failed) = self.apply_while_electing(epoch, &pending).await else {
                return;
            };
            failures += failed;
        }

        info!(epoch, failures, "Intent reconciliation complete");
    }

    async fn handle(&self, command: Command) {
        match command {
            Command::Forward { epoch, op } => {
                let leading = self.state.lock().leadership.is_leader(epoch);
                if !leading {
                    debug!(key = %op.key(), epoch, "Dropping store operation from stale leadership");
                    return;
                }
                if let Err(e) = op.execute(self.store.as_ref()).await {
                    warn!(key = %op.key(), error = %e, "Failed to apply intent operation");
                }
            }
            Command::RemoveAll(reply) => {
                let _ = reply.send(self.purge().await);
            }
            Command::Flush(reply) => {
                let _ = reply.send(());
            }
        }
    }

    #[instrument(skip(self), fields(app_id = %self.app_id))]
    async fn purge(&self) -> Result<()> {
        let leader = {
            let mut state = self.state.lock();
            state.desired.clear();
            state.dirty.clear();
            state.leadership.state() == LeadershipState::Leader
        };
        if !leader {
            info!("Not leader, leaving stored intents in place");
            return Ok(());
        }

        let intents = self.store.intents_for_app(&self.app_id).await?;
        let mut failed = 0;
        for intent in &intents {
            if let Err(e) = self.store.withdraw(intent).await {
                warn!(key = %intent.key, error = %e, "Failed to withdraw intent");
                failed += 1;
            }
        }
        info!(count = intents.len(), failed, "Withdrew all intents");

        if failed > 0 {
            return Err(SdnIpError::Store(format!(
                "{} of {} withdrawals failed",
                failed,
                intents.len()
            )));
        }
        Ok(())
    }

    /// Runs `fut` unless the synchronizer is cancelled first.
    async fn until_cancelled<F: std::future::Future<Output = ()>>(&self, fut: F) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = fut => true,
        }
    }

    async fn run(self: Arc<Self>, mut commands: mpsc::UnboundedReceiver<Command>) {
        info!(app_id = %self.app_id, "Intent synchronizer started");
        loop {
            let completed = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => false,
                _ = self.reconcile_requested.notified() => self.until_cancelled(self.reconcile()).await,
                command = commands.recv() => match command {
                    Some(command) => self.until_cancelled(self.handle(command)).await,
                    None => false,
                },
            };
            if !completed {
                break;
            }
        }
        info!(app_id = %self.app_id, "Intent synchronizer stopped");
    }
}

/// Keeps the desired intents and mirrors them to the store while leader.
pub struct IntentSynchronizer {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl IntentSynchronizer {
    /// Creates the synchronizer and spawns its worker on the current runtime.
    ///
    /// The instance starts as a follower.
    pub fn start(
        app_id: ApplicationId,
        store: Arc<dyn IntentStore>,
        cancel: CancellationToken,
    ) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let (leadership_tx, _) = watch::channel(LeadershipState::Follower);
        let shared = Arc::new(Shared {
            app_id,
            store,
            state: Mutex::new(SyncState::default()),
            reconcile_requested: Notify::new(),
            commands,
            leadership_tx,
            cancel,
        });
        let worker = tokio::spawn(Arc::clone(&shared).run(rx));

        Self {
            shared,
            worker: Mutex::new(Some(worker)),
        }
    }

    pub fn app_id(&self) -> &ApplicationId {
        &self.shared.app_id
    }

    pub fn submit(&self, intent: Intent) {
        self.shared.state.lock().submit(intent, &self.shared.commands);
    }

    pub fn withdraw(&self, key: &IntentKey) {
        self.shared.state.lock().withdraw(key, &self.shared.commands);
    }

    /// Applies one route diff: withdrawals first, then submissions.
    pub fn update_route_intents(&self, submits: Vec<Intent>, withdraws: Vec<IntentKey>) {
        let mut state = self.shared.state.lock();
        for key in &withdraws {
            state.withdraw(key, &self.shared.commands);
        }
        for intent in submits {
            state.submit(intent, &self.shared.commands);
        }
    }

    /// Adds the point-to-point intents connecting the BGP speakers to their
    /// peers. They are reconciled together with the route intents.
    pub fn submit_peer_intents(&self, intents: Vec<Intent>) {
        let mut state = self.shared.state.lock();
        for intent in intents {
            state.submit(intent, &self.shared.commands);
        }
    }

    /// Leadership signal from the election service.
    ///
    /// Losing leadership only stops forwarding; the new leader owns the
    /// stored intents from then on. Gaining it schedules a reconciliation on
    /// the worker.
    pub fn on_leadership_changed(&self, is_leader: bool) {
        let mut state = self.shared.state.lock();
        if is_leader {
            state.leadership.elect();
            state.dirty.clear();
            self.shared
                .leadership_tx
                .send_replace(LeadershipState::Electing);
            drop(state);
            self.shared.reconcile_requested.notify_one();
        } else if state.leadership.demote() {
            state.dirty.clear();
            self.shared
                .leadership_tx
                .send_replace(LeadershipState::Follower);
        }
    }

    /// Re-runs reconciliation if this instance holds leadership.
    pub fn resync(&self) {
        let leading = self.shared.state.lock().leadership.state() != LeadershipState::Follower;
        if leading {
            self.on_leadership_changed(true);
        }
    }

    /// Clears the desired set and, if leader, withdraws every stored intent
    /// of this application.
    pub async fn remove_all(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.shared
            .commands
            .send(Command::RemoveAll(reply))
            .map_err(|_| SdnIpError::ChannelClosed(WORKER))?;
        rx.await.map_err(|_| SdnIpError::ChannelClosed(WORKER))?
    }

    /// Waits until every update queued so far has been applied.
    pub async fn flush(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.shared
            .commands
            .send(Command::Flush(reply))
            .map_err(|_| SdnIpError::ChannelClosed(WORKER))?;
        rx.await.map_err(|_| SdnIpError::ChannelClosed(WORKER))
    }

    /// Stops the worker. Queued and in-flight store operations are dropped.
    pub async fn shutdown(&self) {
        self.shared.cancel.cancel();
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                warn!(error = %e, "Intent synchronizer worker failed");
            }
        }
    }

    pub fn leadership(&self) -> LeadershipState {
        self.shared.state.lock().leadership.state()
    }

    /// Watches leadership transitions.
    pub fn subscribe(&self) -> watch::Receiver<LeadershipState> {
        self.shared.leadership_tx.subscribe()
    }

    pub fn desired_intent(&self, key: &IntentKey) -> Option<Intent> {
        self.shared.state.lock().desired.get(key).cloned()
    }

    /// Every desired intent, sorted by key.
    pub fn desired_intents(&self) -> Vec<Intent> {
        let mut intents: Vec<Intent> = self.shared.state.lock().desired.values().cloned().collect();
        intents.sort_by(|a, b| a.key.cmp(&b.key));
        intents
    }

    /// Desired route intents, sorted by key.
    pub fn route_intents(&self) -> Vec<Intent> {
        self.desired_intents()
            .into_iter()
            .filter(|intent| intent.kind == IntentKind::MultiPointToSinglePoint)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::{EthType, FilteredConnectPoint, TrafficSelector, TrafficTreatment};
    use crate::store::{MemoryIntentStore, StoreCall};
    use crate::types::ConnectPoint;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;
    use std::time::Duration;

    fn app() -> ApplicationId {
        ApplicationId::new("sdnip-test")
    }

    fn intent(prefix: &str, port: u32) -> Intent {
        let prefix = prefix.parse().unwrap();
        Intent {
            key: IntentKey::for_prefix(&prefix),
            app_id: app(),
            kind: IntentKind::MultiPointToSinglePoint,
            selector: TrafficSelector {
                ip_dst: Some(prefix),
                ..TrafficSelector::new(EthType::Ipv4)
            },
            treatment: TrafficTreatment::default(),
            ingress_points: BTreeSet::from([FilteredConnectPoint::new(
                ConnectPoint::new("of:0000000000000009", 1),
                None,
            )]),
            egress_point: FilteredConnectPoint::new(ConnectPoint::new("of:0000000000000001", port), None),
            priority: 220,
        }
    }

    fn key(prefix: &str) -> IntentKey {
        IntentKey::new(prefix)
    }

    fn start(store: &Arc<MemoryIntentStore>) -> IntentSynchronizer {
        let store: Arc<dyn IntentStore> = store.clone();
        IntentSynchronizer::start(app(), store, CancellationToken::new())
    }

    async fn wait_for(sync: &IntentSynchronizer, target: LeadershipState) {
        let mut rx = sync.subscribe();
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| *s == target))
            .await
            .expect("timed out waiting for leadership state")
            .unwrap();
    }

    #[test]
    fn test_plan_diffs_by_content_and_state() {
        let desired: HashMap<IntentKey, Intent> = [
            intent("10.0.1.0/24", 1),
            intent("10.0.2.0/24", 1),
            intent("10.0.3.0/24", 1),
            intent("10.0.4.0/24", 1),
        ]
        .into_iter()
        .map(|i| (i.key.clone(), i))
        .collect();

        let remote = vec![
            // In sync
            (intent("10.0.1.0/24", 1), Some(IntentState::Installed)),
            // Same content but withdrawn
            (intent("10.0.2.0/24", 1), Some(IntentState::Withdrawn)),
            // Same key, different egress
            (intent("10.0.3.0/24", 2), Some(IntentState::Installed)),
            // Listed but the store has no state for it
            (intent("10.0.4.0/24", 1), None),
            // Not desired
            (intent("10.0.5.0/24", 1), Some(IntentState::Installed)),
            (intent("10.0.6.0/24", 1), Some(IntentState::Withdrawing)),
            (intent("10.0.7.0/24", 1), Some(IntentState::Failed)),
        ];

        let plan = ReconcilePlan::compute(&desired, remote);
        let submit: Vec<&str> = plan.submit.iter().map(|i| i.key.as_str()).collect();
        let withdraw: Vec<&str> = plan.withdraw.iter().map(|i| i.key.as_str()).collect();

        assert_eq!(submit, vec!["10.0.2.0/24", "10.0.3.0/24", "10.0.4.0/24"]);
        assert_eq!(withdraw, vec!["10.0.5.0/24", "10.0.7.0/24"]);
        assert_eq!(plan.submit[1].egress_point.connect_point.port, 1);
    }

    #[test]
    fn test_plan_empty_when_in_sync() {
        let i = intent("10.0.1.0/24", 1);
        let desired = HashMap::from([(i.key.clone(), i.clone())]);
        let plan = ReconcilePlan::compute(&desired, vec![(i, Some(IntentState::Installed))]);
        assert!(plan.is_empty());
    }

    #[tokio::test]
    async fn test_follower_never_writes() {
        let store = Arc::new(MemoryIntentStore::new());
        let sync = start(&store);

        sync.submit(intent("10.0.1.0/24", 1));
        sync.submit(intent("10.0.2.0/24", 1));
        sync.withdraw(&key("10.0.2.0/24"));
        sync.flush().await.unwrap();

        assert_eq!(sync.leadership(), LeadershipState::Follower);
        assert!(store.calls().is_empty());
        assert_eq!(sync.desired_intents().len(), 1);
        sync.shutdown().await;
    }

    #[tokio::test]
    async fn test_failed_write_during_reconciliation_is_repaired_by_resync() {
        let store = Arc::new(MemoryIntentStore::new());
        store.seed(intent("10.0.9.0/24", 1), IntentState::Installed);
        store.fail_key(key("10.0.2.0/24"));
        store.fail_key(key("10.0.9.0/24"));
        let sync = start(&store);

        for prefix in ["10.0.1.0/24", "10.0.2.0/24", "10.0.3.0/24"] {
            sync.submit(intent(prefix, 1));
        }
        sync.on_leadership_changed(true);
        wait_for(&sync, LeadershipState::Leader).await;

        // The failed writes do not stop the rest of the pass
        let installed: Vec<IntentKey> = store.installed(&app()).into_iter().map(|i| i.key).collect();
        assert_eq!(
            installed,
            vec![key("10.0.1.0/24"), key("10.0.3.0/24"), key("10.0.9.0/24")]
        );
        assert_eq!(
            store.calls(),
            vec![
                StoreCall::Submit(key("10.0.1.0/24")),
                StoreCall::Submit(key("10.0.3.0/24")),
            ]
        );

        sync.resync();
        wait_for(&sync, LeadershipState::Leader).await;
        sync.flush().await.unwrap();

        let installed: Vec<IntentKey> = store.installed(&app()).into_iter().map(|i| i.key).collect();
        assert_eq!(
            installed,
            vec![key("10.0.1.0/24"), key("10.0.2.0/24"), key("10.0.3.0/24")]
        );
        sync.shutdown().await;
    }

    #[tokio::test]
    async fn test_leader_forwards_updates() {
        let store = Arc::new(MemoryIntentStore::new());
        let sync = start(&store);

        sync.submit(intent("10.0.1.0/24", 1));
        sync.on_leadership_changed(true);
        wait_for(&sync, LeadershipState::Leader).await;
        assert_eq!(store.calls(), vec![StoreCall::Submit(key("10.0.1.0/24"))]);

        sync.submit(intent("10.0.2.0/24", 1));
        sync.withdraw(&key("10.0.1.0/24"));
        sync.flush().await.unwrap();

        assert_eq!(
            store.calls(),
            vec![
                StoreCall::Submit(key("10.0.1.0/24")),
                StoreCall::Submit(key("10.0.2.0/24")),
                StoreCall::Withdraw(key("10.0.1.0/24")),
            ]
        );
        assert_eq!(store.installed(&app()), vec![intent("10.0.2.0/24", 1)]);
        sync.shutdown().await;
    }

    #[tokio::test]
    async fn test_unchanged_resubmit_is_suppressed() {
        let store = Arc::new(MemoryIntentStore::new());
        let sync = start(&store);
        sync.on_leadership_changed(true);
        wait_for(&sync, LeadershipState::Leader).await;

        sync.submit(intent("10.0.1.0/24", 1));
        sync.submit(intent("10.0.1.0/24", 1));
        sync.flush().await.unwrap();

        assert_eq!(store.calls(), vec![StoreCall::Submit(key("10.0.1.0/24"))]);
        sync.shutdown().await;
    }

    #[tokio::test]
    async fn test_leadership_toggle_without_changes_is_quiet() {
        let store = Arc::new(MemoryIntentStore::new());
        let sync = start(&store);
        sync.submit(intent("10.0.1.0/24", 1));
        sync.submit(intent("10.0.2.0/24", 1));
        sync.on_leadership_changed(true);
        wait_for(&sync, LeadershipState::Leader).await;
        store.clear_calls();

        sync.on_leadership_changed(false);
        assert_eq!(sync.leadership(), LeadershipState::Follower);
        sync.on_leadership_changed(true);
        wait_for(&sync, LeadershipState::Leader).await;

        assert!(store.calls().is_empty());
        sync.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_changes_during_reconciliation_are_replayed() {
        let store = Arc::new(MemoryIntentStore::with_latency(Duration::from_millis(10)));
        let sync = start(&store);
        sync.submit(intent("10.0.1.0/24", 1));

        sync.on_leadership_changed(true);
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(sync.leadership(), LeadershipState::Electing);
        sync.submit(intent("10.0.2.0/24", 1));
        sync.withdraw(&key("10.0.1.0/24"));

        wait_for(&sync, LeadershipState::Leader).await;
        assert_eq!(store.installed(&app()), vec![intent("10.0.2.0/24", 1)]);
        sync.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_leadership_loss_aborts_reconciliation() {
        let store = Arc::new(MemoryIntentStore::with_latency(Duration::from_millis(10)));
        let sync = start(&store);
        sync.submit(intent("10.0.1.0/24", 1));

        sync.on_leadership_changed(true);
        // The worker is now waiting on the store snapshot
        tokio::time::sleep(Duration::from_millis(5)).await;
        sync.on_leadership_changed(false);
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(sync.leadership(), LeadershipState::Follower);
        assert!(store.calls().is_empty());
        sync.shutdown().await;
    }

    #[tokio::test]
    async fn test_failed_snapshot_keeps_electing_until_resync() {
        let store = Arc::new(MemoryIntentStore::new());
        let sync = start(&store);
        sync.submit(intent("10.0.1.0/24", 1));

        store.fail_next(1);
        sync.on_leadership_changed(true);
        sync.flush().await.unwrap();
        tokio::task::yield_now().await;
        assert_eq!(sync.leadership(), LeadershipState::Electing);
        assert!(store.calls().is_empty());

        sync.resync();
        wait_for(&sync, LeadershipState::Leader).await;
        assert_eq!(store.installed(&app()), vec![intent("10.0.1.0/24", 1)]);
        sync.shutdown().await;
    }

    #[tokio::test]
    async fn test_remove_all_as_leader() {
        let store = Arc::new(MemoryIntentStore::new());
        let sync = start(&store);
        sync.submit(intent("10.0.1.0/24", 1));
        sync.submit(intent("10.0.2.0/24", 1));
        sync.on_leadership_changed(true);
        wait_for(&sync, LeadershipState::Leader).await;

        sync.remove_all().await.unwrap();

        assert!(sync.desired_intents().is_empty());
        assert!(store.installed(&app()).is_empty());
        sync.shutdown().await;
    }

    #[tokio::test]
    async fn test_remove_all_as_follower_leaves_store() {
        let store = Arc::new(MemoryIntentStore::new());
        store.seed(intent("10.0.1.0/24", 1), IntentState::Installed);
        let sync = start(&store);
        sync.submit(intent("10.0.1.0/24", 1));

        sync.remove_all().await.unwrap();

        assert!(sync.desired_intents().is_empty());
        assert_eq!(store.installed(&app()).len(), 1);
        sync.shutdown().await;
    }

    #[tokio::test]
    async fn test_peer_intents_are_not_route_intents() {
        let store = Arc::new(MemoryIntentStore::new());
        let sync = start(&store);
        let mut peer = intent("192.168.10.1/32", 1);
        peer.key = IntentKey::new("peer-192.168.10.1");
        peer.kind = IntentKind::PointToPoint;

        sync.submit_peer_intents(vec![peer]);
        sync.submit(intent("10.0.1.0/24", 1));

        assert_eq!(sync.desired_intents().len(), 2);
        assert_eq!(sync.route_intents(), vec![intent("10.0.1.0/24", 1)]);
        sync.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_stops_worker() {
        let store = Arc::new(MemoryIntentStore::new());
        let sync = start(&store);
        sync.shutdown().await;

        assert!(sync.flush().await.is_err());
        // Local state still tracks changes
        sync.submit(intent("10.0.1.0/24", 1));
        assert_eq!(sync.desired_intents().len(), 1);
    }
}
