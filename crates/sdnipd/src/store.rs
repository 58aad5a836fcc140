//! In-memory intent store.
//!
//! Stands in for the distributed intent store when sdnipd runs without a
//! cluster, and in tests. Intents are scoped by application and replaced by
//! key; withdrawn intents stay visible in the `Withdrawn` state like they do
//! in the real store until it purges them.

use crate::error::{Result, SdnIpError};
use crate::intent::{Intent, IntentKey, IntentState};
use crate::services::IntentStore;
use crate::types::ApplicationId;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::debug;

/// A call observed by the store, in the order it was served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Submit(IntentKey),
    Withdraw(IntentKey),
}

#[derive(Debug, Clone)]
struct StoredIntent {
    intent: Intent,
    state: IntentState,
}

#[derive(Debug, Default)]
struct StoreInner {
    intents: HashMap<(ApplicationId, IntentKey), StoredIntent>,
    calls: Vec<StoreCall>,
    fail_next: usize,
    failing_keys: HashSet<IntentKey>,
}

#[derive(Debug, Default)]
pub struct MemoryIntentStore {
    inner: Mutex<StoreInner>,
    latency: Option<Duration>,
}

impl MemoryIntentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every call by `latency`, modelling a remote round trip.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            inner: Mutex::new(StoreInner::default()),
            latency: Some(latency),
        }
    }

    /// Makes the next `count` calls fail.
    pub fn fail_next(&self, count: usize) {
        self.inner.lock().fail_next = count;
    }

    /// Makes the next submit or withdraw of `key` fail.
    pub fn fail_key(&self, key: IntentKey) {
        self.inner.lock().failing_keys.insert(key);
    }

    /// Stores `intent` directly in `state`, bypassing the call log.
    pub fn seed(&self, intent: Intent, state: IntentState) {
        let key = (intent.app_id.clone(), intent.key.clone());
        self.inner
            .lock()
            .intents
            .insert(key, StoredIntent { intent, state });
    }

    pub fn intent(&self, app_id: &ApplicationId, key: &IntentKey) -> Option<(Intent, IntentState)> {
        self.inner
            .lock()
            .intents
            .get(&(app_id.clone(), key.clone()))
            .map(|stored| (stored.intent.clone(), stored.state))
    }

    /// Installed intents of `app_id`, sorted by key.
    pub fn installed(&self, app_id: &ApplicationId) -> Vec<Intent> {
        let mut intents: Vec<Intent> = self
            .inner
            .lock()
            .intents
            .iter()
            .filter(|((app, _), stored)| app == app_id && stored.state == IntentState::Installed)
            .map(|(_, stored)| stored.intent.clone())
            .collect();
        intents.sort_by(|a, b| a.key.cmp(&b.key));
        intents
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.inner.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.inner.lock().calls.clear();
    }

    async fn round_trip(&self) -> Result<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let mut inner = self.inner.lock();
        if inner.fail_next > 0 {
            inner.fail_next -= 1;
            return Err(SdnIpError::Store("injected failure".to_string()));
        }
        Ok(())
    }

    /// Consumes a pending failure injected for `key`.
    fn write_fails(&self, key: &IntentKey) -> Result<()> {
        if self.inner.lock().failing_keys.remove(key) {
            return Err(SdnIpError::Store(format!("injected failure for {key}")));
        }
        Ok(())
    }
}

#[async_trait]
impl IntentStore for MemoryIntentStore {
    async fn intents_for_app(&self, app_id: &ApplicationId) -> Result<Vec<Intent>> {
        self.round_trip().await?;
        Ok(self
            .inner
            .lock()
            .intents
            .iter()
            .filter(|((app, _), _)| app == app_id)
            .map(|(_, stored)| stored.intent.clone())
            .collect())
    }

    async fn state(&self, app_id: &ApplicationId, key: &IntentKey) -> Result<Option<IntentState>> {
        self.round_trip().await?;
        Ok(self
            .inner
            .lock()
            .intents
            .get(&(app_id.clone(), key.clone()))
            .map(|stored| stored.state))
    }

    async fn submit(&self, intent: &Intent) -> Result<()> {
        self.round_trip().await?;
        self.write_fails(&intent.key)?;
        debug!(key = %intent.key, "Store submit");
        let mut inner = self.inner.lock();
        inner.calls.push(StoreCall::Submit(intent.key.clone()));
        inner.intents.insert(
            (intent.app_id.clone(), intent.key.clone()),
            StoredIntent {
                intent: intent.clone(),
                state: IntentState::Installed,
            },
        );
        Ok(())
    }

    async fn withdraw(&self, intent: &Intent) -> Result<()> {
        self.round_trip().await?;
        self.write_fails(&intent.key)?;
        debug!(key = %intent.key, "Store withdraw");
        let mut inner = self.inner.lock();
        inner.calls.push(StoreCall::Withdraw(intent.key.clone()));
        if let Some(stored) = inner
            .intents
            .get_mut(&(intent.app_id.clone(), intent.key.clone()))
        {
            stored.state = IntentState::Withdrawn;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::{EthType, FilteredConnectPoint, IntentKind, TrafficSelector, TrafficTreatment};
    use crate::types::ConnectPoint;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;

    fn intent(app: &str, key: &str) -> Intent {
        Intent {
            key: IntentKey::new(key),
            app_id: ApplicationId::new(app),
            kind: IntentKind::MultiPointToSinglePoint,
            selector: TrafficSelector {
                ip_dst: Some(key.parse().unwrap()),
                ..TrafficSelector::new(EthType::Ipv4)
            },
            treatment: TrafficTreatment::default(),
            ingress_points: BTreeSet::new(),
            egress_point: FilteredConnectPoint::new(ConnectPoint::new("of:1", 1), None),
            priority: 100,
        }
    }

    #[tokio::test]
    async fn test_submit_and_withdraw() {
        let store = MemoryIntentStore::new();
        let app = ApplicationId::new("a");
        let i = intent("a", "10.0.0.0/24");

        store.submit(&i).await.unwrap();
        assert_eq!(store.state(&app, &i.key).await.unwrap(), Some(IntentState::Installed));
        assert_eq!(store.installed(&app), vec![i.clone()]);

        store.withdraw(&i).await.unwrap();
        assert_eq!(store.state(&app, &i.key).await.unwrap(), Some(IntentState::Withdrawn));
        assert!(store.installed(&app).is_empty());
        // Withdrawn intents are still listed
        assert_eq!(store.intents_for_app(&app).await.unwrap().len(), 1);

        assert_eq!(
            store.calls(),
            vec![StoreCall::Submit(i.key.clone()), StoreCall::Withdraw(i.key.clone())]
        );
    }

    #[tokio::test]
    async fn test_scoped_by_application() {
        let store = MemoryIntentStore::new();
        store.submit(&intent("a", "10.0.0.0/24")).await.unwrap();
        store.submit(&intent("b", "10.0.1.0/24")).await.unwrap();

        let a = store.intents_for_app(&ApplicationId::new("a")).await.unwrap();
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].key, IntentKey::new("10.0.0.0/24"));
        assert_eq!(
            store
                .state(&ApplicationId::new("a"), &IntentKey::new("10.0.1.0/24"))
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let store = MemoryIntentStore::new();
        store.fail_next(2);

        assert!(store.submit(&intent("a", "10.0.0.0/24")).await.is_err());
        assert!(store.intents_for_app(&ApplicationId::new("a")).await.is_err());
        assert!(store.submit(&intent("a", "10.0.0.0/24")).await.is_ok());
        assert_eq!(store.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_failure_targets_one_key() {
        let store = MemoryIntentStore::new();
        let app = ApplicationId::new("a");
        store.fail_key(IntentKey::new("10.0.1.0/24"));

        store.submit(&intent("a", "10.0.0.0/24")).await.unwrap();
        assert!(store.submit(&intent("a", "10.0.1.0/24")).await.is_err());
        assert_eq!(store.state(&app, &IntentKey::new("10.0.1.0/24")).await.unwrap(), None);

        store.submit(&intent("a", "10.0.1.0/24")).await.unwrap();
        assert_eq!(store.installed(&app).len(), 2);
    }
}
