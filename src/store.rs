// Copyright 2025 RustFS Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Record store for consumers, clusters and the shared discovery container.
//!
//! The traits here are the only way the rest of the operator touches
//! persisted state. [`kubernetes::KubeStore`] backs them with the API server;
//! tests use the in-memory store. Every write carries the version token it
//! was read with and fails with [`Error::Conflict`] when that token is stale.

pub mod kubernetes;
#[cfg(test)]
pub mod memory;

use crate::types::v1::storage_cluster::StorageCluster;
use crate::types::v1alpha1::storage_consumer::StorageConsumer;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use k8s_openapi::api::core::v1::ConfigMap;
use snafu::Snafu;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

/// Attempts made for a read-modify-write before a conflict is surfaced.
pub const MAX_CONFLICT_RETRIES: usize = 5;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("{} '{}' not found", kind, name))]
    NotFound { kind: String, name: String },

    #[snafu(display("{} '{}' already exists", kind, name))]
    AlreadyExists { kind: String, name: String },

    #[snafu(display("{} '{}' was modified concurrently", kind, name))]
    Conflict { kind: String, name: String },

    #[snafu(display("{} timed out after {:?}", operation, timeout))]
    Timeout {
        operation: String,
        timeout: Duration,
    },

    #[snafu(display("Kubernetes API error: {}", source))]
    Kube { source: kube::Error },
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Error::AlreadyExists { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict { .. })
    }

    /// Errors worth retrying later without any change on the caller's side.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Conflict { .. } | Error::Timeout { .. } | Error::Kube { .. }
        )
    }
}

#[async_trait]
pub trait ConsumerStore: Send + Sync {
    async fn create(&self, consumer: &StorageConsumer) -> Result<StorageConsumer, Error>;

    async fn get(&self, namespace: &str, name: &str) -> Result<StorageConsumer, Error>;

    /// Replaces metadata and spec. Status is left untouched.
    async fn update(&self, consumer: &StorageConsumer) -> Result<StorageConsumer, Error>;

    /// Replaces status only. Metadata and spec are left untouched.
    async fn update_status(&self, consumer: &StorageConsumer) -> Result<StorageConsumer, Error>;

    /// Requests deletion. Records still holding finalizers are only marked.
    async fn delete(&self, namespace: &str, name: &str) -> Result<(), Error>;

    /// Consumers in `namespace`, in the order the store reports them.
    async fn list(&self, namespace: &str) -> Result<Vec<StorageConsumer>, Error>;
}

#[async_trait]
pub trait ClusterStore: Send + Sync {
    async fn get_cluster(&self, namespace: &str, name: &str) -> Result<StorageCluster, Error>;

    async fn list_clusters(&self, namespace: &str) -> Result<Vec<StorageCluster>, Error>;

    /// Replaces metadata and spec.
    async fn update_cluster(&self, cluster: &StorageCluster) -> Result<StorageCluster, Error>;
}

/// Whole-value access to ConfigMaps. `replace` swaps the entire data map.
#[async_trait]
pub trait ConfigMapStore: Send + Sync {
    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<ConfigMap, Error>;

    async fn create_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap, Error>;

    async fn replace_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap, Error>;

    async fn delete_config_map(&self, namespace: &str, name: &str) -> Result<(), Error>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SecretLookup: Send + Sync {
    /// Raw data of a secret, keyed by entry name.
    async fn secret_data(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<BTreeMap<String, Vec<u8>>, Error>;
}

/// Runs a store operation under `timeout`, turning expiry into [`Error::Timeout`].
pub async fn with_deadline<T, F>(timeout: Duration, operation: &str, fut: F) -> Result<T, Error>
where
    F: Future<Output = Result<T, Error>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => TimeoutSnafu { operation, timeout }.fail(),
    }
}

/// Coalescing change signal. Every bump wakes each subscriber at most once,
/// however many bumps happened in between.
#[derive(Clone, Debug)]
pub struct ChangeNotifier {
    tx: Arc<watch::Sender<u64>>,
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeNotifier {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self { tx: Arc::new(tx) }
    }

    pub fn notify(&self) {
        self.tx.send_modify(|generation| *generation = generation.wrapping_add(1));
    }

    pub fn generation(&self) -> u64 {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.tx.subscribe()
    }

    /// A stream yielding once per (coalesced) change after subscription.
    pub fn changes(&self) -> impl Stream<Item = ()> + Send + Sync + 'static {
        WatchStream::from_changes(self.subscribe()).map(|_| ())
    }
}

/// Consumer store wrapper that signals a [`ChangeNotifier`] after every
/// successful write.
pub struct Notifying {
    inner: Arc<dyn ConsumerStore>,
    notifier: ChangeNotifier,
}

impl Notifying {
    pub fn new(inner: Arc<dyn ConsumerStore>, notifier: ChangeNotifier) -> Self {
        Self { inner, notifier }
    }

    fn notify_on<T>(&self, result: Result<T, Error>) -> Result<T, Error> {
        if result.is_ok() {
            self.notifier.notify();
        }
        result
    }
}

#[async_trait]
impl ConsumerStore for Notifying {
    async fn create(&self, consumer: &StorageConsumer) -> Result<StorageConsumer, Error> {
        let result = self.inner.create(consumer).await;
        self.notify_on(result)
    }

    async fn get(&self, namespace: &str, name: &str) -> Result<StorageConsumer, Error> {
        self.inner.get(namespace, name).await
    }

    async fn update(&self, consumer: &StorageConsumer) -> Result<StorageConsumer, Error> {
        let result = self.inner.update(consumer).await;
        self.notify_on(result)
    }

    async fn update_status(&self, consumer: &StorageConsumer) -> Result<StorageConsumer, Error> {
        let result = self.inner.update_status(consumer).await;
        self.notify_on(result)
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), Error> {
        let result = self.inner.delete(namespace, name).await;
        self.notify_on(result)
    }

    async fn list(&self, namespace: &str) -> Result<Vec<StorageConsumer>, Error> {
        self.inner.list(namespace).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    #[tokio::test]
    async fn test_deadline_maps_to_timeout() {
        let result: Result<(), Error> = with_deadline(
            Duration::from_millis(10),
            "slow get",
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            },
        )
        .await;

        let err = result.expect_err("should time out");
        assert!(matches!(err, Error::Timeout { .. }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_notifying_store_signals_writes_only() {
        let notifier = ChangeNotifier::new();
        let store = Notifying::new(Arc::new(MemoryStore::default()), notifier.clone());
        let consumer = crate::tests::create_test_consumer("tenant-a", "1Gi");

        store.create(&consumer).await.expect("create");
        assert_eq!(notifier.generation(), 1);

        store.list("openshift-storage").await.expect("list");
        store.get("openshift-storage", "tenant-a").await.expect("get");
        assert_eq!(notifier.generation(), 1);

        assert!(store.create(&consumer).await.is_err());
        assert_eq!(notifier.generation(), 1);

        store.delete("openshift-storage", "tenant-a").await.expect("delete");
        assert_eq!(notifier.generation(), 2);
    }

    #[tokio::test]
    async fn test_changes_coalesce() {
        let notifier = ChangeNotifier::new();
        let mut rx = notifier.subscribe();

        notifier.notify();
        notifier.notify();
        notifier.notify();

        rx.changed().await.expect("changed");
        assert_eq!(*rx.borrow_and_update(), 3);
        assert!(!rx.has_changed().expect("sender alive"));
    }
}
