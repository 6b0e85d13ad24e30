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

//! Merges per-cluster discovery documents into the shared container.
//!
//! The store replaces a ConfigMap as a whole, so every read-modify-write of
//! the container, for any cluster, runs under one [`ContainerLock`].

use crate::discovery::document::DiscoveryDocument;
use crate::discovery::facts::FactsGatherer;
use crate::discovery::{CONTAINER_NAME, Error, YamlSnafu};
use crate::store::{ConfigMapStore, ConsumerStore, MAX_CONFLICT_RETRIES};
use crate::types::v1::storage_cluster::StorageCluster;
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use snafu::ResultExt;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use strum::Display;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// Exclusive access to the shared container. Clones share the same lock.
#[derive(Clone, Debug, Default)]
pub struct ContainerLock(Arc<Mutex<()>>);

impl ContainerLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self) -> MutexGuard<'_, ()> {
        self.0.lock().await
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum AggregatorPhase {
    Idle,
    Computing,
    Writing,
}

struct PhaseGuard(Arc<AtomicUsize>);

impl PhaseGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter.clone())
    }
}

impl Drop for PhaseGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Clone)]
pub struct DiscoveryAggregator {
    config_maps: Arc<dyn ConfigMapStore>,
    lock: ContainerLock,
    namespace: String,
    computing: Arc<AtomicUsize>,
    writing: Arc<AtomicUsize>,
}

impl DiscoveryAggregator {
    /// `namespace` is where the shared container lives.
    pub fn new(config_maps: Arc<dyn ConfigMapStore>, lock: ContainerLock, namespace: &str) -> Self {
        Self {
            config_maps,
            lock,
            namespace: namespace.to_owned(),
            computing: Arc::default(),
            writing: Arc::default(),
        }
    }

    /// `Writing` while any pass holds or waits for the container, else
    /// `Computing` while any pass builds a document.
    pub fn phase(&self) -> AggregatorPhase {
        if self.writing.load(Ordering::SeqCst) > 0 {
            AggregatorPhase::Writing
        } else if self.computing.load(Ordering::SeqCst) > 0 {
            AggregatorPhase::Computing
        } else {
            AggregatorPhase::Idle
        }
    }

    /// One aggregation pass for `cluster`. Nothing is written when any fact
    /// or the consumer list cannot be read.
    pub async fn refresh(
        &self,
        cluster: &StorageCluster,
        facts: &FactsGatherer,
        consumers: &dyn ConsumerStore,
    ) -> Result<(), Error> {
        let payload = {
            let _computing = PhaseGuard::enter(&self.computing);
            let facts = facts.gather(cluster).await?;
            let consumers = consumers.list(&cluster.namespace()?).await?;
            DiscoveryDocument::build(&facts, cluster, &consumers)?
                .to_yaml()
                .context(YamlSnafu)?
        };

        self.publish(cluster, payload).await
    }

    /// Sets this cluster's key in the container, creating it if needed.
    pub async fn publish(&self, cluster: &StorageCluster, payload: String) -> Result<(), Error> {
        let key = cluster.discovery_key()?;
        let owner = cluster.new_owner_ref();

        let _writing = PhaseGuard::enter(&self.writing);
        let _guard = self.lock.acquire().await;

        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = match self
                .config_maps
                .get_config_map(&self.namespace, CONTAINER_NAME)
                .await
            {
                Ok(mut container) => {
                    let data = container.data.get_or_insert_with(BTreeMap::new);
                    let unchanged = data.get(&key) == Some(&payload);
                    data.insert(key.clone(), payload.clone());
                    let owned = add_owner(&mut container.metadata, &owner);
                    if unchanged && !owned {
                        debug!(key = %key, "discovery entry unchanged");
                        return Ok(());
                    }
                    self.config_maps.replace_config_map(&container).await
                }
                Err(e) if e.is_not_found() => {
                    let container = self.new_container(&key, &payload, &owner);
                    self.config_maps.create_config_map(&container).await
                }
                Err(e) => return Err(e.into()),
            };

            match result {
                Ok(_) => {
                    info!(key = %key, container = CONTAINER_NAME, "published discovery entry");
                    return Ok(());
                }
                Err(e)
                    if (e.is_conflict() || e.is_already_exists() || e.is_not_found())
                        && attempt < MAX_CONFLICT_RETRIES =>
                {
                    debug!(key = %key, attempt, error = %e, "container changed underneath, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Drops this cluster's key. The container goes away with its last key.
    pub async fn remove(&self, cluster: &StorageCluster) -> Result<(), Error> {
        let key = cluster.discovery_key()?;
        let uid = cluster.metadata.uid.clone().unwrap_or_default();

        let _writing = PhaseGuard::enter(&self.writing);
        let _guard = self.lock.acquire().await;

        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut container = match self
                .config_maps
                .get_config_map(&self.namespace, CONTAINER_NAME)
                .await
            {
                Ok(container) => container,
                Err(e) if e.is_not_found() => return Ok(()),
                Err(e) => return Err(e.into()),
            };

            let data = container.data.get_or_insert_with(BTreeMap::new);
            data.remove(&key);
            let result = if data.is_empty() {
                self.config_maps
                    .delete_config_map(&self.namespace, CONTAINER_NAME)
                    .await
                    .map(|_| ())
            } else {
                if let Some(owners) = container.metadata.owner_references.as_mut() {
                    owners.retain(|o| o.uid != uid);
                }
                self.config_maps
                    .replace_config_map(&container)
                    .await
                    .map(|_| ())
            };

            match result {
                Ok(()) => {
                    info!(key = %key, container = CONTAINER_NAME, "removed discovery entry");
                    return Ok(());
                }
                Err(e) if e.is_not_found() => return Ok(()),
                Err(e) if e.is_conflict() && attempt < MAX_CONFLICT_RETRIES => {
                    debug!(key = %key, attempt, "container changed underneath, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn new_container(&self, key: &str, payload: &str, owner: &metav1::OwnerReference) -> ConfigMap {
        ConfigMap {
            metadata: metav1::ObjectMeta {
                name: Some(CONTAINER_NAME.to_owned()),
                namespace: Some(self.namespace.clone()),
                owner_references: Some(vec![owner.clone()]),
                ..Default::default()
            },
            data: Some(BTreeMap::from([(key.to_owned(), payload.to_owned())])),
            ..Default::default()
        }
    }
}

/// Adds `owner` unless an owner with the same uid is present.
fn add_owner(meta: &mut metav1::ObjectMeta, owner: &metav1::OwnerReference) -> bool {
    let owners = meta.owner_references.get_or_insert_with(Vec::new);
    if owners.iter().any(|o| o.uid == owner.uid) {
        return false;
    }
    owners.push(owner.clone());
    true
}
