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

//! In-memory store with API-server-like semantics: version tokens checked
//! on every write, status kept apart from metadata and spec, and deletion
//! deferred while finalizers remain.

use crate::store::{ClusterStore, ConfigMapStore, ConsumerStore, Error, SecretLookup};
use crate::types::v1::storage_cluster::StorageCluster;
use crate::types::v1alpha1::storage_consumer::StorageConsumer;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Default)]
struct Inner {
    version: u64,
    consumers: Vec<StorageConsumer>,
    clusters: Vec<StorageCluster>,
    config_maps: Vec<ConfigMap>,
    secrets: BTreeMap<(String, String), BTreeMap<String, Vec<u8>>>,
}

impl Inner {
    fn next_version(&mut self) -> String {
        self.version += 1;
        self.version.to_string()
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    conflicts: AtomicUsize,
    fail_consumer_list: AtomicBool,
}

fn position<K: ResourceExt>(items: &[K], namespace: &str, name: &str) -> Option<usize> {
    items
        .iter()
        .position(|i| i.namespace().as_deref() == Some(namespace) && i.name_any() == name)
}

fn not_found<K: Resource<DynamicType = ()>>(name: &str) -> Error {
    Error::NotFound {
        kind: K::kind(&()).to_string(),
        name: name.to_owned(),
    }
}

fn deletion_time() -> metav1::Time {
    serde_json::from_value(serde_json::json!("2025-01-01T00:00:00Z"))
        .expect("valid RFC 3339 timestamp")
}

impl MemoryStore {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of writes rejected for a stale version token.
    pub fn conflicts(&self) -> usize {
        self.conflicts.load(Ordering::SeqCst)
    }

    /// Makes every following consumer list call fail.
    pub fn fail_consumer_list(&self, fail: bool) {
        self.fail_consumer_list.store(fail, Ordering::SeqCst);
    }

    pub fn insert_cluster(&self, mut cluster: StorageCluster) -> StorageCluster {
        let mut inner = self.lock();
        let version = inner.next_version();
        cluster.metadata.resource_version = Some(version.clone());
        cluster.metadata.uid.get_or_insert_with(|| format!("uid-{version}"));
        inner.clusters.push(cluster.clone());
        cluster
    }

    pub fn insert_secret(&self, namespace: &str, name: &str, data: &[(&str, &[u8])]) {
        self.lock().secrets.insert(
            (namespace.to_owned(), name.to_owned()),
            data.iter()
                .map(|(k, v)| ((*k).to_owned(), v.to_vec()))
                .collect(),
        );
    }

    /// Marks a cluster deleted, or drops it when no finalizers remain.
    pub fn request_cluster_deletion(&self, namespace: &str, name: &str) {
        let mut inner = self.lock();
        let Some(idx) = position(&inner.clusters, namespace, name) else {
            return;
        };
        if inner.clusters[idx].finalizers().is_empty() {
            inner.clusters.remove(idx);
        } else {
            let version = inner.next_version();
            let cluster = &mut inner.clusters[idx];
            cluster.metadata.deletion_timestamp = Some(deletion_time());
            cluster.metadata.resource_version = Some(version);
        }
    }

    pub fn config_map(&self, namespace: &str, name: &str) -> Option<ConfigMap> {
        let inner = self.lock();
        position(&inner.config_maps, namespace, name).map(|i| inner.config_maps[i].clone())
    }

    pub fn consumer(&self, namespace: &str, name: &str) -> Option<StorageConsumer> {
        let inner = self.lock();
        position(&inner.consumers, namespace, name).map(|i| inner.consumers[i].clone())
    }

    fn check_version(
        &self,
        stored: &Option<String>,
        given: &Option<String>,
        kind: &str,
        name: &str,
    ) -> Result<(), Error> {
        match given {
            Some(v) if Some(v) != stored.as_ref() => {
                self.conflicts.fetch_add(1, Ordering::SeqCst);
                Err(Error::Conflict {
                    kind: kind.to_owned(),
                    name: name.to_owned(),
                })
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl ConsumerStore for MemoryStore {
    async fn create(&self, consumer: &StorageConsumer) -> Result<StorageConsumer, Error> {
        tokio::task::yield_now().await;
        let mut inner = self.lock();
        let (ns, name) = (consumer.namespace().unwrap_or_default(), consumer.name_any());
        if position(&inner.consumers, &ns, &name).is_some() {
            return Err(Error::AlreadyExists {
                kind: StorageConsumer::kind(&()).to_string(),
                name,
            });
        }
        let version = inner.next_version();
        let mut created = consumer.clone();
        created.status = None;
        created.metadata.resource_version = Some(version.clone());
        created.metadata.uid = Some(format!("uid-{version}"));
        inner.consumers.push(created.clone());
        Ok(created)
    }

    async fn get(&self, namespace: &str, name: &str) -> Result<StorageConsumer, Error> {
        tokio::task::yield_now().await;
        self.consumer(namespace, name)
            .ok_or_else(|| not_found::<StorageConsumer>(name))
    }

    async fn update(&self, consumer: &StorageConsumer) -> Result<StorageConsumer, Error> {
        tokio::task::yield_now().await;
        let mut inner = self.lock();
        let (ns, name) = (consumer.namespace().unwrap_or_default(), consumer.name_any());
        let idx = position(&inner.consumers, &ns, &name)
            .ok_or_else(|| not_found::<StorageConsumer>(&name))?;
        self.check_version(
            &inner.consumers[idx].metadata.resource_version,
            &consumer.metadata.resource_version,
            "StorageConsumer",
            &name,
        )?;

        let version = inner.next_version();
        let stored = &inner.consumers[idx];
        let mut updated = consumer.clone();
        updated.status = stored.status.clone();
        updated.metadata.uid = stored.metadata.uid.clone();
        updated.metadata.deletion_timestamp = stored.metadata.deletion_timestamp.clone();
        updated.metadata.resource_version = Some(version);

        if updated.metadata.deletion_timestamp.is_some() && updated.finalizers().is_empty() {
            inner.consumers.remove(idx);
        } else {
            inner.consumers[idx] = updated.clone();
        }
        Ok(updated)
    }

    async fn update_status(&self, consumer: &StorageConsumer) -> Result<StorageConsumer, Error> {
        tokio::task::yield_now().await;
        let mut inner = self.lock();
        let (ns, name) = (consumer.namespace().unwrap_or_default(), consumer.name_any());
        let idx = position(&inner.consumers, &ns, &name)
            .ok_or_else(|| not_found::<StorageConsumer>(&name))?;
        self.check_version(
            &inner.consumers[idx].metadata.resource_version,
            &consumer.metadata.resource_version,
            "StorageConsumer",
            &name,
        )?;

        let version = inner.next_version();
        let stored = &mut inner.consumers[idx];
        stored.status = consumer.status.clone();
        stored.metadata.resource_version = Some(version);
        Ok(stored.clone())
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), Error> {
        tokio::task::yield_now().await;
        let mut inner = self.lock();
        let idx = position(&inner.consumers, namespace, name)
            .ok_or_else(|| not_found::<StorageConsumer>(name))?;
        if inner.consumers[idx].finalizers().is_empty() {
            inner.consumers.remove(idx);
        } else if inner.consumers[idx].metadata.deletion_timestamp.is_none() {
            let version = inner.next_version();
            let stored = &mut inner.consumers[idx];
            stored.metadata.deletion_timestamp = Some(deletion_time());
            stored.metadata.resource_version = Some(version);
        }
        Ok(())
    }

    async fn list(&self, namespace: &str) -> Result<Vec<StorageConsumer>, Error> {
        tokio::task::yield_now().await;
        if self.fail_consumer_list.load(Ordering::SeqCst) {
            return Err(Error::Timeout {
                operation: "list".to_owned(),
                timeout: Duration::ZERO,
            });
        }
        Ok(self
            .lock()
            .consumers
            .iter()
            .filter(|c| ResourceExt::namespace(*c).as_deref() == Some(namespace))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ClusterStore for MemoryStore {
    async fn get_cluster(&self, namespace: &str, name: &str) -> Result<StorageCluster, Error> {
        tokio::task::yield_now().await;
        let inner = self.lock();
        position(&inner.clusters, namespace, name)
            .map(|i| inner.clusters[i].clone())
            .ok_or_else(|| not_found::<StorageCluster>(name))
    }

    async fn list_clusters(&self, namespace: &str) -> Result<Vec<StorageCluster>, Error> {
        tokio::task::yield_now().await;
        Ok(self
            .lock()
            .clusters
            .iter()
            .filter(|c| ResourceExt::namespace(*c).as_deref() == Some(namespace))
            .cloned()
            .collect())
    }

    async fn update_cluster(&self, cluster: &StorageCluster) -> Result<StorageCluster, Error> {
        tokio::task::yield_now().await;
        let mut inner = self.lock();
        let (ns, name) = (ResourceExt::namespace(cluster).unwrap_or_default(), cluster.name_any());
        let idx = position(&inner.clusters, &ns, &name)
            .ok_or_else(|| not_found::<StorageCluster>(&name))?;
        self.check_version(
            &inner.clusters[idx].metadata.resource_version,
            &cluster.metadata.resource_version,
            "StorageCluster",
            &name,
        )?;

        let version = inner.next_version();
        let stored = &inner.clusters[idx];
        let mut updated = cluster.clone();
        updated.status = stored.status.clone();
        updated.metadata.uid = stored.metadata.uid.clone();
        updated.metadata.deletion_timestamp = stored.metadata.deletion_timestamp.clone();
        updated.metadata.resource_version = Some(version);

        if updated.metadata.deletion_timestamp.is_some() && updated.finalizers().is_empty() {
            inner.clusters.remove(idx);
        } else {
            inner.clusters[idx] = updated.clone();
        }
        Ok(updated)
    }
}

#[async_trait]
impl ConfigMapStore for MemoryStore {
    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<ConfigMap, Error> {
        tokio::task::yield_now().await;
        self.config_map(namespace, name)
            .ok_or_else(|| not_found::<ConfigMap>(name))
    }

    async fn create_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap, Error> {
        tokio::task::yield_now().await;
        let mut inner = self.lock();
        let (ns, name) = (ResourceExt::namespace(config_map).unwrap_or_default(), config_map.name_any());
        if position(&inner.config_maps, &ns, &name).is_some() {
            return Err(Error::AlreadyExists {
                kind: "ConfigMap".to_owned(),
                name,
            });
        }
        let version = inner.next_version();
        let mut created = config_map.clone();
        created.metadata.resource_version = Some(version);
        inner.config_maps.push(created.clone());
        Ok(created)
    }

    async fn replace_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap, Error> {
        tokio::task::yield_now().await;
        let mut inner = self.lock();
        let (ns, name) = (ResourceExt::namespace(config_map).unwrap_or_default(), config_map.name_any());
        let idx = position(&inner.config_maps, &ns, &name)
            .ok_or_else(|| not_found::<ConfigMap>(&name))?;
        self.check_version(
            &inner.config_maps[idx].metadata.resource_version,
            &config_map.metadata.resource_version,
            "ConfigMap",
            &name,
        )?;
        let version = inner.next_version();
        let mut replaced = config_map.clone();
        replaced.metadata.resource_version = Some(version);
        inner.config_maps[idx] = replaced.clone();
        Ok(replaced)
    }

    async fn delete_config_map(&self, namespace: &str, name: &str) -> Result<(), Error> {
        tokio::task::yield_now().await;
        let mut inner = self.lock();
        let idx = position(&inner.config_maps, namespace, name)
            .ok_or_else(|| not_found::<ConfigMap>(name))?;
        inner.config_maps.remove(idx);
        Ok(())
    }
}

#[async_trait]
impl SecretLookup for MemoryStore {
    async fn secret_data(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<BTreeMap<String, Vec<u8>>, Error> {
        tokio::task::yield_now().await;
        self.lock()
            .secrets
            .get(&(namespace.to_owned(), name.to_owned()))
            .cloned()
            .ok_or_else(|| Error::NotFound {
                kind: "Secret".to_owned(),
                name: name.to_owned(),
            })
    }
}
