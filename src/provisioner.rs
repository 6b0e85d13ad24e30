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

//! Cluster-side objects backing a consumer: a Rook `CephBlockPool` capped at
//! the granted capacity and a `CephClient` whose caps are scoped to it.

use crate::store;
use crate::types;
use crate::types::v1alpha1::status::CephObjects;
use crate::types::v1alpha1::storage_consumer::StorageConsumer;
use crate::utils::quantity;
use async_trait::async_trait;
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::api::{Api, DeleteParams, DynamicObject, Patch, PatchParams};
use kube::discovery::ApiResource;
use snafu::{ResultExt, Snafu};
use std::time::Duration;
use tracing::{debug, info};

const FIELD_MANAGER: &str = "ocs-provider";

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("{} '{}' was rejected: {}", kind, name, message))]
    Rejected {
        kind: String,
        name: String,
        message: String,
    },

    #[snafu(display("Kubernetes API error: {}", source))]
    Kube { source: kube::Error },

    #[snafu(display("invalid capacity: {}", source))]
    Capacity { source: quantity::Error },

    #[snafu(display("serde_json error: {}", source))]
    SerdeJson { source: serde_json::Error },

    #[snafu(transparent)]
    Store { source: store::Error },

    #[snafu(transparent)]
    Types { source: types::error::Error },
}

impl Error {
    /// Failures that will not go away by retrying the same request.
    pub fn is_unrecoverable(&self) -> bool {
        matches!(
            self,
            Error::Rejected { .. } | Error::Capacity { .. } | Error::SerdeJson { .. }
        )
    }
}

/// What provisioning produced for a consumer.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Provisioned {
    pub objects: CephObjects,
    pub connection: Option<corev1::SecretKeySelector>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Creates or updates the pool and user for `consumer`. Idempotent.
    async fn provision(
        &self,
        consumer: &StorageConsumer,
        capacity: &Quantity,
    ) -> Result<Provisioned, Error>;

    /// Removes the pool and user. Objects already gone count as removed.
    async fn deprovision(&self, consumer: &StorageConsumer) -> Result<(), Error>;
}

fn ceph_resource(kind: &str, plural: &str) -> ApiResource {
    ApiResource {
        group: "ceph.rook.io".to_string(),
        version: "v1".to_string(),
        api_version: "ceph.rook.io/v1".to_string(),
        kind: kind.to_string(),
        plural: plural.to_string(),
    }
}

fn block_pool_resource() -> ApiResource {
    ceph_resource("CephBlockPool", "cephblockpools")
}

fn ceph_client_resource() -> ApiResource {
    ceph_resource("CephClient", "cephclients")
}

/// Desired `CephBlockPool` for a consumer with `max_bytes` of quota.
pub fn new_block_pool(consumer: &StorageConsumer, max_bytes: u64) -> Result<DynamicObject, Error> {
    serde_json::from_value(serde_json::json!({
        "apiVersion": "ceph.rook.io/v1",
        "kind": "CephBlockPool",
        "metadata": {
            "name": consumer.block_pool_name(),
            "namespace": consumer.namespace()?,
            "ownerReferences": [consumer.new_owner_ref()],
        },
        "spec": {
            "failureDomain": "host",
            "replicated": { "size": 3 },
            "quotas": { "maxBytes": max_bytes },
        },
    }))
    .context(SerdeJsonSnafu)
}

/// Desired `CephClient` restricted to the consumer's pool.
pub fn new_ceph_client(consumer: &StorageConsumer) -> Result<DynamicObject, Error> {
    serde_json::from_value(serde_json::json!({
        "apiVersion": "ceph.rook.io/v1",
        "kind": "CephClient",
        "metadata": {
            "name": consumer.ceph_user_name(),
            "namespace": consumer.namespace()?,
            "ownerReferences": [consumer.new_owner_ref()],
        },
        "spec": {
            "caps": {
                "mon": "profile rbd",
                "osd": format!("profile rbd pool={}", consumer.block_pool_name()),
            },
        },
    }))
    .context(SerdeJsonSnafu)
}

fn classify(source: kube::Error, kind: &str, name: &str) -> Error {
    match source {
        kube::Error::Api(ae) if ae.code == 400 || ae.code == 422 => Error::Rejected {
            kind: kind.to_owned(),
            name: name.to_owned(),
            message: ae.message,
        },
        source => Error::Kube { source },
    }
}

/// Provisioner that talks to Rook through the API server.
pub struct CephProvisioner {
    client: kube::Client,
    deadline: Duration,
}

impl CephProvisioner {
    pub fn new(client: kube::Client, deadline: Duration) -> Self {
        Self { client, deadline }
    }

    async fn bounded<T, F>(&self, operation: String, fut: F) -> Result<T, Error>
    where
        F: std::future::Future<Output = Result<T, Error>>,
    {
        match tokio::time::timeout(self.deadline, fut).await {
            Ok(result) => result,
            Err(_) => Err(store::Error::Timeout {
                operation,
                timeout: self.deadline,
            }
            .into()),
        }
    }

    async fn apply(&self, ar: &ApiResource, object: &DynamicObject) -> Result<(), Error> {
        let namespace = object.metadata.namespace.clone().unwrap_or_default();
        let name = object.metadata.name.clone().unwrap_or_default();
        let api: Api<DynamicObject> = Api::namespaced_with(self.client.clone(), &namespace, ar);

        self.bounded(format!("apply {}", ar.kind), async {
            api.patch(
                &name,
                &PatchParams::apply(FIELD_MANAGER).force(),
                &Patch::Apply(object),
            )
            .await
            .map_err(|e| classify(e, &ar.kind, &name))
        })
        .await?;

        debug!(kind = %ar.kind, name = %name, namespace = %namespace, "applied");
        Ok(())
    }

    async fn remove(&self, ar: &ApiResource, namespace: &str, name: &str) -> Result<(), Error> {
        let api: Api<DynamicObject> = Api::namespaced_with(self.client.clone(), namespace, ar);

        self.bounded(format!("delete {}", ar.kind), async {
            match api.delete(name, &DeleteParams::default()).await {
                Ok(_) => Ok(()),
                Err(kube::Error::Api(ae)) if ae.code == 404 => {
                    debug!(kind = %ar.kind, name = %name, "already removed");
                    Ok(())
                }
                Err(e) => Err(classify(e, &ar.kind, name)),
            }
        })
        .await
    }
}

#[async_trait]
impl Provisioner for CephProvisioner {
    async fn provision(
        &self,
        consumer: &StorageConsumer,
        capacity: &Quantity,
    ) -> Result<Provisioned, Error> {
        let max_bytes = quantity::to_bytes(capacity).context(CapacitySnafu)?;

        self.apply(&block_pool_resource(), &new_block_pool(consumer, max_bytes)?)
            .await?;
        self.apply(&ceph_client_resource(), &new_ceph_client(consumer)?)
            .await?;

        info!(
            consumer = %consumer.name(),
            pool = %consumer.block_pool_name(),
            max_bytes,
            "provisioned ceph objects"
        );

        Ok(Provisioned {
            objects: CephObjects {
                block_pool_name: Some(consumer.block_pool_name()),
                ceph_user: Some(consumer.ceph_user_name()),
            },
            connection: Some(corev1::SecretKeySelector {
                name: consumer.client_secret_name(),
                key: consumer.ceph_user_name(),
                optional: None,
            }),
        })
    }

    async fn deprovision(&self, consumer: &StorageConsumer) -> Result<(), Error> {
        let namespace = consumer.namespace()?;
        self.remove(&ceph_client_resource(), &namespace, &consumer.ceph_user_name())
            .await?;
        self.remove(&block_pool_resource(), &namespace, &consumer.block_pool_name())
            .await?;
        info!(consumer = %consumer.name(), "deprovisioned ceph objects");
        Ok(())
    }
}
