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

use crate::types;
use crate::types::error::{InvalidCapacitySnafu, InvalidConsumerIdSnafu, NoNamespaceSnafu};
use crate::types::v1alpha1::status::state::ConsumerState;
use crate::utils::quantity;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use kube::{CustomResource, KubeSchema, Resource, ResourceExt};
use serde::{Deserialize, Serialize};
use snafu::{OptionExt, ResultExt};

/// Finalizer that keeps a consumer around until its capacity is released
/// and its Ceph objects are gone.
pub const CONSUMER_FINALIZER: &str = "ocs.openshift.io/storageconsumer-protection";

/// Annotation that asks the operator to retry a `Failed` consumer.
pub const RETRY_ANNOTATION: &str = "ocs.openshift.io/retry";

/// Annotation carrying the client operator version seen at onboarding.
pub const CLIENT_OPERATOR_VERSION_ANNOTATION: &str = "ocs.openshift.io/client-operator-version";

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, KubeSchema, Default)]
#[kube(
    group = "ocs.openshift.io",
    version = "v1alpha1",
    kind = "StorageConsumer",
    namespaced,
    status = "crate::types::v1alpha1::status::Status",
    shortname = "consumer",
    plural = "storageconsumers",
    singular = "storageconsumer",
    printcolumn = r#"{"name":"State", "type":"string", "jsonPath":".status.state"}"#,
    printcolumn = r#"{"name":"Granted", "type":"string", "jsonPath":".status.grantedCapacity"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#,
    crates(serde_json = "k8s_openapi::serde_json")
)]
#[serde(rename_all = "camelCase")]
pub struct StorageConsumerSpec {
    /// Total quota requested by the consumer.
    pub capacity: Quantity,
}

impl StorageConsumer {
    pub fn new_with_capacity(name: &str, namespace: &str, capacity: Quantity) -> Self {
        let mut consumer = StorageConsumer::new(name, StorageConsumerSpec { capacity });
        consumer.metadata.namespace = Some(namespace.to_owned());
        consumer
    }

    pub fn namespace(&self) -> Result<String, types::error::Error> {
        ResourceExt::namespace(self).context(NoNamespaceSnafu)
    }

    pub fn name(&self) -> String {
        ResourceExt::name_any(self)
    }

    /// Stable identifier handed to the client at onboarding.
    pub fn id(&self) -> Result<String, types::error::Error> {
        Ok(format!("{}/{}", self.namespace()?, self.name()))
    }

    pub fn state(&self) -> Option<ConsumerState> {
        self.status.as_ref().and_then(|s| s.state)
    }

    pub fn requested_bytes(&self) -> Result<u64, types::error::Error> {
        quantity::to_bytes(&self.spec.capacity).context(InvalidCapacitySnafu { name: self.name() })
    }

    /// Bytes currently counted against the pool. Only `Configuring` and
    /// `Ready` consumers hold capacity.
    pub fn held_bytes(&self) -> Result<u64, types::error::Error> {
        let Some(status) = self.status.as_ref() else {
            return Ok(0);
        };
        match (status.state, status.granted_capacity.as_ref()) {
            (Some(state), Some(granted)) if state.holds_capacity() => {
                quantity::to_bytes(granted).context(InvalidCapacitySnafu { name: self.name() })
            }
            _ => Ok(0),
        }
    }

    pub fn retry_requested(&self) -> bool {
        self.annotations()
            .get(RETRY_ANNOTATION)
            .is_some_and(|v| v != "false")
    }

    pub fn is_deleted(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// Controller owner reference for objects provisioned for this consumer.
    pub fn new_owner_ref(&self) -> metav1::OwnerReference {
        metav1::OwnerReference {
            api_version: Self::api_version(&()).to_string(),
            kind: Self::kind(&()).to_string(),
            name: self.name(),
            uid: self.meta().uid.clone().unwrap_or_default(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }
    }

    pub fn block_pool_name(&self) -> String {
        format!("cephblockpool-{}", self.name())
    }

    pub fn ceph_user_name(&self) -> String {
        format!("cephclient-{}", self.name())
    }

    /// Secret Rook writes the CephClient key into.
    pub fn client_secret_name(&self) -> String {
        format!("rook-ceph-client-{}", self.ceph_user_name())
    }
}

/// Splits a consumer id of the form `<namespace>/<name>`.
pub fn split_consumer_id(id: &str) -> Result<(&str, &str), types::error::Error> {
    match id.split_once('/') {
        Some((ns, name)) if !ns.is_empty() && !name.is_empty() && !name.contains('/') => {
            Ok((ns, name))
        }
        _ => InvalidConsumerIdSnafu { id }.fail(),
    }
}
