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
use crate::types::error::{InvalidCapacitySnafu, NoNamespaceSnafu};
use crate::utils::quantity;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use kube::{CustomResource, KubeSchema, Resource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use snafu::{OptionExt, ResultExt};
use strum::Display;

/// Finalizer that keeps the cluster until its discovery entry is removed.
pub const DISCOVERY_FINALIZER: &str = "ocs.openshift.io/odf-info-cleanup";

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, KubeSchema, Default)]
#[kube(
    group = "ocs.openshift.io",
    version = "v1",
    kind = "StorageCluster",
    namespaced,
    status = "StorageClusterStatus",
    shortname = "storcluster",
    plural = "storageclusters",
    singular = "storagecluster",
    printcolumn = r#"{"name":"External", "type":"boolean", "jsonPath":".spec.externalStorage.enable"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#,
    crates(serde_json = "k8s_openapi::serde_json")
)]
#[serde(rename_all = "camelCase")]
pub struct StorageClusterSpec {
    #[serde(default)]
    pub external_storage: ExternalStorageSpec,

    /// Total capacity shared by every consumer of this cluster. Unset means
    /// the pool is unbounded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumer_capacity_budget: Option<Quantity>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExternalStorageSpec {
    #[serde(default)]
    pub enable: bool,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StorageClusterStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_provider_endpoint: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Display)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentType {
    #[strum(to_string = "internal")]
    Internal,

    #[strum(to_string = "external")]
    External,
}

impl StorageCluster {
    pub fn namespace(&self) -> Result<String, types::error::Error> {
        ResourceExt::namespace(self).context(NoNamespaceSnafu)
    }

    pub fn name(&self) -> String {
        ResourceExt::name_any(self)
    }

    pub fn deployment_type(&self) -> DeploymentType {
        if self.spec.external_storage.enable {
            DeploymentType::External
        } else {
            DeploymentType::Internal
        }
    }

    pub fn capacity_budget_bytes(&self) -> Result<u64, types::error::Error> {
        match self.spec.consumer_capacity_budget.as_ref() {
            Some(budget) => {
                quantity::to_bytes(budget).context(InvalidCapacitySnafu { name: self.name() })
            }
            None => Ok(u64::MAX),
        }
    }

    pub fn provider_endpoint(&self) -> String {
        self.status
            .as_ref()
            .and_then(|s| s.storage_provider_endpoint.clone())
            .unwrap_or_default()
    }

    /// Key of this cluster's entry inside the shared discovery container.
    pub fn discovery_key(&self) -> Result<String, types::error::Error> {
        Ok(format!("{}_{}.config", self.namespace()?, self.name()))
    }

    /// Plain (non-controller) owner reference, so several clusters can own
    /// the shared container at once.
    pub fn new_owner_ref(&self) -> metav1::OwnerReference {
        metav1::OwnerReference {
            api_version: Self::api_version(&()).to_string(),
            kind: Self::kind(&()).to_string(),
            name: self.name(),
            uid: self.meta().uid.clone().unwrap_or_default(),
            controller: None,
            block_owner_deletion: None,
        }
    }
}
