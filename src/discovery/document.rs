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

use crate::discovery::facts::ClusterFacts;
use crate::types;
use crate::types::v1::storage_cluster::{DeploymentType, StorageCluster};
use crate::types::v1alpha1::storage_consumer::StorageConsumer;
use serde::{Deserialize, Serialize};

/// Published description of one storage cluster and its connected clients.
/// Field order is the serialized order.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryDocument {
    pub version: String,
    pub deployment_type: DeploymentType,
    pub clients: Vec<ConnectedClient>,
    pub storage_cluster: InfoStorageCluster,
    pub storage_system_name: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedClient {
    pub name: String,
    pub cluster_id: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InfoStorageCluster {
    pub namespaced_name: NamespacedName,
    pub storage_provider_endpoint: String,
    #[serde(rename = "cephClusterFSID")]
    pub ceph_cluster_fsid: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct NamespacedName {
    pub namespace: String,
    pub name: String,
}

impl DiscoveryDocument {
    /// Projects the cluster facts and the consumer list. Every consumer is
    /// listed in the order given, whatever its state; consumers that have
    /// not reported yet appear with empty client fields.
    pub fn build(
        facts: &ClusterFacts,
        cluster: &StorageCluster,
        consumers: &[StorageConsumer],
    ) -> Result<Self, types::error::Error> {
        let clients = consumers
            .iter()
            .map(|consumer| {
                let client = consumer.status.as_ref().and_then(|s| s.client.as_ref());
                ConnectedClient {
                    name: client.map(|c| c.name.clone()).unwrap_or_default(),
                    cluster_id: client.map(|c| c.cluster_id.clone()).unwrap_or_default(),
                }
            })
            .collect();

        Ok(Self {
            version: facts.version.clone(),
            deployment_type: facts.deployment_type,
            clients,
            storage_cluster: InfoStorageCluster {
                namespaced_name: NamespacedName {
                    namespace: cluster.namespace()?,
                    name: cluster.name(),
                },
                storage_provider_endpoint: facts.provider_endpoint.clone(),
                ceph_cluster_fsid: facts.ceph_fsid.clone(),
            },
            storage_system_name: facts.storage_system_name.clone(),
        })
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml_ng::Error> {
        serde_yaml_ng::to_string(self)
    }
}
