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

pub mod state;

use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<state::ConsumerState>,

    /// Capacity reserved for the consumer out of the cluster's pool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub granted_capacity: Option<Quantity>,

    #[serde(default)]
    pub ceph_objects: CephObjects,

    /// Reference to the secret holding the consumer's connection credentials.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_details: Option<corev1::SecretKeySelector>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<ClientStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Ceph objects provisioned on behalf of a consumer.
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CephObjects {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_pool_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ceph_user: Option<String>,
}

/// What the consumer's client last told us about itself.
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClientStatus {
    #[serde(default)]
    pub cluster_id: String,

    /// Namespaced name of the client object on the consumer cluster.
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub cluster_name: String,

    #[serde(default)]
    pub platform_version: String,

    #[serde(default)]
    pub operator_version: String,

    /// RFC 3339 timestamp of the last status report.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_heartbeat: Option<String>,
}
