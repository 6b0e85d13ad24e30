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

use crate::types::v1alpha1::status::state::ConsumerState;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use serde::{Deserialize, Serialize};

/// Accessors for what a client sends when it onboards.
pub trait StorageClientOnboarding {
    fn onboarding_ticket(&self) -> &str;
    fn consumer_name(&self) -> &str;
    fn client_operator_version(&self) -> &str;

    fn set_onboarding_ticket(&mut self, ticket: impl Into<String>) -> &mut Self;
    fn set_consumer_name(&mut self, name: impl Into<String>) -> &mut Self;
    fn set_client_operator_version(&mut self, version: impl Into<String>) -> &mut Self;
}

/// Accessors for what a client reports about itself on every heartbeat.
pub trait StorageClientStatus {
    fn platform_version(&self) -> &str;
    fn operator_version(&self) -> &str;
    fn cluster_id(&self) -> &str;
    fn namespaced_name(&self) -> &str;
    fn cluster_name(&self) -> &str;

    fn set_platform_version(&mut self, version: impl Into<String>) -> &mut Self;
    fn set_operator_version(&mut self, version: impl Into<String>) -> &mut Self;
    fn set_cluster_id(&mut self, cluster_id: impl Into<String>) -> &mut Self;
    fn set_namespaced_name(&mut self, namespaced_name: impl Into<String>) -> &mut Self;
    fn set_cluster_name(&mut self, cluster_name: impl Into<String>) -> &mut Self;
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OnboardConsumerRequest {
    pub onboarding_ticket: String,
    pub consumer_name: String,
    #[serde(default)]
    pub client_operator_version: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OnboardConsumerResponse {
    pub storage_consumer_id: String,
    pub storage_provider_endpoint: String,
    pub ceph_cluster_fsid: String,
    pub granted_capacity: Quantity,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReportStatusRequest {
    /// Absent for clients that onboarded before ids were handed out; the
    /// consumer is then matched on `clusterId` and `namespacedName`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_consumer_id: Option<String>,
    #[serde(default)]
    pub cluster_id: String,
    #[serde(default)]
    pub namespaced_name: String,
    #[serde(default)]
    pub cluster_name: String,
    #[serde(default)]
    pub client_platform_version: String,
    #[serde(default)]
    pub client_operator_version: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReportStatusResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<ConsumerState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub granted_capacity: Option<Quantity>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OffboardConsumerRequest {
    pub storage_consumer_id: String,
}

impl StorageClientOnboarding for OnboardConsumerRequest {
    fn onboarding_ticket(&self) -> &str {
        &self.onboarding_ticket
    }

    fn consumer_name(&self) -> &str {
        &self.consumer_name
    }

    fn client_operator_version(&self) -> &str {
        &self.client_operator_version
    }

    fn set_onboarding_ticket(&mut self, ticket: impl Into<String>) -> &mut Self {
        self.onboarding_ticket = ticket.into();
        self
    }

    fn set_consumer_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.consumer_name = name.into();
        self
    }

    fn set_client_operator_version(&mut self, version: impl Into<String>) -> &mut Self {
        self.client_operator_version = version.into();
        self
    }
}

impl StorageClientStatus for ReportStatusRequest {
    fn platform_version(&self) -> &str {
        &self.client_platform_version
    }

    fn operator_version(&self) -> &str {
        &self.client_operator_version
    }

    fn cluster_id(&self) -> &str {
        &self.cluster_id
    }

    fn namespaced_name(&self) -> &str {
        &self.namespaced_name
    }

    fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    fn set_platform_version(&mut self, version: impl Into<String>) -> &mut Self {
        self.client_platform_version = version.into();
        self
    }

    fn set_operator_version(&mut self, version: impl Into<String>) -> &mut Self {
        self.client_operator_version = version.into();
        self
    }

    fn set_cluster_id(&mut self, cluster_id: impl Into<String>) -> &mut Self {
        self.cluster_id = cluster_id.into();
        self
    }

    fn set_namespaced_name(&mut self, namespaced_name: impl Into<String>) -> &mut Self {
        self.namespaced_name = namespaced_name.into();
        self
    }

    fn set_cluster_name(&mut self, cluster_name: impl Into<String>) -> &mut Self {
        self.cluster_name = cluster_name.into();
        self
    }
}
