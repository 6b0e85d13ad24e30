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

use crate::utils::quantity;
use clap::{Args, ValueEnum};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use std::time::Duration;

/// Where the version published in discovery documents comes from.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum VersionSource {
    /// The installed `ocs-operator` ClusterServiceVersion.
    Csv,
    /// The version compiled into this binary.
    Build,
}

#[derive(Args, Debug, Clone)]
pub struct ServerArgs {
    /// Namespace holding the storage cluster, its consumers and the
    /// discovery container.
    #[arg(long, env = "OPERATOR_NAMESPACE", default_value = "openshift-storage")]
    pub operator_namespace: String,

    #[arg(long, env = "PROVIDER_PORT", default_value_t = 50051)]
    pub provider_port: u16,

    /// Secret used to sign and verify onboarding tickets.
    #[arg(long, env = "ONBOARDING_TICKET_SECRET", hide_env_values = true)]
    pub ticket_secret: String,

    /// Capacity granted to tickets that carry no quota.
    #[arg(long, default_value = "1Ti", value_parser = parse_quantity)]
    pub default_consumer_capacity: Quantity,

    #[arg(long, value_enum, default_value_t = VersionSource::Csv)]
    pub version_source: VersionSource,

    /// Deadline for every API server call.
    #[arg(long, default_value_t = 30)]
    pub store_timeout_secs: u64,

    /// Interval between discovery refreshes when nothing changed.
    #[arg(long, default_value_t = 300)]
    pub resync_secs: u64,
}

impl ServerArgs {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }

    pub fn resync(&self) -> Duration {
        Duration::from_secs(self.resync_secs)
    }
}

pub fn parse_quantity(value: &str) -> Result<Quantity, String> {
    let parsed = Quantity(value.to_owned());
    quantity::to_bytes(&parsed).map_err(|e| e.to_string())?;
    Ok(parsed)
}
