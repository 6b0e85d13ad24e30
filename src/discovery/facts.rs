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

//! Facts about a storage cluster gathered from its collaborators.

use crate::discovery::{
    Error, InvalidSecretDataSnafu, MissingSecretKeySnafu, NoAncestorSnafu, NoVersionSnafu,
};
use crate::store::SecretLookup;
use crate::types::v1::storage_cluster::{DeploymentType, StorageCluster};
use async_trait::async_trait;
use kube::api::{Api, DynamicObject, ListParams};
use kube::discovery::ApiResource;
use snafu::OptionExt;
use std::sync::Arc;
use std::time::Duration;

pub const MON_SECRET_NAME: &str = "rook-ceph-mon";
pub const FSID_KEY: &str = "fsid";
pub const STORAGE_SYSTEM_KIND: &str = "StorageSystem";
pub const OPERATOR_CSV_PREFIX: &str = "ocs-operator";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterFacts {
    pub version: String,
    pub deployment_type: DeploymentType,
    pub ceph_fsid: String,
    pub provider_endpoint: String,
    pub storage_system_name: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VersionLookup: Send + Sync {
    /// Installed operator version for clusters in `namespace`.
    async fn installed_version(&self, namespace: &str) -> Result<String, Error>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AncestorLookup: Send + Sync {
    /// Name of the closest ancestor of `cluster` with the given kind.
    async fn ancestor_name(
        &self,
        cluster: &StorageCluster,
        kind: &str,
    ) -> Result<Option<String>, Error>;
}

/// Ancestors read from the cluster's own owner references.
pub struct OwnerReferenceAncestors;

#[async_trait]
impl AncestorLookup for OwnerReferenceAncestors {
    async fn ancestor_name(
        &self,
        cluster: &StorageCluster,
        kind: &str,
    ) -> Result<Option<String>, Error> {
        Ok(cluster
            .metadata
            .owner_references
            .iter()
            .flatten()
            .find(|owner| owner.kind == kind)
            .map(|owner| owner.name.clone()))
    }
}

/// Version of the compiled operator binary.
pub struct BuildVersionLookup;

#[async_trait]
impl VersionLookup for BuildVersionLookup {
    async fn installed_version(&self, _namespace: &str) -> Result<String, Error> {
        Ok(crate::build::PKG_VERSION.to_owned())
    }
}

/// Version taken from the OLM ClusterServiceVersion of the installed operator.
pub struct CsvVersionLookup {
    client: kube::Client,
    deadline: Duration,
}

impl CsvVersionLookup {
    pub fn new(client: kube::Client, deadline: Duration) -> Self {
        Self { client, deadline }
    }
}

fn csv_resource() -> ApiResource {
    ApiResource {
        group: "operators.coreos.com".to_string(),
        version: "v1alpha1".to_string(),
        api_version: "operators.coreos.com/v1alpha1".to_string(),
        kind: "ClusterServiceVersion".to_string(),
        plural: "clusterserviceversions".to_string(),
    }
}

/// Version of the first CSV whose name starts with [`OPERATOR_CSV_PREFIX`].
fn operator_version(csvs: &[DynamicObject]) -> Option<String> {
    csvs.iter()
        .find(|csv| {
            csv.metadata
                .name
                .as_deref()
                .is_some_and(|name| name.starts_with(OPERATOR_CSV_PREFIX))
        })
        .and_then(|csv| csv.data["spec"]["version"].as_str())
        .map(str::to_owned)
}

#[async_trait]
impl VersionLookup for CsvVersionLookup {
    async fn installed_version(&self, namespace: &str) -> Result<String, Error> {
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, &csv_resource());
        let csvs = crate::store::with_deadline(self.deadline, "list csv", async {
            api.list(&ListParams::default())
                .await
                .map_err(|source| crate::store::Error::Kube { source })
        })
        .await?;

        operator_version(&csvs.items).context(NoVersionSnafu {
            prefix: OPERATOR_CSV_PREFIX,
            namespace,
        })
    }
}

/// Collects [`ClusterFacts`] from the secret, version and ancestor lookups.
#[derive(Clone)]
pub struct FactsGatherer {
    secrets: Arc<dyn SecretLookup>,
    versions: Arc<dyn VersionLookup>,
    ancestors: Arc<dyn AncestorLookup>,
}

impl FactsGatherer {
    pub fn new(
        secrets: Arc<dyn SecretLookup>,
        versions: Arc<dyn VersionLookup>,
        ancestors: Arc<dyn AncestorLookup>,
    ) -> Self {
        Self {
            secrets,
            versions,
            ancestors,
        }
    }

    pub async fn gather(&self, cluster: &StorageCluster) -> Result<ClusterFacts, Error> {
        let namespace = cluster.namespace()?;
        let version = self.versions.installed_version(&namespace).await?;
        let ceph_fsid = read_ceph_fsid(self.secrets.as_ref(), &namespace).await?;
        let storage_system_name = self
            .ancestors
            .ancestor_name(cluster, STORAGE_SYSTEM_KIND)
            .await?
            .context(NoAncestorSnafu {
                cluster: cluster.name(),
                kind: STORAGE_SYSTEM_KIND,
            })?;

        Ok(ClusterFacts {
            version,
            deployment_type: cluster.deployment_type(),
            ceph_fsid,
            provider_endpoint: cluster.provider_endpoint(),
            storage_system_name,
        })
    }
}

/// Cluster fsid from the Rook mon secret in `namespace`.
pub async fn read_ceph_fsid(secrets: &dyn SecretLookup, namespace: &str) -> Result<String, Error> {
    let mut data = secrets.secret_data(namespace, MON_SECRET_NAME).await?;
    let fsid = data.remove(FSID_KEY).context(MissingSecretKeySnafu {
        namespace,
        secret: MON_SECRET_NAME,
        key: FSID_KEY,
    })?;
    String::from_utf8(fsid).ok().context(InvalidSecretDataSnafu {
        secret: MON_SECRET_NAME,
        key: FSID_KEY,
    })
}
