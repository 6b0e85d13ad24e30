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

pub mod cluster;
pub mod consumer;

use crate::store::ClusterStore;
use crate::types::v1::storage_cluster::StorageCluster;
use crate::{capacity, discovery, lifecycle, provisioner, store, types};
use snafu::Snafu;

#[derive(Snafu, Debug)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("no storage cluster in namespace '{}'", namespace))]
    NoStorageCluster { namespace: String },

    #[snafu(transparent)]
    Store { source: store::Error },

    #[snafu(transparent)]
    Types { source: types::error::Error },

    #[snafu(transparent)]
    Capacity { source: capacity::Error },

    #[snafu(transparent)]
    Lifecycle { source: lifecycle::Error },

    #[snafu(transparent)]
    Provisioner { source: provisioner::Error },

    #[snafu(transparent)]
    Discovery { source: discovery::Error },
}

impl Error {
    fn store_error(&self) -> Option<&store::Error> {
        match self {
            Error::Store { source } => Some(source),
            Error::Capacity {
                source: capacity::Error::Store { source },
            } => Some(source),
            Error::Discovery {
                source: discovery::Error::Store { source },
            } => Some(source),
            _ => None,
        }
    }

    /// The reconciled object itself is gone.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Store { source } if source.is_not_found())
    }

    /// A write kept losing against concurrent writers.
    pub fn is_conflict(&self) -> bool {
        self.store_error().is_some_and(store::Error::is_conflict)
    }
}

/// The storage cluster serving consumers in `namespace`.
pub(crate) async fn storage_cluster(
    clusters: &dyn ClusterStore,
    namespace: &str,
) -> Result<StorageCluster, Error> {
    clusters
        .list_clusters(namespace)
        .await?
        .into_iter()
        .find(|c| c.metadata.deletion_timestamp.is_none())
        .ok_or_else(|| {
            NoStorageClusterSnafu {
                namespace: namespace.to_owned(),
            }
            .build()
        })
}
