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

use crate::capacity::{CapacityLedger, Reservation};
use crate::discovery::facts::read_ceph_fsid;
use crate::provider::messages::{
    OffboardConsumerRequest, OnboardConsumerRequest, OnboardConsumerResponse,
    ReportStatusRequest, ReportStatusResponse, StorageClientOnboarding, StorageClientStatus,
};
use crate::provider::ticket::TicketKeys;
use crate::provider::{
    DuplicateConsumerSnafu, Error, InvalidConsumerNameSnafu, InvalidTicketSnafu,
    NoStorageClusterSnafu, QuotaExceededSnafu, Result, TicketSubjectMismatchSnafu,
    UnknownConsumerSnafu,
};
use crate::store::{ClusterStore, ConsumerStore, MAX_CONFLICT_RETRIES, SecretLookup};
use crate::types::v1::storage_cluster::StorageCluster;
use crate::types::v1alpha1::status::ClientStatus;
use crate::types::v1alpha1::storage_consumer::{
    CLIENT_OPERATOR_VERSION_ANNOTATION, CONSUMER_FINALIZER, StorageConsumer, split_consumer_id,
};
use crate::utils::finalizers;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::ResourceExt;
use snafu::ResultExt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Consumer names become object names, so they must be DNS-1123 labels.
fn valid_consumer_name(name: &str) -> bool {
    let bytes = name.as_bytes();
    !bytes.is_empty()
        && bytes.len() <= 63
        && bytes
            .iter()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-')
        && bytes[0] != b'-'
        && bytes[bytes.len() - 1] != b'-'
}

/// Created by an onboarding that never finished: no client has reported
/// from it and it is not on its way out.
fn is_unclaimed(consumer: &StorageConsumer) -> bool {
    let state = consumer.state();
    !consumer.is_deleted()
        && consumer.status.as_ref().is_none_or(|s| s.client.is_none())
        && (state.is_none() || state.is_some_and(|s| s.holds_capacity()))
}

fn client_status(report: &impl StorageClientStatus) -> ClientStatus {
    ClientStatus {
        cluster_id: report.cluster_id().to_owned(),
        name: report.namespaced_name().to_owned(),
        cluster_name: report.cluster_name().to_owned(),
        platform_version: report.platform_version().to_owned(),
        operator_version: report.operator_version().to_owned(),
        last_heartbeat: Some(chrono::Utc::now().to_rfc3339()),
    }
}

/// Handles provider requests for the consumers of the storage cluster in
/// one namespace.
#[derive(Clone)]
pub struct ProviderService {
    consumers: Arc<dyn ConsumerStore>,
    clusters: Arc<dyn ClusterStore>,
    secrets: Arc<dyn SecretLookup>,
    ledger: CapacityLedger,
    tickets: TicketKeys,
    namespace: String,
    default_capacity: Quantity,
}

impl ProviderService {
    pub fn new(
        consumers: Arc<dyn ConsumerStore>,
        clusters: Arc<dyn ClusterStore>,
        secrets: Arc<dyn SecretLookup>,
        ledger: CapacityLedger,
        tickets: TicketKeys,
        namespace: &str,
        default_capacity: Quantity,
    ) -> Self {
        Self {
            consumers,
            clusters,
            secrets,
            ledger,
            tickets,
            namespace: namespace.to_owned(),
            default_capacity,
        }
    }

    async fn storage_cluster(&self) -> Result<StorageCluster> {
        self.clusters
            .list_clusters(&self.namespace)
            .await?
            .into_iter()
            .find(|c| c.metadata.deletion_timestamp.is_none())
            .ok_or_else(|| {
                NoStorageClusterSnafu {
                    namespace: self.namespace.clone(),
                }
                .build()
            })
    }

    /// Creates the consumer and reserves its capacity. A request that does
    /// not fit leaves the record `Failed` and returns `QuotaExceeded`.
    ///
    /// A ticket onboards only the consumer named by its subject. Repeating
    /// the call for a record no client has reported from yet resumes that
    /// onboarding instead of failing as a duplicate.
    pub async fn onboard(&self, req: &OnboardConsumerRequest) -> Result<OnboardConsumerResponse> {
        let claims = self
            .tickets
            .validate(req.onboarding_ticket())
            .context(InvalidTicketSnafu)?;

        let name = req.consumer_name();
        if !valid_consumer_name(name) {
            return InvalidConsumerNameSnafu { name }.fail();
        }
        if claims.sub != name {
            warn!(consumer = %name, subject = %claims.sub, "ticket issued for another consumer");
            return TicketSubjectMismatchSnafu {
                subject: claims.sub,
                name,
            }
            .fail();
        }

        let cluster = self.storage_cluster().await?;
        let fsid = read_ceph_fsid(self.secrets.as_ref(), &self.namespace).await?;
        let capacity = claims
            .storage_quota
            .unwrap_or_else(|| self.default_capacity.clone());

        let mut consumer = StorageConsumer::new_with_capacity(name, &self.namespace, capacity);
        finalizers::add_finalizer(&mut consumer.metadata, CONSUMER_FINALIZER);
        if !req.client_operator_version().is_empty() {
            consumer.annotations_mut().insert(
                CLIENT_OPERATOR_VERSION_ANNOTATION.to_owned(),
                req.client_operator_version().to_owned(),
            );
        }

        consumer.requested_bytes()?;
        let budget = cluster.capacity_budget_bytes()?;

        let created = match self.consumers.create(&consumer).await {
            Ok(created) => created,
            Err(e) if e.is_already_exists() => {
                let existing = self.consumers.get(&self.namespace, name).await?;
                if !is_unclaimed(&existing) {
                    warn!(consumer = %name, "rejecting duplicate onboarding");
                    return DuplicateConsumerSnafu { name }.fail();
                }
                debug!(consumer = %name, "resuming an interrupted onboarding");
                existing
            }
            Err(e) => return Err(e.into()),
        };

        match self.ledger.reserve(self.consumers.as_ref(), &created, budget).await? {
            Reservation::Granted(consumer) => {
                let granted = consumer
                    .status
                    .as_ref()
                    .and_then(|s| s.granted_capacity.clone())
                    .unwrap_or_default();
                info!(consumer = %name, granted = %granted.0, "consumer onboarded");
                Ok(OnboardConsumerResponse {
                    storage_consumer_id: consumer.id()?,
                    storage_provider_endpoint: cluster.provider_endpoint(),
                    ceph_cluster_fsid: fsid,
                    granted_capacity: granted,
                })
            }
            Reservation::Exceeded {
                requested,
                available,
                ..
            } => QuotaExceededSnafu {
                requested,
                available,
            }
            .fail(),
        }
    }

    async fn find_reporter(&self, req: &ReportStatusRequest) -> Result<StorageConsumer> {
        if let Some(id) = req.storage_consumer_id.as_deref() {
            let (namespace, name) = split_consumer_id(id)?;
            return match self.consumers.get(namespace, name).await {
                Ok(consumer) => Ok(consumer),
                Err(e) if e.is_not_found() => UnknownConsumerSnafu { id }.fail(),
                Err(e) => Err(e.into()),
            };
        }

        let id = format!("{}@{}", req.namespaced_name(), req.cluster_id());
        if req.cluster_id().is_empty() || req.namespaced_name().is_empty() {
            return UnknownConsumerSnafu { id }.fail();
        }
        self.consumers
            .list(&self.namespace)
            .await?
            .into_iter()
            .find(|c| {
                c.status
                    .as_ref()
                    .and_then(|s| s.client.as_ref())
                    .is_some_and(|client| {
                        client.cluster_id == req.cluster_id()
                            && client.name == req.namespaced_name()
                    })
            })
            .ok_or_else(|| UnknownConsumerSnafu { id }.build())
    }

    /// Records what the client reported. Only `status.client` changes.
    pub async fn report_status(&self, req: &ReportStatusRequest) -> Result<ReportStatusResponse> {
        let found = self.find_reporter(req).await?;
        let namespace = found.namespace()?;
        let name = found.name();

        let mut attempt = 0;
        let mut current = found;
        loop {
            attempt += 1;
            let mut updated = current.clone();
            updated.status.get_or_insert_with(Default::default).client = Some(client_status(req));

            match self.consumers.update_status(&updated).await {
                Ok(consumer) => {
                    debug!(consumer = %name, cluster_id = %req.cluster_id(), "status reported");
                    let status = consumer.status.unwrap_or_default();
                    return Ok(ReportStatusResponse {
                        state: status.state,
                        granted_capacity: status.granted_capacity,
                    });
                }
                Err(e) if e.is_conflict() && attempt < MAX_CONFLICT_RETRIES => {
                    current = self.consumers.get(&namespace, &name).await?;
                }
                Err(e) if e.is_not_found() => {
                    return UnknownConsumerSnafu {
                        id: format!("{namespace}/{name}"),
                    }
                    .fail();
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Requests deletion. Unknown consumers count as already offboarded.
    pub async fn offboard(&self, req: &OffboardConsumerRequest) -> Result<()> {
        let (namespace, name) = split_consumer_id(&req.storage_consumer_id)?;
        match self.consumers.delete(namespace, name).await {
            Ok(()) => {
                info!(consumer = %name, "consumer offboarding requested");
                Ok(())
            }
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(Error::from(e)),
        }
    }
}
