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

use crate::capacity::CapacityLedger;
use crate::discovery::aggregator::DiscoveryAggregator;
use crate::discovery::facts::FactsGatherer;
use crate::provisioner::Provisioner;
use crate::store::{ClusterStore, ConsumerStore};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::Resource;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use snafu::Snafu;
use snafu::futures::TryFutureExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("record event error: {}", source))]
    Record { source: kube::Error },
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(
        &self,
        object: ObjectReference,
        event_type: EventType,
        reason: &str,
        message: &str,
    ) -> Result<(), Error>;
}

/// Publishes Kubernetes events through the runtime's recorder.
pub struct KubeEvents {
    recorder: Recorder,
}

impl KubeEvents {
    pub fn new(client: kube::Client) -> Self {
        let reporter = Reporter {
            controller: "ocs-provider".into(),
            instance: std::env::var("HOSTNAME").ok(),
        };

        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEvents {
    async fn publish(
        &self,
        object: ObjectReference,
        event_type: EventType,
        reason: &str,
        message: &str,
    ) -> Result<(), Error> {
        self.recorder
            .publish(
                &Event {
                    type_: event_type,
                    reason: reason.to_owned(),
                    note: Some(message.into()),
                    action: "Reconcile".into(),
                    secondary: None,
                },
                &object,
            )
            .context(RecordSnafu)
            .await
    }
}

/// Shared state handed to every reconciliation.
pub struct Context {
    pub(crate) consumers: Arc<dyn ConsumerStore>,
    pub(crate) clusters: Arc<dyn ClusterStore>,
    pub(crate) provisioner: Arc<dyn Provisioner>,
    pub(crate) events: Arc<dyn EventPublisher>,
    pub(crate) ledger: CapacityLedger,
    pub(crate) aggregator: DiscoveryAggregator,
    pub(crate) facts: FactsGatherer,
    pub(crate) resync: Duration,
}

impl Context {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        consumers: Arc<dyn ConsumerStore>,
        clusters: Arc<dyn ClusterStore>,
        provisioner: Arc<dyn Provisioner>,
        events: Arc<dyn EventPublisher>,
        ledger: CapacityLedger,
        aggregator: DiscoveryAggregator,
        facts: FactsGatherer,
        resync: Duration,
    ) -> Self {
        Self {
            consumers,
            clusters,
            provisioner,
            events,
            ledger,
            aggregator,
            facts,
            resync,
        }
    }

    /// Sends an event about `resource`. Failures are logged, not returned.
    pub async fn record<K>(&self, resource: &K, event_type: EventType, reason: &str, message: &str)
    where
        K: Resource<DynamicType = ()>,
    {
        if let Err(e) = self
            .events
            .publish(resource.object_ref(&()), event_type, reason, message)
            .await
        {
            warn!(reason, error = %e, "failed to record event");
        }
    }
}
