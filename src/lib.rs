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
use crate::config::{ServerArgs, VersionSource};
use crate::context::{Context, KubeEvents};
use crate::discovery::aggregator::{ContainerLock, DiscoveryAggregator};
use crate::discovery::facts::{
    BuildVersionLookup, CsvVersionLookup, FactsGatherer, OwnerReferenceAncestors, VersionLookup,
};
use crate::error_policy::error_policy;
use crate::provider::service::ProviderService;
use crate::provider::ticket::{TicketClaims, TicketKeys};
use crate::provisioner::CephProvisioner;
use crate::reconcile::{cluster::reconcile_cluster, consumer::reconcile_consumer};
use crate::store::kubernetes::KubeStore;
use crate::store::{ChangeNotifier, ConsumerStore, Notifying};
use crate::types::v1::storage_cluster::StorageCluster;
use crate::types::v1alpha1::storage_consumer::StorageConsumer;
use futures::StreamExt;
use k8s_openapi::api::core::v1 as corev1;
use kube::CustomResourceExt;
use kube::runtime::{Controller, watcher};
use kube::{Api, Client};
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

shadow_rs::shadow!(build);

pub mod capacity;
pub mod config;
mod context;
pub mod discovery;
mod error_policy;
pub mod lifecycle;
pub mod provider;
pub mod provisioner;
pub mod reconcile;
pub mod store;
pub mod types;
pub mod utils;


pub async fn run(args: ServerArgs) -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_level(true)
        .with_file(true)
        .with_line_number(true)
        .with_target(true)
        .init();

    info!(
        version = build::PKG_VERSION,
        namespace = %args.operator_namespace,
        "starting ocs-provider"
    );

    let client = Client::try_default().await?;
    let ns = args.operator_namespace.as_str();
    let store = Arc::new(KubeStore::new(client.clone(), args.store_timeout()));

    let notifier = ChangeNotifier::new();
    let consumers: Arc<dyn ConsumerStore> =
        Arc::new(Notifying::new(store.clone(), notifier.clone()));

    let versions: Arc<dyn VersionLookup> = match args.version_source {
        VersionSource::Csv => Arc::new(CsvVersionLookup::new(client.clone(), args.store_timeout())),
        VersionSource::Build => Arc::new(BuildVersionLookup),
    };
    let facts = FactsGatherer::new(store.clone(), versions, Arc::new(OwnerReferenceAncestors));
    let ledger = CapacityLedger::new();
    let aggregator = DiscoveryAggregator::new(store.clone(), ContainerLock::new(), ns);

    let context = Arc::new(Context::new(
        consumers.clone(),
        store.clone(),
        Arc::new(CephProvisioner::new(client.clone(), args.store_timeout())),
        Arc::new(KubeEvents::new(client.clone())),
        ledger.clone(),
        aggregator,
        facts,
        args.resync(),
    ));

    let service = ProviderService::new(
        consumers,
        store.clone(),
        store,
        ledger,
        TicketKeys::new(args.ticket_secret.as_bytes()),
        ns,
        args.default_consumer_capacity.clone(),
    );
    let provider = provider::server::run(args.provider_port, service);

    let consumer_controller = Controller::new(
        Api::<StorageConsumer>::namespaced(client.clone(), ns),
        watcher::Config::default(),
    )
    .run(reconcile_consumer, error_policy, context.clone())
    .for_each(|res| async move {
        match res {
            Ok((consumer, _)) => info!("reconciled consumer {}", consumer.name),
            Err(e) => warn!("consumer reconcile failed: {}", e),
        }
    });

    let cluster_controller = Controller::new(
        Api::<StorageCluster>::namespaced(client.clone(), ns),
        watcher::Config::default(),
    )
    .owns(
        Api::<corev1::ConfigMap>::namespaced(client.clone(), ns),
        watcher::Config::default(),
    )
    .reconcile_all_on(notifier.changes())
    .run(reconcile_cluster, error_policy, context)
    .for_each(|res| async move {
        match res {
            Ok((cluster, _)) => info!("reconciled storage cluster {}", cluster.name),
            Err(e) => warn!("storage cluster reconcile failed: {}", e),
        }
    });

    tokio::select! {
        _ = consumer_controller => warn!("consumer controller stopped"),
        _ = cluster_controller => warn!("storage cluster controller stopped"),
        res = provider => res?,
    }

    Ok(())
}

pub async fn crd(file: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let mut writer: Pin<Box<dyn AsyncWrite + Send>> = if let Some(file) = file {
        Box::pin(
            tokio::fs::OpenOptions::new()
                .create(true)
                .truncate(true)
                .write(true)
                .open(file)
                .await?,
        )
    } else {
        Box::pin(tokio::io::stdout())
    };

    let documents = [
        serde_yaml_ng::to_string(&StorageCluster::crd())?,
        serde_yaml_ng::to_string(&StorageConsumer::crd())?,
    ];
    writer.write_all(documents.join("---\n").as_bytes()).await?;
    writer.flush().await?;

    Ok(())
}

/// Signs an onboarding ticket for `subject`, valid for `ttl_hours`.
pub fn ticket(
    secret: &str,
    subject: &str,
    quota: Option<&str>,
    ttl_hours: i64,
) -> Result<String, Box<dyn std::error::Error>> {
    let quota = quota.map(config::parse_quantity).transpose()?;
    let claims = TicketClaims::new(subject, quota, chrono::Duration::hours(ttl_hours));
    Ok(TicketKeys::new(secret.as_bytes()).issue(&claims)?)
}
