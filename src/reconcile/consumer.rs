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

//! Drives a StorageConsumer through `Configuring`, `Ready`, `Failed` and
//! `Deleting`.

use crate::capacity::Reservation;
use crate::context::Context;
use crate::lifecycle::{self, REASON_PROVISIONING_FAILED, REASON_QUOTA_EXCEEDED};
use crate::reconcile::{Error, storage_cluster};
use crate::store::MAX_CONFLICT_RETRIES;
use crate::types::v1alpha1::status::Status;
use crate::types::v1alpha1::status::state::ConsumerState;
use crate::types::v1alpha1::storage_consumer::{
    CONSUMER_FINALIZER, RETRY_ANNOTATION, StorageConsumer,
};
use crate::utils::finalizers;
use kube::ResourceExt;
use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use std::sync::Arc;
use tracing::{debug, info};

pub async fn reconcile_consumer(
    consumer: Arc<StorageConsumer>,
    ctx: Arc<Context>,
) -> Result<Action, Error> {
    let ns = consumer.namespace()?;
    let latest = ctx.consumers.get(&ns, &consumer.name()).await?;

    if latest.is_deleted() {
        debug!(
            "consumer {} is deleted, deletion_timestamp is {:?}",
            latest.name(),
            latest.metadata.deletion_timestamp
        );
        return finalize(latest, &ctx).await;
    }

    let latest = if latest.state() == Some(ConsumerState::Failed) && latest.retry_requested() {
        let reset = update_status(&ctx, &latest, lifecycle::reset_for_retry).await?;
        ctx.record(&reset, EventType::Normal, "RetryRequested", "retrying failed consumer")
            .await;
        reset
    } else {
        latest
    };
    let latest = sync_metadata(&ctx, latest).await?;

    match latest.state() {
        None | Some(ConsumerState::Configuring) => configure(latest, &ctx).await,
        Some(ConsumerState::Ready) => provision(latest, &ctx).await,
        Some(ConsumerState::Failed) | Some(ConsumerState::Deleting) => Ok(Action::await_change()),
    }
}

/// Keeps the finalizer on and drops a retry request that no longer applies.
async fn sync_metadata(ctx: &Context, consumer: StorageConsumer) -> Result<StorageConsumer, Error> {
    let failed = consumer.state() == Some(ConsumerState::Failed);
    update_metadata(ctx, consumer, |c| {
        let added = finalizers::add_finalizer(&mut c.metadata, CONSUMER_FINALIZER);
        let cleared = !failed && c.annotations_mut().remove(RETRY_ANNOTATION).is_some();
        added || cleared
    })
    .await
}

async fn configure(consumer: StorageConsumer, ctx: &Context) -> Result<Action, Error> {
    let ns = consumer.namespace()?;
    let cluster = storage_cluster(ctx.clusters.as_ref(), &ns).await?;
    let budget = cluster.capacity_budget_bytes()?;

    match ctx
        .ledger
        .reserve(ctx.consumers.as_ref(), &consumer, budget)
        .await?
    {
        Reservation::Granted(consumer) => provision(consumer, ctx).await,
        Reservation::Exceeded {
            consumer,
            requested,
            available,
        } => {
            ctx.record(
                &consumer,
                EventType::Warning,
                REASON_QUOTA_EXCEEDED,
                &format!("requested {requested} bytes, {available} bytes available"),
            )
            .await;
            Ok(Action::await_change())
        }
    }
}

/// A `Ready` consumer whose status already names its pool and user.
fn is_provisioned(consumer: &StorageConsumer) -> bool {
    consumer.status.as_ref().is_some_and(|s| {
        s.state == Some(ConsumerState::Ready)
            && s.ceph_objects.block_pool_name.as_deref() == Some(consumer.block_pool_name().as_str())
            && s.ceph_objects.ceph_user.as_deref() == Some(consumer.ceph_user_name().as_str())
    })
}

/// Creates the Ceph objects and marks the consumer `Ready`.
async fn provision(consumer: StorageConsumer, ctx: &Context) -> Result<Action, Error> {
    let granted = consumer
        .status
        .as_ref()
        .and_then(|s| s.granted_capacity.clone())
        .ok_or(lifecycle::Error::NotGranted)?;

    if is_provisioned(&consumer) {
        debug!(consumer = %consumer.name(), "ceph objects already provisioned");
        return Ok(Action::requeue(ctx.resync));
    }

    let provisioned = match ctx.provisioner.provision(&consumer, &granted).await {
        Ok(provisioned) => provisioned,
        Err(e) if e.is_unrecoverable() => {
            let failed = ctx
                .ledger
                .fail(ctx.consumers.as_ref(), &consumer, REASON_PROVISIONING_FAILED)
                .await?;
            ctx.record(
                &failed,
                EventType::Warning,
                REASON_PROVISIONING_FAILED,
                &e.to_string(),
            )
            .await;
            return Ok(Action::await_change());
        }
        Err(e) => return Err(e.into()),
    };

    let ready = update_status(ctx, &consumer, |s| {
        lifecycle::mark_ready(s, provisioned.objects.clone(), provisioned.connection.clone())
    })
    .await?;
    info!(consumer = %ready.name(), granted = %granted.0, "consumer ready");
    ctx.record(
        &ready,
        EventType::Normal,
        "Ready",
        &format!("granted {}", granted.0),
    )
    .await;

    Ok(Action::requeue(ctx.resync))
}

/// Returns the grant, removes the Ceph objects, then lets the record go.
async fn finalize(consumer: StorageConsumer, ctx: &Context) -> Result<Action, Error> {
    if !finalizers::has_finalizer(&consumer.metadata, CONSUMER_FINALIZER) {
        return Ok(Action::await_change());
    }

    let was_deleting = consumer.state() == Some(ConsumerState::Deleting);
    let released = ctx.ledger.release(ctx.consumers.as_ref(), &consumer).await?;
    if !was_deleting {
        ctx.record(
            &released,
            EventType::Normal,
            "Deleting",
            "capacity released, removing ceph objects",
        )
        .await;
    }

    ctx.provisioner.deprovision(&released).await?;

    update_metadata(ctx, released, |c| {
        finalizers::remove_finalizer(&mut c.metadata, CONSUMER_FINALIZER)
    })
    .await?;
    info!(consumer = %consumer.name(), "consumer removed");

    Ok(Action::await_change())
}

/// Writes `apply` on top of the consumer's status, re-reading on conflict.
async fn update_status<F>(
    ctx: &Context,
    consumer: &StorageConsumer,
    apply: F,
) -> Result<StorageConsumer, Error>
where
    F: Fn(&mut Status) -> Result<(), lifecycle::Error> + Send + Sync,
{
    let ns = consumer.namespace()?;
    let name = consumer.name();

    let mut current = consumer.clone();
    let mut attempt = 0;
    loop {
        attempt += 1;
        let mut updated = current.clone();
        apply(updated.status.get_or_insert_with(Default::default))?;

        match ctx.consumers.update_status(&updated).await {
            Ok(consumer) => return Ok(consumer),
            Err(e) if e.is_conflict() && attempt < MAX_CONFLICT_RETRIES => {
                debug!(consumer = %name, attempt, "status update conflicted, retrying");
                current = ctx.consumers.get(&ns, &name).await?;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Writes `apply` on top of metadata and spec when it reports a change.
async fn update_metadata<F>(
    ctx: &Context,
    consumer: StorageConsumer,
    apply: F,
) -> Result<StorageConsumer, Error>
where
    F: Fn(&mut StorageConsumer) -> bool + Send + Sync,
{
    let ns = consumer.namespace()?;
    let name = consumer.name();

    let mut current = consumer;
    let mut attempt = 0;
    loop {
        attempt += 1;
        let mut updated = current.clone();
        if !apply(&mut updated) {
            return Ok(current);
        }

        match ctx.consumers.update(&updated).await {
            Ok(consumer) => return Ok(consumer),
            Err(e) if e.is_conflict() && attempt < MAX_CONFLICT_RETRIES => {
                debug!(consumer = %name, attempt, "metadata update conflicted, retrying");
                current = ctx.consumers.get(&ns, &name).await?;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provisioner::{self, MockProvisioner, Provisioned};
    use crate::store::ConsumerStore;
    use crate::store::memory::MemoryStore;
    use crate::tests::{NS, create_test_cluster, create_test_consumer, test_context};
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

    fn provisioned(consumer: &StorageConsumer) -> Provisioned {
        Provisioned {
            objects: crate::types::v1alpha1::status::CephObjects {
                block_pool_name: Some(consumer.block_pool_name()),
                ceph_user: Some(consumer.ceph_user_name()),
            },
            connection: None,
        }
    }

    fn healthy_provisioner() -> MockProvisioner {
        let mut provisioner = MockProvisioner::new();
        provisioner
            .expect_provision()
            .returning(|consumer, _| Ok(provisioned(consumer)));
        provisioner.expect_deprovision().returning(|_| Ok(()));
        provisioner
    }

    fn store_with_cluster(budget: &str) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::default());
        store.insert_cluster(create_test_cluster(NS, "ocs-storagecluster", Some(budget)));
        store
    }

    async fn reconcile(ctx: &Arc<Context>, store: &MemoryStore, name: &str) -> Result<Action, Error> {
        let consumer = store.consumer(NS, name).expect("consumer exists");
        reconcile_consumer(Arc::new(consumer), ctx.clone()).await
    }

    fn granted(store: &MemoryStore, name: &str) -> Option<Quantity> {
        store
            .consumer(NS, name)
            .and_then(|c| c.status)
            .and_then(|s| s.granted_capacity)
    }

    #[tokio::test]
    async fn test_quota_example_end_to_end() {
        let store = store_with_cluster("100Gi");
        let (ctx, events) = test_context(store.clone(), healthy_provisioner());

        store.create(&create_test_consumer("a", "60Gi")).await.expect("a");
        reconcile(&ctx, &store, "a").await.expect("reconcile a");
        let a = store.consumer(NS, "a").expect("a");
        assert_eq!(a.state(), Some(ConsumerState::Ready));
        assert_eq!(granted(&store, "a"), Some(Quantity("60Gi".to_owned())));
        assert!(finalizers::has_finalizer(&a.metadata, CONSUMER_FINALIZER));
        assert_eq!(
            a.status.as_ref().and_then(|s| s.ceph_objects.block_pool_name.clone()),
            Some("cephblockpool-a".to_owned())
        );

        store.create(&create_test_consumer("b", "50Gi")).await.expect("b");
        reconcile(&ctx, &store, "b").await.expect("reconcile b");
        let b = store.consumer(NS, "b").expect("b");
        assert_eq!(b.state(), Some(ConsumerState::Failed));
        assert_eq!(granted(&store, "b"), None);
        assert!(events.reasons().contains(&REASON_QUOTA_EXCEEDED.to_owned()));

        store.delete(NS, "a").await.expect("delete a");
        reconcile(&ctx, &store, "a").await.expect("finalize a");
        assert!(store.consumer(NS, "a").is_none());

        let mut b = store.consumer(NS, "b").expect("b");
        b.annotations_mut()
            .insert(RETRY_ANNOTATION.to_owned(), "true".to_owned());
        store.update(&b).await.expect("annotate");
        reconcile(&ctx, &store, "b").await.expect("retry b");

        let b = store.consumer(NS, "b").expect("b");
        assert_eq!(b.state(), Some(ConsumerState::Ready));
        assert_eq!(granted(&store, "b"), Some(Quantity("50Gi".to_owned())));
        assert!(!b.annotations().contains_key(RETRY_ANNOTATION));
    }

    #[tokio::test]
    async fn test_failed_consumer_waits_for_retry() {
        let store = store_with_cluster("10Gi");
        let (ctx, _) = test_context(store.clone(), healthy_provisioner());

        store.create(&create_test_consumer("big", "50Gi")).await.expect("create");
        reconcile(&ctx, &store, "big").await.expect("first");
        let before = store.consumer(NS, "big").expect("big");

        let action = reconcile(&ctx, &store, "big").await.expect("second");
        assert_eq!(action, Action::await_change());
        let after = store.consumer(NS, "big").expect("big");
        assert_eq!(before.metadata.resource_version, after.metadata.resource_version);
    }

    #[tokio::test]
    async fn test_rejected_provisioning_fails_and_frees_capacity() {
        let store = store_with_cluster("100Gi");
        let mut provisioner = MockProvisioner::new();
        provisioner.expect_provision().returning(|_, _| {
            Err(provisioner::Error::Rejected {
                kind: "CephBlockPool".to_owned(),
                name: "cephblockpool-a".to_owned(),
                message: "invalid quota".to_owned(),
            })
        });
        let (ctx, events) = test_context(store.clone(), provisioner);

        store.create(&create_test_consumer("a", "60Gi")).await.expect("a");
        reconcile(&ctx, &store, "a").await.expect("reconcile");

        let a = store.consumer(NS, "a").expect("a");
        assert_eq!(a.state(), Some(ConsumerState::Failed));
        assert_eq!(
            a.status.as_ref().and_then(|s| s.message.as_deref()),
            Some(REASON_PROVISIONING_FAILED)
        );
        assert_eq!(granted(&store, "a"), None);
        assert!(events.reasons().contains(&REASON_PROVISIONING_FAILED.to_owned()));
    }

    #[tokio::test]
    async fn test_transient_provisioning_error_keeps_grant() {
        let store = store_with_cluster("100Gi");
        let mut provisioner = MockProvisioner::new();
        provisioner.expect_provision().returning(|_, _| {
            Err(crate::store::Error::Timeout {
                operation: "apply CephBlockPool".to_owned(),
                timeout: std::time::Duration::from_secs(1),
            }
            .into())
        });
        let (ctx, _) = test_context(store.clone(), provisioner);

        store.create(&create_test_consumer("a", "60Gi")).await.expect("a");
        assert!(reconcile(&ctx, &store, "a").await.is_err());

        assert_eq!(
            store.consumer(NS, "a").and_then(|c| c.state()),
            Some(ConsumerState::Configuring)
        );
        assert_eq!(granted(&store, "a"), Some(Quantity("60Gi".to_owned())));
    }

    #[tokio::test]
    async fn test_failed_deprovision_stays_deleting() {
        let store = store_with_cluster("100Gi");
        let mut provisioner = MockProvisioner::new();
        provisioner
            .expect_provision()
            .returning(|consumer, _| Ok(provisioned(consumer)));
        let mut calls = 0;
        provisioner.expect_deprovision().returning(move |_| {
            calls += 1;
            if calls == 1 {
                Err(crate::store::Error::Timeout {
                    operation: "delete CephClient".to_owned(),
                    timeout: std::time::Duration::from_secs(1),
                }
                .into())
            } else {
                Ok(())
            }
        });
        let (ctx, _) = test_context(store.clone(), provisioner);

        store.create(&create_test_consumer("a", "60Gi")).await.expect("a");
        reconcile(&ctx, &store, "a").await.expect("ready");
        store.delete(NS, "a").await.expect("delete");

        assert!(reconcile(&ctx, &store, "a").await.is_err());
        let a = store.consumer(NS, "a").expect("still present");
        assert_eq!(a.state(), Some(ConsumerState::Deleting));
        assert_eq!(granted(&store, "a"), None);

        // Capacity is already back in the pool while deprovisioning retries.
        store.create(&create_test_consumer("b", "100Gi")).await.expect("b");
        reconcile(&ctx, &store, "b").await.expect("b");
        assert_eq!(
            store.consumer(NS, "b").and_then(|c| c.state()),
            Some(ConsumerState::Ready)
        );

        reconcile(&ctx, &store, "a").await.expect("finalize");
        assert!(store.consumer(NS, "a").is_none());
    }

    #[tokio::test]
    async fn test_ready_consumer_is_not_reapplied_on_status_writes() {
        let store = store_with_cluster("100Gi");
        let mut provisioner = MockProvisioner::new();
        provisioner
            .expect_provision()
            .times(1)
            .returning(|consumer, _| Ok(provisioned(consumer)));
        let (ctx, _) = test_context(store.clone(), provisioner);

        store.create(&create_test_consumer("a", "60Gi")).await.expect("a");
        reconcile(&ctx, &store, "a").await.expect("ready");

        // a client heartbeat only touches status.client
        let mut a = store.consumer(NS, "a").expect("a");
        if let Some(status) = a.status.as_mut() {
            status.client = Some(crate::types::v1alpha1::status::ClientStatus {
                cluster_id: "cid-1".to_owned(),
                ..Default::default()
            });
        }
        store.update_status(&a).await.expect("heartbeat");

        let action = reconcile(&ctx, &store, "a").await.expect("second pass");
        assert_eq!(action, Action::requeue(ctx.resync));
        assert_eq!(
            store.consumer(NS, "a").and_then(|c| c.state()),
            Some(ConsumerState::Ready)
        );
    }

    #[tokio::test]
    async fn test_missing_storage_cluster_is_an_error() {
        let store = Arc::new(MemoryStore::default());
        let (ctx, _) = test_context(store.clone(), healthy_provisioner());

        store.create(&create_test_consumer("a", "1Gi")).await.expect("a");
        let err = reconcile(&ctx, &store, "a").await.expect_err("no cluster");
        assert!(matches!(err, Error::NoStorageCluster { .. }));
    }
}
