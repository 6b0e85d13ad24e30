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

//! Keeps each StorageCluster's discovery entry current and removes it when
//! the cluster goes away.

use crate::context::Context;
use crate::reconcile::Error;
use crate::store::MAX_CONFLICT_RETRIES;
use crate::types::v1::storage_cluster::{DISCOVERY_FINALIZER, StorageCluster};
use crate::utils::finalizers;
use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use std::sync::Arc;
use tracing::{debug, info};

pub async fn reconcile_cluster(
    cluster: Arc<StorageCluster>,
    ctx: Arc<Context>,
) -> Result<Action, Error> {
    let ns = cluster.namespace()?;
    let latest = ctx.clusters.get_cluster(&ns, &cluster.name()).await?;

    if latest.metadata.deletion_timestamp.is_some() {
        if finalizers::has_finalizer(&latest.metadata, DISCOVERY_FINALIZER) {
            ctx.aggregator.remove(&latest).await?;
            update_finalizer(&ctx, latest, false).await?;
            info!(cluster = %cluster.name(), "discovery entry removed");
        }
        return Ok(Action::await_change());
    }

    let latest = update_finalizer(&ctx, latest, true).await?;

    if let Err(e) = ctx
        .aggregator
        .refresh(&latest, &ctx.facts, ctx.consumers.as_ref())
        .await
    {
        ctx.record(
            &latest,
            EventType::Warning,
            "DiscoveryFailed",
            &e.to_string(),
        )
        .await;
        return Err(e.into());
    }

    debug!(cluster = %latest.name(), phase = %ctx.aggregator.phase(), "discovery refreshed");
    Ok(Action::requeue(ctx.resync))
}

async fn update_finalizer(
    ctx: &Context,
    cluster: StorageCluster,
    present: bool,
) -> Result<StorageCluster, Error> {
    let ns = cluster.namespace()?;
    let name = cluster.name();

    let mut current = cluster;
    let mut attempt = 0;
    loop {
        attempt += 1;
        let mut updated = current.clone();
        let changed = if present {
            finalizers::add_finalizer(&mut updated.metadata, DISCOVERY_FINALIZER)
        } else {
            finalizers::remove_finalizer(&mut updated.metadata, DISCOVERY_FINALIZER)
        };
        if !changed {
            return Ok(current);
        }

        match ctx.clusters.update_cluster(&updated).await {
            Ok(cluster) => return Ok(cluster),
            Err(e) if e.is_conflict() && attempt < MAX_CONFLICT_RETRIES => {
                current = ctx.clusters.get_cluster(&ns, &name).await?;
            }
            Err(e) => return Err(e.into()),
        }
    }
}
