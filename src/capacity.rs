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

//! Shared capacity pool accounting.
//!
//! A consumer's grant is computed as the cluster budget minus everything
//! other `Configuring`/`Ready` consumers in the same namespace already hold.
//! Reservation and release for one namespace run one at a time under the
//! ledger's lock, and each status write is retried against a fresh read on
//! conflict.

use crate::lifecycle::{self, REASON_QUOTA_EXCEEDED};
use crate::store::{self, ConsumerStore, MAX_CONFLICT_RETRIES};
use crate::types;
use crate::types::v1alpha1::status::Status;
use crate::types::v1alpha1::status::state::ConsumerState;
use crate::types::v1alpha1::storage_consumer::StorageConsumer;
use crate::utils::quantity;
use snafu::Snafu;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(transparent)]
    Store { source: store::Error },

    #[snafu(transparent)]
    Types { source: types::error::Error },

    #[snafu(transparent)]
    Lifecycle { source: lifecycle::Error },
}

/// Outcome of a reservation attempt.
#[derive(Debug)]
pub enum Reservation {
    Granted(StorageConsumer),
    Exceeded {
        consumer: StorageConsumer,
        requested: u64,
        available: u64,
    },
}

/// Bytes still free in `budget` once every consumer other than `exclude`
/// has been accounted for.
pub fn available(
    budget: u64,
    consumers: &[StorageConsumer],
    exclude: Option<&str>,
) -> Result<u64, types::error::Error> {
    let mut held: u64 = 0;
    for consumer in consumers {
        if exclude.is_some_and(|name| name == consumer.name()) {
            continue;
        }
        held = held.saturating_add(consumer.held_bytes()?);
    }
    Ok(budget.saturating_sub(held))
}

#[derive(Clone, Default)]
pub struct CapacityLedger {
    locks: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl CapacityLedger {
    pub fn new() -> Self {
        Self::default()
    }

    async fn lock(&self, namespace: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(namespace.to_owned())
            .or_default()
            .clone();
        lock.lock_owned().await
    }

    /// Free capacity in `namespace` right now.
    pub async fn available_in(
        &self,
        store: &dyn ConsumerStore,
        namespace: &str,
        budget: u64,
    ) -> Result<u64, Error> {
        let _guard = self.lock(namespace).await;
        let consumers = store.list(namespace).await?;
        Ok(available(budget, &consumers, None)?)
    }

    /// Reserves the consumer's requested capacity, or moves it to `Failed`
    /// when the request does not fit. An existing grant is kept as is.
    pub async fn reserve(
        &self,
        store: &dyn ConsumerStore,
        consumer: &StorageConsumer,
        budget: u64,
    ) -> Result<Reservation, Error> {
        let namespace = consumer.namespace()?;
        let name = consumer.name();
        let _guard = self.lock(&namespace).await;

        let mut attempt = 0;
        loop {
            attempt += 1;
            let fresh = store.get(&namespace, &name).await?;
            let state = fresh.state().unwrap_or(ConsumerState::Configuring);
            let already_granted = fresh
                .status
                .as_ref()
                .is_some_and(|s| s.granted_capacity.is_some());
            if state.holds_capacity() && already_granted {
                return Ok(Reservation::Granted(fresh));
            }
            if !state.holds_capacity() {
                return Err(lifecycle::Error::InvalidTransition {
                    from: state.to_string(),
                    to: ConsumerState::Configuring.to_string(),
                }
                .into());
            }

            let consumers = store.list(&namespace).await?;
            let free = available(budget, &consumers, Some(&name))?;
            let requested = fresh.requested_bytes()?;

            let mut updated = fresh.clone();
            let status = updated.status.get_or_insert_with(Default::default);
            let exceeded = requested > free;
            if exceeded {
                lifecycle::mark_failed(status, REASON_QUOTA_EXCEEDED)?;
            } else {
                lifecycle::begin_configuring(status)?;
                lifecycle::grant(status, quantity::from_bytes(requested))?;
            }

            match store.update_status(&updated).await {
                Ok(consumer) if exceeded => {
                    warn!(
                        consumer = %name,
                        requested,
                        available = free,
                        "capacity request exceeds the remaining pool"
                    );
                    return Ok(Reservation::Exceeded {
                        consumer,
                        requested,
                        available: free,
                    });
                }
                Ok(consumer) => {
                    info!(consumer = %name, granted = requested, "capacity reserved");
                    return Ok(Reservation::Granted(consumer));
                }
                Err(e) if e.is_conflict() && attempt < MAX_CONFLICT_RETRIES => {
                    debug!(consumer = %name, attempt, "reservation conflicted, retrying with a fresh read");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Moves the consumer to `Deleting`, returning its grant to the pool.
    pub async fn release(
        &self,
        store: &dyn ConsumerStore,
        consumer: &StorageConsumer,
    ) -> Result<StorageConsumer, Error> {
        self.settle(store, consumer, "release", |status| {
            if status.state == Some(ConsumerState::Deleting) && status.granted_capacity.is_none() {
                return Ok(false);
            }
            lifecycle::begin_deleting(status)?;
            Ok(true)
        })
        .await
    }

    /// Moves the consumer to `Failed` with `reason`, returning any grant.
    pub async fn fail(
        &self,
        store: &dyn ConsumerStore,
        consumer: &StorageConsumer,
        reason: &str,
    ) -> Result<StorageConsumer, Error> {
        self.settle(store, consumer, "fail", |status| {
            if status.state == Some(ConsumerState::Failed)
                && status.message.as_deref() == Some(reason)
            {
                return Ok(false);
            }
            lifecycle::mark_failed(status, reason)?;
            Ok(true)
        })
        .await
    }

    /// Applies `apply` to a fresh status under the namespace lock. `apply`
    /// returns false when the status is already where it should be.
    async fn settle<F>(
        &self,
        store: &dyn ConsumerStore,
        consumer: &StorageConsumer,
        action: &str,
        apply: F,
    ) -> Result<StorageConsumer, Error>
    where
        F: Fn(&mut Status) -> Result<bool, lifecycle::Error> + Send + Sync,
    {
        let namespace = consumer.namespace()?;
        let name = consumer.name();
        let _guard = self.lock(&namespace).await;

        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut updated = store.get(&namespace, &name).await?;
            if !apply(updated.status.get_or_insert_with(Default::default))? {
                return Ok(updated);
            }

            match store.update_status(&updated).await {
                Ok(consumer) => {
                    info!(consumer = %name, action, "capacity returned to the pool");
                    return Ok(consumer);
                }
                Err(e) if e.is_conflict() && attempt < MAX_CONFLICT_RETRIES => {
                    debug!(consumer = %name, action, attempt, "conflicted, retrying with a fresh read");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}
