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

//! Status transitions of a StorageConsumer.
//!
//! Every mutation of `state` and `grantedCapacity` goes through these
//! functions so the invariants hold regardless of caller:
//! a grant exists only while `Configuring` or `Ready`, `Ready` requires a
//! grant, and `Failed` never carries one.

use crate::types::v1alpha1::status::state::ConsumerState;
use crate::types::v1alpha1::status::{CephObjects, Status};
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use snafu::Snafu;

pub const REASON_QUOTA_EXCEEDED: &str = "QuotaExceeded";
pub const REASON_PROVISIONING_FAILED: &str = "ProvisioningFailed";

#[derive(Debug, Snafu, PartialEq, Eq)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("invalid consumer state transition from {} to {}", from, to))]
    InvalidTransition { from: String, to: String },

    #[snafu(display("consumer cannot become Ready without granted capacity"))]
    NotGranted,
}

fn current(status: &Status) -> ConsumerState {
    status.state.unwrap_or(ConsumerState::Configuring)
}

fn advance(status: &mut Status, next: ConsumerState) -> Result<(), Error> {
    let from = current(status);
    if status.state.is_some() && !from.can_transition_to(next) {
        return InvalidTransitionSnafu {
            from: from.to_string(),
            to: next.to_string(),
        }
        .fail();
    }
    status.state = Some(next);
    Ok(())
}

/// Puts a fresh record into `Configuring`.
pub fn begin_configuring(status: &mut Status) -> Result<(), Error> {
    advance(status, ConsumerState::Configuring)?;
    status.message = None;
    Ok(())
}

/// Records a reservation. Only valid while `Configuring`.
pub fn grant(status: &mut Status, capacity: Quantity) -> Result<(), Error> {
    let state = current(status);
    if state != ConsumerState::Configuring {
        return InvalidTransitionSnafu {
            from: state.to_string(),
            to: "granted".to_owned(),
        }
        .fail();
    }
    status.state = Some(ConsumerState::Configuring);
    status.granted_capacity = Some(capacity);
    Ok(())
}

pub fn mark_ready(
    status: &mut Status,
    objects: CephObjects,
    connection: Option<corev1::SecretKeySelector>,
) -> Result<(), Error> {
    if status.granted_capacity.is_none() {
        return NotGrantedSnafu.fail();
    }
    advance(status, ConsumerState::Ready)?;
    status.ceph_objects = objects;
    status.connection_details = connection;
    status.message = None;
    Ok(())
}

/// Moves to `Failed` and drops any grant.
pub fn mark_failed(status: &mut Status, reason: &str) -> Result<(), Error> {
    advance(status, ConsumerState::Failed)?;
    status.granted_capacity = None;
    status.message = Some(reason.to_owned());
    Ok(())
}

/// Moves to `Deleting`, releasing the grant back to the pool.
pub fn begin_deleting(status: &mut Status) -> Result<(), Error> {
    advance(status, ConsumerState::Deleting)?;
    status.granted_capacity = None;
    Ok(())
}

/// Explicit retry of a `Failed` consumer.
pub fn reset_for_retry(status: &mut Status) -> Result<(), Error> {
    let state = current(status);
    if state != ConsumerState::Failed {
        return InvalidTransitionSnafu {
            from: state.to_string(),
            to: ConsumerState::Configuring.to_string(),
        }
        .fail();
    }
    advance(status, ConsumerState::Configuring)?;
    status.granted_capacity = None;
    status.message = None;
    Ok(())
}
