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

//! Onboarding and status protocol served to storage clients.

pub mod messages;
pub mod server;
pub mod service;
pub mod ticket;

use crate::{capacity, discovery, store, types};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("invalid onboarding ticket: {}", source))]
    InvalidTicket { source: jsonwebtoken::errors::Error },

    #[snafu(display("onboarding ticket was issued for '{}', not '{}'", subject, name))]
    TicketSubjectMismatch { subject: String, name: String },

    #[snafu(display("invalid consumer name '{}'", name))]
    InvalidConsumerName { name: String },

    #[snafu(display("consumer '{}' already exists", name))]
    DuplicateConsumer { name: String },

    #[snafu(display(
        "requested {} bytes but only {} bytes are available",
        requested,
        available
    ))]
    QuotaExceeded { requested: u64, available: u64 },

    #[snafu(display("unknown consumer '{}'", id))]
    UnknownConsumer { id: String },

    #[snafu(display("no storage cluster in namespace '{}'", namespace))]
    NoStorageCluster { namespace: String },

    #[snafu(transparent)]
    Store { source: store::Error },

    #[snafu(transparent)]
    Capacity { source: capacity::Error },

    #[snafu(transparent)]
    Discovery { source: discovery::Error },

    #[snafu(transparent)]
    Types { source: types::error::Error },
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            Error::InvalidTicket { .. } | Error::TicketSubjectMismatch { .. } => {
                (StatusCode::UNAUTHORIZED, "InvalidTicket")
            }
            Error::InvalidConsumerName { .. } => (StatusCode::BAD_REQUEST, "InvalidConsumerName"),
            Error::DuplicateConsumer { .. } => (StatusCode::CONFLICT, "DuplicateConsumer"),
            Error::QuotaExceeded { .. } => (StatusCode::INSUFFICIENT_STORAGE, "QuotaExceeded"),
            Error::UnknownConsumer { .. } => (StatusCode::NOT_FOUND, "UnknownConsumer"),
            Error::Types { .. } => (StatusCode::BAD_REQUEST, "BadRequest"),
            Error::NoStorageCluster { .. } => (StatusCode::SERVICE_UNAVAILABLE, "Unavailable"),
            Error::Store { source } if source.is_transient() => {
                (StatusCode::SERVICE_UNAVAILABLE, "Unavailable")
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "InternalServerError"),
        };

        if status.is_server_error() {
            tracing::warn!(error = %self, "provider request failed");
        }

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message: self.to_string(),
        });

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, Error>;
