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

//! Discovery documents: one YAML entry per storage cluster, merged into the
//! shared `odf-info` ConfigMap in the operator namespace.

pub mod aggregator;
pub mod document;
pub mod facts;

use crate::{store, types};
use snafu::Snafu;

/// Name of the shared container every cluster publishes into.
pub const CONTAINER_NAME: &str = "odf-info";

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("secret '{}/{}' has no '{}' entry", namespace, secret, key))]
    MissingSecretKey {
        namespace: String,
        secret: String,
        key: String,
    },

    #[snafu(display("secret '{}' entry '{}' is not valid UTF-8", secret, key))]
    InvalidSecretData { secret: String, key: String },

    #[snafu(display("storage cluster '{}' has no {} ancestor", cluster, kind))]
    NoAncestor { cluster: String, kind: String },

    #[snafu(display("no ClusterServiceVersion with prefix '{}' in '{}'", prefix, namespace))]
    NoVersion { prefix: String, namespace: String },

    #[snafu(display("YAML error: {}", source))]
    Yaml { source: serde_yaml_ng::Error },

    #[snafu(transparent)]
    Store { source: store::Error },

    #[snafu(transparent)]
    Types { source: types::error::Error },
}
