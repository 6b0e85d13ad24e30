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

use schemars::{JsonSchema, Schema, SchemaGenerator, json_schema};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use strum::{Display, EnumString};

/// Lifecycle state of a StorageConsumer.
///
/// `Configuring` is the initial state. A record leaves the system only from
/// `Deleting`; `Failed` is terminal until an explicit retry moves it back to
/// `Configuring`.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Display, EnumString)]
pub enum ConsumerState {
    #[strum(serialize = "Configuring")]
    Configuring,

    #[strum(serialize = "Ready")]
    Ready,

    #[strum(serialize = "Deleting")]
    Deleting,

    #[strum(serialize = "Failed")]
    Failed,
}

impl ConsumerState {
    pub fn can_transition_to(self, next: ConsumerState) -> bool {
        use ConsumerState::*;

        match (self, next) {
            (from, to) if from == to => true,
            // deprovisioning is retried in place, never failed
            (Deleting, _) => false,
            (_, Failed) => true,
            (Configuring, Ready) | (Configuring, Deleting) | (Ready, Deleting) => true,
            (Failed, Configuring) | (Failed, Deleting) => true,
            _ => false,
        }
    }

    /// States whose granted capacity counts against the shared pool.
    pub fn holds_capacity(self) -> bool {
        matches!(self, ConsumerState::Configuring | ConsumerState::Ready)
    }
}

impl JsonSchema for ConsumerState {
    fn schema_name() -> Cow<'static, str> {
        Cow::Borrowed("ConsumerState")
    }
    fn schema_id() -> Cow<'static, str> {
        Cow::Borrowed(concat!(module_path!(), "::", "ConsumerState"))
    }
    fn json_schema(_generator: &mut SchemaGenerator) -> Schema {
        json_schema! {
            {
                "type": "string",
                "enum": ["Configuring", "Ready", "Deleting", "Failed"]
            }
        }
    }
}
