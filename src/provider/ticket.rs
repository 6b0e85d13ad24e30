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

//! Onboarding tickets: HS256 tokens signed with the provider's secret.

use jsonwebtoken::errors::Error;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TicketClaims {
    /// Who the ticket was issued for.
    pub sub: String,
    pub exp: usize,
    pub iat: usize,
    /// Capacity the consumer may request. Unset means the provider default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_quota: Option<Quantity>,
}

impl TicketClaims {
    pub fn new(subject: &str, storage_quota: Option<Quantity>, ttl: chrono::Duration) -> Self {
        let now = chrono::Utc::now();
        Self {
            sub: subject.to_owned(),
            iat: now.timestamp() as usize,
            exp: (now + ttl).timestamp() as usize,
            storage_quota,
        }
    }
}

#[derive(Clone)]
pub struct TicketKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl TicketKeys {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }

    pub fn issue(&self, claims: &TicketClaims) -> Result<String, Error> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
    }

    /// Checks signature and expiry.
    pub fn validate(&self, ticket: &str) -> Result<TicketClaims, Error> {
        let validation = Validation::new(Algorithm::HS256);
        decode::<TicketClaims>(ticket, &self.decoding, &validation).map(|data| data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issued_ticket_validates() {
        let keys = TicketKeys::new(b"provider-secret");
        let claims = TicketClaims::new(
            "tenant-a",
            Some(Quantity("50Gi".to_owned())),
            chrono::Duration::hours(1),
        );

        let ticket = keys.issue(&claims).expect("issue");
        assert_eq!(keys.validate(&ticket).expect("validate"), claims);
    }

    #[test]
    fn test_rejects_foreign_and_expired_tickets() {
        let keys = TicketKeys::new(b"provider-secret");
        let other = TicketKeys::new(b"someone-else");
        let claims = TicketClaims::new("tenant-a", None, chrono::Duration::hours(1));
        assert!(keys.validate(&other.issue(&claims).expect("issue")).is_err());

        let expired = TicketClaims::new("tenant-a", None, chrono::Duration::hours(-2));
        assert!(keys.validate(&keys.issue(&expired).expect("issue")).is_err());

        assert!(keys.validate("not-a-ticket").is_err());
    }

    #[test]
    fn test_cli_ticket_round_trips() {
        let ticket = crate::ticket("cli-secret", "tenant-a", Some("10Gi"), 48).expect("issue");
        let claims = TicketKeys::new(b"cli-secret").validate(&ticket).expect("validate");
        assert_eq!(claims.sub, "tenant-a");
        assert_eq!(claims.storage_quota, Some(Quantity("10Gi".to_owned())));
        assert_eq!(claims.exp - claims.iat, 48 * 3600);

        assert!(crate::ticket("cli-secret", "tenant-a", Some("lots"), 48).is_err());
    }
}
