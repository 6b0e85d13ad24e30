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

use crate::store::{
    ClusterStore, ConfigMapStore, ConsumerStore, Error, SecretLookup, with_deadline,
};
use crate::types::v1::storage_cluster::StorageCluster;
use crate::types::v1alpha1::storage_consumer::StorageConsumer;
use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::{Resource, ResourceExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::time::Duration;

/// Store backed by the Kubernetes API server. `resourceVersion` is the
/// version token; every call is bounded by the configured deadline.
#[derive(Clone)]
pub struct KubeStore {
    client: kube::Client,
    deadline: Duration,
}

/// Maps an API error for `kind/name`. 409 means a name clash on create and
/// a stale `resourceVersion` on every other verb.
fn classify(source: kube::Error, kind: &str, name: &str, creating: bool) -> Error {
    match source {
        kube::Error::Api(ae) if ae.code == 404 => Error::NotFound {
            kind: kind.to_owned(),
            name: name.to_owned(),
        },
        kube::Error::Api(ae) if ae.code == 409 && creating => Error::AlreadyExists {
            kind: kind.to_owned(),
            name: name.to_owned(),
        },
        kube::Error::Api(ae) if ae.code == 409 => Error::Conflict {
            kind: kind.to_owned(),
            name: name.to_owned(),
        },
        source => Error::Kube { source },
    }
}

impl KubeStore {
    pub fn new(client: kube::Client, deadline: Duration) -> Self {
        Self { client, deadline }
    }

    fn api<T>(&self, namespace: &str) -> Api<T>
    where
        T: Resource<Scope = NamespaceResourceScope>,
        <T as Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn get_object<T>(&self, namespace: &str, name: &str) -> Result<T, Error>
    where
        T: Clone + DeserializeOwned + Debug + Resource<Scope = NamespaceResourceScope>,
        <T as Resource>::DynamicType: Default,
    {
        let api = self.api::<T>(namespace);
        with_deadline(self.deadline, "get", async {
            api.get(name)
                .await
                .map_err(|e| classify(e, &T::kind(&Default::default()), name, false))
        })
        .await
    }

    async fn list_objects<T>(&self, namespace: &str) -> Result<Vec<T>, Error>
    where
        T: Clone + DeserializeOwned + Debug + Resource<Scope = NamespaceResourceScope>,
        <T as Resource>::DynamicType: Default,
    {
        let api = self.api::<T>(namespace);
        with_deadline(self.deadline, "list", async {
            api.list(&ListParams::default())
                .await
                .map(|list| list.items)
                .map_err(|source| Error::Kube { source })
        })
        .await
    }

    async fn create_object<T>(&self, resource: &T, namespace: &str) -> Result<T, Error>
    where
        T: Clone + Serialize + DeserializeOwned + Debug + Resource<Scope = NamespaceResourceScope>,
        <T as Resource>::DynamicType: Default,
    {
        let api = self.api::<T>(namespace);
        let name = resource.name_any();
        with_deadline(self.deadline, "create", async {
            api.create(&PostParams::default(), resource)
                .await
                .map_err(|e| classify(e, &T::kind(&Default::default()), &name, true))
        })
        .await
    }

    async fn replace_object<T>(&self, resource: &T, namespace: &str) -> Result<T, Error>
    where
        T: Clone + Serialize + DeserializeOwned + Debug + Resource<Scope = NamespaceResourceScope>,
        <T as Resource>::DynamicType: Default,
    {
        let api = self.api::<T>(namespace);
        let name = resource.name_any();
        with_deadline(self.deadline, "replace", async {
            api.replace(&name, &PostParams::default(), resource)
                .await
                .map_err(|e| classify(e, &T::kind(&Default::default()), &name, false))
        })
        .await
    }

    async fn replace_object_status<T>(&self, resource: &T, namespace: &str) -> Result<T, Error>
    where
        T: Clone + Serialize + DeserializeOwned + Debug + Resource<Scope = NamespaceResourceScope>,
        <T as Resource>::DynamicType: Default,
    {
        let api = self.api::<T>(namespace);
        let name = resource.name_any();
        // the whole object is sent so the resourceVersion is checked
        with_deadline(self.deadline, "replace status", async {
            api.replace_status(&name, &PostParams::default(), resource)
                .await
                .map_err(|e| classify(e, &T::kind(&Default::default()), &name, false))
        })
        .await
    }

    async fn delete_object<T>(&self, namespace: &str, name: &str) -> Result<(), Error>
    where
        T: Clone + DeserializeOwned + Debug + Resource<Scope = NamespaceResourceScope>,
        <T as Resource>::DynamicType: Default,
    {
        let api = self.api::<T>(namespace);
        with_deadline(self.deadline, "delete", async {
            api.delete(name, &DeleteParams::default())
                .await
                .map(|_| ())
                .map_err(|e| classify(e, &T::kind(&Default::default()), name, false))
        })
        .await
    }
}

fn namespace_of<T: ResourceExt>(resource: &T) -> String {
    resource.namespace().unwrap_or_default()
}

#[async_trait]
impl ConsumerStore for KubeStore {
    async fn create(&self, consumer: &StorageConsumer) -> Result<StorageConsumer, Error> {
        self.create_object(consumer, &namespace_of(consumer)).await
    }

    async fn get(&self, namespace: &str, name: &str) -> Result<StorageConsumer, Error> {
        self.get_object(namespace, name).await
    }

    async fn update(&self, consumer: &StorageConsumer) -> Result<StorageConsumer, Error> {
        self.replace_object(consumer, &namespace_of(consumer)).await
    }

    async fn update_status(&self, consumer: &StorageConsumer) -> Result<StorageConsumer, Error> {
        self.replace_object_status(consumer, &namespace_of(consumer)).await
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), Error> {
        self.delete_object::<StorageConsumer>(namespace, name).await
    }

    async fn list(&self, namespace: &str) -> Result<Vec<StorageConsumer>, Error> {
        self.list_objects(namespace).await
    }
}

#[async_trait]
impl ClusterStore for KubeStore {
    async fn get_cluster(&self, namespace: &str, name: &str) -> Result<StorageCluster, Error> {
        self.get_object(namespace, name).await
    }

    async fn list_clusters(&self, namespace: &str) -> Result<Vec<StorageCluster>, Error> {
        self.list_objects(namespace).await
    }

    async fn update_cluster(&self, cluster: &StorageCluster) -> Result<StorageCluster, Error> {
        self.replace_object(cluster, &namespace_of(cluster)).await
    }
}

#[async_trait]
impl ConfigMapStore for KubeStore {
    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<ConfigMap, Error> {
        self.get_object(namespace, name).await
    }

    async fn create_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap, Error> {
        self.create_object(config_map, &namespace_of(config_map)).await
    }

    async fn replace_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap, Error> {
        self.replace_object(config_map, &namespace_of(config_map)).await
    }

    async fn delete_config_map(&self, namespace: &str, name: &str) -> Result<(), Error> {
        self.delete_object::<ConfigMap>(namespace, name).await
    }
}

#[async_trait]
impl SecretLookup for KubeStore {
    async fn secret_data(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<BTreeMap<String, Vec<u8>>, Error> {
        let secret: Secret = self.get_object(namespace, name).await?;
        Ok(secret
            .data
            .unwrap_or_default()
            .into_iter()
            .map(|(k, v)| (k, v.0))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::v1alpha1::status::Status;
    use crate::types::v1alpha1::status::state::ConsumerState;
    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request, Response, StatusCode};
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
    use std::convert::Infallible;
    use std::sync::{Arc, Mutex};

    type Seen = Arc<Mutex<Vec<(Method, String, serde_json::Value)>>>;

    /// API server that accepts writes at `resourceVersion` 7 and echoes them back.
    fn echo_client(seen: Seen) -> kube::Client {
        let service = tower::service_fn(move |req: Request<kube::client::Body>| {
            let seen = seen.clone();
            async move {
                let (parts, body) = req.into_parts();
                let bytes = to_bytes(Body::new(body), usize::MAX).await.unwrap_or_default();
                let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap_or_default();
                let current = json["metadata"]["resourceVersion"] == "7";
                seen.lock()
                    .expect("seen")
                    .push((parts.method, parts.uri.path().to_owned(), json));

                let response = if current {
                    Response::new(Body::from(bytes))
                } else {
                    let status = serde_json::json!({
                        "kind": "Status",
                        "apiVersion": "v1",
                        "status": "Failure",
                        "message": "the object has been modified",
                        "reason": "Conflict",
                        "code": 409,
                    });
                    let mut response = Response::new(Body::from(status.to_string()));
                    *response.status_mut() = StatusCode::CONFLICT;
                    response
                };
                Ok::<_, Infallible>(response)
            }
        });
        kube::Client::new(service, "default")
    }

    fn ready_consumer(resource_version: &str) -> StorageConsumer {
        let mut consumer =
            StorageConsumer::new_with_capacity("tenant-a", "storage", Quantity("1Gi".to_owned()));
        consumer.metadata.resource_version = Some(resource_version.to_owned());
        consumer.status = Some(Status {
            state: Some(ConsumerState::Ready),
            ..Default::default()
        });
        consumer
    }

    #[tokio::test]
    async fn test_status_write_sends_the_whole_object() {
        let seen = Seen::default();
        let store = KubeStore::new(echo_client(seen.clone()), Duration::from_secs(5));

        let written = store.update_status(&ready_consumer("7")).await.expect("status write");
        assert_eq!(written.status.and_then(|s| s.state), Some(ConsumerState::Ready));

        let seen = seen.lock().expect("seen");
        let (method, path, body) = &seen[0];
        assert_eq!(method, Method::PUT);
        assert_eq!(
            path,
            "/apis/ocs.openshift.io/v1alpha1/namespaces/storage/storageconsumers/tenant-a/status"
        );
        assert_eq!(body["metadata"]["resourceVersion"], "7");
        assert_eq!(body["status"]["state"], "Ready");
    }

    #[tokio::test]
    async fn test_stale_status_write_is_a_conflict() {
        let store = KubeStore::new(echo_client(Seen::default()), Duration::from_secs(5));

        let err = store.update_status(&ready_consumer("6")).await.expect_err("stale");
        assert!(err.is_conflict());
    }
}
