#![allow(dead_code)]
use async_trait::async_trait;
use futures::StreamExt;
use hyper::http::{Request, Response};
use k8s_openapi::api::storage::v1::StorageClass;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Client;
use kube::api::{ListParams, WatchEvent, WatchParams};
use kube::client::Body;
use kube::error::ErrorResponse;
use k8s_openapi::serde_json::{self, json};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use storage_informers::error::{Error, Result};
use storage_informers::k8s::informers::{ListPage, ListWatch, WatchStream};

pub type MockHandle = tower_test::mock::Handle<Request<Body>, Response<Body>>;

/// Client whose requests go to an in-process mock; nothing reaches a cluster
pub fn mock_client() -> (Client, MockHandle) {
    let (service, handle) = tower_test::mock::pair::<Request<Body>, Response<Body>>();
    (Client::new(service, "default"), handle)
}

pub fn storage_class(name: &str, resource_version: &str) -> StorageClass {
    StorageClass {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            resource_version: Some(resource_version.to_string()),
            labels: Some(BTreeMap::from([("tier".to_string(), "ssd".to_string())])),
            ..Default::default()
        },
        provisioner: "csi.example.com".to_string(),
        ..Default::default()
    }
}

/// One scripted response to a watch call
enum WatchScript<K> {
    /// Deliver the events, then stay open
    Open(Vec<Result<WatchEvent<K>>>),
    /// Deliver the events, then end the stream
    Closing(Vec<Result<WatchEvent<K>>>),
    /// Refuse to open the watch
    Fail(Error),
}

/// Scripted list/watch source. Each list call pops the next page; each watch
/// call pops the next watch script. Once a script runs out, lists serve an
/// empty collection and watches stay open without events.
pub struct FakeListWatch<K> {
    pages: Mutex<VecDeque<Result<ListPage<K>>>>,
    watches: Mutex<VecDeque<WatchScript<K>>>,
    list_calls: AtomicUsize,
    watch_versions: Mutex<Vec<String>>,
}

impl<K> FakeListWatch<K> {
    pub fn new() -> Self {
        Self {
            pages: Mutex::new(VecDeque::new()),
            watches: Mutex::new(VecDeque::new()),
            list_calls: AtomicUsize::new(0),
            watch_versions: Mutex::new(Vec::new()),
        }
    }

    pub fn with_page(self, items: Vec<K>, resource_version: &str) -> Self {
        self.pages.lock().unwrap().push_back(Ok(ListPage {
            items,
            resource_version: resource_version.to_string(),
        }));
        self
    }

    pub fn with_failing_list(self, message: &str) -> Self {
        self.pages
            .lock()
            .unwrap()
            .push_back(Err(Error::Custom(message.to_string())));
        self
    }

    pub fn with_watch(self, events: Vec<Result<WatchEvent<K>>>) -> Self {
        self.watches.lock().unwrap().push_back(WatchScript::Open(events));
        self
    }

    pub fn with_closing_watch(self, events: Vec<Result<WatchEvent<K>>>) -> Self {
        self.watches.lock().unwrap().push_back(WatchScript::Closing(events));
        self
    }

    pub fn with_failing_watch(self, error: Error) -> Self {
        self.watches.lock().unwrap().push_back(WatchScript::Fail(error));
        self
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn watch_versions(&self) -> Vec<String> {
        self.watch_versions.lock().unwrap().clone()
    }
}

#[async_trait]
impl<K: Clone + Send + Sync + 'static> ListWatch<K> for FakeListWatch<K> {
    async fn list(&self, _params: &ListParams) -> Result<ListPage<K>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.pages.lock().unwrap().pop_front();
        next.unwrap_or_else(|| {
            Ok(ListPage {
                items: Vec::new(),
                resource_version: "0".to_string(),
            })
        })
    }

    async fn watch(&self, _params: &WatchParams, resource_version: &str) -> Result<WatchStream<K>> {
        self.watch_versions
            .lock()
            .unwrap()
            .push(resource_version.to_string());
        let next = self.watches.lock().unwrap().pop_front();
        match next.unwrap_or(WatchScript::Open(Vec::new())) {
            WatchScript::Open(events) => Ok(futures::stream::iter(events)
                .chain(futures::stream::pending())
                .boxed()),
            WatchScript::Closing(events) => Ok(futures::stream::iter(events).boxed()),
            WatchScript::Fail(error) => Err(error),
        }
    }
}

/// Shared view of a fake's call counters, kept after the fake moves into an informer
pub struct Calls<K>(pub Arc<FakeListWatch<K>>);

#[async_trait]
impl<K: Clone + Send + Sync + 'static> ListWatch<K> for Calls<K> {
    async fn list(&self, params: &ListParams) -> Result<ListPage<K>> {
        ListWatch::list(self.0.as_ref(), params).await
    }

    async fn watch(&self, params: &WatchParams, resource_version: &str) -> Result<WatchStream<K>> {
        ListWatch::watch(self.0.as_ref(), params, resource_version).await
    }
}

/// API error as returned by the server, e.g. 410 for an expired resource version
pub fn api_error(code: u16, message: &str) -> ErrorResponse {
    ErrorResponse {
        status: "Failure".to_string(),
        message: message.to_string(),
        reason: if code == 410 { "Expired" } else { "InternalError" }.to_string(),
        code,
    }
}

pub fn bookmark(resource_version: &str) -> WatchEvent<StorageClass> {
    serde_json::from_value(json!({
        "type": "BOOKMARK",
        "object": {
            "apiVersion": "storage.k8s.io/v1",
            "kind": "StorageClass",
            "metadata": { "resourceVersion": resource_version },
        },
    }))
    .unwrap()
}
