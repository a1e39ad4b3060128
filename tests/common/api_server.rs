//! In-memory Kubernetes API server for driving whole reconcile passes
//!
//! A `tower-test` mock service stands in for the HTTP transport of a
//! [`kube::Client`]. Requests are answered from a map of JSON objects keyed
//! by their API path, and every request is logged so tests can assert on
//! the writes a pass made and their order.
//!
//! ```rust,ignore
//! let (client, server) = FakeApiServer::start();
//! server.insert("default", &cluster);
//! reconcile(Arc::new(cluster), ctx).await.unwrap();
//! assert!(server.writes().is_empty());
//! ```

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use http::{Request, Response, StatusCode};
use kube::client::Body;
use kube::{Client, Resource, ResourceExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tower_test::mock;

/// A logged request: `(method, path)`
#[allow(dead_code)]
pub type LoggedRequest = (String, String);

/// Shared state of the fake API server
#[allow(dead_code)]
#[derive(Clone, Default)]
pub struct FakeApiServer {
    objects: Arc<Mutex<BTreeMap<String, Value>>>,
    log: Arc<Mutex<Vec<LoggedRequest>>>,
}

/// Path of a namespaced object of kind `K`
#[allow(dead_code)]
pub fn object_path<K: Resource<DynamicType = ()>>(ns: &str, name: &str) -> String {
    format!("{}/{}", K::url_path(&(), Some(ns)), name)
}

#[allow(dead_code)]
impl FakeApiServer {
    /// Start serving on a background task; must be called inside a runtime
    pub fn start() -> (Client, Self) {
        let (service, handle) = mock::pair::<Request<Body>, Response<Body>>();
        let server = Self::default();
        tokio::spawn(server.clone().serve(handle));
        (Client::new(service, "default"), server)
    }

    /// Store `object` in `ns` under its name
    pub fn insert<K>(&self, ns: &str, object: &K)
    where
        K: Resource<DynamicType = ()> + Serialize,
    {
        let value = serde_json::to_value(object).unwrap();
        self.insert_json(&object_path::<K>(ns, &object.name_any()), value);
    }

    /// Store a raw JSON object at `path`
    pub fn insert_json(&self, path: &str, value: Value) {
        self.objects.lock().unwrap().insert(path.to_string(), value);
    }

    /// Fetch and decode the object of kind `K`, if stored
    pub fn get<K>(&self, ns: &str, name: &str) -> Option<K>
    where
        K: Resource<DynamicType = ()> + DeserializeOwned,
    {
        self.objects
            .lock()
            .unwrap()
            .get(&object_path::<K>(ns, name))
            .map(|v| serde_json::from_value(v.clone()).unwrap())
    }

    /// Edit a stored object in place
    pub fn update_json<K, F>(&self, ns: &str, name: &str, edit: F)
    where
        K: Resource<DynamicType = ()>,
        F: FnOnce(&mut Value),
    {
        let mut objects = self.objects.lock().unwrap();
        let value = objects
            .get_mut(&object_path::<K>(ns, name))
            .expect("object to edit is stored");
        edit(value);
    }

    /// Every request served so far
    pub fn requests(&self) -> Vec<LoggedRequest> {
        self.log.lock().unwrap().clone()
    }

    /// Every request that was not a read
    pub fn writes(&self) -> Vec<LoggedRequest> {
        self.requests()
            .into_iter()
            .filter(|(method, _)| method != "GET")
            .collect()
    }

    /// Forget the request log
    pub fn clear_log(&self) {
        self.log.lock().unwrap().clear();
    }

    async fn serve(self, mut handle: mock::Handle<Request<Body>, Response<Body>>) {
        while let Some((request, send)) = handle.next_request().await {
            let method = request.method().to_string();
            let path = request.uri().path().to_string();
            let body = request.into_body().collect_bytes().await.unwrap_or_default();
            let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);

            self.log.lock().unwrap().push((method.clone(), path.clone()));
            let (status, payload) = self.respond(&method, &path, body);

            let response = Response::builder()
                .status(status)
                .body(Body::from(serde_json::to_vec(&payload).unwrap()))
                .unwrap();
            send.send_response(response);
        }
    }

    fn respond(&self, method: &str, path: &str, body: Value) -> (StatusCode, Value) {
        let mut objects = self.objects.lock().unwrap();

        // Segments after `namespaces/<ns>`: resource, name, subresource
        let parts: Vec<&str> = path.trim_matches('/').split('/').collect();
        let depth = parts
            .iter()
            .position(|p| *p == "namespaces")
            .map_or(0, |i| parts.len().saturating_sub(i + 2));

        match (method, depth) {
            ("GET", 1) => {
                let prefix = format!("{}/", path);
                let items: Vec<Value> = objects
                    .iter()
                    .filter(|(key, _)| {
                        key.strip_prefix(&prefix)
                            .is_some_and(|name| !name.contains('/'))
                    })
                    .map(|(_, v)| v.clone())
                    .collect();
                (
                    StatusCode::OK,
                    json!({
                        "apiVersion": "v1",
                        "kind": "List",
                        "metadata": { "resourceVersion": "1" },
                        "items": items,
                    }),
                )
            }
            ("GET", 2) => match objects.get(path) {
                Some(object) => (StatusCode::OK, object.clone()),
                None => not_found(path),
            },
            ("POST", 1) => {
                let mut object = body;
                let name = object["metadata"]["name"].as_str().unwrap_or_default().to_string();
                let key = format!("{}/{}", path, name);
                if objects.contains_key(&key) {
                    return status(StatusCode::CONFLICT, "AlreadyExists", &key);
                }
                if object["metadata"]["resourceVersion"].is_null() {
                    object["metadata"]["resourceVersion"] = json!("1");
                }
                objects.insert(key, object.clone());
                (StatusCode::CREATED, object)
            }
            ("PUT", 2) => match objects.get_mut(path) {
                Some(object) => {
                    *object = body;
                    (StatusCode::OK, object.clone())
                }
                None => not_found(path),
            },
            ("PATCH", 3) if path.ends_with("/status") => {
                let parent = path.trim_end_matches("/status");
                match objects.get_mut(parent) {
                    Some(object) => {
                        merge_patch(&mut object["status"], &body["status"]);
                        (StatusCode::OK, object.clone())
                    }
                    None => not_found(parent),
                }
            }
            ("DELETE", 2) => match objects.remove(path) {
                Some(object) => (StatusCode::OK, object),
                None => not_found(path),
            },
            _ => status(StatusCode::METHOD_NOT_ALLOWED, "MethodNotAllowed", path),
        }
    }
}

/// JSON merge patch: objects merge recursively and `null` removes a key
#[allow(dead_code)]
fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(fields) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = json!({});
    }
    if let Value::Object(existing) = target {
        for (key, value) in fields {
            if value.is_null() {
                existing.remove(key);
            } else {
                merge_patch(existing.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

#[allow(dead_code)]
fn not_found(path: &str) -> (StatusCode, Value) {
    status(StatusCode::NOT_FOUND, "NotFound", path)
}

#[allow(dead_code)]
fn status(code: StatusCode, reason: &str, path: &str) -> (StatusCode, Value) {
    (
        code,
        json!({
            "apiVersion": "v1",
            "kind": "Status",
            "metadata": {},
            "status": "Failure",
            "message": format!("{} {}", reason, path),
            "reason": reason,
            "code": code.as_u16(),
        }),
    )
}
