//! Scripted API server for driving the reconcilers without a cluster
use crate::reconcilers::{Context, State};

use http::{Method, Request, Response, StatusCode};
use kube::client::Body;
use kube::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::task::JoinHandle;

type ApiServerHandle = tower_test::mock::Handle<Request<Body>, Response<Body>>;

/// Answers the client's requests in the order of a list of expected exchanges
pub struct ApiServerVerifier(ApiServerHandle);

/// One request the reconcilers are expected to make, and how to answer it
#[derive(Clone, Debug)]
pub enum Exchange {
    /// GET of a named object, answered with `object` or a 404
    Get { path: String, object: Option<Value> },
    /// POST to a collection, answered with the submitted object
    Create { path: String },
    /// PUT of a named object, answered with the submitted object
    Replace { path: String, dry_run: bool },
    /// DELETE of a named object
    Delete { path: String },
    /// Any request on `path`, answered with an API error
    Fail { method: Method, path: String, code: u16 },
}

impl Exchange {
    pub fn get(path: impl Into<String>, object: Value) -> Self {
        Exchange::Get {
            path: path.into(),
            object: Some(object),
        }
    }

    pub fn not_found(path: impl Into<String>) -> Self {
        Exchange::Get {
            path: path.into(),
            object: None,
        }
    }

    pub fn create(path: impl Into<String>) -> Self {
        Exchange::Create { path: path.into() }
    }

    pub fn replace(path: impl Into<String>) -> Self {
        Exchange::Replace {
            path: path.into(),
            dry_run: false,
        }
    }

    pub fn dry_run(path: impl Into<String>) -> Self {
        Exchange::Replace {
            path: path.into(),
            dry_run: true,
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Exchange::Delete { path: path.into() }
    }
}

/// A write the mocked API server accepted
#[derive(Clone, Debug)]
pub struct Recorded {
    pub method: Method,
    pub path: String,
    pub dry_run: bool,
    pub body: Value,
}

pub fn deployment_path(namespace: &str, name: Option<&str>) -> String {
    resource_path("/apis/apps/v1", namespace, "deployments", name)
}

pub fn service_path(namespace: &str, name: Option<&str>) -> String {
    resource_path("/api/v1", namespace, "services", name)
}

pub fn hpa_path(namespace: &str, name: Option<&str>) -> String {
    resource_path("/apis/autoscaling/v2", namespace, "horizontalpodautoscalers", name)
}

pub fn ingress_path(namespace: &str, name: Option<&str>) -> String {
    resource_path("/apis/networking.k8s.io/v1", namespace, "ingresses", name)
}

pub fn config_map_path(namespace: &str, name: Option<&str>) -> String {
    resource_path("/api/v1", namespace, "configmaps", name)
}

fn resource_path(group: &str, namespace: &str, plural: &str, name: Option<&str>) -> String {
    match name {
        Some(name) => format!("{}/namespaces/{}/{}/{}", group, namespace, plural, name),
        None => format!("{}/namespaces/{}/{}", group, namespace, plural),
    }
}

fn status(code: u16, reason: &str) -> Response<Body> {
    let body = json!({
        "kind": "Status",
        "apiVersion": "v1",
        "metadata": {},
        "status": "Failure",
        "message": reason,
        "reason": reason,
        "code": code,
    });
    Response::builder()
        .status(StatusCode::from_u16(code).unwrap())
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

fn ok(body: &Value) -> Response<Body> {
    Response::builder()
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

impl ApiServerVerifier {
    /// Serve `exchanges` in order, then return every write that was made.
    ///
    /// A request that does not match the next exchange fails the test.
    pub fn run(mut self, exchanges: Vec<Exchange>) -> JoinHandle<Vec<Recorded>> {
        tokio::spawn(async move {
            let mut recorded = Vec::new();
            for exchange in exchanges {
                let (request, send) = self.0.next_request().await.expect("service not called");
                let method = request.method().clone();
                let path = request.uri().path().to_string();
                let dry_run = request.uri().query().unwrap_or_default().contains("dryRun=All");
                let bytes = request.into_body().collect_bytes().await.unwrap();

                match exchange {
                    Exchange::Get { path: expected, object } => {
                        assert_eq!((method, path), (Method::GET, expected));
                        match object {
                            Some(object) => send.send_response(ok(&object)),
                            None => send.send_response(status(404, "NotFound")),
                        }
                    }
                    Exchange::Create { path: expected } => {
                        assert_eq!((method.clone(), path.clone(), dry_run), (Method::POST, expected, false));
                        let mut body: Value = serde_json::from_slice(&bytes).unwrap();
                        body["metadata"]["resourceVersion"] = json!("1");
                        send.send_response(ok(&body));
                        recorded.push(Recorded {
                            method,
                            path,
                            dry_run,
                            body,
                        });
                    }
                    Exchange::Replace {
                        path: expected,
                        dry_run: expected_dry_run,
                    } => {
                        assert_eq!(
                            (method.clone(), path.clone(), dry_run),
                            (Method::PUT, expected, expected_dry_run)
                        );
                        let body: Value = serde_json::from_slice(&bytes).unwrap();
                        send.send_response(ok(&body));
                        recorded.push(Recorded {
                            method,
                            path,
                            dry_run,
                            body,
                        });
                    }
                    Exchange::Delete { path: expected } => {
                        assert_eq!((method.clone(), path.clone()), (Method::DELETE, expected));
                        send.send_response(ok(&json!({
                            "kind": "Status",
                            "apiVersion": "v1",
                            "metadata": {},
                            "status": "Success",
                        })));
                        recorded.push(Recorded {
                            method,
                            path,
                            dry_run,
                            body: Value::Null,
                        });
                    }
                    Exchange::Fail {
                        method: expected_method,
                        path: expected,
                        code,
                    } => {
                        assert_eq!((method, path), (expected_method, expected));
                        send.send_response(status(code, "InternalError"));
                    }
                }
            }
            recorded
        })
    }
}

impl Context {
    /// A context whose client talks to the returned verifier
    pub fn test() -> (Context, ApiServerVerifier, State) {
        let (mock_service, handle) = tower_test::mock::pair::<Request<Body>, Response<Body>>();
        let client = Client::new(mock_service, "default");
        let state = State::default();
        let ctx = state.to_context(client).unwrap();
        (ctx, ApiServerVerifier(handle), state)
    }
}

/// Await the verifier, failing if the reconciler left exchanges unanswered
pub async fn timeout_after_1s(handle: JoinHandle<Vec<Recorded>>) -> Vec<Recorded> {
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("timeout on mock apiserver")
        .expect("scenario succeeded")
}
