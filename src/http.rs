// Copyright 2024 Palantir Technologies, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A small HTTP exposition facade for a [`MetricRegistry`], built on `hyper`.
//!
//! Mount [`MetricsServer`] at a dedicated address (it is not a general-purpose
//! router — it is meant to be run as its own small server, one per process) to
//! expose a registry's metrics over a handful of routes rooted at a
//! configurable path, `/_app-metrics` by default:
//!
//! | Method | Path | Behavior |
//! | --- | --- | --- |
//! | `GET` | `/_app-metrics` | the names of every registered instrument |
//! | `GET` | `/_app-metrics/<name>` | the instrument's current snapshot, or 404 |
//! | `PUT` | `/_app-metrics/<name>` | registers a new instrument of the given kind |
//! | `POST` | `/_app-metrics/<name>` | notifies the instrument with a new value |
//! | `DELETE` | `/_app-metrics/<name>` | removes the instrument |
//!
//! Requests whose path falls outside the configured root are forwarded to the
//! wrapped application passed to [`MetricsServer::with_inner`], or answered
//! `404` if none was configured.

use crate::instrument::Instrument;
use crate::reservoir::{
    ExponentiallyDecayingReservoir, SlidingTimeWindowReservoir, SlidingWindowReservoir,
    UniformReservoir,
};
use crate::{AppMetricsError, Counter, Gauge, Histogram, Meter, MetricRegistry, Timer};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// A boxed future returning a response, the common currency for the wrapped
/// application a [`MetricsServer`] forwards unmatched requests to.
type BoxResponseFuture = Pin<Box<dyn Future<Output = Response<Body>> + Send>>;

/// The wrapped application a [`MetricsServer`] sits in front of.
///
/// Requests whose path doesn't fall under the server's configured root are
/// forwarded here unchanged, mirroring the original WSGI middleware's
/// behavior of transparently delegating to the application it instruments.
trait Inner: Send + Sync {
    fn call(&self, req: Request<Body>) -> BoxResponseFuture;
}

impl<F, Fut> Inner for F
where
    F: Fn(Request<Body>) -> Fut + Send + Sync,
    Fut: Future<Output = Response<Body>> + Send + 'static,
{
    fn call(&self, req: Request<Body>) -> BoxResponseFuture {
        Box::pin((self)(req))
    }
}

fn not_found(_req: Request<Body>) -> BoxResponseFuture {
    Box::pin(async { response(StatusCode::NOT_FOUND, "no such route".to_string()) })
}

/// An HTTP server exposing a [`MetricRegistry`]'s instruments.
pub struct MetricsServer {
    registry: Arc<MetricRegistry>,
    root: String,
    address: SocketAddr,
    inner: Arc<dyn Inner>,
}

impl MetricsServer {
    /// Creates a new server exposing `registry` at `address`, rooted at
    /// `/_app-metrics`.
    ///
    /// Requests outside the root respond `404`; use
    /// [`with_inner`](MetricsServer::with_inner) to forward them to a wrapped
    /// application instead.
    pub fn new(registry: Arc<MetricRegistry>, address: SocketAddr) -> Self {
        Self::with_root(registry, address, "_app-metrics")
    }

    /// Creates a new server exposing `registry` at `address`, rooted at
    /// `/<root>` instead of the default `/_app-metrics`.
    pub fn with_root(registry: Arc<MetricRegistry>, address: SocketAddr, root: &str) -> Self {
        MetricsServer {
            registry,
            root: format!("/{}", root.trim_matches('/')),
            address,
            inner: Arc::new(not_found as fn(Request<Body>) -> BoxResponseFuture),
        }
    }

    /// Wraps `app`, an application the metrics facade is mounted in front of;
    /// requests whose path doesn't fall under this server's root are
    /// forwarded to `app` instead of 404ing.
    pub fn with_inner<F, Fut>(mut self, app: F) -> Self
    where
        F: Fn(Request<Body>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response<Body>> + Send + 'static,
    {
        self.inner = Arc::new(app);
        self
    }

    /// Runs the server until its future is dropped or the process exits.
    pub async fn run(self) -> Result<(), hyper::Error> {
        let registry = self.registry;
        let root = Arc::new(self.root);
        let inner = self.inner;

        let make_svc = make_service_fn(move |_conn| {
            let registry = registry.clone();
            let root = root.clone();
            let inner = inner.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |req| {
                    let registry = registry.clone();
                    let root = root.clone();
                    let inner = inner.clone();
                    async move { Ok::<_, Infallible>(handle(&registry, &root, &*inner, req).await) }
                }))
            }
        });

        Server::bind(&self.address).serve(make_svc).await
    }
}

async fn handle(
    registry: &MetricRegistry,
    root: &str,
    inner: &dyn Inner,
    req: Request<Body>,
) -> Response<Body> {
    let path = req.uri().path().to_string();
    let suffix = match path.strip_prefix(root) {
        Some(suffix) => suffix,
        None => return inner.call(req).await,
    };

    let name = suffix.trim_start_matches('/');

    if name.is_empty() {
        return match *req.method() {
            Method::GET => json_response(StatusCode::OK, &registry.names()),
            _ => response(StatusCode::METHOD_NOT_ALLOWED, "method not allowed".to_string()),
        };
    }

    match *req.method() {
        Method::GET => match registry.get(name) {
            Some(snapshot) => json_response(StatusCode::OK, &snapshot),
            None => response(StatusCode::NOT_FOUND, format!("no such metric: {:?}", name)),
        },
        Method::PUT => {
            let body = match read_json(req).await {
                Ok(body) => body,
                Err(resp) => return resp,
            };
            match create(registry, name, &body) {
                Ok(()) => response(StatusCode::OK, String::new()),
                Err(e) => response(StatusCode::BAD_REQUEST, e.to_string()),
            }
        }
        Method::POST => {
            let body = match read_json(req).await {
                Ok(body) => body,
                Err(resp) => return resp,
            };
            let value = match body.get("value") {
                Some(v) => v.clone(),
                None => {
                    return response(
                        StatusCode::BAD_REQUEST,
                        "metric value not provided".to_string(),
                    )
                }
            };
            let value = match serde_json::from_value::<serde_value::Value>(value) {
                Ok(v) => v,
                Err(e) => return response(StatusCode::BAD_REQUEST, e.to_string()),
            };

            match registry.notify(name, value) {
                Ok(()) => response(StatusCode::OK, String::new()),
                Err(AppMetricsError::InvalidMetric(_)) => {
                    response(StatusCode::NOT_FOUND, format!("no such metric: {:?}", name))
                }
                Err(e) => response(StatusCode::BAD_REQUEST, e.to_string()),
            }
        }
        Method::DELETE => {
            let deleted = registry.delete(name).is_some();
            response(
                StatusCode::OK,
                if deleted { "deleted" } else { "not deleted" }.to_string(),
            )
        }
        _ => response(StatusCode::METHOD_NOT_ALLOWED, "method not allowed".to_string()),
    }
}

async fn read_json(req: Request<Body>) -> Result<serde_json::Map<String, serde_json::Value>, Response<Body>> {
    let content_type = req
        .headers()
        .get(hyper::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    if !content_type.starts_with("application/json") {
        return Err(response(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "content-type must be application/json".to_string(),
        ));
    }

    let bytes = match hyper::body::to_bytes(req.into_body()).await {
        Ok(bytes) => bytes,
        Err(e) => return Err(response(StatusCode::BAD_REQUEST, e.to_string())),
    };

    match serde_json::from_slice::<serde_json::Value>(&bytes) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(_) => Err(response(
            StatusCode::BAD_REQUEST,
            "request body must be a JSON object".to_string(),
        )),
        Err(e) => Err(response(
            StatusCode::BAD_REQUEST,
            format!("invalid json: {}", e),
        )),
    }
}

fn create(
    registry: &MetricRegistry,
    name: &str,
    body: &serde_json::Map<String, serde_json::Value>,
) -> Result<(), AppMetricsError> {
    let kind = body
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or_else(|| AppMetricsError::InvalidArgument("metric type not provided".to_string()))?;

    let instrument = match kind {
        "counter" => Instrument::Counter(Arc::new(Counter::new())),
        "gauge" => Instrument::Gauge(Arc::new(Gauge::new())),
        "timer" => Instrument::Timer(Arc::new(Timer::new())),
        "meter" => {
            let tick_interval = body
                .get("tick_interval_secs")
                .and_then(|v| v.as_u64())
                .unwrap_or(crate::meter::DEFAULT_TICK_INTERVAL_SECS);
            Instrument::Meter(Arc::new(Meter::with_tick_interval(Duration::from_secs(
                tick_interval,
            ))))
        }
        "histogram" => {
            let reservoir_type = body
                .get("reservoir_type")
                .and_then(|v| v.as_str())
                .unwrap_or("uniform");
            Instrument::Histogram(Arc::new(build_histogram(reservoir_type, body)?))
        }
        other => {
            return Err(AppMetricsError::InvalidArgument(format!(
                "invalid metric type: {:?}",
                other
            )))
        }
    };

    registry.register(name, instrument)
}

fn build_histogram(
    reservoir_type: &str,
    body: &serde_json::Map<String, serde_json::Value>,
) -> Result<Histogram, AppMetricsError> {
    let capacity = body
        .get("capacity")
        .and_then(|v| v.as_u64())
        .unwrap_or(1028) as usize;

    match reservoir_type {
        "uniform" => Ok(Histogram::new(UniformReservoir::with_capacity(capacity))),
        "sliding_window" => {
            let window_size = body
                .get("window_size")
                .and_then(|v| v.as_u64())
                .unwrap_or(1028) as usize;
            Ok(Histogram::new(SlidingWindowReservoir::new(window_size)))
        }
        "sliding_time_window" => {
            let window_secs = body.get("window_secs").and_then(|v| v.as_u64()).unwrap_or(60);
            Ok(Histogram::new(SlidingTimeWindowReservoir::new(
                Duration::from_secs(window_secs),
            )))
        }
        "exp_decaying" => {
            let alpha = body.get("alpha").and_then(|v| v.as_f64()).unwrap_or(0.015);
            Ok(Histogram::new(
                ExponentiallyDecayingReservoir::with_capacity_and_alpha(capacity, alpha),
            ))
        }
        other => Err(AppMetricsError::InvalidArgument(format!(
            "unknown reservoir type: {:?}",
            other
        ))),
    }
}

fn response(status: StatusCode, body: String) -> Response<Body> {
    Response::builder()
        .status(status)
        .body(Body::from(body))
        .expect("response builder arguments are always valid")
}

fn json_response<T>(status: StatusCode, value: &T) -> Response<Body>
where
    T: serde::Serialize,
{
    match serde_json::to_vec(value) {
        Ok(body) => Response::builder()
            .status(status)
            .header(hyper::header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .expect("response builder arguments are always valid"),
        Err(e) => {
            log::warn!("failed to serialize metrics response: {}", e);
            response(StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use hyper::Body;

    fn request(method: Method, path: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(path)
            .header(hyper::header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn h(registry: &MetricRegistry, req: Request<Body>) -> Response<Body> {
        handle(registry, "/_app-metrics", &not_found, req).await
    }

    #[tokio::test]
    async fn get_on_the_root_lists_names() {
        let registry = MetricRegistry::new();
        registry.counter("requests");

        let resp = h(&registry, request(Method::GET, "/_app-metrics", "")).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let bytes = hyper::body::to_bytes(resp.into_body()).await.unwrap();
        let names: Vec<String> = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(names, vec!["requests".to_string()]);
    }

    #[tokio::test]
    async fn get_on_a_missing_metric_is_404() {
        let registry = MetricRegistry::new();
        let resp = h(&registry, request(Method::GET, "/_app-metrics/nope", "")).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn requests_outside_the_root_are_forwarded_to_the_inner_app() {
        let registry = MetricRegistry::new();
        let resp = handle(
            &registry,
            "/_app-metrics",
            &|_req: Request<Body>| -> BoxResponseFuture {
                Box::pin(async { response(StatusCode::OK, "from the app".to_string()) })
            },
            request(Method::GET, "/healthz", ""),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = hyper::body::to_bytes(resp.into_body()).await.unwrap();
        assert_eq!(&bytes[..], b"from the app");
    }

    #[tokio::test]
    async fn requests_outside_the_root_are_404_with_no_inner_app_configured() {
        let registry = MetricRegistry::new();
        let resp = h(&registry, request(Method::GET, "/healthz", "")).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn put_registers_a_new_counter() {
        let registry = MetricRegistry::new();
        let resp = h(
            &registry,
            request(Method::PUT, "/_app-metrics/requests", r#"{"type": "counter"}"#),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(registry.counter("requests").count(), 0);
    }

    #[tokio::test]
    async fn duplicate_put_is_a_bad_request() {
        let registry = MetricRegistry::new();
        let first = h(
            &registry,
            request(Method::PUT, "/_app-metrics/foo", r#"{"type": "counter"}"#),
        )
        .await;
        assert_eq!(first.status(), StatusCode::OK);

        let second = h(
            &registry,
            request(Method::PUT, "/_app-metrics/foo", r#"{"type": "counter"}"#),
        )
        .await;
        assert_eq!(second.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn full_counter_lifecycle_through_http() {
        let registry = MetricRegistry::new();

        let put = h(
            &registry,
            request(Method::PUT, "/_app-metrics/foo", r#"{"type": "counter"}"#),
        )
        .await;
        assert_eq!(put.status(), StatusCode::OK);

        let post = h(
            &registry,
            request(Method::POST, "/_app-metrics/foo", r#"{"value": 5}"#),
        )
        .await;
        assert_eq!(post.status(), StatusCode::OK);

        let get = h(&registry, request(Method::GET, "/_app-metrics/foo", "")).await;
        assert_eq!(get.status(), StatusCode::OK);
        let bytes = hyper::body::to_bytes(get.into_body()).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["kind"], "counter");
        assert_eq!(body["value"], 5);
    }

    #[tokio::test]
    async fn post_notifies_an_existing_metric() {
        let registry = MetricRegistry::new();
        registry.counter("requests");

        let resp = handle(
            &registry,
            "/_app-metrics",
            request(Method::POST, "/_app-metrics/requests", r#"{"value": 5}"#),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(registry.counter("requests").count(), 5);
    }

    #[tokio::test]
    async fn delete_removes_a_metric() {
        let registry = MetricRegistry::new();
        registry.counter("requests");

        let resp = handle(
            &registry,
            "/_app-metrics",
            request(Method::DELETE, "/_app-metrics/requests", ""),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(registry.lookup("requests").is_none());
    }
}
