//! The reverse-proxy / streaming forwarder (spec §4.5).

use crate::body;
use crate::error::Error;
use bytes::Bytes;
use futures::StreamExt;
use futures_core::Stream;
use http::{HeaderMap, StatusCode};
use modelgate_coordinator::Coordinator;
use modelgate_types::RequestContext;
use std::pin::Pin;
use std::sync::Arc;

/// How the forwarder picks a target when the inbound body omits `model`
/// (spec §4.5 step 1).
#[derive(Debug, Clone)]
pub enum DefaultModelPolicy {
    Named(String),
    FirstReady,
    Error,
}

/// Headers that must never be copied across a proxy hop (RFC 7230 §6.1),
/// plus `host`, which is rebuilt from `proxy_url`.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

pub struct Forwarder {
    coordinator: Arc<Coordinator>,
    http: reqwest::Client,
    default_model_policy: DefaultModelPolicy,
}

pub struct ForwardResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Pin<Box<dyn Stream<Item = Result<Bytes, Error>> + Send>>,
}

impl Forwarder {
    pub fn new(coordinator: Arc<Coordinator>, default_model_policy: DefaultModelPolicy) -> Self {
        Self {
            coordinator,
            http: reqwest::Client::new(),
            default_model_policy,
        }
    }

    /// Forwards a JSON-enveloped OpenAI-style request (spec §4.5 steps
    /// 1-6). `upstream_path` is the path+query the inbound request
    /// arrived on, replayed unmodified against the target's `proxy_url`.
    pub async fn forward(
        &self,
        upstream_path: &str,
        raw_body: Bytes,
        inbound_headers: &HeaderMap,
        ctx: &RequestContext,
    ) -> Result<ForwardResponse, Error> {
        let parsed = body::parse(&raw_body)?;
        let requested = body::requested_model(&parsed.object);
        let name = self.resolve_default(requested).await?;
        let derived = body::strip_reserved_prefix(&name).to_string();

        let catalog = self.coordinator.catalog().await;
        let canonical = catalog
            .resolve(&derived)
            .ok_or_else(|| Error::Coordinator(modelgate_coordinator::Error::NotFound(derived.clone())))?;
        let entry = catalog
            .get(&canonical)
            .cloned()
            .expect("resolve() only returns canonical ids present in the catalog");
        drop(catalog);

        ctx.set_target(canonical.clone());
        let handle = self.coordinator.acquire(canonical.as_str(), ctx).await?;

        let rewritten = body::rewrite(
            parsed.object,
            entry.use_upstream_name.as_deref(),
            &entry.strip_params,
        );

        let url = format!(
            "{}{}",
            entry.proxy_url.as_str().trim_end_matches('/'),
            upstream_path
        );
        let outbound_headers = copy_headers(inbound_headers);

        let mut request = self.http.post(&url).headers(outbound_headers).body(rewritten);
        if let Some(timeout) = ctx.timeout {
            request = request.timeout(timeout);
        }

        let response = tokio::select! {
            result = request.send() => result.map_err(classify_send_error)?,
            _ = ctx.cancel.cancelled() => return Err(Error::ClientCancelled),
        };

        if response.status().is_server_error() {
            return Err(Error::Upstream5xx(response.status().as_u16()));
        }

        let status = response.status();
        let response_headers = response.headers().clone();
        let is_sse = parsed.requested_stream || content_type_is_event_stream(&response_headers);

        let continue_rx = self.coordinator.continue_rx(&canonical).await;
        let stream = stream_response(response, ctx.clone(), continue_rx, is_sse, handle);

        Ok(ForwardResponse {
            status,
            headers: response_headers,
            body: Box::pin(stream),
        })
    }

    async fn resolve_default(&self, requested: Option<String>) -> Result<String, Error> {
        if let Some(name) = requested {
            return Ok(name);
        }
        match &self.default_model_policy {
            DefaultModelPolicy::Named(name) => Ok(name.clone()),
            DefaultModelPolicy::FirstReady => self
                .coordinator
                .first_ready()
                .await
                .map(|c| c.as_str().to_string())
                .ok_or_else(|| Error::InvalidInput("no model specified and none are ready".to_string())),
            DefaultModelPolicy::Error => Err(Error::InvalidInput("request did not specify a model".to_string())),
        }
    }
}

fn copy_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::new();
    for (name, value) in inbound {
        if HOP_BY_HOP.contains(&name.as_str()) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

fn content_type_is_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/event-stream"))
}

fn classify_send_error(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::Timeout
    } else if err.is_connect() || err.is_request() {
        Error::UpstreamClosed
    } else {
        Error::UpstreamClosed
    }
}

/// Adapts the upstream byte stream: stops early on client cancellation or
/// the supervisor's abort latch, and appends the SSE `[DONE]` sentinel on
/// clean completion only (spec §4.5 step 6, §9 open question).
fn stream_response(
    response: reqwest::Response,
    ctx: RequestContext,
    continue_rx: Option<tokio::sync::watch::Receiver<bool>>,
    is_sse: bool,
    handle: modelgate_process::ReadyHandle,
) -> impl Stream<Item = Result<Bytes, Error>> {
    enum State {
        Streaming(reqwest::Response),
        Sentinel,
        Done,
    }

    // `handle` rides along in the unfold state purely to stay alive (and
    // so keep the in-flight count up) for as long as the stream is
    // polled; it is dropped, decrementing the count, once the stream
    // itself is dropped or exhausted.
    let seed = (State::Streaming(response), ctx, continue_rx, handle);

    futures::stream::unfold(seed, move |(state, ctx, continue_rx, handle)| async move {
        match state {
            State::Done => None,
            State::Sentinel => Some((
                Ok(Bytes::from_static(b"data: [DONE]\n\n")),
                (State::Done, ctx, continue_rx, handle),
            )),
            State::Streaming(mut response) => {
                if ctx.is_cancelled() {
                    return Some((Err(Error::ClientCancelled), (State::Done, ctx, continue_rx, handle)));
                }
                if let Some(rx) = &continue_rx {
                    if !*rx.borrow() {
                        return Some((Err(Error::ClientCancelled), (State::Done, ctx, continue_rx, handle)));
                    }
                }

                let outcome = tokio::select! {
                    chunk = response.chunk() => chunk,
                    _ = ctx.cancel.cancelled() => {
                        return Some((Err(Error::ClientCancelled), (State::Done, ctx, continue_rx, handle)));
                    }
                };

                match outcome {
                    Ok(Some(bytes)) => Some((Ok(bytes), (State::Streaming(response), ctx, continue_rx, handle))),
                    Ok(None) if is_sse => Some((
                        Ok(Bytes::new()),
                        (State::Sentinel, ctx, continue_rx, handle),
                    )),
                    Ok(None) => None,
                    Err(err) => Some((Err(classify_send_error(err)), (State::Done, ctx, continue_rx, handle))),
                }
            }
        }
    })
    .filter(|item| {
        // The zero-length marker chunk above exists only to drive the
        // state machine into `Sentinel`; never surface it to the caller.
        let keep = !matches!(item, Ok(bytes) if bytes.is_empty());
        std::future::ready(keep)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelgate_coordinator::Coordinator;
    use modelgate_events::Bus;
    use modelgate_process::SupervisorConfig;
    use modelgate_types::{Catalog, CatalogVersion, GroupId, ModelEntry};
    use std::collections::BTreeMap;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn entry(canonical: &str, proxy_url: &str, use_upstream_name: Option<&str>) -> ModelEntry {
        ModelEntry {
            canonical: modelgate_types::CanonicalName::new(canonical),
            aliases: vec![],
            group: GroupId::default_group(),
            command: vec!["sh".into(), "-c".into(), "sleep 5".into()],
            stop_command: None,
            proxy_url: proxy_url.parse().unwrap(),
            health_path: "/health".into(),
            port: 0,
            env: BTreeMap::new(),
            idle_ttl: std::time::Duration::from_secs(0),
            unlisted: false,
            concurrency_limit: 0,
            use_upstream_name: use_upstream_name.map(str::to_string),
            send_loading_state: None,
            strip_params: vec![],
            name: None,
            description: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Spec §8 scenario 6: forward + rewrite. `use_upstream_name` rewrites
    /// the `model` field; every other byte of the request is preserved,
    /// and a clean (non-SSE) completion streams the upstream body as-is.
    #[tokio::test]
    async fn forward_rewrites_model_and_preserves_the_rest_of_the_body() {
        let upstream = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&upstream)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_json(serde_json::json!({
                "model": "qwen-7b",
                "prompt": "hi",
                "stream": true
            })))
            .respond_with(ResponseTemplate::new(200).set_body_raw("hello", "text/event-stream"))
            .mount(&upstream)
            .await;

        let mut models = BTreeMap::new();
        models.insert(
            modelgate_types::CanonicalName::new("M"),
            entry("M", &upstream.uri(), Some("qwen-7b")),
        );
        let catalog = Catalog::new(CatalogVersion::default(), models, BTreeMap::new());
        let coordinator = Arc::new(Coordinator::new(catalog, Bus::new(16), SupervisorConfig::default()));
        let forwarder = Forwarder::new(coordinator, DefaultModelPolicy::Error);

        let ctx = RequestContext::new("test".to_string(), None);
        let body = Bytes::from(r#"{"model":"M","prompt":"hi","stream":true}"#);
        let response = forwarder
            .forward("/v1/chat/completions", body, &HeaderMap::new(), &ctx)
            .await
            .expect("forward succeeds");

        assert_eq!(response.status, StatusCode::OK);
        let chunks: Vec<Bytes> = response.body.map(|c| c.unwrap()).collect().await;
        let joined: Vec<u8> = chunks.iter().flat_map(|c| c.to_vec()).collect();
        assert!(joined.ends_with(b"data: [DONE]\n\n"));
        assert!(joined.starts_with(b"hello"));
    }

    #[tokio::test]
    async fn missing_model_with_error_policy_is_invalid_input() {
        let mut models = BTreeMap::new();
        models.insert(
            modelgate_types::CanonicalName::new("M"),
            entry("M", "http://127.0.0.1:1", None),
        );
        let catalog = Catalog::new(CatalogVersion::default(), models, BTreeMap::new());
        let coordinator = Arc::new(Coordinator::new(catalog, Bus::new(16), SupervisorConfig::default()));
        let forwarder = Forwarder::new(coordinator, DefaultModelPolicy::Error);

        let ctx = RequestContext::new("test".to_string(), None);
        let body = Bytes::from(r#"{"prompt":"hi"}"#);
        let err = forwarder
            .forward("/v1/chat/completions", body, &HeaderMap::new(), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
