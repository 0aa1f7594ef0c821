//! HTTP request executor
//!
//! Issues one request and exposes status, headers and the parsed body as
//! outputs. A non-2xx status is data, not a failure, unless `throwOnError`
//! is configured.

use crate::error::{EngineError, Result};
use crate::executor::{ActivitySink, ExecOutcome, ExecRequest, NodeExecutor};
use async_trait::async_trait;
use foundry_graph::{render_template, NodeKind};
use reqwest::{Client, Method};
use serde_json::{json, Map, Value};
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub struct HttpExecutor {
    client: Client,
}

impl HttpExecutor {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

impl Default for HttpExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NodeExecutor for HttpExecutor {
    fn kind(&self) -> NodeKind {
        NodeKind::Http
    }

    async fn execute(&self, request: &ExecRequest, activity: &ActivitySink) -> Result<ExecOutcome> {
        let url = match request.input_str("url") {
            Some(url) => url.to_string(),
            None => {
                let template = request.config_str("url").ok_or_else(|| {
                    EngineError::PortUnresolved {
                        node: request.node.id.clone(),
                        port: "url".to_string(),
                    }
                })?;
                render_template(template, &request.scope)?
            }
        };

        let method = request.config_str("method").unwrap_or("GET");
        let method = Method::from_str(&method.to_uppercase())
            .map_err(|_| EngineError::Internal(format!("invalid HTTP method '{method}'")))?;

        let timeout_secs = request.config_u64("timeoutSecs").unwrap_or(DEFAULT_TIMEOUT_SECS);
        let throw_on_error = request.config_bool("throwOnError");

        let mut builder = self
            .client
            .request(method.clone(), &url)
            .timeout(Duration::from_secs(timeout_secs));

        if let Some(headers) = request.node.config.get("headers").and_then(Value::as_object) {
            for (name, value) in headers {
                if let Some(v) = value.as_str() {
                    builder = builder.header(name, v);
                }
            }
        }

        let body = request
            .input("body")
            .cloned()
            .or_else(|| request.node.config.get("body").cloned());
        if let Some(body) = body {
            builder = builder.json(&body);
        }

        activity.emit("http-request", json!({"method": method.as_str(), "url": url}));

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                EngineError::Provider(format!("request to {url} timed out after {timeout_secs}s"))
            } else {
                EngineError::Provider(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let mut headers = Map::new();
        for (name, value) in response.headers() {
            if let Ok(v) = value.to_str() {
                headers.insert(name.to_string(), json!(v));
            }
        }

        let text = response
            .text()
            .await
            .map_err(|e| EngineError::Provider(e.to_string()))?;
        let body: Value = serde_json::from_str(&text).unwrap_or(Value::String(text));

        activity.emit("http-response", json!({"status": status}));

        if throw_on_error && !(200..300).contains(&status) {
            return Err(EngineError::Provider(format!(
                "request to {url} returned status {status}"
            )));
        }

        Ok(ExecOutcome::new()
            .with_output("status", json!(status))
            .with_output("headers", Value::Object(headers))
            .with_output("body", body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventBus;
    use foundry_graph::PlanNode;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn request(config: Value, inputs: Value) -> ExecRequest {
        ExecRequest {
            execution_id: "exec".into(),
            node: PlanNode {
                id: "http".into(),
                kind: NodeKind::Http,
                config,
            },
            inputs: inputs.as_object().cloned().unwrap_or_default(),
            scope: json!({}),
            env: HashMap::new(),
        }
    }

    fn sink() -> ActivitySink {
        ActivitySink::new(Arc::new(EventBus::new()), "exec", "http")
    }

    #[tokio::test]
    async fn test_http_missing_url_is_port_unresolved() {
        let executor = HttpExecutor::new();
        let req = request(json!({}), json!({}));
        let err = executor.execute(&req, &sink()).await.unwrap_err();
        assert_eq!(err.kind(), "PortUnresolved");
    }

    #[tokio::test]
    async fn test_http_invalid_method_is_internal() {
        let executor = HttpExecutor::new();
        let req = request(
            json!({"url": "http://localhost:1", "method": "NOT A METHOD"}),
            json!({}),
        );
        let err = executor.execute(&req, &sink()).await.unwrap_err();
        assert_eq!(err.kind(), "InternalError");
    }

    #[tokio::test]
    async fn test_http_connection_failure_is_provider_error() {
        let executor = HttpExecutor::new();
        // nothing listens on this port
        let req = request(json!({"url": "http://127.0.0.1:9", "timeoutSecs": 2}), json!({}));
        let err = executor.execute(&req, &sink()).await.unwrap_err();
        assert_eq!(err.kind(), "ProviderError");
    }
}
