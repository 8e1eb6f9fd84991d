/// Outbound plugin calls for `plugin-action` nodes
///
/// Every call goes to `METHOD {base_url}/plugins/{plugin}{action}` through one
/// shared `reqwest::Client` with a per-call timeout. Parameters arrive already
/// resolved against the run's `VariableContext`.

use crate::config::DispatchConfig;
use crate::error::DispatchError;
use anyhow::Result;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Methods a plugin action may use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl FromStr for HttpMethod {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "DELETE" => Ok(HttpMethod::Delete),
            _ => Err(DispatchError::UnsupportedMethod(s.to_string())),
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        })
    }
}

/// Decoded plugin response
#[derive(Debug, Clone)]
pub struct DispatchResponse {
    pub status: u16,
    pub body: Value,
}

#[derive(Debug, Clone)]
pub struct ActionDispatcher {
    client: reqwest::Client,
    base_url: String,
    timeout_secs: u64,
}

impl ActionDispatcher {
    pub fn new(config: &DispatchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout_secs: config.timeout_secs,
        })
    }

    pub fn action_url(&self, plugin: &str, action: &str) -> String {
        format!("{}/plugins/{}{}", self.base_url, plugin, action)
    }

    /// Call a plugin action
    ///
    /// The method is checked before any network traffic. GET sends `params`
    /// as query pairs, POST and PUT as a JSON body, DELETE sends nothing.
    pub async fn dispatch(
        &self,
        plugin: &str,
        action: &str,
        method: &str,
        params: &Value,
    ) -> Result<DispatchResponse, DispatchError> {
        let method: HttpMethod = method.parse()?;
        let url = self.action_url(plugin, action);

        tracing::debug!("🌍 Plugin request: {} {}", method, url);

        let request = match method {
            HttpMethod::Get => self.client.get(&url).query(&query_pairs(params)?),
            HttpMethod::Post => self.client.post(&url).json(params),
            HttpMethod::Put => self.client.put(&url).json(params),
            HttpMethod::Delete => self.client.delete(&url),
        };

        let response = request.send().await.map_err(|e| self.request_error(&url, e))?;
        let status = response.status();
        let text = response.text().await.map_err(|e| self.request_error(&url, e))?;

        if !status.is_success() {
            return Err(DispatchError::Status {
                url,
                status: status.as_u16(),
                body: text,
            });
        }

        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).map_err(|e| DispatchError::Decode {
                url: url.clone(),
                reason: e.to_string(),
            })?
        };

        Ok(DispatchResponse {
            status: status.as_u16(),
            body,
        })
    }

    fn request_error(&self, url: &str, error: reqwest::Error) -> DispatchError {
        if error.is_timeout() {
            DispatchError::Timeout {
                url: url.to_string(),
                timeout_secs: self.timeout_secs,
            }
        } else {
            DispatchError::Request {
                url: url.to_string(),
                source: error,
            }
        }
    }
}

/// GET parameters: an object (or null) rendered to string pairs
fn query_pairs(params: &Value) -> Result<Vec<(String, String)>, DispatchError> {
    match params {
        Value::Null => Ok(Vec::new()),
        Value::Object(map) => Ok(map
            .iter()
            .map(|(key, value)| {
                let rendered = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (key.clone(), rendered)
            })
            .collect()),
        other => Err(DispatchError::InvalidParameters(format!(
            "GET parameters must be an object, got {}",
            other
        ))),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! In-process stand-in for the plugin host

    use axum::{
        extract::{Json, Query},
        http::StatusCode,
        routing::get,
        Router,
    };
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::time::Duration;

    /// Serve the echo plugin on an ephemeral port and return its base URL
    pub async fn spawn_plugin_server() -> String {
        let app = Router::new()
            .route(
                "/plugins/echo/ping",
                get(|Query(query): Query<HashMap<String, String>>| async move {
                    Json(json!({"pong": true, "count": 5, "query": query}))
                }),
            )
            .route(
                "/plugins/echo/echo",
                axum::routing::post(|Json(body): Json<Value>| async move { Json(json!({"echo": body})) })
                    .put(|Json(body): Json<Value>| async move { Json(json!({"echo": body, "updated": true})) }),
            )
            .route(
                "/plugins/echo/item",
                axum::routing::delete(|| async { Json(json!({"deleted": true})) }),
            )
            .route(
                "/plugins/echo/low",
                get(|| async { Json(json!({"count": 2})) }),
            )
            .route(
                "/plugins/echo/fail",
                get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "plugin exploded") }),
            )
            .route(
                "/plugins/echo/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(3)).await;
                    Json(json!({"late": true}))
                }),
            )
            .route("/plugins/echo/text", get(|| async { "not json" }))
            .route("/plugins/echo/empty", get(|| async { StatusCode::NO_CONTENT }));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind plugin server");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });
        format!("http://{}", addr)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::spawn_plugin_server;
    use super::*;
    use serde_json::json;

    fn dispatcher(base_url: &str, timeout_secs: u64) -> ActionDispatcher {
        ActionDispatcher::new(&DispatchConfig {
            base_url: base_url.to_string(),
            timeout_secs,
        })
        .unwrap()
    }

    #[test]
    fn test_action_url_joins_plugin_and_action() {
        let d = dispatcher("http://localhost:8000/", 5);
        assert_eq!(d.action_url("jira", "/issues"), "http://localhost:8000/plugins/jira/issues");
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!("get".parse::<HttpMethod>().unwrap(), HttpMethod::Get);
        assert_eq!("Delete".parse::<HttpMethod>().unwrap(), HttpMethod::Delete);
        assert!(matches!("PATCH".parse::<HttpMethod>(), Err(DispatchError::UnsupportedMethod(_))));
    }

    #[tokio::test]
    async fn test_unsupported_method_fails_before_network() {
        // nothing listens on port 9; an attempted call would be a Request error
        let d = dispatcher("http://127.0.0.1:9", 1);
        let err = d.dispatch("echo", "/ping", "PATCH", &json!({})).await.unwrap_err();
        assert!(matches!(err, DispatchError::UnsupportedMethod(_)));
    }

    #[tokio::test]
    async fn test_get_sends_query_params() {
        let base = spawn_plugin_server().await;
        let d = dispatcher(&base, 5);
        let response = d
            .dispatch("echo", "/ping", "GET", &json!({"q": "rust", "n": 2}))
            .await
            .unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body["pong"], json!(true));
        assert_eq!(response.body["query"], json!({"q": "rust", "n": "2"}));
    }

    #[tokio::test]
    async fn test_post_put_and_delete() {
        let base = spawn_plugin_server().await;
        let d = dispatcher(&base, 5);

        let posted = d.dispatch("echo", "/echo", "POST", &json!({"to": "ada"})).await.unwrap();
        assert_eq!(posted.body, json!({"echo": {"to": "ada"}}));

        let put = d.dispatch("echo", "/echo", "put", &json!([1, 2])).await.unwrap();
        assert_eq!(put.body, json!({"echo": [1, 2], "updated": true}));

        let deleted = d.dispatch("echo", "/item", "DELETE", &json!({"ignored": true})).await.unwrap();
        assert_eq!(deleted.body, json!({"deleted": true}));
    }

    #[tokio::test]
    async fn test_non_success_carries_body() {
        let base = spawn_plugin_server().await;
        let err = dispatcher(&base, 5)
            .dispatch("echo", "/fail", "GET", &json!({}))
            .await
            .unwrap_err();
        match err {
            DispatchError::Status { status, body, .. } => {
                assert_eq!(status, 500);
                assert_eq!(body, "plugin exploded");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_timeout_is_reported() {
        let base = spawn_plugin_server().await;
        let err = dispatcher(&base, 1)
            .dispatch("echo", "/slow", "GET", &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Timeout { timeout_secs: 1, .. }), "{:?}", err);
    }

    #[tokio::test]
    async fn test_body_decoding() {
        let base = spawn_plugin_server().await;
        let d = dispatcher(&base, 5);

        let empty = d.dispatch("echo", "/empty", "GET", &json!({})).await.unwrap();
        assert_eq!(empty.body, Value::Null);

        let err = d.dispatch("echo", "/text", "GET", &json!({})).await.unwrap_err();
        assert!(matches!(err, DispatchError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_get_rejects_non_object_params() {
        let base = spawn_plugin_server().await;
        let err = dispatcher(&base, 5)
            .dispatch("echo", "/ping", "GET", &json!([1, 2]))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidParameters(_)));
    }
}
