//! JSON-RPC Transport
//!
//! Both the wallet and the daemon speak JSON-RPC 2.0 over HTTP POST to
//! `/json_rpc`. The daemon additionally exposes "other" endpoints (such as
//! `/get_transactions`) that take the params object as the whole body.
//!
//! A wallet started with `--rpc-login` answers with an HTTP digest
//! challenge; the request is then repeated with the computed
//! `Authorization` header.

use digest_auth::AuthContext;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, WWW_AUTHENTICATE};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::time::Duration;

/// Wallet operations over large histories are slow
pub const RPC_TIMEOUT: Duration = Duration::from_secs(300);

/// Uniform RPC failure
///
/// Callers treat every variant the same way; the variants exist so the
/// log line says what actually went wrong.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("HTTP request failed: {0}")]
    Transport(String),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("RPC error {code}: {message}")]
    Remote { code: i64, message: String },

    #[error("Undecodable response: {0}")]
    Decode(String),

    #[error("Authentication failed: {0}")]
    Auth(String),
}

impl From<reqwest::Error> for RpcError {
    fn from(e: reqwest::Error) -> Self {
        RpcError::Transport(e.to_string())
    }
}

/// Which service a client talks to; selects the log target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcService {
    Wallet,
    Daemon,
}

/// JSON-RPC HTTP client
#[derive(Debug, Clone)]
pub struct JsonRpcClient {
    client: Client,
    base_url: String,
    credentials: Option<(String, String)>,
    service: RpcService,
}

impl JsonRpcClient {
    pub fn new(base_url: &str, service: RpcService) -> Result<Self, RpcError> {
        let client = Client::builder().timeout(RPC_TIMEOUT).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials: None,
            service,
        })
    }

    /// Answer HTTP digest challenges with these credentials
    pub fn with_credentials(mut self, username: String, password: String) -> Self {
        self.credentials = Some((username, password));
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Call a `/json_rpc` method and decode its `result`
    pub async fn call<R: DeserializeOwned>(&self, method: &str, params: Option<Value>) -> Result<R, RpcError> {
        let mut request = json!({
            "jsonrpc": "2.0",
            "id": "0",
            "method": method,
        });
        if let Some(params) = params {
            request["params"] = params;
        }

        let mut body = self.post("json_rpc", &request).await?;
        let result = body
            .get_mut("result")
            .map(Value::take)
            .ok_or_else(|| RpcError::Decode(format!("{}: missing result", method)))?;

        serde_json::from_value(result).map_err(|e| RpcError::Decode(format!("{}: {}", method, e)))
    }

    /// Call a non-JSON-RPC endpoint whose body is the params object itself
    pub async fn call_other<R: DeserializeOwned>(&self, path: &str, params: &Value) -> Result<R, RpcError> {
        let body = self.post(path, params).await?;
        serde_json::from_value(body).map_err(|e| RpcError::Decode(format!("{}: {}", path, e)))
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, RpcError> {
        let url = format!("{}/{}", self.base_url, path);
        let payload = serde_json::to_vec(body).map_err(|e| RpcError::Decode(e.to_string()))?;
        self.log_exchange("req", body);

        let request = || {
            self.client
                .post(&url)
                .header(CONTENT_TYPE, "application/json")
                .body(payload.clone())
        };

        let mut resp = self.send(request()).await?;

        if resp.status() == StatusCode::UNAUTHORIZED {
            if let Some((username, password)) = &self.credentials {
                let uri = format!("/{}", path);
                let authorization = match answer_challenge(&resp, username, password, &uri, &payload) {
                    Ok(authorization) => authorization,
                    Err(e) => return Err(self.fail(e)),
                };
                resp = self.send(request().header(AUTHORIZATION, authorization)).await?;
            }
        }

        if !resp.status().is_success() {
            return Err(self.fail(RpcError::Status(resp.status().as_u16())));
        }

        let text = match resp.text().await {
            Ok(text) => text,
            Err(e) => return Err(self.fail(e.into())),
        };

        match parse_response(&text) {
            Ok(value) => {
                self.log_exchange("res", &value);
                Ok(value)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, RpcError> {
        request.send().await.map_err(|e| self.fail(e.into()))
    }

    fn log_exchange(&self, direction: &str, body: &Value) {
        match self.service {
            RpcService::Wallet => tracing::debug!(target: "payoutd::wallet_rpc", direction, %body),
            RpcService::Daemon => tracing::debug!(target: "payoutd::daemon_rpc", direction, %body),
        }
    }

    fn fail(&self, error: RpcError) -> RpcError {
        match self.service {
            RpcService::Wallet => tracing::error!(target: "payoutd::wallet_rpc", %error, "wallet rpc failed"),
            RpcService::Daemon => tracing::error!(target: "payoutd::daemon_rpc", %error, "daemon rpc failed"),
        }
        error
    }
}

/// Authorization header answering the first usable digest challenge of a 401
fn answer_challenge(resp: &Response, username: &str, password: &str, uri: &str, body: &[u8]) -> Result<String, RpcError> {
    let challenges: Vec<&str> = resp
        .headers()
        .get_all(WWW_AUTHENTICATE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .collect();

    if challenges.is_empty() {
        return Err(RpcError::Auth("401 without a WWW-Authenticate challenge".to_string()));
    }

    let mut last_error = None;
    for challenge in challenges {
        match digest_authorization(challenge, username, password, uri, body) {
            Ok(authorization) => return Ok(authorization),
            Err(e) => last_error = Some(e),
        }
    }

    Err(last_error.unwrap_or_else(|| RpcError::Auth("no usable challenge".to_string())))
}

/// Digest `Authorization` header value for a POST to `uri`
pub fn digest_authorization(
    challenge: &str,
    username: &str,
    password: &str,
    uri: &str,
    body: &[u8],
) -> Result<String, RpcError> {
    let mut prompt = digest_auth::parse(challenge).map_err(|e| RpcError::Auth(e.to_string()))?;
    let context = AuthContext::new_post(username, password, uri, Some(body));
    let answer = prompt.respond(&context).map_err(|e| RpcError::Auth(e.to_string()))?;
    Ok(answer.to_header_string())
}

/// Decode a response body, turning an embedded `error` object into an error
pub fn parse_response(text: &str) -> Result<Value, RpcError> {
    let value: Value = serde_json::from_str(text).map_err(|e| RpcError::Decode(e.to_string()))?;

    if let Some(error) = value.get("error") {
        if !error.is_null() {
            return Err(RpcError::Remote {
                code: error.get("code").and_then(Value::as_i64).unwrap_or(0),
                message: error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string(),
            });
        }
    }

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_result() {
        let value = parse_response(r#"{"id":"0","jsonrpc":"2.0","result":{"height":42}}"#).unwrap();
        assert_eq!(value["result"]["height"], 42);
    }

    #[test]
    fn test_parse_embedded_error() {
        let err = parse_response(
            r#"{"id":"0","jsonrpc":"2.0","error":{"code":-4,"message":"not enough money"}}"#,
        )
        .unwrap_err();

        match err {
            RpcError::Remote { code, message } => {
                assert_eq!(code, -4);
                assert_eq!(message, "not enough money");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parse_garbage() {
        assert!(matches!(parse_response("<html>"), Err(RpcError::Decode(_))));
    }

    #[test]
    fn test_digest_authorization_without_qop() {
        let header = digest_authorization(
            r#"Digest realm="monero-rpc", nonce="dcd98b7102dd2f0e8b11d0f600bfb0c093", algorithm=MD5"#,
            "payout",
            "hunter2",
            "/json_rpc",
            b"{}",
        )
        .unwrap();

        assert!(header.starts_with("Digest "));
        assert!(header.contains(r#"username="payout""#));
        assert!(header.contains(r#"realm="monero-rpc""#));
        assert!(header.contains(r#"uri="/json_rpc""#));
        // MD5(MD5(user:realm:pass):nonce:MD5(POST:uri))
        assert!(header.contains(r#"response="e581368de8c2debee1e08e2e01914b07""#));
    }

    #[test]
    fn test_digest_authorization_with_qop() {
        let header = digest_authorization(
            r#"Digest qop="auth",algorithm=MD5,realm="monero-rpc",nonce="q8DYbHFfSgJ3UEy8Un3BPw==",stale=false"#,
            "payout",
            "hunter2",
            "/json_rpc",
            b"{}",
        )
        .unwrap();

        assert!(header.contains("qop=auth"));
        assert!(header.contains("nc=00000001"));
        assert!(header.contains("cnonce="));
    }

    #[test]
    fn test_digest_authorization_rejects_basic_challenge() {
        let result = digest_authorization(r#"Basic realm="wallet""#, "payout", "hunter2", "/json_rpc", b"{}");
        assert!(matches!(result, Err(RpcError::Auth(_))));
    }

    #[test]
    fn test_base_url_trimmed() {
        let client = JsonRpcClient::new("http://127.0.0.1:18082/", RpcService::Wallet).unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:18082");
    }

    #[tokio::test]
    async fn test_unreachable_host_is_rpc_error() {
        let client = JsonRpcClient::new("http://127.0.0.1:1", RpcService::Daemon).unwrap();
        let result: Result<Value, _> = client.call("get_info", None).await;
        assert!(matches!(result, Err(RpcError::Transport(_))));
    }
}
