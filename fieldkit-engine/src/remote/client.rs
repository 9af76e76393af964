//! JSON-RPC 2.0 client for the remote validation service
//!
//! Every request carries the session token in `X-Transaction-Id`. When the
//! service answers with the configured stale-session error code, a fresh
//! token is generated and the call fails with [`Error::SessionExpired`]; the
//! caller decides whether to try again.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use fieldkit_common::config::RemoteConfig;
use fieldkit_common::{Error, Result};

use super::mapping;
use super::{CheckResponse, Params, Prediction, PredictionKind, RemoteService};
use crate::lock;

const JSONRPC_VERSION: &str = "2.0";

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    #[serde(default)]
    message: String,
}

/// reqwest-backed [`RemoteService`]
pub struct JsonRpcClient {
    http_client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    agent: String,
    session_expired_code: i64,
    session: Mutex<Uuid>,
    ids: Mutex<HashMap<String, u64>>,
}

impl JsonRpcClient {
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| Error::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            agent: config.agent.clone(),
            session_expired_code: config.session_expired_code,
            session: Mutex::new(Uuid::new_v4()),
            ids: Mutex::new(HashMap::new()),
        })
    }

    /// Current session token
    pub fn session_token(&self) -> Uuid {
        *lock(&self.session)
    }

    fn regenerate_session(&self) -> Uuid {
        let mut session = lock(&self.session);
        *session = Uuid::new_v4();
        *session
    }

    /// Next request id for a method family (starts at 1)
    fn next_id(&self, method: &str) -> u64 {
        let mut ids = lock(&self.ids);
        let id = ids.entry(method.to_string()).or_insert(0);
        *id += 1;
        *id
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let request = RpcRequest {
            jsonrpc: JSONRPC_VERSION,
            id: self.next_id(method),
            method,
            params,
        };
        let session = self.session_token();

        debug!(method, id = request.id, "Sending JSON-RPC request");

        let mut builder = self
            .http_client
            .post(&self.endpoint)
            .header("X-Agent", &self.agent)
            .header("X-Transaction-Id", session.to_string())
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.header("X-Auth-Key", key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout(format!("{} request", method))
            } else {
                Error::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Network(format!("HTTP {} from {}", status, method)));
        }

        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| Error::Network(format!("Malformed response: {}", e)))?;

        self.response_result(method, body)
    }

    fn response_result(&self, method: &str, body: RpcResponse) -> Result<Value> {
        if let Some(error) = body.error {
            if error.code == self.session_expired_code {
                let session = self.regenerate_session();
                info!(method, %session, "Session expired, issued new session token");
                return Err(Error::SessionExpired);
            }
            warn!(method, code = error.code, message = %error.message, "Remote error");
            return Err(Error::Remote {
                code: error.code,
                message: error.message,
            });
        }
        Ok(body.result.unwrap_or(Value::Null))
    }
}

#[async_trait]
impl RemoteService for JsonRpcClient {
    async fn predict(&self, kind: PredictionKind, params: &Params) -> Result<Vec<Prediction>> {
        let result = self.call(kind.method(), mapping::params_to_wire(params)).await?;
        Ok(mapping::predictions_from_wire(result.get("predictions")))
    }

    async fn check_address(&self, params: &Params) -> Result<CheckResponse> {
        let result = self
            .call("addressCheck", mapping::params_to_wire(params))
            .await?;
        Ok(CheckResponse {
            status: mapping::status_from_wire(result.get("status")),
            predictions: mapping::predictions_from_wire(result.get("predictions")),
        })
    }

    async fn check_email(&self, email: &str) -> Result<Vec<String>> {
        let result = self.call("emailCheck", json!({ "email": email })).await?;
        Ok(mapping::status_from_wire(result.get("status")))
    }
}
