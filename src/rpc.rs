use std::collections::{HashMap, HashSet};
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::scan_stats::SCAN_STATS;

#[derive(thiserror::Error, Debug)]
pub enum RpcError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("RPC endpoint answered with HTTP {0}")]
    Status(reqwest::StatusCode),
    #[error("malformed RPC response: {0}")]
    Protocol(String),
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("batch failed after {attempts} attempts: {last}")]
    BatchExhausted { attempts: u32, last: Box<RpcError> },
}

impl RpcError {
    /// Failures worth resending the whole request for. An error object from
    /// the node is an answer, not a delivery problem.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RpcError::Transport(_) | RpcError::Status(_) | RpcError::Protocol(_)
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RpcCall {
    jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    pub params: Value,
}

impl RpcCall {
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: method.into(),
            params,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    id: Value,
    #[serde(default, deserialize_with = "present")]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

fn present<'de, D: serde::Deserializer<'de>>(d: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(d).map(Some)
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

impl RpcResponse {
    fn into_result(self) -> Result<Value, RpcError> {
        if let Some(err) = self.error {
            return Err(RpcError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        // `"result": null` is a valid answer (e.g. unknown block), only a
        // missing member is malformed.
        self.result
            .ok_or_else(|| RpcError::Protocol("response has neither result nor error".into()))
    }

    fn correlation_id(&self) -> Option<u64> {
        match &self.id {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    /// Extra random delay, as a fraction of the computed backoff.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            multiplier: 1.0,
            max_delay: delay,
            jitter: 0.0,
        }
    }

    /// Backoff before the retry that follows failed attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(32) as i32;
        let backoff = self.base_delay.as_secs_f64() * self.multiplier.max(1.0).powi(exp);
        let capped = backoff.min(self.max_delay.as_secs_f64()).max(0.0);
        let extra = if self.jitter.is_finite() && self.jitter > 0.0 {
            rand::thread_rng().gen_range(0.0..=self.jitter.min(1.0)) * capped
        } else {
            0.0
        };
        Duration::from_secs_f64(capped + extra)
    }
}

#[derive(Clone)]
pub struct RpcClient {
    http: reqwest::Client,
    url: Url,
    retry: RetryPolicy,
}

impl RpcClient {
    pub fn new(url: Url, timeout: Duration, retry: RetryPolicy) -> Result<Self, RpcError> {
        let http = reqwest::Client::builder()
            .no_proxy()
            .timeout(timeout)
            .build()?;
        Ok(Self { http, url, retry })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Sends one request, once.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let body = RpcCall::new(1, method, params);
        let response: RpcResponse = self.post(&body).await?;
        response.into_result()
    }

    /// Sends all calls as one batch request and returns their results in call
    /// order, matched by id. Delivery failures resend the whole batch.
    pub async fn call_batch(
        &self,
        calls: &[RpcCall],
    ) -> Result<Vec<Result<Value, RpcError>>, RpcError> {
        if calls.is_empty() {
            return Ok(Vec::new());
        }
        let mut seen = HashSet::with_capacity(calls.len());
        if let Some(dup) = calls.iter().find(|c| !seen.insert(c.id)) {
            return Err(RpcError::Protocol(format!(
                "duplicate correlation id {} in batch",
                dup.id
            )));
        }

        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.send_batch_once(calls).await {
                Ok(results) => return Ok(results),
                Err(err) if err.is_retryable() => {
                    if attempt >= max_attempts {
                        tracing::error!(attempts = attempt, "RPC batch exhausted retries: {}", err);
                        return Err(RpcError::BatchExhausted {
                            attempts: attempt,
                            last: Box::new(err),
                        });
                    }
                    let delay = self.retry.delay_for(attempt);
                    tracing::warn!(
                        attempt,
                        max_attempts,
                        calls = calls.len(),
                        "RPC batch failed, retrying in {:?}: {}",
                        delay,
                        err
                    );
                    SCAN_STATS.inc_batch_retries(1);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn send_batch_once(
        &self,
        calls: &[RpcCall],
    ) -> Result<Vec<Result<Value, RpcError>>, RpcError> {
        let body: Value = self.post(calls).await?;
        let responses: Vec<RpcResponse> = match body {
            Value::Array(entries) => entries
                .into_iter()
                .map(serde_json::from_value)
                .collect::<Result<_, _>>()
                .map_err(|e| RpcError::Protocol(e.to_string()))?,
            // Nodes reject a whole batch (too large, rate limited) with one
            // error object instead of an array.
            Value::Object(fields) if fields.contains_key("error") => {
                let response: RpcResponse = serde_json::from_value(Value::Object(fields))
                    .map_err(|e| RpcError::Protocol(e.to_string()))?;
                return Err(response.into_result().err().unwrap_or_else(|| {
                    RpcError::Protocol("batch answered with a single response".into())
                }));
            }
            other => {
                return Err(RpcError::Protocol(format!(
                    "batch answer is not an array: {}",
                    other
                )))
            }
        };
        let mut by_id: HashMap<u64, RpcResponse> = responses
            .into_iter()
            .filter_map(|r| r.correlation_id().map(|id| (id, r)))
            .collect();

        // A lost answer fails the envelope, so the whole batch is resent.
        calls
            .iter()
            .map(|call| {
                by_id
                    .remove(&call.id)
                    .map(RpcResponse::into_result)
                    .ok_or_else(|| {
                        RpcError::Protocol(format!("no response for call id {}", call.id))
                    })
            })
            .collect()
    }

    async fn post<B, R>(&self, body: &B) -> Result<R, RpcError>
    where
        B: Serialize + ?Sized,
        R: for<'de> Deserialize<'de>,
    {
        let response = self.http.post(self.url.clone()).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RpcError::Status(status));
        }
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| RpcError::Protocol(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fixed_policy_has_constant_delay() {
        let policy = RetryPolicy::fixed(3, Duration::from_secs(2));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
    }

    #[test]
    fn exponential_policy_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            multiplier: 2.0,
            max_delay: Duration::from_millis(500),
            jitter: 0.0,
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for(4), Duration::from_millis(500));
        assert_eq!(policy.delay_for(9), Duration::from_millis(500));
    }

    #[test]
    fn jitter_stays_within_ratio() {
        let policy = RetryPolicy {
            jitter: 0.5,
            ..RetryPolicy::fixed(3, Duration::from_millis(1000))
        };
        for _ in 0..100 {
            let delay = policy.delay_for(1);
            assert!(delay >= Duration::from_millis(1000));
            assert!(delay <= Duration::from_millis(1500));
        }
    }

    #[test]
    fn out_of_range_jitter_does_not_panic() {
        let policy = RetryPolicy {
            jitter: f64::INFINITY,
            ..RetryPolicy::fixed(3, Duration::from_millis(100))
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));

        let policy = RetryPolicy {
            jitter: 1e300,
            ..RetryPolicy::fixed(3, Duration::from_millis(100))
        };
        assert!(policy.delay_for(1) <= Duration::from_millis(200));
    }

    #[test]
    fn rpc_call_serializes_as_jsonrpc_request() {
        let call = RpcCall::new(42, "eth_getBlockByNumber", json!(["0x2a", true]));
        assert_eq!(
            serde_json::to_value(&call).unwrap(),
            json!({
                "jsonrpc": "2.0",
                "id": 42,
                "method": "eth_getBlockByNumber",
                "params": ["0x2a", true]
            })
        );
    }

    #[test]
    fn response_error_object_wins_over_result() {
        let response: RpcResponse = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 7,
            "error": { "code": -32000, "message": "header not found" }
        }))
        .unwrap();
        assert_eq!(response.correlation_id(), Some(7));
        match response.into_result() {
            Err(RpcError::Rpc { code, message }) => {
                assert_eq!(code, -32000);
                assert_eq!(message, "header not found");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn null_result_is_not_a_protocol_error() {
        let response: RpcResponse =
            serde_json::from_value(json!({ "jsonrpc": "2.0", "id": "3", "result": null }))
                .unwrap();
        assert_eq!(response.correlation_id(), Some(3));
        assert_eq!(response.into_result().unwrap(), Value::Null);
    }

    #[test]
    fn missing_result_is_a_protocol_error() {
        let response: RpcResponse =
            serde_json::from_value(json!({ "jsonrpc": "2.0", "id": 1 })).unwrap();
        assert!(matches!(response.into_result(), Err(RpcError::Protocol(_))));
    }

    #[test]
    fn upstream_errors_are_not_retryable() {
        assert!(RpcError::Protocol("x".into()).is_retryable());
        assert!(RpcError::Status(reqwest::StatusCode::BAD_GATEWAY).is_retryable());
        assert!(!RpcError::Rpc {
            code: -32000,
            message: "x".into()
        }
        .is_retryable());
    }
}
