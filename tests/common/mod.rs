#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use tokio::task::JoinHandle;

pub const WALLET: &str = "0xAbC0000000000000000000000000000000000dEf";
pub const OTHER: &str = "0x1111111111111111111111111111111111111111";

pub struct MockBlock {
    pub timestamp: u64,
    pub senders: Vec<String>,
}

/// How the node misbehaves on the batches counted by `fail_batches`.
#[derive(Default, Clone, Copy, Debug)]
pub enum BatchFault {
    /// HTTP 503.
    #[default]
    Unavailable,
    /// HTTP 200 with a body that is not JSON.
    Garbage,
    /// A valid array with the answer to the last call left out.
    DropLastAnswer,
    /// HTTP 200 with one error object for the whole batch.
    RejectBatch,
}

/// In-process JSON-RPC node serving a fixed chain. Batch answers come back in
/// reverse order so callers must match by id.
#[derive(Default)]
pub struct MockNode {
    pub blocks: Vec<MockBlock>,
    /// Batch requests still to be answered with `batch_fault`.
    pub fail_batches: AtomicUsize,
    pub batch_fault: BatchFault,
    /// Block whose full fetch answers with an error object.
    pub error_block: Option<u64>,
    pub batch_requests: AtomicUsize,
    pub single_requests: AtomicUsize,
    pub blocks_served: AtomicUsize,
}

impl MockNode {
    pub fn new(blocks: Vec<MockBlock>) -> Self {
        Self {
            blocks,
            ..Default::default()
        }
    }

    pub fn batches(&self) -> usize {
        self.batch_requests.load(Ordering::SeqCst)
    }

    pub fn singles(&self) -> usize {
        self.single_requests.load(Ordering::SeqCst)
    }

    fn answer(&self, call: &Value) -> Value {
        let id = call.get("id").cloned().unwrap_or(Value::Null);
        let method = call.get("method").and_then(Value::as_str).unwrap_or_default();
        let params = call.get("params").cloned().unwrap_or_else(|| json!([]));

        match method {
            "eth_blockNumber" => {
                let head = format!("{:#x}", self.blocks.len() - 1);
                json!({ "jsonrpc": "2.0", "id": id, "result": head })
            }
            "eth_getBlockByNumber" => {
                let number = params[0]
                    .as_str()
                    .and_then(|s| u64::from_str_radix(s.trim_start_matches("0x"), 16).ok())
                    .unwrap_or(u64::MAX);
                let full = params[1].as_bool().unwrap_or(false);
                if full && self.error_block == Some(number) {
                    return json!({
                        "jsonrpc": "2.0",
                        "id": id,
                        "error": { "code": -32000, "message": "block unavailable" }
                    });
                }
                json!({ "jsonrpc": "2.0", "id": id, "result": self.block_json(number, full) })
            }
            _ => json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": { "code": -32601, "message": "method not found" }
            }),
        }
    }

    fn block_json(&self, number: u64, full: bool) -> Value {
        let Some(block) = self.blocks.get(number as usize) else {
            return Value::Null;
        };
        if full {
            self.blocks_served.fetch_add(1, Ordering::SeqCst);
        }
        let transactions: Vec<Value> = block
            .senders
            .iter()
            .enumerate()
            .map(|(i, from)| {
                let hash = format!("0x{:060x}{:04x}", number, i);
                if full {
                    json!({ "hash": hash, "from": from, "to": OTHER, "value": "0x0" })
                } else {
                    json!(hash)
                }
            })
            .collect();
        json!({
            "number": format!("{:#x}", number),
            "timestamp": format!("{:#x}", block.timestamp),
            "transactions": transactions
        })
    }
}

async fn rpc(State(node): State<Arc<MockNode>>, Json(body): Json<Value>) -> Response {
    match body {
        Value::Array(calls) => {
            node.batch_requests.fetch_add(1, Ordering::SeqCst);
            let failing = node
                .fail_batches
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            let mut answers: Vec<Value> = calls.iter().rev().map(|c| node.answer(c)).collect();
            if failing {
                match node.batch_fault {
                    BatchFault::Unavailable => {
                        return (StatusCode::SERVICE_UNAVAILABLE, "try again").into_response();
                    }
                    BatchFault::Garbage => {
                        return (StatusCode::OK, "<html>upstream hiccup</html>").into_response();
                    }
                    BatchFault::DropLastAnswer => {
                        // answers are reversed, so the last call's answer is first
                        answers.remove(0);
                    }
                    BatchFault::RejectBatch => {
                        return Json(json!({
                            "jsonrpc": "2.0",
                            "id": null,
                            "error": { "code": -32005, "message": "batch size too large" }
                        }))
                        .into_response();
                    }
                }
            }
            Json(Value::Array(answers)).into_response()
        }
        call => {
            node.single_requests.fetch_add(1, Ordering::SeqCst);
            Json(node.answer(&call)).into_response()
        }
    }
}

pub async fn spawn_node(node: Arc<MockNode>) -> (String, JoinHandle<()>) {
    let app = Router::new().route("/", post(rpc)).with_state(node);
    spawn(app).await
}

pub async fn spawn(app: Router) -> (String, JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    let base_url = format!("http://{}", addr);
    let server = axum::serve(listener, app);
    let handle = tokio::spawn(async move {
        let _ = server.await;
    });
    (base_url, handle)
}

/// 1001 blocks, block 950 is the first at or after `day_start`, blocks
/// 950..=959 each hold one transaction from `WALLET`. Earlier blocks also
/// hold some `WALLET` transactions that must not be counted.
pub fn scenario_chain(day_start: u64) -> Vec<MockBlock> {
    (0..=1000u64)
        .map(|n| {
            let timestamp = if n < 950 {
                day_start - 12 * (950 - n)
            } else {
                day_start + 12 * (n - 950)
            };
            let senders = if (950..960).contains(&n) {
                vec![OTHER.to_string(), WALLET.to_string()]
            } else if n < 950 && n % 10 == 0 {
                vec![WALLET.to_lowercase()]
            } else {
                vec![OTHER.to_string()]
            };
            MockBlock { timestamp, senders }
        })
        .collect()
}
