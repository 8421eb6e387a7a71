#![allow(dead_code)]

use std::io::Read;
use std::sync::{Arc, Mutex};
use std::thread;

use serde_json::{json, Value};
use tiny_http::{Method, Response, Server, StatusCode};

use inpage_provider_core::{EventEmitter, EventKind, ProviderEvent};

#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<ProviderEvent>>>);

impl EventLog {
    pub fn attach(emitter: &EventEmitter) -> Self {
        let log = Self::default();
        for kind in EventKind::ALL {
            let sink = Arc::clone(&log.0);
            emitter.on(
                kind,
                Arc::new(move |event: &ProviderEvent| {
                    sink.lock().expect("event log lock").push(event.clone());
                }),
            );
        }
        log
    }

    pub fn events(&self) -> Vec<ProviderEvent> {
        self.0.lock().expect("event log lock").clone()
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.events().iter().map(ProviderEvent::kind).collect()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.kinds().into_iter().filter(|k| *k == kind).count()
    }
}

pub fn provider_state_fixture() -> Value {
    json!({
        "accounts": ["0x00000000000000000000000000000000000000aa"],
        "chainId": "0x89",
        "isUnlocked": true,
        "networkHint": "137",
    })
}

fn answer(call: &Value) -> Value {
    let id = call.get("id").cloned().unwrap_or(Value::Null);
    let method = call.get("method").and_then(Value::as_str).unwrap_or_default();
    match method {
        "eth_chainId" => json!({ "jsonrpc": "2.0", "id": id, "result": "0x89" }),
        "eth_accounts" | "eth_requestAccounts" => json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": ["0x00000000000000000000000000000000000000aa"],
        }),
        "wallet_getProviderState" => {
            json!({ "jsonrpc": "2.0", "id": id, "result": provider_state_fixture() })
        }
        other => json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": { "code": -32601, "message": format!("unknown method {other}") },
        }),
    }
}

/// JSON-RPC proxy fixture. `POST /rpc` answers calls; `POST /broken` fails
/// with a JSON 500 and `POST /gateway` with an HTML 502. Every request body is
/// recorded.
pub fn spawn_rpc_proxy(bodies: Arc<Mutex<Vec<Value>>>) -> (String, thread::JoinHandle<()>) {
    let server = Server::http("127.0.0.1:0").expect("start server");
    let addr = format!("http://{}", server.server_addr());

    let join = thread::spawn(move || {
        for _ in 0..16 {
            let mut req = match server.recv() {
                Ok(r) => r,
                Err(_) => break,
            };
            let mut raw = String::new();
            let _ = req.as_reader().read_to_string(&mut raw);
            let body: Value = serde_json::from_str(&raw).unwrap_or(Value::Null);
            if let Ok(mut g) = bodies.lock() {
                g.push(body.clone());
            }

            let method = req.method().clone();
            let url = req.url().to_owned();
            let (code, payload) = match (method, url.as_str()) {
                (Method::Post, "/rpc") => match &body {
                    Value::Array(calls) => (200, Value::Array(calls.iter().map(answer).collect())),
                    call => (200, answer(call)),
                },
                (Method::Post, "/broken") => (500, json!({ "error": "upstream unavailable" })),
                (Method::Post, "/gateway") => {
                    let page = "<html><body>502 Bad Gateway</body></html>";
                    let response =
                        Response::from_string(page).with_status_code(StatusCode(502));
                    let _ = req.respond(response);
                    continue;
                }
                _ => (404, json!({ "error": "not found" })),
            };

            let response =
                Response::from_string(payload.to_string()).with_status_code(StatusCode(code));
            let _ = req.respond(response);
        }
    });

    (addr, join)
}
