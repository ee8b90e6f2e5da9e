use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{SecondsFormat, Utc};
use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use rand::distr::Alphanumeric;
use rand::Rng;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex};
use tower_http::services::{ServeDir, ServeFile};
use wirebox_puzzle::completion::{CompletionStore, FileCompletionStore};
use wirebox_puzzle::constants::TICK_MS;
use wirebox_puzzle::layout::{demo_layouts, load_layout_dir, PuzzleLayout};
use wirebox_puzzle::protocol::{parse_client_message, ParsedClientMessage};
use wirebox_puzzle::puzzle::{PuzzleOptions, WirePuzzle};
use wirebox_puzzle::registry::PuzzleRegistry;
use wirebox_puzzle::types::{EvaluationMode, PuzzleSummary, RemovalPolicy};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

type SharedState = Arc<Mutex<ServerState>>;

#[derive(Parser, Debug)]
#[command(author, version, about = "Host wire-box puzzles over a websocket")]
struct Cli {
    #[arg(long, env = "PORT", default_value_t = 8080)]
    port: u16,
    #[arg(long, env = "LAYOUTS_DIR")]
    layouts_dir: Option<PathBuf>,
    #[arg(long, env = "COMPLETION_DB_PATH", default_value = ".data/completed.json")]
    completion_db: PathBuf,
    #[arg(long, env = "STATIC_DIR")]
    static_dir: Option<PathBuf>,
    #[arg(long, default_value = "refund")]
    removal_policy: String,
    #[arg(long)]
    polling: bool,
}

#[derive(Clone, Debug)]
enum OutboundMessage {
    Text(String),
    Close { code: u16, reason: String },
}

struct ClientContext {
    tx: mpsc::Sender<OutboundMessage>,
    puzzle: Option<WirePuzzle>,
}

struct ServerState {
    layouts: BTreeMap<String, PuzzleLayout>,
    registry: PuzzleRegistry,
    store: FileCompletionStore,
    options: PuzzleOptions,
    clients: HashMap<String, ClientContext>,
}

impl ServerState {
    fn new(layouts: Vec<PuzzleLayout>, completion_db: PathBuf, options: PuzzleOptions) -> Self {
        let mut registry = PuzzleRegistry::new();
        let mut by_name = BTreeMap::new();
        for layout in layouts {
            registry.register(&layout.name);
            by_name.insert(layout.name.trim().to_lowercase(), layout);
        }
        let store = FileCompletionStore::open(completion_db, &registry);
        Self {
            layouts: by_name,
            registry,
            store,
            options,
            clients: HashMap::new(),
        }
    }

    fn summaries(&self) -> Vec<PuzzleSummary> {
        self.layouts
            .values()
            .map(|layout| PuzzleSummary {
                name: layout.name.trim().to_string(),
                completed: self
                    .registry
                    .key_of(&layout.name)
                    .is_some_and(|key| self.store.contains(key)),
                node_count: layout.nodes.len() + 1,
                wire_count: layout.wires.len(),
            })
            .collect()
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let Some(removal_policy) = RemovalPolicy::parse(&cli.removal_policy) else {
        log::error!("unknown removal policy '{}'", cli.removal_policy);
        std::process::exit(2);
    };
    let options = PuzzleOptions {
        removal_policy,
        evaluation_mode: if cli.polling {
            EvaluationMode::Polling
        } else {
            EvaluationMode::OnChange
        },
    };

    let layouts = match cli.layouts_dir.as_ref() {
        Some(dir) => match load_layout_dir(dir) {
            Ok(layouts) if !layouts.is_empty() => layouts,
            Ok(_) => {
                log::error!("no puzzle layouts found in {}", dir.display());
                std::process::exit(2);
            }
            Err(error) => {
                log::error!("failed to load puzzle layouts: {error}");
                std::process::exit(2);
            }
        },
        None => demo_layouts(),
    };
    log::info!("serving {} puzzle(s)", layouts.len());

    let state = Arc::new(Mutex::new(ServerState::new(
        layouts,
        cli.completion_db.clone(),
        options,
    )));
    start_tick_loop(state.clone());

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/api/puzzles", get(puzzles_handler))
        .route("/ws", get(ws_handler))
        .with_state(state);

    let app = match resolve_static_dir(cli.static_dir.clone()) {
        Some(static_dir) => {
            log::info!("static file root: {}", static_dir.display());
            let index_file = static_dir.join("index.html");
            app.fallback_service(
                ServeDir::new(static_dir).not_found_service(ServeFile::new(index_file)),
            )
        }
        None => app,
    };

    let bind_addr = format!("0.0.0.0:{}", cli.port);
    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(listener) => listener,
        Err(error) => {
            log::error!("failed to bind {bind_addr}: {error}");
            std::process::exit(1);
        }
    };

    log::info!("listening on :{}", cli.port);
    if let Err(error) = axum::serve(listener, app).await {
        log::error!("server runtime failed: {error}");
        std::process::exit(1);
    }
}

fn resolve_static_dir(configured: Option<PathBuf>) -> Option<PathBuf> {
    let candidates = configured
        .into_iter()
        .chain([PathBuf::from("dist/client"), PathBuf::from("web")]);
    candidates
        .into_iter()
        .find(|path| path.join("index.html").is_file())
}

async fn healthz() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

async fn puzzles_handler(State(state): State<SharedState>) -> impl IntoResponse {
    let guard = state.lock().await;
    Json(json!({
        "generatedAtIso": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        "puzzles": guard.summaries(),
    }))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<SharedState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: SharedState, socket: WebSocket) {
    let client_id = make_client_id();
    let (tx, mut rx) = mpsc::channel::<OutboundMessage>(256);

    {
        let mut guard = state.lock().await;
        guard.clients.insert(
            client_id.clone(),
            ClientContext {
                tx: tx.clone(),
                puzzle: None,
            },
        );
    }
    log::debug!("client {client_id} connected");

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let writer = tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            let should_close = matches!(outbound, OutboundMessage::Close { .. });
            let result = match outbound {
                OutboundMessage::Text(payload) => {
                    ws_sender.send(Message::Text(payload.into())).await
                }
                OutboundMessage::Close { code, reason } => {
                    let frame = CloseFrame {
                        code,
                        reason: reason.into(),
                    };
                    ws_sender.send(Message::Close(Some(frame))).await
                }
            };
            if result.is_err() || should_close {
                break;
            }
        }
    });

    while let Some(received) = ws_receiver.next().await {
        let Ok(message) = received else {
            break;
        };
        match message {
            Message::Text(raw) => {
                handle_client_message(&state, &client_id, raw.as_str()).await;
            }
            Message::Binary(raw) => match std::str::from_utf8(&raw) {
                Ok(text) => handle_client_message(&state, &client_id, text).await,
                Err(_) => send_error(&state, &client_id, "invalid utf8 message").await,
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    state.lock().await.clients.remove(&client_id);
    log::debug!("client {client_id} disconnected");
    drop(tx);
    let _ = writer.await;
}

async fn handle_client_message(state: &SharedState, client_id: &str, raw: &str) {
    let Some(message) = parse_client_message(raw) else {
        send_error(state, client_id, "invalid message").await;
        return;
    };

    let mut guard = state.lock().await;
    let ServerState {
        layouts,
        registry,
        store,
        options,
        clients,
    } = &mut *guard;
    let Some(client) = clients.get_mut(client_id) else {
        return;
    };

    match message {
        ParsedClientMessage::Hello { puzzle } => {
            let Some(key) = registry.key_of(&puzzle) else {
                send(client, &error_message("unknown puzzle"));
                return;
            };
            let Some(layout) = layouts.get(&puzzle.to_lowercase()) else {
                send(client, &error_message("unknown puzzle"));
                return;
            };
            let mut session = match WirePuzzle::new(layout, key, *options, &*store) {
                Ok(session) => session,
                Err(error) => {
                    log::warn!("puzzle '{puzzle}' failed to start: {error}");
                    send(client, &error_message("puzzle setup failed"));
                    return;
                }
            };
            let tx = client.tx.clone();
            let name = session.name().to_string();
            session.on_completed(move || {
                let payload = json!({ "type": "completed", "puzzle": name });
                let _ = tx.try_send(OutboundMessage::Text(payload.to_string()));
            });
            let snapshot = session.build_snapshot(false);
            send(
                client,
                &json!({
                    "type": "welcome",
                    "clientId": client_id,
                    "snapshot": snapshot,
                }),
            );
            client.puzzle = Some(session);
        }
        ParsedClientMessage::Click { target } => {
            let Some(session) = client.puzzle.as_mut() else {
                send(client, &error_message("send hello first"));
                return;
            };
            let outcome = session.handle_click(target, &mut *store);
            send(client, &json!({ "type": "click_result", "outcome": outcome }));
        }
        ParsedClientMessage::SelectWire { wire } => {
            let Some(session) = client.puzzle.as_mut() else {
                send(client, &error_message("send hello first"));
                return;
            };
            if let Err(reason) = session.select_wire(wire) {
                send(client, &json!({ "type": "ignored", "reason": reason }));
            }
        }
        ParsedClientMessage::DeselectWire { wire } => {
            let Some(session) = client.puzzle.as_mut() else {
                send(client, &error_message("send hello first"));
                return;
            };
            session.deselect_wire(wire);
        }
        ParsedClientMessage::Ping { t } => {
            send(client, &json!({ "type": "pong", "t": t }));
        }
    }
}

fn start_tick_loop(state: SharedState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(TICK_MS));
        loop {
            interval.tick().await;
            let mut guard = state.lock().await;
            tick_sessions(&mut guard);
        }
    });
}

fn tick_sessions(state: &mut ServerState) {
    let ServerState { store, clients, .. } = state;
    let mut stalled = Vec::new();
    for (client_id, client) in clients.iter_mut() {
        let Some(session) = client.puzzle.as_mut() else {
            continue;
        };
        session.step(TICK_MS, &mut *store);
        if !session.has_pending_events() {
            continue;
        }
        let snapshot = session.build_snapshot(true);
        let payload = json!({ "type": "state", "snapshot": snapshot });
        if client
            .tx
            .try_send(OutboundMessage::Text(payload.to_string()))
            .is_err()
        {
            stalled.push(client_id.clone());
        }
    }
    for client_id in stalled {
        if let Some(client) = clients.remove(&client_id) {
            log::warn!("dropping client {client_id}: outbound queue full");
            let _ = client.tx.try_send(OutboundMessage::Close {
                code: 1013,
                reason: "outbound queue full".to_string(),
            });
        }
    }
}

fn send(client: &ClientContext, message: &Value) {
    if client
        .tx
        .try_send(OutboundMessage::Text(message.to_string()))
        .is_err()
    {
        log::debug!("outbound queue rejected a message");
    }
}

async fn send_error(state: &SharedState, client_id: &str, message: &str) {
    let guard = state.lock().await;
    if let Some(client) = guard.clients.get(client_id) {
        send(client, &error_message(message));
    }
}

fn error_message(message: &str) -> Value {
    json!({ "type": "error", "message": message })
}

fn make_client_id() -> String {
    let seq = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    let suffix: String = rand::rng()
        .sample_iter(Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    format!("client_{seq}_{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use wirebox_puzzle::types::{ClickTarget, NodeId, WireId};

    fn state_with_demo(dir: &tempfile::TempDir) -> ServerState {
        ServerState::new(
            demo_layouts(),
            dir.path().join("completed.json"),
            PuzzleOptions::default(),
        )
    }

    #[test]
    fn summaries_list_every_layout() {
        let dir = tempfile::tempdir().expect("temp dir");
        let state = state_with_demo(&dir);
        let summaries = state.summaries();
        assert_eq!(summaries.len(), demo_layouts().len());
        assert!(summaries.iter().all(|summary| !summary.completed));
    }

    #[test]
    fn tick_sends_state_after_clicks_and_records_completion() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut state = state_with_demo(&dir);
        let (tx, mut rx) = mpsc::channel(64);
        let key = state.registry.key_of("generator_room").expect("registered");
        let layout = state.layouts["generator_room"].clone();
        let mut session =
            WirePuzzle::new(&layout, key, state.options, &state.store).expect("valid layout");
        for target in [
            ClickTarget::Wire(WireId(2)),
            ClickTarget::Node(NodeId(0)),
            ClickTarget::Node(NodeId(1)),
            ClickTarget::Wire(WireId(0)),
            ClickTarget::Node(NodeId(1)),
            ClickTarget::Node(NodeId(2)),
        ] {
            session.handle_click(target, &mut state.store);
        }
        state.clients.insert(
            "client_1".to_string(),
            ClientContext {
                tx,
                puzzle: Some(session),
            },
        );

        tick_sessions(&mut state);
        let Ok(OutboundMessage::Text(payload)) = rx.try_recv() else {
            panic!("expected a state message");
        };
        let value: Value = serde_json::from_str(&payload).expect("valid json");
        assert_eq!(value["type"], "state");
        assert_eq!(value["snapshot"]["completed"], true);
        assert!(state.summaries().iter().any(|summary| summary.completed));

        tick_sessions(&mut state);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn client_ids_are_unique() {
        assert_ne!(make_client_id(), make_client_id());
    }

    fn drain(rx: &mut mpsc::Receiver<OutboundMessage>) -> Vec<Value> {
        let mut messages = Vec::new();
        while let Ok(OutboundMessage::Text(payload)) = rx.try_recv() {
            messages.push(serde_json::from_str(&payload).expect("valid json"));
        }
        messages
    }

    #[tokio::test]
    async fn unsupported_messages_are_rejected() {
        let dir = tempfile::tempdir().expect("temp dir");
        let state: SharedState = Arc::new(Mutex::new(state_with_demo(&dir)));
        let (tx, mut rx) = mpsc::channel(64);
        state.lock().await.clients.insert(
            "client_1".to_string(),
            ClientContext { tx, puzzle: None },
        );

        handle_client_message(
            &state,
            "client_1",
            r#"{"type":"click","target":{"kind":"node","id":1}}"#,
        )
        .await;
        handle_client_message(&state, "client_1", r#"{"type":"hello","puzzle":"attic"}"#).await;
        handle_client_message(&state, "client_1", r#"{"type":"teleport"}"#).await;
        let messages = drain(&mut rx);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0]["message"], "send hello first");
        assert_eq!(messages[1]["message"], "unknown puzzle");
        assert_eq!(messages[2]["message"], "invalid message");
        assert!(messages.iter().all(|message| message["type"] == "error"));
        assert!(state.lock().await.clients["client_1"].puzzle.is_none());
    }

    #[tokio::test]
    async fn used_wire_selection_is_ignored() {
        let dir = tempfile::tempdir().expect("temp dir");
        let state: SharedState = Arc::new(Mutex::new(state_with_demo(&dir)));
        let (tx, mut rx) = mpsc::channel(64);
        state.lock().await.clients.insert(
            "client_1".to_string(),
            ClientContext { tx, puzzle: None },
        );

        for raw in [
            r#"{"type":"hello","puzzle":"Generator_Room"}"#,
            r#"{"type":"select_wire","wire":2}"#,
            r#"{"type":"click","target":{"kind":"node","id":0}}"#,
            r#"{"type":"click","target":{"kind":"node","id":1}}"#,
        ] {
            handle_client_message(&state, "client_1", raw).await;
        }
        let messages = drain(&mut rx);
        assert_eq!(messages[0]["type"], "welcome");
        assert_eq!(messages[2]["type"], "click_result");
        assert_eq!(messages[2]["outcome"]["outcome"], "connected");

        handle_client_message(&state, "client_1", r#"{"type":"select_wire","wire":2}"#).await;
        let messages = drain(&mut rx);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["type"], "ignored");
        assert_eq!(messages[0]["reason"], "wire_unavailable");
    }
}
