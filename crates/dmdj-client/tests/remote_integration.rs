//! End-to-end tests against an in-process fake soundboard server.
//!
//! The fake records every request it sees and keeps a small preset store so
//! save → re-list round trips can be observed.
//!
//! Run with: cargo test --test remote_integration

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::{Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use dmdj_client::debounce::{commit_fn, DebouncedControl};
use dmdj_client::editor::VoiceEditor;
use dmdj_client::error::ClientError;
use dmdj_client::gesture::{Navbar, Navigator, PressOutcome};
use dmdj_client::orchestrator::Orchestrator;
use dmdj_client::push::{ConnectionState, PushReducer, WsTransport};
use dmdj_proto::effect::EffectParams;
use dmdj_proto::protocol::{Channel, RequestKey, Snapshot};

// ── Fake server ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
struct Seen {
    method: Method,
    path: String,
    query: HashMap<String, String>,
}

#[derive(Default)]
struct Fake {
    seen: Mutex<Vec<Seen>>,
    presets: Mutex<serde_json::Map<String, Value>>,
    /// Knobs of the last `POST /modulator/custom`; `PUT` saves these.
    custom: Mutex<HashMap<String, String>>,
    /// Paths answered with HTTP 500.
    failing: HashSet<String>,
    /// Frames pushed to every WebSocket client on connect.
    push: Vec<Message>,
    connections: AtomicUsize,
}

impl Fake {
    fn requests(&self, path: &str) -> Vec<Seen> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.path == path)
            .cloned()
            .collect()
    }
}

async fn handle(
    State(fake): State<Arc<Fake>>,
    method: Method,
    uri: Uri,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let path = uri.path().to_string();
    fake.seen.lock().unwrap().push(Seen {
        method: method.clone(),
        path: path.clone(),
        query: query.clone(),
    });

    if fake.failing.contains(&path) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response();
    }

    match (method, path.as_str()) {
        (Method::GET, "/tracks/music") => {
            Json(json!(["Tavern/Drunken Sailor.mp3", "Tavern/Jig.mp3", "Battle.mp3"]))
                .into_response()
        }
        (Method::GET, "/tracks/ambient") => Json(json!({ "tracks": ["Forest/Rain.ogg"] })).into_response(),
        (Method::GET, "/tracks/fx") => Json(json!(["Door.wav"])).into_response(),
        (Method::GET, "/modulator") => {
            Json(Value::Object(fake.presets.lock().unwrap().clone())).into_response()
        }
        (Method::POST, "/modulator/custom") => {
            *fake.custom.lock().unwrap() = query;
            Json(json!({ "ok": true })).into_response()
        }
        (Method::PUT, "/modulator") => {
            let name = query.get("name").cloned().unwrap_or_default();
            let params: serde_json::Map<String, Value> = fake
                .custom
                .lock()
                .unwrap()
                .iter()
                .filter_map(|(k, v)| Some((k.clone(), json!(v.parse::<f64>().ok()?))))
                .collect();
            fake.presets.lock().unwrap().insert(name, Value::Object(params));
            StatusCode::OK.into_response()
        }
        (Method::DELETE, "/modulator") => {
            if let Some(name) = query.get("name") {
                fake.presets.lock().unwrap().remove(name);
            }
            StatusCode::OK.into_response()
        }
        _ => Json(json!({ "ok": true })).into_response(),
    }
}

async fn push_socket(State(fake): State<Arc<Fake>>, ws: WebSocketUpgrade) -> Response {
    fake.connections.fetch_add(1, Ordering::SeqCst);
    ws.on_upgrade(move |mut socket| async move {
        for msg in &fake.push {
            if socket.send(msg.clone()).await.is_err() {
                return;
            }
        }
        // Keep the connection open until the client goes away.
        while let Some(Ok(_)) = socket.recv().await {}
    })
}

async fn start_fake(fake: Fake) -> (String, Arc<Fake>) {
    let fake = Arc::new(fake);
    let app = Router::new()
        .route("/ws", get(push_socket))
        .fallback(handle)
        .with_state(fake.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), fake)
}

/// Poll `check` until it holds or two seconds pass.
async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

// ── Orchestrator ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_bootstrap_loads_every_catalog() {
    let (base, _fake) = start_fake(Fake::default()).await;
    let orch = Orchestrator::new(Some(&base));
    assert!(orch.is_loading());

    orch.bootstrap().await;

    assert!(!orch.is_loading());
    let catalog = orch.catalog();
    assert_eq!(catalog.music.len(), 3);
    assert_eq!(catalog.ambient, vec!["Forest/Rain.ogg".to_string()]);
    assert_eq!(catalog.fx, vec!["Door.wav".to_string()]);
    assert!(catalog.modulator.is_empty());
}

#[tokio::test]
async fn test_bootstrap_keeps_partial_results() {
    let fake = Fake {
        failing: ["/tracks/ambient".to_string()].into_iter().collect(),
        ..Fake::default()
    };
    let (base, _fake) = start_fake(fake).await;
    let orch = Orchestrator::new(Some(&base));

    orch.bootstrap().await;

    let catalog = orch.catalog();
    assert_eq!(catalog.music.len(), 3);
    assert!(catalog.ambient.is_empty());
    assert_eq!(catalog.fx.len(), 1);
    assert!(!orch.is_loading());
}

#[tokio::test]
async fn test_server_error_releases_busy_and_reports() {
    let fake = Fake {
        failing: ["/music/stop".to_string()].into_iter().collect(),
        ..Fake::default()
    };
    let (base, _fake) = start_fake(fake).await;
    let orch = Orchestrator::new(Some(&base));
    let mut failures = orch.subscribe_failures();

    let err = orch.stop(Channel::Music).await.unwrap_err();
    assert!(matches!(err, ClientError::Status { status: 500, .. }));

    let key = RequestKey::from("music_stop");
    assert!(!orch.is_busy(&key));
    let failure = failures.recv().await.unwrap();
    assert_eq!(failure.key, key);
}

#[tokio::test]
async fn test_command_wire_shape() {
    let (base, fake) = start_fake(Fake::default()).await;
    let orch = Orchestrator::new(Some(&base));

    orch.play(Channel::Music, "Tavern/Jig.mp3").await.unwrap();
    orch.set_volume(Channel::Ambient, 72.0).await.unwrap();

    let play = fake.requests("/music/play");
    assert_eq!(play.len(), 1);
    assert_eq!(play[0].method, Method::POST);
    assert_eq!(play[0].query.get("track").map(String::as_str), Some("Tavern/Jig.mp3"));

    let volume = fake.requests("/ambient/volume");
    assert_eq!(volume[0].query.get("volume").map(String::as_str), Some("72"));
}

#[tokio::test]
async fn test_unsupported_command_never_hits_network() {
    let (base, fake) = start_fake(Fake::default()).await;
    let orch = Orchestrator::new(Some(&base));

    let err = orch.stop(Channel::Fx).await.unwrap_err();
    assert!(matches!(err, ClientError::Unsupported { .. }));
    assert!(fake.requests("/fx/stop").is_empty());
}

// ── Debounced slider ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_slider_drag_commits_final_value_once() {
    let (base, fake) = start_fake(Fake::default()).await;
    let orch = Orchestrator::new(Some(&base));

    let commit = {
        let orch = orch.clone();
        commit_fn(move |v: f64| {
            let orch = orch.clone();
            async move {
                orch.set_volume(Channel::Music, v).await?;
                Ok::<(), anyhow::Error>(())
            }
        })
    };
    let mut slider = DebouncedControl::new(50.0, Duration::from_millis(100), commit);
    for v in [55.0, 61.0, 68.0, 72.0] {
        slider.input(v);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(*slider.value(), 72.0);

    assert!(eventually(|| !fake.requests("/music/volume").is_empty()).await);
    tokio::time::sleep(Duration::from_millis(200)).await;
    let sent = fake.requests("/music/volume");
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].query.get("volume").map(String::as_str), Some("72"));
}

// ── Voice editor ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_save_then_relist_preset() {
    let (base, fake) = start_fake(Fake::default()).await;
    let orch = Orchestrator::new(Some(&base));
    orch.bootstrap().await;
    assert!(orch.catalog().modulator.is_empty());

    let mut editor = VoiceEditor::new(orch.clone());
    for (knob, value) in [("pitch", -12.0), ("ring_mod", 440.0), ("mix", 0.35), ("low_pass", 8000.0)] {
        editor.set_param(knob, value);
    }
    let submitted: EffectParams = editor.draft().params;
    editor.play().await.unwrap();
    editor.set_name("Deep");
    assert!(editor.save().await.unwrap());

    let catalog = orch.catalog();
    assert_eq!(catalog.modulator.get("Deep"), Some(&submitted));
    assert_eq!(editor.selected(), "Deep");

    // The saved preset is selectable and loads the submitted knobs.
    editor.select_preset("", &catalog.modulator).await.unwrap();
    editor.select_preset("Deep", &catalog.modulator).await.unwrap();
    assert_eq!(editor.draft().params, submitted);

    let custom = fake.requests("/modulator/custom");
    assert_eq!(custom[0].query.get("pitch").map(String::as_str), Some("-12"));

    editor.delete("Deep").await.unwrap();
    assert!(orch.catalog().modulator.is_empty());
    assert_eq!(editor.selected(), "");
}

// ── Navbar ────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct CountingNavigator {
    visits: Mutex<Vec<Channel>>,
}

impl Navigator for CountingNavigator {
    fn navigate(&self, channel: Channel) {
        self.visits.lock().unwrap().push(channel);
    }
}

#[tokio::test]
async fn test_voice_hold_turns_effect_off() {
    let (base, fake) = start_fake(Fake::default()).await;
    let orch = Orchestrator::new(Some(&base));

    let mut snap = Snapshot::default();
    snap.modulator.effect = Some("robot".into());
    let (_tx, rx) = tokio::sync::watch::channel(snap);
    let nav = Arc::new(CountingNavigator::default());
    let mut bar = Navbar::new(orch, rx, nav.clone(), Duration::from_millis(50));

    bar.press_start(Channel::Modulator);
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(bar.press_end(Channel::Modulator), Some(PressOutcome::Held));

    assert!(eventually(|| !fake.requests("/modulator").is_empty()).await);
    let sent = fake.requests("/modulator");
    assert_eq!(sent[0].method, Method::POST);
    assert_eq!(sent[0].query.get("effect").map(String::as_str), Some("off"));
    assert!(nav.visits.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_music_tap_only_navigates() {
    let (base, fake) = start_fake(Fake::default()).await;
    let orch = Orchestrator::new(Some(&base));

    let mut snap = Snapshot::default();
    snap.music.playing = true;
    snap.music.track = Some("Battle.mp3".into());
    let (_tx, rx) = tokio::sync::watch::channel(snap);
    let nav = Arc::new(CountingNavigator::default());
    let mut bar = Navbar::new(orch, rx, nav.clone(), Duration::from_millis(200));

    bar.press_start(Channel::Music);
    assert_eq!(bar.press_end(Channel::Music), Some(PressOutcome::Tap));
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(*nav.visits.lock().unwrap(), vec![Channel::Music]);
    assert!(fake.requests("/music/stop").is_empty());
}

// ── Push channel ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_push_messages_merge_over_websocket() {
    let fake = Fake {
        push: vec![
            Message::Text(r#"{"music": {"track": "Battle.mp3", "playing": true, "volume": 80}}"#.to_string()),
            Message::Text("not json".to_string()),
            Message::Text(r#"{"modulator": {"effect": "robot"}, "extra": 1}"#.to_string()),
        ],
        ..Fake::default()
    };
    let (base, _fake) = start_fake(fake).await;
    let url = format!("{}/ws", base.replacen("http", "ws", 1));

    let handle = PushReducer::new(WsTransport, url, Duration::from_millis(100)).spawn();

    assert!(
        eventually(|| handle.snapshot().modulator.effect.as_deref() == Some("robot")).await
    );
    let snap = handle.snapshot();
    assert_eq!(snap.music.track.as_deref(), Some("Battle.mp3"));
    assert_eq!(snap.music.volume, Some(80.0));
    assert_eq!(handle.connection(), ConnectionState::Open);

    handle.shutdown();
}

#[tokio::test]
async fn test_bad_binary_frame_dropped_without_reconnect() {
    let fake = Fake {
        push: vec![
            Message::Binary(vec![0xff, 0xfe, 0x00]),
            Message::Text(r#"{"music": {"track": "a"}}"#.to_string()),
        ],
        ..Fake::default()
    };
    let (base, fake) = start_fake(fake).await;
    let url = format!("{}/ws", base.replacen("http", "ws", 1));

    let handle = PushReducer::new(WsTransport, url, Duration::from_millis(100)).spawn();

    assert!(eventually(|| handle.snapshot().music.track.as_deref() == Some("a")).await);
    // Several reconnect delays pass without a new connection.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(fake.connections.load(Ordering::SeqCst), 1);
    assert_eq!(handle.connection(), ConnectionState::Open);

    handle.shutdown();
}

#[tokio::test]
async fn test_failed_command_keeps_pushed_state() {
    let fake = Fake {
        failing: ["/music/volume".to_string()].into_iter().collect(),
        push: vec![Message::Text(
            r#"{"music": {"track": "Battle.mp3", "playing": true, "volume": 80}}"#.to_string(),
        )],
        ..Fake::default()
    };
    let (base, fake) = start_fake(fake).await;
    let url = format!("{}/ws", base.replacen("http", "ws", 1));
    let handle = PushReducer::new(WsTransport, url, Duration::from_millis(100)).spawn();
    assert!(eventually(|| handle.snapshot().music.volume == Some(80.0)).await);
    let confirmed = handle.snapshot();

    let orch = Orchestrator::new(Some(&base));
    let mut failures = orch.subscribe_failures();
    let commit = {
        let orch = orch.clone();
        commit_fn(move |v: f64| {
            let orch = orch.clone();
            async move {
                orch.set_volume(Channel::Music, v).await?;
                Ok::<(), anyhow::Error>(())
            }
        })
    };
    let mut slider = DebouncedControl::new(80.0, Duration::from_millis(50), commit);
    slider.input(30.0);

    let failure = failures.recv().await.unwrap();
    assert_eq!(failure.key.as_str(), "music_volume");
    assert_eq!(fake.requests("/music/volume").len(), 1);
    assert!(!orch.is_busy(&RequestKey::from("music_volume")));

    // Confirmed state is untouched and the slider falls back to it.
    assert_eq!(handle.snapshot(), confirmed);
    assert!(eventually(|| !slider.is_pending()).await);
    assert!(slider.sync(confirmed.music.volume.unwrap()));
    assert_eq!(*slider.value(), 80.0);

    handle.shutdown();
}
