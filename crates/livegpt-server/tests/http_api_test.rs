//! HTTP surface and supervisor behavior, driven through the router with
//! an in-process room and fixture providers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use base64::Engine as _;
use bytes::Bytes;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use livegpt_agent::room::local::{LocalConnector, LocalSfu};
use livegpt_agent::Providers;
use livegpt_llm::{ChatBackend, CompletionError, DeltaStream};
use livegpt_server::{app, AppState, Config, RoomInfo, RoomLookup, Supervisor, SupervisorError};
use livegpt_types::Language;
use livegpt_voice::{SessionConfig, SttClient, SttResponse, SttSession, Synthesizer, VoiceError};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;
use tower::ServiceExt;

const API_KEY: &str = "devkey";
const API_SECRET: &str = "devsecret";

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

struct NullStt;

#[async_trait::async_trait]
impl SttClient for NullStt {
    async fn open(&self, _config: SessionConfig) -> Result<SttSession, VoiceError> {
        let (audio_tx, mut audio_rx) = mpsc::channel::<Bytes>(8);
        let (_results_tx, results) = mpsc::channel::<Result<SttResponse, VoiceError>>(8);
        tokio::spawn(async move { while audio_rx.recv().await.is_some() {} });
        Ok(SttSession { audio_tx, results })
    }
}

struct NullTts;

#[async_trait::async_trait]
impl Synthesizer for NullTts {
    async fn synthesize(&self, _text: &str, _language: &Language) -> Result<Bytes, VoiceError> {
        Err(VoiceError::Tts("synthesis disabled in this fixture".into()))
    }
}

struct NullLlm;

#[async_trait::async_trait]
impl ChatBackend for NullLlm {
    async fn stream_chat(
        &self,
        _messages: Vec<livegpt_llm::ChatMessage>,
    ) -> Result<DeltaStream, CompletionError> {
        Ok(Box::pin(futures_util::stream::empty()))
    }
}

/// Room lookup fixture: the rooms the "SFU" knows about.
#[derive(Default)]
struct FakeDirectory {
    rooms: Mutex<HashMap<String, RoomInfo>>,
}

impl FakeDirectory {
    fn with_room(self, name: &str) -> Self {
        self.rooms.lock().unwrap().insert(
            name.to_string(),
            RoomInfo {
                sid: format!("RM_{name}"),
                name: name.to_string(),
                num_participants: 1,
            },
        );
        self
    }
}

#[async_trait::async_trait]
impl RoomLookup for FakeDirectory {
    async fn find_room(&self, name: &str) -> Result<Option<RoomInfo>, SupervisorError> {
        Ok(self.rooms.lock().unwrap().get(name).cloned())
    }

    fn join_token(&self, _room: &str) -> Result<String, SupervisorError> {
        Ok("test-token".to_string())
    }
}

struct Fixture {
    state: Arc<AppState>,
    supervisor: Arc<Supervisor>,
    _sfu: Arc<LocalSfu>,
}

fn fixture(directory: FakeDirectory) -> Fixture {
    let sfu = LocalSfu::new();
    let providers = Providers {
        stt: Arc::new(NullStt),
        tts: Arc::new(NullTts),
        llm: Arc::new(NullLlm),
    };

    let config = Config::from_yaml(&format!(
        "livekit:\n  url: ws://localhost:7880\n  api_key: {API_KEY}\n  secret_key: {API_SECRET}\nopenai_api_key: sk-test\n"
    ))
    .unwrap();

    let supervisor = Supervisor::new(
        config,
        providers,
        Arc::new(LocalConnector::new(sfu.clone())),
        Arc::new(directory),
    );

    let state = Arc::new(AppState {
        supervisor: supervisor.clone(),
        api_key: API_KEY.to_string(),
        api_secret: API_SECRET.to_string(),
    });

    Fixture {
        state,
        supervisor,
        _sfu: sfu,
    }
}

#[derive(Serialize)]
struct SignClaims {
    sha256: String,
    iss: &'static str,
    exp: u64,
}

fn sign(body: &[u8]) -> String {
    let exp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs()
        + 600;
    encode(
        &Header::new(Algorithm::HS256),
        &SignClaims {
            sha256: base64::engine::general_purpose::STANDARD.encode(Sha256::digest(body)),
            iss: API_KEY,
            exp,
        },
        &EncodingKey::from_secret(API_SECRET.as_bytes()),
    )
    .unwrap()
}

fn joined_event(room: &str, identity: &str) -> Vec<u8> {
    serde_json::json!({
        "event": "participant_joined",
        "room": { "sid": format!("RM_{room}"), "name": room, "numParticipants": 1 },
        "participant": { "identity": identity, "name": identity, "metadata": "" },
    })
    .to_string()
    .into_bytes()
}

fn left_event(room: &str, remaining: u32) -> Vec<u8> {
    serde_json::json!({
        "event": "participant_left",
        "room": { "sid": format!("RM_{room}"), "name": room, "numParticipants": remaining },
        "participant": { "identity": "alice", "name": "alice", "metadata": "" },
    })
    .to_string()
    .into_bytes()
}

async fn post_webhook(fixture: &Fixture, body: Vec<u8>) -> StatusCode {
    let token = sign(&body);
    let response = app(fixture.state.clone())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook")
                .header("authorization", token)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    response.status()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn liveness_returns_ok() {
    let fixture = fixture(FakeDirectory::default());
    let response = app(fixture.state.clone())
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], b"OK");
}

#[tokio::test]
async fn join_unknown_room_is_404() {
    let fixture = fixture(FakeDirectory::default());
    let response = app(fixture.state.clone())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/join/ghost")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(fixture.supervisor.agent_count(), 0);
}

#[tokio::test]
async fn join_known_room_creates_one_agent() {
    let fixture = fixture(FakeDirectory::default().with_room("demo"));

    for _ in 0..2 {
        let response = app(fixture.state.clone())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/join/demo")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"Success");
    }

    assert_eq!(fixture.supervisor.agent_count(), 1);
}

#[tokio::test]
async fn join_rejects_other_methods() {
    let fixture = fixture(FakeDirectory::default().with_room("demo"));
    let response = app(fixture.state.clone())
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/join/demo")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn webhook_join_creates_an_agent_once() {
    let fixture = fixture(FakeDirectory::default());

    assert_eq!(
        post_webhook(&fixture, joined_event("demo", "alice")).await,
        StatusCode::OK
    );
    assert_eq!(
        post_webhook(&fixture, joined_event("demo", "bob")).await,
        StatusCode::OK
    );

    assert_eq!(fixture.supervisor.agent_count(), 1);
}

#[tokio::test]
async fn webhook_ignores_the_bot_itself() {
    let fixture = fixture(FakeDirectory::default());
    assert_eq!(
        post_webhook(&fixture, joined_event("demo", "KITT")).await,
        StatusCode::OK
    );
    assert_eq!(fixture.supervisor.agent_count(), 0);
}

#[tokio::test]
async fn webhook_garbage_is_acknowledged() {
    let fixture = fixture(FakeDirectory::default());

    // Unsigned garbage.
    let response = app(fixture.state.clone())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook")
                .body(Body::from("not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Signed garbage.
    assert_eq!(
        post_webhook(&fixture, b"still not json".to_vec()).await,
        StatusCode::OK
    );
    assert_eq!(fixture.supervisor.agent_count(), 0);
}

#[tokio::test]
async fn webhook_left_event_tears_the_agent_down() {
    let fixture = fixture(FakeDirectory::default());

    assert_eq!(
        post_webhook(&fixture, joined_event("demo", "alice")).await,
        StatusCode::OK
    );
    assert_eq!(fixture.supervisor.agent_count(), 1);

    // Two participants remain: the agent stays.
    assert_eq!(
        post_webhook(&fixture, left_event("demo", 2)).await,
        StatusCode::OK
    );
    assert_eq!(fixture.supervisor.agent_count(), 1);

    // Only the bot remains: the agent leaves.
    assert_eq!(
        post_webhook(&fixture, left_event("demo", 1)).await,
        StatusCode::OK
    );
    assert_eq!(fixture.supervisor.agent_count(), 0);
}

#[tokio::test]
async fn concurrent_joins_create_at_most_one_agent_per_room() {
    let fixture = fixture(
        FakeDirectory::default()
            .with_room("alpha")
            .with_room("beta")
            .with_room("gamma"),
    );

    let mut joins = Vec::new();
    for room in ["alpha", "beta", "gamma"] {
        for _ in 0..4 {
            let supervisor = fixture.supervisor.clone();
            joins.push(tokio::spawn(async move {
                supervisor.join_room(room).await
            }));
        }
    }
    for join in joins {
        join.await.unwrap().unwrap();
    }

    assert_eq!(fixture.supervisor.agent_count(), 3);
}
