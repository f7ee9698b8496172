//! HTTP ingress and turn orchestration.
//!
//! One webhook route receives channel messages; each message runs one
//! dialogue turn: load the session, detect language, classify intent (unless
//! an open slot owns the turn), dispatch to the intent handler, persist the
//! session, and hand the reply back for verbatim delivery.

pub mod commerce;
pub mod handlers;
pub mod inference;
pub mod session;
pub mod users;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use souk_config::Config;
use souk_contracts::{InboundMessage, Intent, Language, OutboundReply, PendingStep};
use souk_kernel::extract::{self, FieldKey, ParsedValue};
use souk_kernel::{prompts, replies, route_turn, Route};
use tokio::sync::Mutex;
use tracing::{info, warn};

use commerce::{Commerce, HttpCommerce};
use handlers::TurnContext;
use inference::{HttpInference, Inference};
use session::{SessionBackend, TurnLocks};
use users::UserStore;

pub async fn serve(cfg: Config) -> Result<(), String> {
    let addr: SocketAddr = cfg
        .server
        .listen_addr
        .parse()
        .map_err(|e| format!("invalid listen_addr: {e}"))?;

    let app = build_app(cfg)?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| format!("bind failed: {e}"))?;
    info!(%addr, "listening");
    axum::serve(listener, app)
        .await
        .map_err(|e| format!("serve failed: {e}"))
}

pub fn build_app(cfg: Config) -> Result<Router, String> {
    let commerce: Arc<dyn Commerce> = Arc::new(HttpCommerce::new(&cfg.commerce)?);
    let inference: Arc<dyn Inference> = Arc::new(HttpInference::new(&cfg.inference)?);
    build_app_with(cfg, commerce, inference)
}

/// Router with injected collaborators; the seam the integration tests use.
pub fn build_app_with(
    cfg: Config,
    commerce: Arc<dyn Commerce>,
    inference: Arc<dyn Inference>,
) -> Result<Router, String> {
    let state = AppState::new(cfg, commerce, inference)?;
    Ok(Router::new()
        .route("/v1/healthz", get(healthz))
        .route("/v1/webhook", post(webhook))
        .with_state(state))
}

#[derive(Clone)]
struct AppState {
    cfg: Config,
    sessions: Arc<Mutex<SessionBackend>>,
    locks: Arc<TurnLocks>,
    users: Arc<Mutex<UserStore>>,
    commerce: Arc<dyn Commerce>,
    inference: Arc<dyn Inference>,
}

impl AppState {
    fn new(
        cfg: Config,
        commerce: Arc<dyn Commerce>,
        inference: Arc<dyn Inference>,
    ) -> Result<Self, String> {
        let sessions = SessionBackend::from_config(&cfg.session_store)?;
        let users = UserStore::new(&cfg.user_store.sqlite_path)?;
        Ok(Self {
            sessions: Arc::new(Mutex::new(sessions)),
            locks: Arc::new(TurnLocks::default()),
            users: Arc::new(Mutex::new(users)),
            commerce,
            inference,
            cfg,
        })
    }

    async fn process_turn(&self, msg: InboundMessage) -> Result<OutboundReply, String> {
        if msg.counterparty_id.trim().is_empty() {
            return Err("counterparty_id is required".to_string());
        }

        // Concurrent deliveries for one counterparty run strictly in order.
        let lock = self.locks.acquire(&msg.counterparty_id).await;
        let _turn = lock.lock().await;

        let mut state = { self.sessions.lock().await.get(&msg.counterparty_id) };

        let body = msg.body.trim().to_string();
        if body.is_empty() {
            // An open address slot re-prompts for the address; otherwise an
            // empty message just asks for clarification.
            let reply = if state.pending_step == Some(PendingStep::AwaitingAddress) {
                replies::invalid_address(state.language, &state.requested_items)
            } else {
                replies::clarification(state.language)
            };
            return Ok(OutboundReply {
                reply,
                language: state.language,
            });
        }
        state.user_input = body.clone();

        // An open address slot consumes the message verbatim; detection and
        // classification are skipped so the address text is never mistaken
        // for a new request.
        if state.pending_step != Some(PendingStep::AwaitingAddress) {
            self.detect_language(&mut state, &body).await;
            self.classify(&mut state, &body).await;
        }
        let route = route_turn(state.pending_step, state.intent);

        let ctx = TurnContext {
            commerce: self.commerce.as_ref(),
            inference: self.inference.as_ref(),
            users: &self.users,
            counterparty_id: &msg.counterparty_id,
            display_name: &msg.display_name,
            max_attempts: self.cfg.dialogue.max_attempts,
            similarity_threshold: self.cfg.dialogue.similarity_threshold,
        };
        let reply = match route {
            Route::AddressCapture => handlers::address_capture(&ctx, &mut state).await,
            Route::Greeting => handlers::greeting(&ctx, &state).await,
            Route::ListProducts => handlers::list_products(&ctx, &state).await,
            Route::NewOrder => handlers::new_order(&ctx, &mut state).await,
            Route::RetrieveOrders => handlers::retrieve_orders(&ctx, &state).await,
            Route::ReportIssue => handlers::report_issue(&ctx, &state).await,
            Route::Clarify => handlers::clarify(&ctx, &state).await,
        };

        if let Err(violation) = state.check_invariants() {
            warn!(violation = %violation, "resetting inconsistent pending step");
            state.pending_step = None;
        }
        let language = state.language;
        self.sessions
            .lock()
            .await
            .save(&msg.counterparty_id, &state)?;

        Ok(OutboundReply { reply, language })
    }

    /// Language is sticky: a detection that fails or names an unsupported
    /// language keeps whatever the session already established.
    async fn detect_language(&self, state: &mut souk_contracts::ConversationState, body: &str) {
        match self
            .inference
            .complete(&prompts::language_detection(body))
            .await
        {
            Ok(raw) => {
                if let ParsedValue::Text(value) = extract::extract_field(&raw, FieldKey::Language) {
                    if let Some(language) = Language::parse(&value) {
                        state.language = language;
                    }
                }
            }
            Err(err) => warn!(error = %err, "language detection failed, keeping session language"),
        }
    }

    async fn classify(&self, state: &mut souk_contracts::ConversationState, body: &str) {
        match self
            .inference
            .complete(&prompts::intent_classification(state.language, body))
            .await
        {
            Ok(raw) => {
                state.intent = extract::intent(&raw);
                state.requested_items = extract::items(&raw, FieldKey::Items);
                state.issue_product = extract::items(&raw, FieldKey::IssueProduct)
                    .into_iter()
                    .next();
            }
            Err(err) => {
                warn!(error = %err, "intent classification failed, asking for clarification");
                state.intent = Intent::None;
                state.requested_items.clear();
                state.issue_product = None;
            }
        }
    }
}

async fn healthz() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

async fn webhook(
    State(state): State<AppState>,
    Json(msg): Json<InboundMessage>,
) -> Result<Json<OutboundReply>, (StatusCode, Json<Value>)> {
    state.process_turn(msg).await.map(Json).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": {"code":"validation_error","message": e}})),
        )
    })
}
