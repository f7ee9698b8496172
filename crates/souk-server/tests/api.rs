use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use souk_config::{
    Commerce as CommerceCfg, Config, Dialogue, Inference as InferenceCfg, Server, SessionStore,
    UserStore as UserStoreCfg,
};
use souk_contracts::{CatalogEntry, OrderFilter, OrderReceipt, OrderSummary};
use souk_server::build_app_with;
use souk_server::commerce::{Commerce, CustomerInfo, HttpCommerce};
use souk_server::inference::Inference;
use tower::util::ServiceExt;

fn unique_nanos() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time before unix epoch")
        .as_nanos()
}

fn test_config() -> Config {
    let nanos = unique_nanos();
    Config {
        server: Server {
            listen_addr: "127.0.0.1:0".to_string(),
        },
        session_store: SessionStore {
            kind: "memory".to_string(),
            sqlite_path: None,
        },
        user_store: UserStoreCfg {
            sqlite_path: std::env::temp_dir()
                .join(format!("souk-users-api-{nanos}.db"))
                .to_string_lossy()
                .to_string(),
        },
        commerce: CommerceCfg {
            base_url: "http://127.0.0.1:9/api/v1".to_string(),
            token_url: "http://127.0.0.1:9/GetAccessToken".to_string(),
            timeout_ms: 1_000,
        },
        inference: InferenceCfg {
            endpoint: "http://127.0.0.1:9/api/generate".to_string(),
            model: "test-model".to_string(),
            timeout_ms: 1_000,
        },
        dialogue: Dialogue {
            max_attempts: 3,
            similarity_threshold: 0.7,
        },
    }
}

/// Pops one canned completion per call; an exhausted script returns an empty
/// completion, which drives handlers onto their template fallbacks.
struct ScriptedInference {
    responses: tokio::sync::Mutex<VecDeque<String>>,
}

impl ScriptedInference {
    fn new(responses: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            responses: tokio::sync::Mutex::new(
                responses.iter().map(|s| s.to_string()).collect(),
            ),
        })
    }
}

#[async_trait]
impl Inference for ScriptedInference {
    async fn complete(&self, _prompt: &str) -> Result<String, String> {
        Ok(self.responses.lock().await.pop_front().unwrap_or_default())
    }
}

struct StubCommerce {
    catalog: tokio::sync::Mutex<Vec<CatalogEntry>>,
    orders: Vec<OrderSummary>,
    created: tokio::sync::Mutex<Vec<(CustomerInfo, Vec<CatalogEntry>)>>,
}

impl StubCommerce {
    fn new(catalog: Vec<CatalogEntry>, orders: Vec<OrderSummary>) -> Arc<Self> {
        Arc::new(Self {
            catalog: tokio::sync::Mutex::new(catalog),
            orders,
            created: tokio::sync::Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl Commerce for StubCommerce {
    async fn list_products(&self) -> Result<Vec<CatalogEntry>, String> {
        Ok(self.catalog.lock().await.clone())
    }

    async fn create_order(
        &self,
        customer: &CustomerInfo,
        items: &[CatalogEntry],
    ) -> Result<OrderReceipt, String> {
        self.created
            .lock()
            .await
            .push((customer.clone(), items.to_vec()));
        Ok(OrderReceipt {
            order_id: "68a1".to_string(),
            status: "pending".to_string(),
        })
    }

    async fn list_orders(
        &self,
        _counterparty_id: &str,
        filter: &OrderFilter,
    ) -> Result<Vec<OrderSummary>, String> {
        let mut orders = self.orders.clone();
        if let Some(status) = &filter.status {
            orders.retain(|o| o.status.eq_ignore_ascii_case(status));
        }
        Ok(orders)
    }
}

fn wall_lamp() -> CatalogEntry {
    CatalogEntry {
        id: "p1".to_string(),
        name: "solar interaction wall lamp".to_string(),
        price: 23.0,
        delivery_cost: 7.0,
    }
}

fn pending_lamp_order() -> OrderSummary {
    OrderSummary {
        order_id: "68a1".to_string(),
        items: vec!["solar interaction wall lamp".to_string()],
        status: "pending".to_string(),
    }
}

async fn post_message(app: &Router, counterparty_id: &str, body_text: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri("/v1/webhook")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({
                "counterparty_id": counterparty_id,
                "display_name": "Amine",
                "body": body_text,
            })
            .to_string(),
        ))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let payload = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, payload)
}

#[tokio::test]
async fn healthz_ok() {
    let app = build_app_with(
        test_config(),
        StubCommerce::new(vec![], vec![]),
        ScriptedInference::new(&[]),
    )
    .unwrap();
    let response = app
        .oneshot(
            Request::builder()
                .uri("/v1/healthz")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn greeting_turn_uses_the_generated_reply() {
    let inference = ScriptedInference::new(&[
        "**Language:** french",
        "**Intent:** greeting\n**Items:** none\n**IssueProduct:** none\n**Address:** none",
        "**Response:** Bonjour Amine !",
    ]);
    let app = build_app_with(test_config(), StubCommerce::new(vec![], vec![]), inference).unwrap();

    let (status, payload) = post_message(&app, "216000001", "bonsoir").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["reply"], "Bonjour Amine !");
    assert_eq!(payload["language"], "french");
}

#[tokio::test]
async fn gibberish_falls_back_to_a_clarification_template() {
    // Every completion is unusable, so detection keeps english, the intent
    // collapses to none, and the clarification template is the reply.
    let inference = ScriptedInference::new(&["garbage", "garbage", "garbage"]);
    let app = build_app_with(test_config(), StubCommerce::new(vec![], vec![]), inference).unwrap();

    let (status, payload) = post_message(&app, "216000002", "qwskdjqwd").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        payload["reply"],
        "Sorry, I didn’t understand your request. Could you clarify, like listing our products or checking an order?"
    );
    assert_eq!(payload["language"], "english");
}

#[tokio::test]
async fn empty_message_short_circuits_without_inference() {
    let inference = ScriptedInference::new(&["**Language:** arabic"]);
    let app = build_app_with(
        test_config(),
        StubCommerce::new(vec![], vec![]),
        inference.clone(),
    )
    .unwrap();

    let (status, payload) = post_message(&app, "216000003", "   ").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["language"], "english");
    // The scripted completion was never consumed.
    assert_eq!(inference.responses.lock().await.len(), 1);
}

#[tokio::test]
async fn order_flow_fills_the_address_slot_across_turns() {
    let commerce = StubCommerce::new(vec![wall_lamp()], vec![]);
    let inference = ScriptedInference::new(&[
        "**Language:** english",
        "**Intent:** new_order\n**Items:** wall lamp\n**IssueProduct:** none\n**Address:** none",
        "**Products:** solar interaction wall lamp",
        // Address-request and confirmation replies fall back to templates.
    ]);
    let app = build_app_with(test_config(), commerce.clone(), inference).unwrap();

    let (status, payload) = post_message(&app, "216000004", "I want to buy a wall lamp").await;
    assert_eq!(status, StatusCode::OK);
    let ask = payload["reply"].as_str().unwrap();
    assert!(ask.contains("solar interaction wall lamp"), "got: {ask}");
    assert!(ask.contains("address"), "got: {ask}");

    // The next message is consumed as the address, never re-classified.
    let (status, payload) = post_message(&app, "216000004", "12 Rue Ibn Khaldoun, Tunis").await;
    assert_eq!(status, StatusCode::OK);
    let confirmation = payload["reply"].as_str().unwrap();
    assert!(confirmation.contains("68a1"), "got: {confirmation}");
    assert!(confirmation.contains("12 Rue Ibn Khaldoun, Tunis"));

    let created = commerce.created.lock().await;
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].0.phone, "216000004");
    assert_eq!(created[0].0.address, "12 Rue Ibn Khaldoun, Tunis");
    assert_eq!(created[0].1[0].name, "solar interaction wall lamp");
}

#[tokio::test]
async fn two_item_order_keeps_both_items_through_the_address_slot() {
    let lunch_box = CatalogEntry {
        id: "p3".to_string(),
        name: "Generic Boîte Lunch Box".to_string(),
        price: 15.0,
        delivery_cost: 9.0,
    };
    let commerce = StubCommerce::new(vec![wall_lamp(), lunch_box], vec![]);
    let inference = ScriptedInference::new(&[
        "**Language:** english",
        "**Intent:** new_order\n**Items:** wall lamp,lunch box\n**IssueProduct:** none\n**Address:** none",
        "**Products:** solar interaction wall lamp,Generic Boîte Lunch Box",
    ]);
    let app = build_app_with(test_config(), commerce.clone(), inference).unwrap();

    let (_, payload) = post_message(&app, "216000014", "buy a wall lamp and a lunch box").await;
    let ask = payload["reply"].as_str().unwrap();
    assert!(ask.contains("solar interaction wall lamp"), "got: {ask}");
    assert!(ask.contains("Generic Boîte Lunch Box"), "got: {ask}");

    // A greeting-looking follow-up is still consumed as the address.
    let (_, payload) = post_message(&app, "216000014", "Hello, 12 Rue Ibn Khaldoun, Tunis").await;
    assert!(payload["reply"].as_str().unwrap().contains("68a1"));

    let created = commerce.created.lock().await;
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].1.len(), 2);
    assert_eq!(created[0].0.address, "Hello, 12 Rue Ibn Khaldoun, Tunis");
}

#[tokio::test]
async fn known_address_skips_the_address_slot() {
    let cfg = test_config();
    {
        let mut store = souk_server::users::UserStore::new(&cfg.user_store.sqlite_path).unwrap();
        store.get_or_create("216000013", "Amine").unwrap();
        store
            .update_address("216000013", "7 Avenue de Carthage, Tunis")
            .unwrap();
    }

    let commerce = StubCommerce::new(vec![wall_lamp()], vec![]);
    let inference = ScriptedInference::new(&[
        "**Language:** english",
        "**Intent:** new_order\n**Items:** wall lamp\n**IssueProduct:** none\n**Address:** none",
        "**Products:** solar interaction wall lamp",
    ]);
    let app = build_app_with(cfg, commerce.clone(), inference).unwrap();

    let (status, payload) = post_message(&app, "216000013", "buy the wall lamp").await;
    assert_eq!(status, StatusCode::OK);
    let reply = payload["reply"].as_str().unwrap();
    assert!(reply.contains("68a1"), "got: {reply}");
    assert!(reply.contains("7 Avenue de Carthage, Tunis"));
    assert_eq!(commerce.created.lock().await.len(), 1);
}

#[tokio::test]
async fn a_short_address_still_places_the_order() {
    let commerce = StubCommerce::new(vec![wall_lamp()], vec![]);
    let inference = ScriptedInference::new(&[
        "**Language:** english",
        "**Intent:** new_order\n**Items:** wall lamp\n**IssueProduct:** none\n**Address:** none",
        "**Products:** solar interaction wall lamp",
    ]);
    let app = build_app_with(test_config(), commerce.clone(), inference).unwrap();

    post_message(&app, "216000005", "buy the wall lamp").await;

    // Any non-empty message is the address, however terse.
    let (_, payload) = post_message(&app, "216000005", "Sfax").await;
    assert!(payload["reply"].as_str().unwrap().contains("68a1"));

    let created = commerce.created.lock().await;
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].0.address, "Sfax");
}

#[tokio::test]
async fn empty_message_while_awaiting_address_reprompts_for_it() {
    let commerce = StubCommerce::new(vec![wall_lamp()], vec![]);
    let inference = ScriptedInference::new(&[
        "**Language:** english",
        "**Intent:** new_order\n**Items:** wall lamp\n**IssueProduct:** none\n**Address:** none",
        "**Products:** solar interaction wall lamp",
    ]);
    let app = build_app_with(test_config(), commerce.clone(), inference).unwrap();

    post_message(&app, "216000015", "buy the wall lamp").await;

    let (_, payload) = post_message(&app, "216000015", "  ").await;
    let reply = payload["reply"].as_str().unwrap();
    assert!(reply.contains("valid address"), "got: {reply}");
    assert!(reply.contains("solar interaction wall lamp"), "got: {reply}");
    assert!(commerce.created.lock().await.is_empty());

    let (_, payload) = post_message(&app, "216000015", "Avenue Habib Bourguiba 10, Tunis").await;
    assert!(payload["reply"].as_str().unwrap().contains("68a1"));
    assert_eq!(commerce.created.lock().await.len(), 1);
}

#[tokio::test]
async fn items_gone_from_the_catalog_get_the_unavailable_reply() {
    let commerce = StubCommerce::new(vec![wall_lamp()], vec![]);
    let inference = ScriptedInference::new(&[
        "**Language:** english",
        "**Intent:** new_order\n**Items:** wall lamp\n**IssueProduct:** none\n**Address:** none",
        "**Products:** solar interaction wall lamp",
    ]);
    let app = build_app_with(test_config(), commerce.clone(), inference).unwrap();

    post_message(&app, "216000016", "buy the wall lamp").await;

    // The lamp sells out between the two turns.
    commerce.catalog.lock().await.clear();

    let (_, payload) = post_message(&app, "216000016", "12 Rue Ibn Khaldoun, Tunis").await;
    let reply = payload["reply"].as_str().unwrap();
    assert!(reply.contains("not available"), "got: {reply}");
    assert!(reply.contains("solar interaction wall lamp"), "got: {reply}");
    assert!(commerce.created.lock().await.is_empty());
}

#[tokio::test]
async fn misspelled_product_resolves_after_generation_exhausts() {
    let presse = CatalogEntry {
        id: "p2".to_string(),
        name: "Presse Agrume Silver Crest YZI-001 45W Rose".to_string(),
        price: 38.0,
        delivery_cost: 7.0,
    };
    let commerce = StubCommerce::new(vec![presse], vec![]);
    // The generator never produces an exact catalog name, so the bounded
    // loop exhausts and direct resolution handles the typo.
    let inference = ScriptedInference::new(&[
        "**Language:** french",
        "**Intent:** new_order\n**Items:** Presse Argume\n**IssueProduct:** none\n**Address:** none",
        "**Products:** Presse Argume",
        "**Products:** none",
        "**Products:** something else entirely",
    ]);
    let app = build_app_with(test_config(), commerce, inference).unwrap();

    let (status, payload) = post_message(&app, "216000006", "je veux une presse argume").await;
    assert_eq!(status, StatusCode::OK);
    assert!(payload["reply"]
        .as_str()
        .unwrap()
        .contains("Presse Agrume Silver Crest YZI-001 45W Rose"));
}

#[tokio::test]
async fn retrieve_orders_lists_matching_orders() {
    let commerce = StubCommerce::new(vec![], vec![pending_lamp_order()]);
    let inference = ScriptedInference::new(&[
        "**Language:** english",
        "**Intent:** retrieve_order\n**Items:** none\n**IssueProduct:** none\n**Address:** none",
        "```json\n{\"status\": \"pending\"}\n```",
    ]);
    let app = build_app_with(test_config(), commerce, inference).unwrap();

    let (status, payload) = post_message(&app, "216000007", "show my pending orders").await;
    assert_eq!(status, StatusCode::OK);
    let reply = payload["reply"].as_str().unwrap();
    assert!(reply.contains("Order ID: 68a1"), "got: {reply}");
    assert!(reply.contains("solar interaction wall lamp"));
}

#[tokio::test]
async fn retrieve_orders_with_no_matches_settles_without_retrying() {
    let commerce = StubCommerce::new(vec![], vec![]);
    let inference = ScriptedInference::new(&[
        "**Language:** english",
        "**Intent:** retrieve_order\n**Items:** none\n**IssueProduct:** none\n**Address:** none",
        "```json\n{}\n```",
    ]);
    let app = build_app_with(test_config(), commerce, inference.clone()).unwrap();

    let (status, payload) = post_message(&app, "216000008", "what did I order?").await;
    assert_eq!(status, StatusCode::OK);
    assert!(payload["reply"].as_str().unwrap().contains("no orders"));
    // The empty result settled the loop; no regeneration was attempted.
    assert!(inference.responses.lock().await.is_empty());
}

#[tokio::test]
async fn rejected_filters_are_regenerated_with_feedback() {
    let commerce = StubCommerce::new(vec![], vec![pending_lamp_order()]);
    let inference = ScriptedInference::new(&[
        "**Language:** english",
        "**Intent:** retrieve_order\n**Items:** none\n**IssueProduct:** none\n**Address:** none",
        "```json\n{\"status\": \"shipped\"}\n```",
        "```json\n{\"status\": \"pending\"}\n```",
    ]);
    let app = build_app_with(test_config(), commerce, inference).unwrap();

    let (_, payload) = post_message(&app, "216000009", "my shipped orders").await;
    assert!(payload["reply"].as_str().unwrap().contains("Order ID: 68a1"));
}

#[tokio::test]
async fn issue_for_an_ordered_product_records_a_claim() {
    let commerce = StubCommerce::new(vec![], vec![pending_lamp_order()]);
    let inference = ScriptedInference::new(&[
        "**Language:** english",
        "**Intent:** report_issue\n**Items:** none\n**IssueProduct:** wall lamp\n**Address:** none",
        "**Category:** defective",
    ]);
    let app = build_app_with(test_config(), commerce, inference).unwrap();

    let (status, payload) = post_message(&app, "216000010", "my wall lamp stopped working").await;
    assert_eq!(status, StatusCode::OK);
    assert!(payload["reply"].as_str().unwrap().contains("iss1"));
}

#[tokio::test]
async fn issue_for_an_unordered_product_is_refused() {
    let commerce = StubCommerce::new(vec![], vec![pending_lamp_order()]);
    let inference = ScriptedInference::new(&[
        "**Language:** english",
        "**Intent:** report_issue\n**Items:** none\n**IssueProduct:** teapot\n**Address:** none",
    ]);
    let app = build_app_with(test_config(), commerce, inference).unwrap();

    let (_, payload) = post_message(&app, "216000011", "my teapot is broken").await;
    let reply = payload["reply"].as_str().unwrap();
    assert!(reply.contains("teapot"), "got: {reply}");
    assert!(reply.contains("haven’t ordered"), "got: {reply}");
}

#[tokio::test]
async fn webhook_rejects_unknown_fields() {
    let app = build_app_with(
        test_config(),
        StubCommerce::new(vec![], vec![]),
        ScriptedInference::new(&[]),
    )
    .unwrap();
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/webhook")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({"counterparty_id": "216000012", "body": "hi", "extra": 1}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn http_commerce_refreshes_the_token_once_on_401() {
    let issued = Arc::new(AtomicUsize::new(0));

    let issued_for_token = issued.clone();
    let token_route = post(move || {
        let issued = issued_for_token.clone();
        async move {
            let n = issued.fetch_add(1, Ordering::SeqCst) + 1;
            Json(json!({ "access_token": format!("token-{n}") }))
        }
    });
    // The first issued token is always rejected, so the client must refresh
    // exactly once and retry with the second.
    let products_route = get(|headers: HeaderMap| async move {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if auth != "Bearer token-2" {
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "success": false, "message": "unauthorized" })),
            );
        }
        (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": [
                    { "_id": "p1", "name": "solar interaction wall lamp", "price": 23.0, "deliveryCost": 7.0 }
                ]
            })),
        )
    });
    let stub = Router::new()
        .route("/GetAccessToken", token_route)
        .route("/api/v1/products", products_route);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, stub).await.unwrap();
    });

    let cfg = CommerceCfg {
        base_url: format!("http://{addr}/api/v1"),
        token_url: format!("http://{addr}/GetAccessToken"),
        timeout_ms: 2_000,
    };
    let commerce = HttpCommerce::new(&cfg).unwrap();
    let products = commerce.list_products().await.unwrap();

    assert_eq!(products.len(), 1);
    assert_eq!(products[0].name, "solar interaction wall lamp");
    assert_eq!(issued.load(Ordering::SeqCst), 2);
}
