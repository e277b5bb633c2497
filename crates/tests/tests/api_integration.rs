use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use oficina_agents::{MaintenanceAgent, DEFAULT_PAYMENT_LINK_BASE};
use oficina_api::{build_app, AppConfig};
use oficina_core::{Attachment, InboundMessage, IntentExtractor};
use oficina_observability::AppMetrics;
use oficina_storage::Store;
use serde_json::json;
use tower::ServiceExt;

async fn app() -> Router {
    build_app(&AppConfig::default())
        .await
        .expect("app should build")
}

fn json_message(body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/v1/messages")
        .header("content-type", "application/json")
        .header("x-api-key", "dev-oficina-key")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn webhook_form(body: &'static str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/webhook/whatsapp")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from(body))
        .unwrap()
}

async fn body_json(app: &Router, request: Request<Body>) -> serde_json::Value {
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn health_is_public() {
    let response = app()
        .await
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(parsed["status"], "ok");
    assert_eq!(parsed["store"], "memory");
}

#[tokio::test]
async fn messages_require_api_key() {
    let request = Request::builder()
        .method("POST")
        .uri("/v1/messages")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "text": "troca de oleo yale" }).to_string()))
        .unwrap();

    let response = app().await.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn registered_procedure_comes_back_with_photos() {
    let app = app().await;

    let registered = body_json(
        &app,
        json_message(json!({
            "sender": "whatsapp:+5511999990000",
            "text": "troca de rolamento RRE160HCC Toyota",
            "attachments": [
                { "url": "https://media.example/a.jpg", "content_type": "image/jpeg" },
                { "url": "https://media.example/b.png", "content_type": "image/png" }
            ]
        })),
    )
    .await;
    assert_eq!(registered["kind"], "registration");

    let found = body_json(
        &app,
        json_message(json!({ "text": "como fazer troca de rolamento RRE160HCC toyota" })),
    )
    .await;
    assert_eq!(found["kind"], "query");

    let segments = found["segments"].as_array().unwrap();
    assert_eq!(segments[0]["type"], "text");
    assert!(segments[0]["body"]
        .as_str()
        .unwrap()
        .contains("troca de rolamento"));
    assert_eq!(segments[1]["url"], "https://media.example/a.jpg");
    assert_eq!(segments[2]["url"], "https://media.example/b.png");
}

#[tokio::test]
async fn empty_message_gets_usage_hint() {
    let app = app().await;
    let reply = body_json(&app, json_message(json!({ "text": "" }))).await;

    assert_eq!(reply["kind"], "unknown");
    assert!(reply["segments"][0]["body"]
        .as_str()
        .unwrap()
        .contains("troca de rolamento RRE160HCC Toyota"));
}

#[tokio::test]
async fn whatsapp_webhook_registers_and_answers_with_twiml() {
    let app = app().await;

    let registration = app
        .clone()
        .oneshot(webhook_form(
            "From=whatsapp%3A%2B5511999990000&Body=troca+de+correia+RRE160HCC+toyota\
             &NumMedia=1&MediaUrl0=https%3A%2F%2Fmedia.example%2F1.jpg&MediaContentType0=image%2Fjpeg",
        ))
        .await
        .unwrap();
    assert_eq!(registration.status(), StatusCode::OK);
    assert_eq!(
        registration.headers()["content-type"],
        "text/xml; charset=utf-8"
    );
    let body = to_bytes(registration.into_body(), usize::MAX).await.unwrap();
    let twiml = String::from_utf8(body.to_vec()).unwrap();
    assert!(twiml.contains("Procedimento registrado: troca de correia"));

    let query = app
        .oneshot(webhook_form(
            "From=whatsapp%3A%2B5511999990000&Body=como+faz+troca+de+correia+RRE160HCC+toyota%3F&NumMedia=0",
        ))
        .await
        .unwrap();
    let body = to_bytes(query.into_body(), usize::MAX).await.unwrap();
    let twiml = String::from_utf8(body.to_vec()).unwrap();

    assert!(twiml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response>"));
    assert!(twiml.contains("<Media>https://media.example/1.jpg</Media>"));
}

#[tokio::test]
async fn finance_expense_shows_up_in_balance() {
    let app = app().await;
    let sender = "whatsapp:+5511977776666";

    let expense = body_json(
        &app,
        json_message(json!({ "sender": sender, "text": "gastei 35,90 no mercado" })),
    )
    .await;
    assert_eq!(expense["kind"], "finance_expense");

    let summary = body_json(&app, json_message(json!({ "sender": sender, "text": "saldo" }))).await;
    assert_eq!(summary["kind"], "finance_summary");
    let text = summary["segments"][0]["body"].as_str().unwrap();
    assert!(text.contains("Despesas: R$ 35,90"));
    assert!(text.contains("- mercado: R$ 35,90"));
}

#[tokio::test]
async fn agent_persists_through_sqlite_store() -> anyhow::Result<()> {
    let store = Store::sqlite("sqlite::memory:").await?;
    let agent = MaintenanceAgent::new(
        IntentExtractor::reference(),
        Arc::new(store),
        AppMetrics::shared(),
        DEFAULT_PAYMENT_LINK_BASE,
    );

    let registration = InboundMessage::text("revisao preventiva CPCD25 heli")
        .from_sender("whatsapp:+5511912345678")
        .with_attachment(Attachment::image("https://media.example/heli.jpg"));
    agent.handle_message(registration).await?;

    let handled = agent
        .handle_message(InboundMessage::text("Revisão preventiva heli"))
        .await?;
    assert_eq!(handled.kind, "query");
    assert_eq!(handled.reply.media_urls(), vec!["https://media.example/heli.jpg"]);
    Ok(())
}
