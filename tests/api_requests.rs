//! HTTP-level tests for the transfer-domain API.

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use secrecy::SecretString;
use serde_json::{Value, json};
use tower::ServiceExt;

use transfer_domain::api::create_router;
use transfer_domain::app::{AppState, ServiceSettings, TransferDomainService};
use transfer_domain::domain::{Amount, COIN, Domain, DomainAddress, Network};
use transfer_domain::test_utils::{MockConfig, MockLedger};

const DVM: DomainAddress = DomainAddress::Legacy {
    pubkey_hash: [0x3c; 20],
};
const EVM: DomainAddress = DomainAddress::Evm {
    address: [0x9d; 20],
};

fn ledger(config: MockConfig) -> Arc<MockLedger> {
    let ledger = Arc::new(MockLedger::with_config(config));
    ledger.add_wallet_address(DVM);
    ledger.add_wallet_address(EVM);
    ledger.credit(DVM, Domain::Dvm, 0, Amount::from_units(100 * COIN).unwrap());
    ledger.fund(DVM, Amount::from_units(COIN).unwrap());
    ledger
}

fn state(ledger: &Arc<MockLedger>) -> AppState {
    let service = TransferDomainService::new(
        ledger.clone(),
        ledger.clone(),
        ledger.clone(),
        ledger.clone(),
        ServiceSettings {
            network: Network::Regtest,
            ..ServiceSettings::default()
        },
    );
    AppState::new(Arc::new(service))
}

fn router(ledger: &Arc<MockLedger>) -> Router {
    create_router(Arc::new(state(ledger)))
}

fn transfer_body(amount: &str) -> Value {
    json!({
        "items": [{
            "src": {"address": DVM.render(Network::Regtest), "amount": amount, "domain": "DVM"},
            "dst": {"address": EVM.render(Network::Regtest), "amount": amount, "domain": "EVM"}
        }]
    })
}

fn post(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_encode_then_decode() {
    let ledger = ledger(MockConfig::success());
    let app = router(&ledger);

    let response = app
        .clone()
        .oneshot(post("/transfer-domain/encode", &transfer_body("3@DFI")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let script = json_body(response).await["script"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(script.starts_with("6a"));

    let response = app
        .oneshot(post("/transfer-domain/decode", &json!({ "script": script })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let item = &body["items"][0];
    assert_eq!(item["src"]["address"], DVM.render(Network::Regtest));
    assert_eq!(item["src"]["amount"], "3.00000000@0");
    assert_eq!(item["src"]["domain"], "DVM");
    assert_eq!(item["dst"]["domain"], "EVM");
}

#[tokio::test]
async fn test_decode_garbage_is_bad_request() {
    let ledger = ledger(MockConfig::success());
    let response = router(&ledger)
        .oneshot(post(
            "/transfer-domain/decode",
            &json!({ "script": "6a0444665478" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"]["type"], "malformed_payload");
}

#[tokio::test]
async fn test_validate_reports_typed_error() {
    let ledger = ledger(MockConfig::success());
    let response = router(&ledger)
        .oneshot(post("/transfer-domain/validate", &transfer_body("999@DFI")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = json_body(response).await;
    assert_eq!(body["error"]["type"], "insufficient_balance");
    assert_eq!(
        body["error"]["message"],
        "amount 100.00000000 is less than 999.00000000"
    );
    let details = &body["error"]["details"];
    assert_eq!(details["required"], "999.00000000");
    assert_eq!(details["available"], "100.00000000");
    assert_eq!(details["domain"], "DVM");
}

#[tokio::test]
async fn test_negative_amount_is_out_of_range() {
    let ledger = ledger(MockConfig::success());
    let response = router(&ledger)
        .oneshot(post("/transfer-domain/validate", &transfer_body("-1@DFI")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"]["type"], "amount_out_of_range");
}

#[tokio::test]
async fn test_empty_items_is_validation_error() {
    let ledger = ledger(MockConfig::success());
    let response = router(&ledger)
        .oneshot(post("/transfer-domain/validate", &json!({ "items": [] })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"]["type"], "validation_error");
    assert!(body["error"].get("details").is_none());
}

#[tokio::test]
async fn test_transfer_domain_broadcasts() {
    let ledger = ledger(MockConfig::success());
    let app = router(&ledger);

    let response = app
        .clone()
        .oneshot(post("/transfer-domain", &transfer_body("3@DFI")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let receipt = json_body(response).await;
    assert_eq!(receipt["txid"].as_str().unwrap().len(), 64);
    assert_eq!(ledger.submitted_transactions().len(), 1);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/balances?include_evm=true")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["balances"][0]["amount"], "100.00000000");
}

#[tokio::test]
async fn test_build_does_not_broadcast() {
    let ledger = ledger(MockConfig::success());
    let response = router(&ledger)
        .oneshot(post("/transfer-domain/build", &transfer_body("3@DFI")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let receipt = json_body(response).await;
    assert!(receipt["hex"].as_str().unwrap().starts_with("04000000"));
    assert!(ledger.submitted_transactions().is_empty());
}

#[tokio::test]
async fn test_node_rejection_keeps_raw_message() {
    let raw = "TransferDomainTx: tx must have at least one input from account owner (code 16)";
    let ledger = ledger(MockConfig::rejecting(-26, raw));
    let response = router(&ledger)
        .oneshot(post("/transfer-domain", &transfer_body("3@DFI")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = json_body(response).await;
    assert_eq!(body["error"]["type"], "not_owner");
    assert_eq!(body["error"]["message"], raw);
}

#[tokio::test]
async fn test_submit_invalid_hex() {
    let ledger = ledger(MockConfig::success());
    let response = router(&ledger)
        .oneshot(post("/transactions", &json!({ "hex": "deadbeef" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        json_body(response).await["error"]["type"],
        "invalid_transaction"
    );
}

#[tokio::test]
async fn test_api_key_required_for_post() {
    let ledger = ledger(MockConfig::success());
    let state = state(&ledger).with_api_key(SecretString::from("s3cret".to_string()));
    let app = create_router(Arc::new(state));

    let response = app
        .clone()
        .oneshot(post("/transfer-domain/encode", &transfer_body("3@DFI")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let mut request = post("/transfer-domain/encode", &transfer_body("3@DFI"));
    request
        .headers_mut()
        .insert("x-api-key", "s3cret".parse().unwrap());
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(Request::builder().uri("/balances").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_health_reflects_node() {
    let ledger = ledger(MockConfig::success());
    let app = router(&ledger);

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(json_body(response).await["status"], "healthy");

    ledger.set_healthy(false);
    let response = app
        .oneshot(
            Request::builder()
                .uri("/health/ready")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let ledger = ledger(MockConfig::success());
    let body = "x".repeat(300 * 1024);
    let request = Request::builder()
        .method("POST")
        .uri("/transfer-domain/decode")
        .header("Content-Type", "application/json")
        .header("Content-Length", body.len())
        .body(Body::from(body))
        .unwrap();
    let response = router(&ledger).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}
