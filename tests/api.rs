use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use three_way_match::{api, MemoryDocumentStore, Tolerances, VerificationService};

fn app() -> Router {
    let store = Arc::new(MemoryDocumentStore::new());
    let service = Arc::new(VerificationService::new(store, Tolerances::default()));
    api::router(service)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}

async fn send_json(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let (status, bytes) = send(app, method, uri, body).await;
    (status, serde_json::from_slice(&bytes).unwrap())
}

/// 通过录入接口建立一组单据, 返回 (invoice_id, po_id, gr_id)
async fn create_documents(app: &Router, invoice_price: &str, received_qty: &str) -> (String, String, String) {
    let (status, po) = send_json(
        app,
        "POST",
        "/api/purchase-orders",
        Some(json!({
            "po_number": "PO-2024-001",
            "vendor_name": "Acme Fasteners",
            "po_date": "2024-02-20",
            "total_amount": "50.00",
            "line_items": [
                { "description": "Bolt M6", "quantity": "100", "unit_price": "0.50" }
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, gr) = send_json(
        app,
        "POST",
        "/api/goods-receipts",
        Some(json!({
            "gr_number": "GR-2024-001",
            "po_number": "PO-2024-001",
            "vendor_name": "Acme Fasteners",
            "receipt_date": "2024-02-28",
            "line_items": [
                { "description": "Bolt M6", "quantity": received_qty }
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, inv) = send_json(
        app,
        "POST",
        "/api/invoices",
        Some(json!({
            "invoice_number": "INV-2024-001",
            "vendor_name": "Acme Fasteners",
            "invoice_date": "2024-03-01",
            "total_amount": "50.00",
            "line_items": [
                { "description": "bolt m6 ", "quantity": "100", "unit_price": invoice_price }
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    (
        inv["id"].as_str().unwrap().to_string(),
        po["id"].as_str().unwrap().to_string(),
        gr["id"].as_str().unwrap().to_string(),
    )
}

#[tokio::test]
async fn health_check_responds_ok() {
    let (status, body) = send(&app(), "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"OK");
}

#[tokio::test]
async fn verify_returns_rounded_result() {
    let app = app();
    let (invoice_id, po_id, gr_id) = create_documents(&app, "0.50", "100").await;

    let (status, body) = send_json(
        &app,
        "POST",
        "/api/verify",
        Some(json!({ "invoice_id": invoice_id, "po_id": po_id, "gr_id": gr_id })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["overall_status"], "pass");
    assert!(body["total_variance"].is_number());
    assert!(body["price_variance"].is_number());
    assert!(body["quantity_variance"].is_number());
    assert_eq!(body["total_variance"].as_f64(), Some(0.0));
    assert_eq!(body["price_variance"].as_f64(), Some(0.0));
    assert_eq!(body["invoice_id"], invoice_id.as_str());

    let lines = body["line_item_matches"].as_array().unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["description"], "bolt m6");
    assert_eq!(lines[0]["invoice_qty"].as_f64(), Some(100.0));
    assert_eq!(lines[0]["invoice_price"].as_f64(), Some(0.5));
    assert_eq!(lines[0]["invoice_amount"].as_f64(), Some(50.0));
    assert_eq!(lines[0]["status"], "pass");
}

#[tokio::test]
async fn unknown_document_maps_to_not_found() {
    let app = app();
    let (invoice_id, _po_id, gr_id) = create_documents(&app, "0.50", "100").await;

    let (status, body) = send_json(
        &app,
        "POST",
        "/api/verify",
        Some(json!({ "invoice_id": invoice_id, "po_id": "po-missing", "gr_id": gr_id })),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["kind"], "not_found");
    assert_eq!(body["retryable"], false);
    assert!(body["message"].as_str().unwrap().contains("po-missing"));
}

#[tokio::test]
async fn intake_rejects_document_without_lines() {
    let (status, body) = send_json(
        &app(),
        "POST",
        "/api/invoices",
        Some(json!({
            "invoice_number": "INV-EMPTY",
            "vendor_name": "Acme Fasteners",
            "invoice_date": "2024-03-01",
            "total_amount": "0",
            "line_items": []
        })),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["kind"], "invalid_document");
}

#[tokio::test]
async fn batch_reports_each_request_in_order() {
    let app = app();
    let (invoice_id, po_id, gr_id) = create_documents(&app, "0.50", "80").await;

    let (status, body) = send_json(
        &app,
        "POST",
        "/api/verify/batch",
        Some(json!({
            "requests": [
                { "invoice_id": invoice_id, "po_id": po_id, "gr_id": gr_id },
                { "invoice_id": "inv-missing", "po_id": po_id, "gr_id": gr_id }
            ]
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["success"], true);
    assert_eq!(items[0]["result"]["overall_status"], "fail");
    assert_eq!(items[1]["success"], false);
    assert_eq!(items[1]["error"]["kind"], "not_found");
    assert_eq!(items[1]["request"]["invoice_id"], "inv-missing");
}

#[tokio::test]
async fn history_and_export_list_appended_results() {
    let app = app();
    let (invoice_id, po_id, gr_id) = create_documents(&app, "0.515", "100").await;
    let request = json!({ "invoice_id": invoice_id, "po_id": po_id, "gr_id": gr_id });

    let (_, first) = send_json(&app, "POST", "/api/verify", Some(request.clone())).await;
    let (_, second) = send_json(&app, "POST", "/api/verify", Some(request)).await;
    assert_eq!(first["overall_status"], "warning");

    let (status, history) = send_json(&app, "GET", "/api/verification-results", None).await;
    assert_eq!(status, StatusCode::OK);
    let history = history.as_array().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0]["id"], second["id"]);
    assert_eq!(history[1]["id"], first["id"]);

    let (status, csv) = send(&app, "GET", "/api/verification-results/export", None).await;
    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(csv).unwrap();
    let rows: Vec<&str> = text.lines().collect();
    assert_eq!(rows.len(), 3);
    assert!(rows[0].starts_with("result_id,"));
    assert!(rows[1].contains(",warning,bolt m6,"));
}

#[tokio::test]
async fn document_listings_return_created_documents() {
    let app = app();
    create_documents(&app, "0.50", "100").await;

    for uri in ["/api/invoices", "/api/purchase-orders", "/api/goods-receipts"] {
        let (status, body) = send_json(&app, "GET", uri, None).await;
        assert_eq!(status, StatusCode::OK, "{}", uri);
        assert_eq!(body.as_array().unwrap().len(), 1, "{}", uri);
    }
}

/// 与前端表单一致的载荷: 数值为 JSON 数字, 空白金额为 0, 收货行带 unit_price / amount
async fn create_from_form(
    app: &Router,
    quantity: f64,
    invoice_price: f64,
    order_price: f64,
) -> Value {
    let (status, po) = send_json(
        app,
        "POST",
        "/api/purchase-orders",
        Some(json!({
            "po_number": "PO-FORM-1",
            "vendor_name": "Acme Fasteners",
            "po_date": "2024-02-20",
            "total_amount": quantity * order_price,
            "line_items": [
                { "description": "Hex Nut", "quantity": quantity, "unit_price": order_price, "amount": 0 }
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, gr) = send_json(
        app,
        "POST",
        "/api/goods-receipts",
        Some(json!({
            "gr_number": "GR-FORM-1",
            "po_number": "PO-FORM-1",
            "vendor_name": "Acme Fasteners",
            "receipt_date": "2024-02-28",
            "line_items": [
                { "description": "Hex Nut", "quantity": quantity, "unit_price": 0, "amount": 0 }
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, inv) = send_json(
        app,
        "POST",
        "/api/invoices",
        Some(json!({
            "invoice_number": "INV-FORM-1",
            "vendor_name": "Acme Fasteners",
            "invoice_date": "2024-03-01",
            "total_amount": 0,
            "line_items": [
                { "description": "Hex Nut", "quantity": quantity, "unit_price": invoice_price, "amount": 0 }
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    json!({ "invoice_id": inv["id"], "po_id": po["id"], "gr_id": gr["id"] })
}

#[tokio::test]
async fn numeric_form_payload_verifies_to_numeric_result() {
    let app = app();
    let request = create_from_form(&app, 10.0, 10.3, 10.0).await;

    let (status, body) = send_json(&app, "POST", "/api/verify", Some(request)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["overall_status"], "warning");
    assert!(body["total_variance"].is_number());
    assert!(body["price_variance"].is_number());
    assert!(body["quantity_variance"].is_number());
    assert_eq!(body["total_variance"].as_f64(), Some(3.0));
    assert_eq!(body["price_variance"].as_f64(), Some(0.03));
    assert_eq!(body["quantity_variance"].as_f64(), Some(0.0));

    let line = &body["line_item_matches"][0];
    assert_eq!(line["status"], "warning");
    assert_eq!(line["invoice_qty"].as_f64(), Some(10.0));
    assert_eq!(line["invoice_price"].as_f64(), Some(10.3));
    assert_eq!(line["price_ratio"].as_f64(), Some(0.03));
    assert_eq!(line["amount_mismatch"], false);
}

#[tokio::test]
async fn oversized_amount_maps_to_unprocessable() {
    let app = app();
    let request = create_from_form(&app, 1_000_000_000.0, 10_000_000.0, 10_000_000.0).await;

    let (status, body) = send_json(&app, "POST", "/api/verify", Some(request)).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["kind"], "arithmetic_overflow");
    assert_eq!(body["retryable"], false);
}
