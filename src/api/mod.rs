pub mod handlers;

use crate::service::VerificationService;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

pub use handlers::*;

/// 构建路由
pub fn router(service: Arc<VerificationService>) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/api/verify", post(handlers::verify))
        .route("/api/verify/batch", post(handlers::verify_batch))
        .route("/api/verification-results", get(handlers::verification_results))
        .route(
            "/api/verification-results/export",
            get(handlers::export_results),
        )
        .route(
            "/api/invoices",
            get(handlers::list_invoices).post(handlers::create_invoice),
        )
        .route(
            "/api/purchase-orders",
            get(handlers::list_purchase_orders).post(handlers::create_purchase_order),
        )
        .route(
            "/api/goods-receipts",
            get(handlers::list_goods_receipts).post(handlers::create_goods_receipt),
        )
        .with_state(service)
}
