use crate::db::export_to_csv;
use crate::error::VerifyError;
use crate::models::{NewGoodsReceipt, NewInvoice, NewPurchaseOrder, VerificationResult};
use crate::service::{VerificationService, VerifyRequest};
use axum::{
    extract::{Json, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// 错误响应体
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub kind: &'static str,
    pub message: String,
    pub retryable: bool,
}

impl From<&VerifyError> for ErrorResponse {
    fn from(err: &VerifyError) -> Self {
        Self {
            success: false,
            kind: err.kind(),
            message: err.to_string(),
            retryable: err.is_retryable(),
        }
    }
}

fn status_for(err: &VerifyError) -> StatusCode {
    match err {
        VerifyError::NotFound { .. } => StatusCode::NOT_FOUND,
        VerifyError::InvalidDocument { .. } | VerifyError::ArithmeticOverflow { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        VerifyError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        VerifyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: &VerifyError) -> Response {
    (status_for(err), Json(ErrorResponse::from(err))).into_response()
}

/// 批量核验请求体
#[derive(Debug, Deserialize)]
pub struct BatchVerifyRequest {
    pub requests: Vec<VerifyRequest>,
}

/// 批量核验中单个请求的结果
#[derive(Debug, Serialize)]
pub struct BatchItem {
    pub request: VerifyRequest,
    pub success: bool,
    pub result: Option<VerificationResult>,
    pub error: Option<ErrorResponse>,
}

/// 批量核验响应体
#[derive(Debug, Serialize)]
pub struct BatchVerifyResponse {
    pub success: bool,
    pub message: String,
    pub items: Vec<BatchItem>,
}

/// 健康检查
pub async fn health_check() -> &'static str {
    "OK"
}

/// 三单匹配核验
pub async fn verify(
    State(service): State<Arc<VerificationService>>,
    Json(req): Json<VerifyRequest>,
) -> Response {
    match service.verify(&req).await {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(e) => {
            tracing::warn!("Verification of {:?} failed: {}", req, e);
            error_response(&e)
        }
    }
}

/// 批量核验, 单个请求失败不影响其他请求
pub async fn verify_batch(
    State(service): State<Arc<VerificationService>>,
    Json(req): Json<BatchVerifyRequest>,
) -> Response {
    match service.verify_batch(&req.requests).await {
        Ok(outcomes) => {
            let items: Vec<BatchItem> = req
                .requests
                .into_iter()
                .zip(outcomes)
                .map(|(request, outcome)| match outcome {
                    Ok(result) => BatchItem {
                        request,
                        success: true,
                        result: Some(result),
                        error: None,
                    },
                    Err(e) => BatchItem {
                        request,
                        success: false,
                        result: None,
                        error: Some(ErrorResponse::from(&e)),
                    },
                })
                .collect();
            let verified = items.iter().filter(|i| i.success).count();
            let response = BatchVerifyResponse {
                success: verified == items.len(),
                message: format!("Verified {} of {} requests", verified, items.len()),
                items,
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => error_response(&e),
    }
}

/// 历史核验结果, 最新的在前
pub async fn verification_results(State(service): State<Arc<VerificationService>>) -> Response {
    match service.history().await {
        Ok(results) => (StatusCode::OK, Json(results)).into_response(),
        Err(e) => error_response(&e),
    }
}

/// 导出历史核验结果为 CSV
pub async fn export_results(State(service): State<Arc<VerificationService>>) -> Response {
    let results = match service.history().await {
        Ok(results) => results,
        Err(e) => return error_response(&e),
    };

    let mut body = Vec::new();
    if let Err(e) = export_to_csv(&results, &mut body) {
        tracing::error!("CSV export failed: {}", e);
        return error_response(&VerifyError::Internal(format!("csv export failed: {}", e)));
    }

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/csv; charset=utf-8")],
        body,
    )
        .into_response()
}

pub async fn create_invoice(
    State(service): State<Arc<VerificationService>>,
    Json(new): Json<NewInvoice>,
) -> Response {
    match service.create_invoice(new).await {
        Ok(invoice) => (StatusCode::CREATED, Json(invoice)).into_response(),
        Err(e) => error_response(&e),
    }
}

pub async fn list_invoices(State(service): State<Arc<VerificationService>>) -> Response {
    match service.invoices().await {
        Ok(invoices) => (StatusCode::OK, Json(invoices)).into_response(),
        Err(e) => error_response(&e),
    }
}

pub async fn create_purchase_order(
    State(service): State<Arc<VerificationService>>,
    Json(new): Json<NewPurchaseOrder>,
) -> Response {
    match service.create_purchase_order(new).await {
        Ok(po) => (StatusCode::CREATED, Json(po)).into_response(),
        Err(e) => error_response(&e),
    }
}

pub async fn list_purchase_orders(State(service): State<Arc<VerificationService>>) -> Response {
    match service.purchase_orders().await {
        Ok(pos) => (StatusCode::OK, Json(pos)).into_response(),
        Err(e) => error_response(&e),
    }
}

pub async fn create_goods_receipt(
    State(service): State<Arc<VerificationService>>,
    Json(new): Json<NewGoodsReceipt>,
) -> Response {
    match service.create_goods_receipt(new).await {
        Ok(gr) => (StatusCode::CREATED, Json(gr)).into_response(),
        Err(e) => error_response(&e),
    }
}

pub async fn list_goods_receipts(State(service): State<Arc<VerificationService>>) -> Response {
    match service.goods_receipts().await {
        Ok(grs) => (StatusCode::OK, Json(grs)).into_response(),
        Err(e) => error_response(&e),
    }
}
