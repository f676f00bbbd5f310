//! 核验编排: 校验输入 → 行匹配 → 差异计算 → 状态分类 → 追加结果
//!
//! 每次核验都是对三张单据的纯计算, 只有结果追加会写入单据库;
//! 追加之前放弃调用不会留下任何痕迹。

use chrono::Utc;
use futures::stream::{self, StreamExt};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Tolerances;
use crate::db::DocumentStore;
use crate::error::{StoreError, StoreResult, VerifyError};
use crate::models::{
    DocumentKind, GoodsReceipt, Invoice, LineItemMatch, LineStatus, NewGoodsReceipt, NewInvoice,
    NewPurchaseOrder, PurchaseOrder, ResultParts, VerificationResult,
};
use crate::service::classifier;
use crate::service::matcher;
use crate::service::variance::{self, AnnotatedLine};

const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_BATCH_CONCURRENCY: usize = 8;

/// 核验请求: 发票、订单、收货单的标识
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyRequest {
    pub invoice_id: String,
    pub po_id: String,
    pub gr_id: String,
}

/// 已加载的三张单据
#[derive(Debug, Clone)]
pub struct DocumentTriple {
    pub invoice: Invoice,
    pub po: PurchaseOrder,
    pub gr: GoodsReceipt,
}

/// 纯计算: 校验 → 行匹配 → 差异计算 → 状态分类 → 组装结果
pub fn reconcile(
    triple: &DocumentTriple,
    tolerances: &Tolerances,
) -> Result<VerificationResult, VerifyError> {
    let DocumentTriple { invoice, po, gr } = triple;

    invoice.validate()?;
    po.validate()?;
    gr.validate()?;
    if !po.is_referenced_by(gr) {
        return Err(VerifyError::InvalidDocument {
            kind: DocumentKind::GoodsReceipt,
            id: gr.id.clone(),
            reason: format!(
                "purchase order reference '{}' does not match '{}'",
                gr.po_number, po.po_number
            ),
        });
    }

    let correlated = matcher::correlate(invoice, po, gr);
    let annotated = variance::annotate(correlated, &tolerances.amount)?;
    let document = variance::document_variance(&annotated, &invoice.total_amount)?;
    let statuses = classifier::classify(&annotated, tolerances);

    if document.declared_total_delta.abs() > tolerances.amount {
        tracing::warn!(
            "[Verify] invoice {}: declared total differs from line sum by {}",
            invoice.id,
            document.declared_total_delta
        );
    }

    let line_item_matches = annotated
        .into_iter()
        .zip(statuses)
        .map(|(line, status)| to_line_match(line, status))
        .collect();

    Ok(VerificationResult::assemble(ResultParts {
        id: uuid::Uuid::new_v4().to_string(),
        invoice_id: invoice.id.clone(),
        po_id: po.id.clone(),
        gr_id: gr.id.clone(),
        line_item_matches,
        total_variance: document.total_variance,
        price_variance: document.price_variance,
        quantity_variance: document.quantity_variance,
        declared_total_delta: document.declared_total_delta,
        created_at: Utc::now(),
    }))
}

fn to_line_match(annotated: AnnotatedLine, status: LineStatus) -> LineItemMatch {
    let AnnotatedLine { line, variance } = annotated;
    let (invoice_qty, invoice_price) = match line.invoice {
        Some(side) => (Some(side.quantity), Some(side.unit_price)),
        None => (None, None),
    };
    let (po_qty, po_price) = match line.po {
        Some(side) => (Some(side.quantity), Some(side.unit_price)),
        None => (None, None),
    };
    LineItemMatch {
        description: line.description,
        invoice_qty,
        invoice_price,
        invoice_amount: variance.invoice_amount,
        po_qty,
        po_price,
        po_amount: variance.po_amount,
        gr_qty: line.gr.map(|side| side.quantity),
        quantity_delta: variance.quantity_delta,
        price_delta: variance.price_delta,
        quantity_ratio: variance.quantity_ratio,
        price_ratio: variance.price_ratio,
        amount_variance: variance.amount_variance,
        amount_mismatch: variance.amount_mismatch,
        status,
    }
}

/// 三单匹配核验服务
pub struct VerificationService {
    store: Arc<dyn DocumentStore>,
    tolerances: Tolerances,
    store_timeout: Duration,
    batch_concurrency: usize,
}

impl VerificationService {
    pub fn new(store: Arc<dyn DocumentStore>, tolerances: Tolerances) -> Self {
        Self {
            store,
            tolerances,
            store_timeout: DEFAULT_STORE_TIMEOUT,
            batch_concurrency: DEFAULT_BATCH_CONCURRENCY,
        }
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn with_batch_concurrency(mut self, concurrency: usize) -> Self {
        self.batch_concurrency = concurrency.max(1);
        self
    }

    pub fn tolerances(&self) -> &Tolerances {
        &self.tolerances
    }

    /// 单据库调用统一加超时, 超时视为可重试的不可用
    async fn bounded<T, F>(&self, call: F) -> Result<T, VerifyError>
    where
        F: Future<Output = StoreResult<T>>,
    {
        match tokio::time::timeout(self.store_timeout, call).await {
            Ok(result) => result.map_err(|e| {
                tracing::error!("[Verify] store call failed: {}", e);
                VerifyError::from(e)
            }),
            Err(_) => {
                tracing::error!("[Verify] store call timed out (>{:?})", self.store_timeout);
                Err(StoreError::Timeout(self.store_timeout).into())
            }
        }
    }

    /// 并发加载三张单据; 任一不存在即失败, 不做部分匹配
    pub async fn load(&self, request: &VerifyRequest) -> Result<DocumentTriple, VerifyError> {
        let (invoice, po, gr) = futures::try_join!(
            self.bounded(self.store.get_invoice(&request.invoice_id)),
            self.bounded(self.store.get_purchase_order(&request.po_id)),
            self.bounded(self.store.get_goods_receipt(&request.gr_id))
        )?;

        let invoice = invoice.ok_or_else(|| VerifyError::NotFound {
            kind: DocumentKind::Invoice,
            id: request.invoice_id.clone(),
        })?;
        let po = po.ok_or_else(|| VerifyError::NotFound {
            kind: DocumentKind::PurchaseOrder,
            id: request.po_id.clone(),
        })?;
        let gr = gr.ok_or_else(|| VerifyError::NotFound {
            kind: DocumentKind::GoodsReceipt,
            id: request.gr_id.clone(),
        })?;

        Ok(DocumentTriple { invoice, po, gr })
    }

    /// 核验一组单据并追加结果
    pub async fn verify(&self, request: &VerifyRequest) -> Result<VerificationResult, VerifyError> {
        tracing::info!(
            "[Verify] start: invoice {}, po {}, gr {}",
            request.invoice_id,
            request.po_id,
            request.gr_id
        );

        let triple = self.load(request).await?;
        tracing::info!(
            "[Verify] loaded {} invoice / {} po / {} gr lines",
            triple.invoice.line_items.len(),
            triple.po.line_items.len(),
            triple.gr.line_items.len()
        );

        let result = reconcile(&triple, &self.tolerances)?;
        self.bounded(self.store.append_result(&result)).await?;

        tracing::info!(
            "[Verify] result {}: {} ({} lines, total variance {})",
            result.id,
            result.overall_status(),
            result.line_item_matches.len(),
            result.total_variance
        );
        Ok(result)
    }

    /// 批量核验: 并发加载单据, rayon 并行计算, 逐条追加; 结果顺序与请求一致
    pub async fn verify_batch(
        &self,
        requests: &[VerifyRequest],
    ) -> Result<Vec<Result<VerificationResult, VerifyError>>, VerifyError> {
        tracing::info!("[Verify] batch of {} requests", requests.len());

        let loaded: Vec<Result<DocumentTriple, VerifyError>> = stream::iter(requests.to_vec())
            .map(|request| async move { self.load(&request).await })
            .buffered(self.batch_concurrency)
            .collect()
            .await;

        let tolerances = self.tolerances.clone();
        let reconciled = tokio::task::spawn_blocking(move || {
            loaded
                .into_par_iter()
                .map(|triple| triple.and_then(|t| reconcile(&t, &tolerances)))
                .collect::<Vec<_>>()
        })
        .await
        .map_err(|e| VerifyError::Internal(format!("batch worker failed: {}", e)))?;

        let mut outcomes = Vec::with_capacity(reconciled.len());
        for outcome in reconciled {
            let outcome = match outcome {
                Ok(result) => self
                    .bounded(self.store.append_result(&result))
                    .await
                    .map(|_| result),
                Err(e) => Err(e),
            };
            if let Err(e) = &outcome {
                tracing::warn!("[Verify] batch item failed: {}", e);
            }
            outcomes.push(outcome);
        }

        let passed = outcomes.iter().filter(|o| o.is_ok()).count();
        tracing::info!("[Verify] batch done: {}/{} verified", passed, outcomes.len());
        Ok(outcomes)
    }

    /// 历史核验结果, 最新的在前
    pub async fn history(&self) -> Result<Vec<VerificationResult>, VerifyError> {
        self.bounded(self.store.list_results()).await
    }

    pub async fn create_invoice(&self, new: NewInvoice) -> Result<Invoice, VerifyError> {
        let invoice = new.into_invoice();
        invoice.validate()?;
        self.bounded(self.store.insert_invoice(&invoice)).await?;
        tracing::info!("Invoice {} ({}) created", invoice.id, invoice.invoice_number);
        Ok(invoice)
    }

    pub async fn create_purchase_order(
        &self,
        new: NewPurchaseOrder,
    ) -> Result<PurchaseOrder, VerifyError> {
        let po = new.into_purchase_order();
        po.validate()?;
        self.bounded(self.store.insert_purchase_order(&po)).await?;
        tracing::info!("Purchase order {} ({}) created", po.id, po.po_number);
        Ok(po)
    }

    pub async fn create_goods_receipt(
        &self,
        new: NewGoodsReceipt,
    ) -> Result<GoodsReceipt, VerifyError> {
        let gr = new.into_goods_receipt();
        gr.validate()?;
        self.bounded(self.store.insert_goods_receipt(&gr)).await?;
        tracing::info!("Goods receipt {} ({}) created", gr.id, gr.gr_number);
        Ok(gr)
    }

    pub async fn invoices(&self) -> Result<Vec<Invoice>, VerifyError> {
        self.bounded(self.store.list_invoices()).await
    }

    pub async fn purchase_orders(&self) -> Result<Vec<PurchaseOrder>, VerifyError> {
        self.bounded(self.store.list_purchase_orders()).await
    }

    pub async fn goods_receipts(&self) -> Result<Vec<GoodsReceipt>, VerifyError> {
        self.bounded(self.store.list_goods_receipts()).await
    }
}
