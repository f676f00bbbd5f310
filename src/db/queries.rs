use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, Transaction};
use std::collections::HashMap;

use crate::db::store::DocumentStore;
use crate::error::{StoreError, StoreResult};
use crate::models::{
    DocumentKind, GoodsReceipt, Invoice, LineItemMatch, LineStatus, PricedLine, PurchaseOrder,
    ReceiptLine, ResultParts, VerificationResult,
};

/// 发票主表
#[derive(Debug, Clone, FromRow)]
struct InvoiceRow {
    id: String,
    invoice_number: String,
    vendor_name: String,
    invoice_date: NaiveDate,
    total_amount: BigDecimal,
    created_at: DateTime<Utc>,
}

/// 采购订单主表
#[derive(Debug, Clone, FromRow)]
struct PurchaseOrderRow {
    id: String,
    po_number: String,
    vendor_name: String,
    po_date: NaiveDate,
    total_amount: BigDecimal,
    created_at: DateTime<Utc>,
}

/// 收货单主表
#[derive(Debug, Clone, FromRow)]
struct GoodsReceiptRow {
    id: String,
    gr_number: String,
    po_number: String,
    vendor_name: String,
    receipt_date: NaiveDate,
    created_at: DateTime<Utc>,
}

/// 单据明细表 (三类单据共用)
#[derive(Debug, Clone, FromRow)]
struct LineRow {
    document_id: String,
    description: String,
    quantity: BigDecimal,
    unit_price: Option<BigDecimal>,
    amount: Option<BigDecimal>,
}

/// 核验结果主表
#[derive(Debug, Clone, FromRow)]
struct ResultRow {
    id: String,
    invoice_id: String,
    po_id: String,
    gr_id: String,
    total_variance: BigDecimal,
    price_variance: BigDecimal,
    quantity_variance: BigDecimal,
    declared_total_delta: BigDecimal,
    created_at: DateTime<Utc>,
}

/// 行匹配结果表
#[derive(Debug, Clone, FromRow)]
struct MatchRow {
    result_id: String,
    description: String,
    invoice_qty: Option<BigDecimal>,
    invoice_price: Option<BigDecimal>,
    invoice_amount: Option<BigDecimal>,
    po_qty: Option<BigDecimal>,
    po_price: Option<BigDecimal>,
    po_amount: Option<BigDecimal>,
    gr_qty: Option<BigDecimal>,
    quantity_delta: Option<BigDecimal>,
    price_delta: Option<BigDecimal>,
    quantity_ratio: Option<BigDecimal>,
    price_ratio: Option<BigDecimal>,
    amount_variance: BigDecimal,
    amount_mismatch: bool,
    status: String,
}

/// PostgreSQL 单据库
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 查询若干单据的明细, 按单据分组并保持行号顺序
    async fn lines_for(
        &self,
        kind: DocumentKind,
        document_ids: &[String],
    ) -> Result<HashMap<String, Vec<LineRow>>, sqlx::Error> {
        let rows = sqlx::query_as::<_, LineRow>(
            r#"
            SELECT document_id, description, quantity, unit_price, amount
            FROM tw_document_line
            WHERE document_kind = $1
              AND document_id = ANY($2)
            ORDER BY document_id, line_no
            "#,
        )
        .bind(kind.as_str())
        .bind(document_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut grouped: HashMap<String, Vec<LineRow>> = HashMap::new();
        for row in rows {
            grouped.entry(row.document_id.clone()).or_default().push(row);
        }
        Ok(grouped)
    }
}

fn priced_lines(kind: DocumentKind, id: &str, rows: Vec<LineRow>) -> StoreResult<Vec<PricedLine>> {
    rows.into_iter()
        .map(|row| {
            let unit_price = row.unit_price.ok_or_else(|| StoreError::Corrupt {
                kind,
                id: id.to_string(),
                reason: format!("line '{}' has no unit price", row.description),
            })?;
            Ok(PricedLine {
                description: row.description,
                quantity: row.quantity,
                unit_price,
                amount: row.amount,
            })
        })
        .collect()
}

fn receipt_lines(rows: Vec<LineRow>) -> Vec<ReceiptLine> {
    rows.into_iter()
        .map(|row| ReceiptLine {
            description: row.description,
            quantity: row.quantity,
        })
        .collect()
}

fn invoice_from_row(row: InvoiceRow, lines: Vec<LineRow>) -> StoreResult<Invoice> {
    let line_items = priced_lines(DocumentKind::Invoice, &row.id, lines)?;
    Ok(Invoice {
        id: row.id,
        invoice_number: row.invoice_number,
        vendor_name: row.vendor_name,
        invoice_date: row.invoice_date,
        total_amount: row.total_amount,
        line_items,
        created_at: row.created_at,
    })
}

fn purchase_order_from_row(row: PurchaseOrderRow, lines: Vec<LineRow>) -> StoreResult<PurchaseOrder> {
    let line_items = priced_lines(DocumentKind::PurchaseOrder, &row.id, lines)?;
    Ok(PurchaseOrder {
        id: row.id,
        po_number: row.po_number,
        vendor_name: row.vendor_name,
        po_date: row.po_date,
        total_amount: row.total_amount,
        line_items,
        created_at: row.created_at,
    })
}

fn goods_receipt_from_row(row: GoodsReceiptRow, lines: Vec<LineRow>) -> GoodsReceipt {
    GoodsReceipt {
        id: row.id,
        gr_number: row.gr_number,
        po_number: row.po_number,
        vendor_name: row.vendor_name,
        receipt_date: row.receipt_date,
        line_items: receipt_lines(lines),
        created_at: row.created_at,
    }
}

fn match_from_row(row: MatchRow) -> StoreResult<LineItemMatch> {
    let status: LineStatus = row.status.parse().map_err(|reason| StoreError::CorruptResult {
        id: row.result_id.clone(),
        reason,
    })?;
    Ok(LineItemMatch {
        description: row.description,
        invoice_qty: row.invoice_qty,
        invoice_price: row.invoice_price,
        invoice_amount: row.invoice_amount,
        po_qty: row.po_qty,
        po_price: row.po_price,
        po_amount: row.po_amount,
        gr_qty: row.gr_qty,
        quantity_delta: row.quantity_delta,
        price_delta: row.price_delta,
        quantity_ratio: row.quantity_ratio,
        price_ratio: row.price_ratio,
        amount_variance: row.amount_variance,
        amount_mismatch: row.amount_mismatch,
        status,
    })
}

/// 批量插入明细行
async fn insert_lines<'a, I>(
    tx: &mut Transaction<'_, Postgres>,
    kind: DocumentKind,
    document_id: &str,
    lines: I,
) -> Result<(), sqlx::Error>
where
    I: IntoIterator<Item = (&'a str, &'a BigDecimal, Option<&'a BigDecimal>, Option<&'a BigDecimal>)>,
{
    let rows: Vec<_> = lines.into_iter().enumerate().collect();
    if rows.is_empty() {
        return Ok(());
    }

    let mut query_builder = QueryBuilder::<Postgres>::new(
        "INSERT INTO tw_document_line (
            document_kind, document_id, line_no,
            description, quantity, unit_price, amount
        ) ",
    );
    query_builder.push_values(rows, |mut b, (idx, (description, quantity, unit_price, amount))| {
        b.push_bind(kind.as_str())
            .push_bind(document_id.to_string())
            .push_bind(idx as i32 + 1)
            .push_bind(description.to_string())
            .push_bind(quantity.clone())
            .push_bind(unit_price.cloned())
            .push_bind(amount.cloned());
    });
    query_builder.build().execute(&mut **tx).await?;
    Ok(())
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn get_invoice(&self, id: &str) -> StoreResult<Option<Invoice>> {
        let row = sqlx::query_as::<_, InvoiceRow>(
            r#"
            SELECT id, invoice_number, vendor_name, invoice_date, total_amount, created_at
            FROM tw_invoice
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut lines = self.lines_for(DocumentKind::Invoice, &[row.id.clone()]).await?;
        let lines = lines.remove(&row.id).unwrap_or_default();
        invoice_from_row(row, lines).map(Some)
    }

    async fn get_purchase_order(&self, id: &str) -> StoreResult<Option<PurchaseOrder>> {
        let row = sqlx::query_as::<_, PurchaseOrderRow>(
            r#"
            SELECT id, po_number, vendor_name, po_date, total_amount, created_at
            FROM tw_purchase_order
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut lines = self.lines_for(DocumentKind::PurchaseOrder, &[row.id.clone()]).await?;
        let lines = lines.remove(&row.id).unwrap_or_default();
        purchase_order_from_row(row, lines).map(Some)
    }

    async fn get_goods_receipt(&self, id: &str) -> StoreResult<Option<GoodsReceipt>> {
        let row = sqlx::query_as::<_, GoodsReceiptRow>(
            r#"
            SELECT id, gr_number, po_number, vendor_name, receipt_date, created_at
            FROM tw_goods_receipt
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut lines = self.lines_for(DocumentKind::GoodsReceipt, &[row.id.clone()]).await?;
        let lines = lines.remove(&row.id).unwrap_or_default();
        Ok(Some(goods_receipt_from_row(row, lines)))
    }

    async fn append_result(&self, result: &VerificationResult) -> StoreResult<()> {
        tracing::debug!(
            "Appending verification result {} ({} line matches)",
            result.id,
            result.line_item_matches.len()
        );
        let start_time = std::time::Instant::now();

        let mut tx = self.pool.begin().await?;

        // 同一结果重复追加 (重试) 不报错
        let inserted = sqlx::query(
            r#"
            INSERT INTO tw_verification_result (
                id, invoice_id, po_id, gr_id,
                total_variance, price_variance, quantity_variance, declared_total_delta,
                overall_status, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&result.id)
        .bind(&result.invoice_id)
        .bind(&result.po_id)
        .bind(&result.gr_id)
        .bind(result.total_variance.clone())
        .bind(result.price_variance.clone())
        .bind(result.quantity_variance.clone())
        .bind(result.declared_total_delta.clone())
        .bind(result.overall_status().as_str())
        .bind(result.created_at)
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            tx.rollback().await?;
            tracing::info!("Verification result {} already stored", result.id);
            return Ok(());
        }

        if !result.line_item_matches.is_empty() {
            let mut query_builder = QueryBuilder::<Postgres>::new(
                "INSERT INTO tw_line_item_match (
                    result_id, seq, description,
                    invoice_qty, invoice_price, invoice_amount,
                    po_qty, po_price, po_amount, gr_qty,
                    quantity_delta, price_delta, quantity_ratio, price_ratio,
                    amount_variance, amount_mismatch, status
                ) ",
            );
            query_builder.push_values(
                result.line_item_matches.iter().enumerate(),
                |mut b, (idx, m)| {
                    b.push_bind(&result.id)
                        .push_bind(idx as i32)
                        .push_bind(&m.description)
                        .push_bind(m.invoice_qty.clone())
                        .push_bind(m.invoice_price.clone())
                        .push_bind(m.invoice_amount.clone())
                        .push_bind(m.po_qty.clone())
                        .push_bind(m.po_price.clone())
                        .push_bind(m.po_amount.clone())
                        .push_bind(m.gr_qty.clone())
                        .push_bind(m.quantity_delta.clone())
                        .push_bind(m.price_delta.clone())
                        .push_bind(m.quantity_ratio.clone())
                        .push_bind(m.price_ratio.clone())
                        .push_bind(m.amount_variance.clone())
                        .push_bind(m.amount_mismatch)
                        .push_bind(m.status.as_str());
                },
            );
            query_builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        tracing::info!(
            "✓ Verification result {} stored, elapsed: {:?}",
            result.id,
            start_time.elapsed()
        );
        Ok(())
    }

    async fn list_results(&self) -> StoreResult<Vec<VerificationResult>> {
        let headers = sqlx::query_as::<_, ResultRow>(
            r#"
            SELECT id, invoice_id, po_id, gr_id,
                   total_variance, price_variance, quantity_variance, declared_total_delta,
                   created_at
            FROM tw_verification_result
            ORDER BY created_at DESC, id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        if headers.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = headers.iter().map(|h| h.id.clone()).collect();
        let rows = sqlx::query_as::<_, MatchRow>(
            r#"
            SELECT result_id, description,
                   invoice_qty, invoice_price, invoice_amount,
                   po_qty, po_price, po_amount, gr_qty,
                   quantity_delta, price_delta, quantity_ratio, price_ratio,
                   amount_variance, amount_mismatch, status
            FROM tw_line_item_match
            WHERE result_id = ANY($1)
            ORDER BY result_id, seq
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut matches: HashMap<String, Vec<LineItemMatch>> = HashMap::new();
        for row in rows {
            let result_id = row.result_id.clone();
            matches.entry(result_id).or_default().push(match_from_row(row)?);
        }

        // 结论由行状态重新推出
        Ok(headers
            .into_iter()
            .map(|h| {
                let line_item_matches = matches.remove(&h.id).unwrap_or_default();
                VerificationResult::assemble(ResultParts {
                    id: h.id,
                    invoice_id: h.invoice_id,
                    po_id: h.po_id,
                    gr_id: h.gr_id,
                    line_item_matches,
                    total_variance: h.total_variance,
                    price_variance: h.price_variance,
                    quantity_variance: h.quantity_variance,
                    declared_total_delta: h.declared_total_delta,
                    created_at: h.created_at,
                })
            })
            .collect())
    }

    async fn insert_invoice(&self, invoice: &Invoice) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO tw_invoice (id, invoice_number, vendor_name, invoice_date, total_amount, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&invoice.id)
        .bind(&invoice.invoice_number)
        .bind(&invoice.vendor_name)
        .bind(invoice.invoice_date)
        .bind(invoice.total_amount.clone())
        .bind(invoice.created_at)
        .execute(&mut *tx)
        .await?;
        insert_lines(
            &mut tx,
            DocumentKind::Invoice,
            &invoice.id,
            invoice.line_items.iter().map(|l| {
                (l.description.as_str(), &l.quantity, Some(&l.unit_price), l.amount.as_ref())
            }),
        )
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn insert_purchase_order(&self, po: &PurchaseOrder) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO tw_purchase_order (id, po_number, vendor_name, po_date, total_amount, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&po.id)
        .bind(&po.po_number)
        .bind(&po.vendor_name)
        .bind(po.po_date)
        .bind(po.total_amount.clone())
        .bind(po.created_at)
        .execute(&mut *tx)
        .await?;
        insert_lines(
            &mut tx,
            DocumentKind::PurchaseOrder,
            &po.id,
            po.line_items.iter().map(|l| {
                (l.description.as_str(), &l.quantity, Some(&l.unit_price), l.amount.as_ref())
            }),
        )
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn insert_goods_receipt(&self, gr: &GoodsReceipt) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO tw_goods_receipt (id, gr_number, po_number, vendor_name, receipt_date, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&gr.id)
        .bind(&gr.gr_number)
        .bind(&gr.po_number)
        .bind(&gr.vendor_name)
        .bind(gr.receipt_date)
        .bind(gr.created_at)
        .execute(&mut *tx)
        .await?;
        insert_lines(
            &mut tx,
            DocumentKind::GoodsReceipt,
            &gr.id,
            gr.line_items
                .iter()
                .map(|l| (l.description.as_str(), &l.quantity, None, None)),
        )
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn list_invoices(&self) -> StoreResult<Vec<Invoice>> {
        let rows = sqlx::query_as::<_, InvoiceRow>(
            r#"
            SELECT id, invoice_number, vendor_name, invoice_date, total_amount, created_at
            FROM tw_invoice
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
        let mut lines = self.lines_for(DocumentKind::Invoice, &ids).await?;
        rows.into_iter()
            .map(|row| {
                let row_lines = lines.remove(&row.id).unwrap_or_default();
                invoice_from_row(row, row_lines)
            })
            .collect()
    }

    async fn list_purchase_orders(&self) -> StoreResult<Vec<PurchaseOrder>> {
        let rows = sqlx::query_as::<_, PurchaseOrderRow>(
            r#"
            SELECT id, po_number, vendor_name, po_date, total_amount, created_at
            FROM tw_purchase_order
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
        let mut lines = self.lines_for(DocumentKind::PurchaseOrder, &ids).await?;
        rows.into_iter()
            .map(|row| {
                let row_lines = lines.remove(&row.id).unwrap_or_default();
                purchase_order_from_row(row, row_lines)
            })
            .collect()
    }

    async fn list_goods_receipts(&self) -> StoreResult<Vec<GoodsReceipt>> {
        let rows = sqlx::query_as::<_, GoodsReceiptRow>(
            r#"
            SELECT id, gr_number, po_number, vendor_name, receipt_date, created_at
            FROM tw_goods_receipt
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
        let mut lines = self.lines_for(DocumentKind::GoodsReceipt, &ids).await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let row_lines = lines.remove(&row.id).unwrap_or_default();
                goods_receipt_from_row(row, row_lines)
            })
            .collect())
    }
}
