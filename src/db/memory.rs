//! 内存单据库: 单据用 DashMap 保存, 核验结果为只追加列表

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::RwLock;

use crate::db::store::DocumentStore;
use crate::error::StoreResult;
use crate::models::{GoodsReceipt, Invoice, PurchaseOrder, VerificationResult};

#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    invoices: DashMap<String, Invoice>,
    purchase_orders: DashMap<String, PurchaseOrder>,
    goods_receipts: DashMap<String, GoodsReceipt>,
    results: RwLock<Vec<VerificationResult>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn result_count(&self) -> usize {
        self.results.read().map(|r| r.len()).unwrap_or_else(|e| e.into_inner().len())
    }
}

/// 按创建时间倒序
fn newest_first<T, F>(mut items: Vec<T>, created_at: F) -> Vec<T>
where
    F: Fn(&T) -> chrono::DateTime<chrono::Utc>,
{
    items.sort_by(|a, b| created_at(b).cmp(&created_at(a)));
    items
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get_invoice(&self, id: &str) -> StoreResult<Option<Invoice>> {
        Ok(self.invoices.get(id).map(|e| e.value().clone()))
    }

    async fn get_purchase_order(&self, id: &str) -> StoreResult<Option<PurchaseOrder>> {
        Ok(self.purchase_orders.get(id).map(|e| e.value().clone()))
    }

    async fn get_goods_receipt(&self, id: &str) -> StoreResult<Option<GoodsReceipt>> {
        Ok(self.goods_receipts.get(id).map(|e| e.value().clone()))
    }

    async fn append_result(&self, result: &VerificationResult) -> StoreResult<()> {
        // 锁中毒时列表本身仍然完整, 继续追加
        let mut results = self.results.write().unwrap_or_else(|e| e.into_inner());
        results.push(result.clone());
        Ok(())
    }

    async fn list_results(&self) -> StoreResult<Vec<VerificationResult>> {
        let results = self.results.read().unwrap_or_else(|e| e.into_inner());
        // 追加顺序即时间顺序, 倒序返回
        Ok(results.iter().rev().cloned().collect())
    }

    async fn insert_invoice(&self, invoice: &Invoice) -> StoreResult<()> {
        self.invoices.insert(invoice.id.clone(), invoice.clone());
        Ok(())
    }

    async fn insert_purchase_order(&self, po: &PurchaseOrder) -> StoreResult<()> {
        self.purchase_orders.insert(po.id.clone(), po.clone());
        Ok(())
    }

    async fn insert_goods_receipt(&self, gr: &GoodsReceipt) -> StoreResult<()> {
        self.goods_receipts.insert(gr.id.clone(), gr.clone());
        Ok(())
    }

    async fn list_invoices(&self) -> StoreResult<Vec<Invoice>> {
        let items = self.invoices.iter().map(|e| e.value().clone()).collect();
        Ok(newest_first(items, |i: &Invoice| i.created_at))
    }

    async fn list_purchase_orders(&self) -> StoreResult<Vec<PurchaseOrder>> {
        let items = self.purchase_orders.iter().map(|e| e.value().clone()).collect();
        Ok(newest_first(items, |p: &PurchaseOrder| p.created_at))
    }

    async fn list_goods_receipts(&self) -> StoreResult<Vec<GoodsReceipt>> {
        let items = self.goods_receipts.iter().map(|e| e.value().clone()).collect();
        Ok(newest_first(items, |g: &GoodsReceipt| g.created_at))
    }
}
