//! 单据库抽象
//!
//! 核验引擎只按标识读取三类单据, 并追加核验结果。结果只追加不覆盖,
//! 重试导致的重复追加只会多出一条审计记录。

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::models::{GoodsReceipt, Invoice, PurchaseOrder, VerificationResult};

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_invoice(&self, id: &str) -> StoreResult<Option<Invoice>>;

    async fn get_purchase_order(&self, id: &str) -> StoreResult<Option<PurchaseOrder>>;

    async fn get_goods_receipt(&self, id: &str) -> StoreResult<Option<GoodsReceipt>>;

    /// 追加一条核验结果 (至少一次语义)
    async fn append_result(&self, result: &VerificationResult) -> StoreResult<()>;

    /// 历史核验结果, 最新的在前
    async fn list_results(&self) -> StoreResult<Vec<VerificationResult>>;

    async fn insert_invoice(&self, invoice: &Invoice) -> StoreResult<()>;

    async fn insert_purchase_order(&self, po: &PurchaseOrder) -> StoreResult<()>;

    async fn insert_goods_receipt(&self, gr: &GoodsReceipt) -> StoreResult<()>;

    async fn list_invoices(&self) -> StoreResult<Vec<Invoice>>;

    async fn list_purchase_orders(&self) -> StoreResult<Vec<PurchaseOrder>>;

    async fn list_goods_receipts(&self) -> StoreResult<Vec<GoodsReceipt>>;
}
