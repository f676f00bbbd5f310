use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::VerifyError;

/// 单据类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Invoice,
    PurchaseOrder,
    GoodsReceipt,
}

impl DocumentKind {
    /// 数据库中的类型标识
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Invoice => "invoice",
            DocumentKind::PurchaseOrder => "purchase_order",
            DocumentKind::GoodsReceipt => "goods_receipt",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DocumentKind::Invoice => "invoice",
            DocumentKind::PurchaseOrder => "purchase order",
            DocumentKind::GoodsReceipt => "goods receipt",
        };
        f.write_str(label)
    }
}

/// 带价格的明细行 (发票行 / 采购订单行)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricedLine {
    pub description: String,
    pub quantity: BigDecimal,
    pub unit_price: BigDecimal,
    /// 录入的行金额; 未录入时为 None
    #[serde(default)]
    pub amount: Option<BigDecimal>,
}

pub type InvoiceLine = PricedLine;
pub type OrderLine = PricedLine;

/// 收货行: 只有实收数量
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptLine {
    pub description: String,
    pub quantity: BigDecimal,
}

/// 发票
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: String,
    pub invoice_number: String,
    pub vendor_name: String,
    pub invoice_date: NaiveDate,
    pub total_amount: BigDecimal,
    pub line_items: Vec<InvoiceLine>,
    pub created_at: DateTime<Utc>,
}

/// 采购订单
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseOrder {
    pub id: String,
    pub po_number: String,
    pub vendor_name: String,
    pub po_date: NaiveDate,
    pub total_amount: BigDecimal,
    pub line_items: Vec<OrderLine>,
    pub created_at: DateTime<Utc>,
}

/// 收货单
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoodsReceipt {
    pub id: String,
    pub gr_number: String,
    /// 所引用的采购订单 (订单号或订单 ID)
    pub po_number: String,
    pub vendor_name: String,
    pub receipt_date: NaiveDate,
    pub line_items: Vec<ReceiptLine>,
    pub created_at: DateTime<Utc>,
}

/// 录入请求: 发票
#[derive(Debug, Clone, Deserialize)]
pub struct NewInvoice {
    pub invoice_number: String,
    pub vendor_name: String,
    pub invoice_date: NaiveDate,
    pub total_amount: BigDecimal,
    pub line_items: Vec<InvoiceLine>,
}

/// 录入请求: 采购订单
#[derive(Debug, Clone, Deserialize)]
pub struct NewPurchaseOrder {
    pub po_number: String,
    pub vendor_name: String,
    pub po_date: NaiveDate,
    pub total_amount: BigDecimal,
    pub line_items: Vec<OrderLine>,
}

/// 录入请求: 收货单
#[derive(Debug, Clone, Deserialize)]
pub struct NewGoodsReceipt {
    pub gr_number: String,
    pub po_number: String,
    #[serde(default)]
    pub vendor_name: String,
    pub receipt_date: NaiveDate,
    pub line_items: Vec<ReceiptLine>,
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl NewInvoice {
    pub fn into_invoice(self) -> Invoice {
        Invoice {
            id: new_id(),
            invoice_number: self.invoice_number,
            vendor_name: self.vendor_name,
            invoice_date: self.invoice_date,
            total_amount: self.total_amount,
            line_items: self.line_items,
            created_at: Utc::now(),
        }
    }
}

impl NewPurchaseOrder {
    pub fn into_purchase_order(self) -> PurchaseOrder {
        PurchaseOrder {
            id: new_id(),
            po_number: self.po_number,
            vendor_name: self.vendor_name,
            po_date: self.po_date,
            total_amount: self.total_amount,
            line_items: self.line_items,
            created_at: Utc::now(),
        }
    }
}

impl NewGoodsReceipt {
    pub fn into_goods_receipt(self) -> GoodsReceipt {
        GoodsReceipt {
            id: new_id(),
            gr_number: self.gr_number,
            po_number: self.po_number,
            vendor_name: self.vendor_name,
            receipt_date: self.receipt_date,
            line_items: self.line_items,
            created_at: Utc::now(),
        }
    }
}

/// 结构校验: 至少一行, 描述非空, 数量/单价非负
fn validate_lines<'a, I>(kind: DocumentKind, id: &str, lines: I) -> Result<(), VerifyError>
where
    I: ExactSizeIterator<Item = (&'a str, &'a BigDecimal, Option<&'a BigDecimal>)>,
{
    let invalid = |reason: String| VerifyError::InvalidDocument {
        kind,
        id: id.to_string(),
        reason,
    };

    if lines.len() == 0 {
        return Err(invalid("document has no line items".to_string()));
    }

    let zero = BigDecimal::zero();
    for (idx, (description, quantity, unit_price)) in lines.enumerate() {
        let line_no = idx + 1;
        if description.trim().is_empty() {
            return Err(invalid(format!("line {} has a blank description", line_no)));
        }
        if *quantity < zero {
            return Err(invalid(format!(
                "line {} ('{}') has negative quantity {}",
                line_no, description, quantity
            )));
        }
        if let Some(price) = unit_price {
            if *price < zero {
                return Err(invalid(format!(
                    "line {} ('{}') has negative unit price {}",
                    line_no, description, price
                )));
            }
        }
    }

    Ok(())
}

impl Invoice {
    pub fn validate(&self) -> Result<(), VerifyError> {
        validate_lines(
            DocumentKind::Invoice,
            &self.id,
            self.line_items
                .iter()
                .map(|l| (l.description.as_str(), &l.quantity, Some(&l.unit_price))),
        )
    }
}

impl PurchaseOrder {
    pub fn validate(&self) -> Result<(), VerifyError> {
        validate_lines(
            DocumentKind::PurchaseOrder,
            &self.id,
            self.line_items
                .iter()
                .map(|l| (l.description.as_str(), &l.quantity, Some(&l.unit_price))),
        )
    }

    /// 收货单引用的是否为本订单 (订单 ID 或订单号, 忽略大小写和首尾空白)
    pub fn is_referenced_by(&self, receipt: &GoodsReceipt) -> bool {
        let reference = receipt.po_number.trim();
        reference.eq_ignore_ascii_case(self.id.trim())
            || reference.eq_ignore_ascii_case(self.po_number.trim())
    }
}

impl GoodsReceipt {
    pub fn validate(&self) -> Result<(), VerifyError> {
        validate_lines(
            DocumentKind::GoodsReceipt,
            &self.id,
            self.line_items
                .iter()
                .map(|l| (l.description.as_str(), &l.quantity, None)),
        )
    }
}
