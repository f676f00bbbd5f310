use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::models::money;
use crate::service::classifier::rollup;

/// 行级核验状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineStatus {
    Pass,
    Warning,
    Fail,
    MissingInPo,
    MissingInGr,
}

impl LineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineStatus::Pass => "pass",
            LineStatus::Warning => "warning",
            LineStatus::Fail => "fail",
            LineStatus::MissingInPo => "missing_in_po",
            LineStatus::MissingInGr => "missing_in_gr",
        }
    }
}

impl fmt::Display for LineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LineStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pass" => Ok(LineStatus::Pass),
            "warning" => Ok(LineStatus::Warning),
            "fail" => Ok(LineStatus::Fail),
            "missing_in_po" => Ok(LineStatus::MissingInPo),
            "missing_in_gr" => Ok(LineStatus::MissingInGr),
            other => Err(format!("unknown line status '{}'", other)),
        }
    }
}

/// 单据级核验结论
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Pass,
    Warning,
    Fail,
}

impl OverallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverallStatus::Pass => "pass",
            OverallStatus::Warning => "warning",
            OverallStatus::Fail => "fail",
        }
    }
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单个描述在发票/订单/收货单三方的对照结果
///
/// None 表示该方不存在此描述的行, 与录入为 0 的数量/单价不同。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineItemMatch {
    pub description: String,
    #[serde(serialize_with = "money::serialize_opt_quantity")]
    pub invoice_qty: Option<BigDecimal>,
    #[serde(serialize_with = "money::serialize_opt_amount")]
    pub invoice_price: Option<BigDecimal>,
    #[serde(serialize_with = "money::serialize_opt_amount")]
    pub invoice_amount: Option<BigDecimal>,
    #[serde(serialize_with = "money::serialize_opt_quantity")]
    pub po_qty: Option<BigDecimal>,
    #[serde(serialize_with = "money::serialize_opt_amount")]
    pub po_price: Option<BigDecimal>,
    #[serde(serialize_with = "money::serialize_opt_amount")]
    pub po_amount: Option<BigDecimal>,
    #[serde(serialize_with = "money::serialize_opt_quantity")]
    pub gr_qty: Option<BigDecimal>,
    #[serde(serialize_with = "money::serialize_opt_quantity")]
    pub quantity_delta: Option<BigDecimal>,
    #[serde(serialize_with = "money::serialize_opt_amount")]
    pub price_delta: Option<BigDecimal>,
    #[serde(serialize_with = "money::serialize_opt_ratio")]
    pub quantity_ratio: Option<BigDecimal>,
    #[serde(serialize_with = "money::serialize_opt_ratio")]
    pub price_ratio: Option<BigDecimal>,
    /// 该行对 total_variance 的贡献
    #[serde(serialize_with = "money::serialize_amount")]
    pub amount_variance: BigDecimal,
    /// 发票录入金额与 数量×单价 不一致
    pub amount_mismatch: bool,
    pub status: LineStatus,
}

/// 一次核验运行的结果; 创建后不可变, 重复核验追加新记录
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationResult {
    pub id: String,
    pub invoice_id: String,
    pub po_id: String,
    pub gr_id: String,
    pub line_item_matches: Vec<LineItemMatch>,
    #[serde(serialize_with = "money::serialize_amount")]
    pub total_variance: BigDecimal,
    #[serde(serialize_with = "money::serialize_ratio")]
    pub price_variance: BigDecimal,
    #[serde(serialize_with = "money::serialize_ratio")]
    pub quantity_variance: BigDecimal,
    /// 发票声明总额 - 重算行金额之和
    #[serde(serialize_with = "money::serialize_amount")]
    pub declared_total_delta: BigDecimal,
    overall_status: OverallStatus,
    pub created_at: DateTime<Utc>,
}

/// 组装核验结果所需的计算产物
#[derive(Debug, Clone)]
pub struct ResultParts {
    pub id: String,
    pub invoice_id: String,
    pub po_id: String,
    pub gr_id: String,
    pub line_item_matches: Vec<LineItemMatch>,
    pub total_variance: BigDecimal,
    pub price_variance: BigDecimal,
    pub quantity_variance: BigDecimal,
    pub declared_total_delta: BigDecimal,
    pub created_at: DateTime<Utc>,
}

impl VerificationResult {
    /// 结论总是由行状态推出, 不能单独设置
    pub fn assemble(parts: ResultParts) -> Self {
        let overall_status = rollup(parts.line_item_matches.iter().map(|m| m.status));
        Self {
            id: parts.id,
            invoice_id: parts.invoice_id,
            po_id: parts.po_id,
            gr_id: parts.gr_id,
            line_item_matches: parts.line_item_matches,
            total_variance: parts.total_variance,
            price_variance: parts.price_variance,
            quantity_variance: parts.quantity_variance,
            declared_total_delta: parts.declared_total_delta,
            overall_status,
            created_at: parts.created_at,
        }
    }

    pub fn overall_status(&self) -> OverallStatus {
        self.overall_status
    }
}
