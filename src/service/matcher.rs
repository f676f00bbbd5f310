//! 行匹配: 以描述 (去首尾空白, 忽略大小写) 为关联键, 对三张单据的明细取并集。
//!
//! 同一单据内描述重复的行先合并 (数量、金额相加) 再关联。
//! 缺失的一方用 None 表示, 不以 0 代替。

use bigdecimal::{BigDecimal, Zero};
use indexmap::IndexMap;

use crate::models::{GoodsReceipt, Invoice, PricedLine, PurchaseOrder, ReceiptLine};

/// 发票或订单一方按描述合并后的数据
#[derive(Debug, Clone, PartialEq)]
pub struct PricedSide {
    pub quantity: BigDecimal,
    /// 有效单价: 各行单价一致时取该单价, 否则为 Σ(数量×单价) / Σ数量
    pub unit_price: BigDecimal,
    /// Σ(数量×单价), 不采信录入金额
    pub extended_amount: BigDecimal,
    /// Σ|录入金额 - 数量×单价|, 只统计录入了非零金额的行
    pub recorded_deviation: BigDecimal,
    pub line_count: usize,
}

/// 收货一方按描述合并后的数据
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiptSide {
    pub quantity: BigDecimal,
    pub line_count: usize,
}

/// 一个描述在三方的关联结果
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelatedLine {
    /// 归一化后的关联键
    pub key: String,
    /// 首次出现时的描述原文 (去首尾空白)
    pub description: String,
    pub invoice: Option<PricedSide>,
    pub po: Option<PricedSide>,
    pub gr: Option<ReceiptSide>,
}

impl CorrelatedLine {
    fn new(key: String, description: &str) -> Self {
        Self {
            key,
            description: description.trim().to_string(),
            invoice: None,
            po: None,
            gr: None,
        }
    }
}

/// 关联键: 去首尾空白后转小写
pub fn correlation_key(description: &str) -> String {
    description.trim().to_lowercase()
}

#[derive(Debug)]
struct PricedAccumulator {
    quantity: BigDecimal,
    extended_amount: BigDecimal,
    recorded_deviation: BigDecimal,
    first_price: BigDecimal,
    uniform_price: bool,
    line_count: usize,
}

impl PricedAccumulator {
    fn new(line: &PricedLine) -> Self {
        Self {
            quantity: BigDecimal::zero(),
            extended_amount: BigDecimal::zero(),
            recorded_deviation: BigDecimal::zero(),
            first_price: line.unit_price.clone(),
            uniform_price: true,
            line_count: 0,
        }
    }

    fn add(&mut self, line: &PricedLine) {
        let extended = &line.quantity * &line.unit_price;
        // 录入金额为 0 视为未录入
        if let Some(recorded) = line.amount.as_ref().filter(|a| !a.is_zero()) {
            self.recorded_deviation += (recorded - &extended).abs();
        }
        if line.unit_price != self.first_price {
            self.uniform_price = false;
        }
        self.quantity += &line.quantity;
        self.extended_amount += extended;
        self.line_count += 1;
    }

    fn finish(self) -> PricedSide {
        let unit_price = if self.uniform_price || self.quantity.is_zero() {
            self.first_price
        } else {
            &self.extended_amount / &self.quantity
        };
        PricedSide {
            quantity: self.quantity,
            unit_price,
            extended_amount: self.extended_amount,
            recorded_deviation: self.recorded_deviation,
            line_count: self.line_count,
        }
    }
}

/// 按关联键合并带价格的明细, 保持首次出现顺序
fn collapse_priced(lines: &[PricedLine]) -> IndexMap<String, (String, PricedSide)> {
    let mut acc: IndexMap<String, (String, PricedAccumulator)> = IndexMap::new();
    for line in lines {
        let key = correlation_key(&line.description);
        let entry = acc
            .entry(key)
            .or_insert_with(|| (line.description.trim().to_string(), PricedAccumulator::new(line)));
        entry.1.add(line);
    }
    acc.into_iter()
        .map(|(key, (description, a))| (key, (description, a.finish())))
        .collect()
}

fn collapse_receipt(lines: &[ReceiptLine]) -> IndexMap<String, (String, ReceiptSide)> {
    let mut acc: IndexMap<String, (String, ReceiptSide)> = IndexMap::new();
    for line in lines {
        let key = correlation_key(&line.description);
        let entry = acc.entry(key).or_insert_with(|| {
            (
                line.description.trim().to_string(),
                ReceiptSide {
                    quantity: BigDecimal::zero(),
                    line_count: 0,
                },
            )
        });
        entry.1.quantity += &line.quantity;
        entry.1.line_count += 1;
    }
    acc
}

/// 三方关联: 每个出现过的描述产生一条记录 (并集), 顺序为发票 → 订单 → 收货单中的首次出现顺序
pub fn correlate(
    invoice: &Invoice,
    po: &PurchaseOrder,
    gr: &GoodsReceipt,
) -> Vec<CorrelatedLine> {
    let mut lines: IndexMap<String, CorrelatedLine> = IndexMap::new();

    for (key, (description, side)) in collapse_priced(&invoice.line_items) {
        lines
            .entry(key.clone())
            .or_insert_with(|| CorrelatedLine::new(key, &description))
            .invoice = Some(side);
    }

    for (key, (description, side)) in collapse_priced(&po.line_items) {
        lines
            .entry(key.clone())
            .or_insert_with(|| CorrelatedLine::new(key, &description))
            .po = Some(side);
    }

    for (key, (description, side)) in collapse_receipt(&gr.line_items) {
        lines
            .entry(key.clone())
            .or_insert_with(|| CorrelatedLine::new(key, &description))
            .gr = Some(side);
    }

    tracing::debug!(
        "[Matcher] invoice {} / po {} / gr {}: {} correlated descriptions",
        invoice.id,
        po.id,
        gr.id,
        lines.len()
    );

    lines.into_values().collect()
}
