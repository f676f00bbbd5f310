//! 状态分类: 行状态按严格优先级判定, 单据结论取最坏情况

use bigdecimal::BigDecimal;

use crate::config::Tolerances;
use crate::models::{LineStatus, OverallStatus};
use crate::service::variance::AnnotatedLine;

/// 行状态, 第一条命中的规则生效:
/// 1. 订单中没有 => missing_in_po
/// 2. 发票和订单都有, 收货单没有 => missing_in_gr
/// 3. |数量差异率| > 数量容差 或 |单价差异率| > 单价容差 => fail
/// 4. 任一差异率超过 epsilon => warning
/// 5. 其余 => pass
///
/// 只有订单/收货而未开票的行没有差异率, 判为 pass。
pub fn classify_line(line: &AnnotatedLine, tolerances: &Tolerances) -> LineStatus {
    let correlated = &line.line;

    if correlated.po.is_none() {
        return LineStatus::MissingInPo;
    }
    if correlated.invoice.is_some() && correlated.gr.is_none() {
        return LineStatus::MissingInGr;
    }

    let quantity = line.variance.quantity_ratio.as_ref().map(BigDecimal::abs);
    let price = line.variance.price_ratio.as_ref().map(BigDecimal::abs);

    let exceeds = |r: &Option<BigDecimal>, limit: &BigDecimal| {
        r.as_ref().map(|v| v > limit).unwrap_or(false)
    };

    if exceeds(&quantity, &tolerances.quantity) || exceeds(&price, &tolerances.price) {
        return LineStatus::Fail;
    }
    if exceeds(&quantity, &tolerances.epsilon) || exceeds(&price, &tolerances.epsilon) {
        return LineStatus::Warning;
    }
    LineStatus::Pass
}

/// 最坏情况汇总: fail / missing_in_po => fail; warning / missing_in_gr => warning; 否则 pass
pub fn rollup<I>(statuses: I) -> OverallStatus
where
    I: IntoIterator<Item = LineStatus>,
{
    let mut overall = OverallStatus::Pass;
    for status in statuses {
        match status {
            LineStatus::Fail | LineStatus::MissingInPo => return OverallStatus::Fail,
            LineStatus::Warning | LineStatus::MissingInGr => overall = OverallStatus::Warning,
            LineStatus::Pass => {}
        }
    }
    overall
}

/// 为每条差异行给出状态
pub fn classify(lines: &[AnnotatedLine], tolerances: &Tolerances) -> Vec<LineStatus> {
    lines
        .iter()
        .map(|line| {
            let status = classify_line(line, tolerances);
            tracing::debug!("[Classifier] '{}' => {}", line.line.description, status);
            status
        })
        .collect()
}
