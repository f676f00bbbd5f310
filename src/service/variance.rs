//! 差异计算: 行级数量/单价/金额差异与单据级加权汇总

use bigdecimal::{BigDecimal, One, Zero};

use crate::error::VerifyError;
use crate::models::money::ensure_representable;
use crate::service::matcher::CorrelatedLine;

/// 行级差异; 任一方缺失时相关字段为 None
#[derive(Debug, Clone, PartialEq)]
pub struct LineVariance {
    /// 发票数量 × 发票单价 (重算)
    pub invoice_amount: Option<BigDecimal>,
    /// 订单数量 × 订单单价
    pub po_amount: Option<BigDecimal>,
    /// 发票数量 - 收货数量
    pub quantity_delta: Option<BigDecimal>,
    /// 发票单价 - 订单单价
    pub price_delta: Option<BigDecimal>,
    pub quantity_ratio: Option<BigDecimal>,
    pub price_ratio: Option<BigDecimal>,
    /// 对 total_variance 的贡献
    pub amount_variance: BigDecimal,
    pub amount_mismatch: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnnotatedLine {
    pub line: CorrelatedLine,
    pub variance: LineVariance,
}

/// 单据级差异
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentVariance {
    pub total_variance: BigDecimal,
    /// 按发票行金额加权的 |单价差异率| 平均值
    pub price_variance: BigDecimal,
    /// 按发票行金额加权的 |数量差异率| 平均值
    pub quantity_variance: BigDecimal,
    pub declared_total_delta: BigDecimal,
}

/// 差异率 = delta / base; base 为 0 时: delta 非 0 记为 1 (100% 偏差), 否则为 0
pub fn ratio(delta: &BigDecimal, base: &BigDecimal) -> BigDecimal {
    if !base.is_zero() {
        delta / base
    } else if delta.is_zero() {
        BigDecimal::zero()
    } else {
        BigDecimal::one()
    }
}

/// 计算单行差异
pub fn line_variance(
    line: &CorrelatedLine,
    amount_tolerance: &BigDecimal,
) -> Result<LineVariance, VerifyError> {
    let invoice_amount = match &line.invoice {
        Some(inv) => {
            let amount = &inv.quantity * &inv.unit_price;
            ensure_representable(&amount, &format!("invoice amount of '{}'", line.description))?;
            Some(amount)
        }
        None => None,
    };

    let po_amount = match &line.po {
        Some(po) => {
            let amount = &po.quantity * &po.unit_price;
            ensure_representable(&amount, &format!("order amount of '{}'", line.description))?;
            Some(amount)
        }
        None => None,
    };

    let (quantity_delta, quantity_ratio) = match (&line.invoice, &line.gr) {
        (Some(inv), Some(gr)) => {
            let delta = &inv.quantity - &gr.quantity;
            let r = ratio(&delta, &gr.quantity);
            (Some(delta), Some(r))
        }
        _ => (None, None),
    };

    let (price_delta, price_ratio) = match (&line.invoice, &line.po) {
        (Some(inv), Some(po)) => {
            let delta = &inv.unit_price - &po.unit_price;
            let r = ratio(&delta, &po.unit_price);
            (Some(delta), Some(r))
        }
        _ => (None, None),
    };

    // 订单中没有的发票行没有比较基准, 全额计入差异
    let amount_variance = match (&invoice_amount, &po_amount) {
        (Some(inv), Some(po)) => (inv - po).abs(),
        (Some(inv), None) => inv.clone(),
        _ => BigDecimal::zero(),
    };

    let amount_mismatch = line
        .invoice
        .as_ref()
        .map(|inv| inv.recorded_deviation > *amount_tolerance)
        .unwrap_or(false);
    if amount_mismatch {
        tracing::warn!(
            "[Variance] '{}': recorded invoice amount deviates from quantity x unit price",
            line.description
        );
    }

    Ok(LineVariance {
        invoice_amount,
        po_amount,
        quantity_delta,
        price_delta,
        quantity_ratio,
        price_ratio,
        amount_variance,
        amount_mismatch,
    })
}

/// 为每条关联行附加差异
pub fn annotate(
    lines: Vec<CorrelatedLine>,
    amount_tolerance: &BigDecimal,
) -> Result<Vec<AnnotatedLine>, VerifyError> {
    lines
        .into_iter()
        .map(|line| {
            let variance = line_variance(&line, amount_tolerance)?;
            Ok(AnnotatedLine { line, variance })
        })
        .collect()
}

/// 按发票行金额加权的 |差异率| 平均值; 权重和为 0 时为 0
fn weighted_ratio<'a, I>(samples: I) -> BigDecimal
where
    I: Iterator<Item = (&'a BigDecimal, &'a BigDecimal)>,
{
    let mut weighted_sum = BigDecimal::zero();
    let mut weight_sum = BigDecimal::zero();
    for (weight, r) in samples {
        weighted_sum += weight * &r.abs();
        weight_sum += weight;
    }
    if weight_sum.is_zero() {
        BigDecimal::zero()
    } else {
        weighted_sum / weight_sum
    }
}

/// 单据级汇总
pub fn document_variance(
    lines: &[AnnotatedLine],
    declared_total: &BigDecimal,
) -> Result<DocumentVariance, VerifyError> {
    let mut total_variance = BigDecimal::zero();
    for l in lines {
        total_variance += &l.variance.amount_variance;
    }
    ensure_representable(&total_variance, "total variance")?;

    let price_variance = weighted_ratio(lines.iter().filter_map(|l| {
        match (&l.variance.invoice_amount, &l.variance.price_ratio) {
            (Some(w), Some(r)) => Some((w, r)),
            _ => None,
        }
    }));

    let quantity_variance = weighted_ratio(lines.iter().filter_map(|l| {
        match (&l.variance.invoice_amount, &l.variance.quantity_ratio) {
            (Some(w), Some(r)) => Some((w, r)),
            _ => None,
        }
    }));

    let mut invoice_line_total = BigDecimal::zero();
    for amount in lines.iter().filter_map(|l| l.variance.invoice_amount.as_ref()) {
        invoice_line_total += amount;
    }
    ensure_representable(&invoice_line_total, "invoice line total")?;
    let declared_total_delta = declared_total - &invoice_line_total;

    Ok(DocumentVariance {
        total_variance,
        price_variance,
        quantity_variance,
        declared_total_delta,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::matcher::{PricedSide, ReceiptSide};
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn side(qty: &str, price: &str) -> PricedSide {
        PricedSide {
            quantity: dec(qty),
            unit_price: dec(price),
            extended_amount: dec(qty) * dec(price),
            recorded_deviation: BigDecimal::zero(),
            line_count: 1,
        }
    }

    fn line(inv: Option<(&str, &str)>, po: Option<(&str, &str)>, gr: Option<&str>) -> CorrelatedLine {
        CorrelatedLine {
            key: "item".into(),
            description: "Item".into(),
            invoice: inv.map(|(q, p)| side(q, p)),
            po: po.map(|(q, p)| side(q, p)),
            gr: gr.map(|q| ReceiptSide {
                quantity: dec(q),
                line_count: 1,
            }),
        }
    }

    fn tol() -> BigDecimal {
        dec("0.01")
    }

    #[test]
    fn ratio_guards_zero_denominator() {
        assert_eq!(ratio(&dec("20"), &dec("80")), dec("0.25"));
        assert_eq!(ratio(&dec("5"), &dec("0")), dec("1"));
        assert_eq!(ratio(&dec("0"), &dec("0")), dec("0"));
        assert_eq!(ratio(&dec("-20"), &dec("100")), dec("-0.2"));
    }

    #[test]
    fn exact_match_has_no_variance() {
        let v = line_variance(&line(Some(("100", "0.50")), Some(("100", "0.50")), Some("100")), &tol())
            .unwrap();
        assert_eq!(v.invoice_amount, Some(dec("50")));
        assert_eq!(v.quantity_ratio, Some(dec("0")));
        assert_eq!(v.price_ratio, Some(dec("0")));
        assert_eq!(v.amount_variance, dec("0"));
        assert!(!v.amount_mismatch);
    }

    #[test]
    fn quantity_ratio_is_against_received_quantity() {
        let v = line_variance(&line(Some(("100", "5")), Some(("100", "5")), Some("80")), &tol())
            .unwrap();
        assert_eq!(v.quantity_delta, Some(dec("20")));
        assert_eq!(v.quantity_ratio, Some(dec("0.25")));
    }

    #[test]
    fn price_ratio_is_against_order_price() {
        let v = line_variance(&line(Some(("10", "10.30")), Some(("10", "10.00")), Some("10")), &tol())
            .unwrap();
        assert_eq!(v.price_delta, Some(dec("0.30")));
        assert_eq!(v.price_ratio, Some(dec("0.03")));
        assert_eq!(v.amount_variance, dec("3"));
    }

    #[test]
    fn missing_receipt_has_no_quantity_ratio() {
        let v = line_variance(&line(Some(("5", "1")), Some(("5", "1")), None), &tol()).unwrap();
        assert_eq!(v.quantity_delta, None);
        assert_eq!(v.quantity_ratio, None);
    }

    #[test]
    fn zero_receipt_counts_as_full_deviation() {
        let v = line_variance(&line(Some(("5", "1")), Some(("5", "1")), Some("0")), &tol()).unwrap();
        assert_eq!(v.quantity_ratio, Some(dec("1")));
    }

    #[test]
    fn invoice_line_missing_from_order_counts_in_full() {
        let v = line_variance(&line(Some(("1", "75")), None, None), &tol()).unwrap();
        assert_eq!(v.amount_variance, dec("75"));
        assert_eq!(v.price_ratio, None);
    }

    #[test]
    fn order_only_line_adds_nothing() {
        let v = line_variance(&line(None, Some(("3", "4")), Some("3")), &tol()).unwrap();
        assert_eq!(v.amount_variance, dec("0"));
        assert_eq!(v.invoice_amount, None);
        assert_eq!(v.po_amount, Some(dec("12")));
    }

    #[test]
    fn flags_recorded_amount_mismatch() {
        let mut l = line(Some(("10", "2")), Some(("10", "2")), Some("10"));
        if let Some(inv) = l.invoice.as_mut() {
            inv.recorded_deviation = dec("0.02");
        }
        assert!(line_variance(&l, &tol()).unwrap().amount_mismatch);
        if let Some(inv) = l.invoice.as_mut() {
            inv.recorded_deviation = dec("0.01");
        }
        assert!(!line_variance(&l, &tol()).unwrap().amount_mismatch);
    }

    #[test]
    fn document_ratios_are_amount_weighted() {
        // 金额 10 的行单价偏差 50%, 金额 990 的行无偏差
        let lines = annotate(
            vec![
                line(Some(("1", "10")), Some(("1", "20")), Some("1")),
                line(Some(("99", "10")), Some(("99", "10")), Some("99")),
            ],
            &tol(),
        )
        .unwrap();
        assert_eq!(lines[0].variance.price_ratio, Some(dec("-0.5")));

        let doc = document_variance(&lines, &dec("1000")).unwrap();
        assert_eq!(doc.price_variance, dec("0.005"));
        assert_eq!(doc.quantity_variance, dec("0"));
        assert_eq!(doc.declared_total_delta, dec("0"));
    }

    #[test]
    fn document_ratios_do_not_cancel_out() {
        let lines = annotate(
            vec![
                line(Some(("10", "11")), Some(("10", "10")), Some("10")),
                line(Some(("10", "9")), Some(("10", "10")), Some("10")),
            ],
            &tol(),
        )
        .unwrap();
        let doc = document_variance(&lines, &dec("200")).unwrap();
        // (110 × 0.1 + 90 × 0.1) / 200
        assert_eq!(doc.price_variance, dec("0.1"));
        assert_eq!(doc.total_variance, dec("20"));
    }

    #[test]
    fn empty_weights_give_zero() {
        let lines = annotate(vec![line(None, Some(("1", "1")), Some("1"))], &tol()).unwrap();
        let doc = document_variance(&lines, &dec("0")).unwrap();
        assert_eq!(doc.price_variance, dec("0"));
        assert_eq!(doc.quantity_variance, dec("0"));
    }

    #[test]
    fn oversized_amount_overflows() {
        let err = line_variance(
            &line(Some(("1000000000", "1000000")), Some(("1", "1")), Some("1")),
            &tol(),
        )
        .unwrap_err();
        assert!(matches!(err, VerifyError::ArithmeticOverflow { .. }));
    }
}
