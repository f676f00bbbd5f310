use bigdecimal::BigDecimal;
use std::io::Write;

use crate::models::money::{round_half_away, AMOUNT_SCALE, RATIO_SCALE};
use crate::models::VerificationResult;

const HEADER: [&str; 17] = [
    "result_id",
    "created_at",
    "invoice_id",
    "po_id",
    "gr_id",
    "overall_status",
    "description",
    "invoice_qty",
    "invoice_price",
    "invoice_amount",
    "po_qty",
    "po_price",
    "gr_qty",
    "quantity_ratio",
    "price_ratio",
    "amount_variance",
    "status",
];

/// 将 Option<BigDecimal> 转换为 CSV 字符串, 缺失为空
fn option_to_csv(val: &Option<BigDecimal>) -> String {
    val.as_ref().map(|v| v.to_string()).unwrap_or_default()
}

fn rounded(val: &Option<BigDecimal>, scale: i64) -> String {
    val.as_ref()
        .map(|v| round_half_away(v, scale).to_string())
        .unwrap_or_default()
}

/// 导出核验结果到 CSV, 每个行匹配一行
pub fn export_to_csv<W: Write>(
    results: &[VerificationResult],
    output: W,
) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_writer(output);
    writer.write_record(HEADER)?;

    for result in results {
        for m in &result.line_item_matches {
            writer.write_record(&[
                result.id.clone(),
                result.created_at.to_rfc3339(),
                result.invoice_id.clone(),
                result.po_id.clone(),
                result.gr_id.clone(),
                result.overall_status().to_string(),
                m.description.clone(),
                option_to_csv(&m.invoice_qty),
                rounded(&m.invoice_price, AMOUNT_SCALE),
                rounded(&m.invoice_amount, AMOUNT_SCALE),
                option_to_csv(&m.po_qty),
                rounded(&m.po_price, AMOUNT_SCALE),
                option_to_csv(&m.gr_qty),
                rounded(&m.quantity_ratio, RATIO_SCALE),
                rounded(&m.price_ratio, RATIO_SCALE),
                round_half_away(&m.amount_variance, AMOUNT_SCALE).to_string(),
                m.status.to_string(),
            ])?;
        }
    }

    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LineItemMatch, LineStatus, ResultParts};
    use bigdecimal::Zero;
    use chrono::Utc;
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn writes_one_row_per_line_match() {
        let result = VerificationResult::assemble(ResultParts {
            id: "r1".into(),
            invoice_id: "inv".into(),
            po_id: "po".into(),
            gr_id: "gr".into(),
            line_item_matches: vec![
                LineItemMatch {
                    description: "Bolt M6".into(),
                    invoice_qty: Some(dec("100")),
                    invoice_price: Some(dec("0.5")),
                    invoice_amount: Some(dec("50")),
                    po_qty: Some(dec("100")),
                    po_price: Some(dec("0.5")),
                    po_amount: Some(dec("50")),
                    gr_qty: Some(dec("100")),
                    quantity_delta: Some(dec("0")),
                    price_delta: Some(dec("0")),
                    quantity_ratio: Some(dec("0")),
                    price_ratio: Some(dec("0")),
                    amount_variance: BigDecimal::zero(),
                    amount_mismatch: false,
                    status: LineStatus::Pass,
                },
                LineItemMatch {
                    description: "Expedite Fee".into(),
                    invoice_qty: Some(dec("1")),
                    invoice_price: Some(dec("25")),
                    invoice_amount: Some(dec("25")),
                    po_qty: None,
                    po_price: None,
                    po_amount: None,
                    gr_qty: None,
                    quantity_delta: None,
                    price_delta: None,
                    quantity_ratio: None,
                    price_ratio: None,
                    amount_variance: dec("25"),
                    amount_mismatch: false,
                    status: LineStatus::MissingInPo,
                },
            ],
            total_variance: dec("25"),
            price_variance: dec("0"),
            quantity_variance: dec("0"),
            declared_total_delta: dec("0"),
            created_at: Utc::now(),
        });

        let mut buf = Vec::new();
        export_to_csv(&[result], &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("result_id,created_at"));
        assert!(lines[1].contains(",fail,Bolt M6,100,0.50,50.00,100,0.50,100,0.0000,0.0000,0.00,pass"));
        assert!(lines[2].contains(",fail,Expedite Fee,1,25.00,25.00,,,,,,25.00,missing_in_po"));
    }
}
