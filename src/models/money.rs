//! 金额/比率的展示精度与可表示范围
//!
//! 内部计算保持完整精度, 只有序列化边界按"四舍五入远离零"取整:
//! 金额保留 2 位小数, 比率保留 4 位小数。

use bigdecimal::{BigDecimal, Zero};
use serde::ser::Error as _;
use serde::Serializer;

use crate::error::VerifyError;

/// 金额展示精度
pub const AMOUNT_SCALE: i64 = 2;
/// 比率展示精度
pub const RATIO_SCALE: i64 = 4;
/// NUMERIC(19,4) 的整数部分上限: 10^15
const MAX_ABS_AMOUNT_EXP: i64 = 15;

/// 四舍五入 (远离零) 到指定小数位
pub fn round_half_away(value: &BigDecimal, scale: i64) -> BigDecimal {
    // with_scale 向零截断
    let truncated = value.with_scale(scale);
    let remainder = (value - &truncated).abs();
    let half = BigDecimal::new(5.into(), scale + 1);
    if remainder < half {
        return truncated;
    }
    let unit = BigDecimal::new(1.into(), scale);
    if *value < BigDecimal::zero() {
        truncated - unit
    } else {
        truncated + unit
    }
}

/// 超出 NUMERIC(19,4) 可表示范围时报 ArithmeticOverflow
pub fn ensure_representable(value: &BigDecimal, context: &str) -> Result<(), VerifyError> {
    let limit = BigDecimal::new(1.into(), -MAX_ABS_AMOUNT_EXP);
    if value.abs() >= limit {
        return Err(VerifyError::ArithmeticOverflow {
            context: format!("{} = {} exceeds representable precision", context, value),
        });
    }
    Ok(())
}

/// 以 JSON 数字输出; 十进制文本解析为最接近的 f64
fn serialize_number<S: Serializer>(value: &BigDecimal, s: S) -> Result<S::Ok, S::Error> {
    let text = value.to_string();
    let number: f64 = text
        .parse()
        .map_err(|_| S::Error::custom(format!("decimal {} is not representable as a number", text)))?;
    s.serialize_f64(number)
}

pub fn serialize_amount<S: Serializer>(value: &BigDecimal, s: S) -> Result<S::Ok, S::Error> {
    serialize_number(&round_half_away(value, AMOUNT_SCALE), s)
}

pub fn serialize_opt_amount<S: Serializer>(
    value: &Option<BigDecimal>,
    s: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(v) => serialize_amount(v, s),
        None => s.serialize_none(),
    }
}

pub fn serialize_ratio<S: Serializer>(value: &BigDecimal, s: S) -> Result<S::Ok, S::Error> {
    serialize_number(&round_half_away(value, RATIO_SCALE), s)
}

pub fn serialize_opt_ratio<S: Serializer>(
    value: &Option<BigDecimal>,
    s: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(v) => serialize_ratio(v, s),
        None => s.serialize_none(),
    }
}

/// 数量不取整
pub fn serialize_opt_quantity<S: Serializer>(
    value: &Option<BigDecimal>,
    s: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(v) => serialize_number(v, s),
        None => s.serialize_none(),
    }
}
