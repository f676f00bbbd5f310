use std::time::Duration;

use thiserror::Error;

use crate::models::DocumentKind;

/// 单据库错误
#[derive(Error, Debug)]
pub enum StoreError {
    /// 数据库访问失败
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// 存储中的数据无法还原为合法单据
    #[error("corrupt {kind} record '{id}': {reason}")]
    Corrupt {
        kind: DocumentKind,
        id: String,
        reason: String,
    },

    /// 存储中的核验结果无法还原
    #[error("corrupt verification result '{id}': {reason}")]
    CorruptResult { id: String, reason: String },

    /// 单据库调用超时
    #[error("store call timed out after {0:?}")]
    Timeout(Duration),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// 三单匹配核验错误
#[derive(Error, Debug)]
pub enum VerifyError {
    /// 标识无法在单据库中解析
    #[error("{kind} '{id}' not found")]
    NotFound { kind: DocumentKind, id: String },

    /// 单据结构不合法 (无行、负数量/单价、空描述、引用错误)
    #[error("invalid {kind} '{id}': {reason}")]
    InvalidDocument {
        kind: DocumentKind,
        id: String,
        reason: String,
    },

    /// 单据库暂时不可用, 调用方可重试
    #[error("document store unavailable: {0}")]
    StoreUnavailable(String),

    /// 金额超出可表示精度
    #[error("arithmetic overflow: {context}")]
    ArithmeticOverflow { context: String },

    /// 批量核验工作线程失败
    #[error("internal error: {0}")]
    Internal(String),
}

impl VerifyError {
    /// 只有单据库的瞬时故障可重试
    pub fn is_retryable(&self) -> bool {
        matches!(self, VerifyError::StoreUnavailable(_))
    }

    /// 错误类别, 用于 API 响应
    pub fn kind(&self) -> &'static str {
        match self {
            VerifyError::NotFound { .. } => "not_found",
            VerifyError::InvalidDocument { .. } => "invalid_document",
            VerifyError::StoreUnavailable(_) => "store_unavailable",
            VerifyError::ArithmeticOverflow { .. } => "arithmetic_overflow",
            VerifyError::Internal(_) => "internal",
        }
    }
}

impl From<StoreError> for VerifyError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Corrupt { kind, id, reason } => {
                VerifyError::InvalidDocument { kind, id, reason }
            }
            corrupt @ StoreError::CorruptResult { .. } => VerifyError::Internal(corrupt.to_string()),
            other => VerifyError::StoreUnavailable(other.to_string()),
        }
    }
}
