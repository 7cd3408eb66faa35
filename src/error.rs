//! Adapter error taxonomy / 适配器错误分类
//!
//! `NotFound` is recoverable (callers may retry with a trailing slash),
//! `TransferFailed` is an operation failure, `ConfigInvalid` is fatal at
//! construction time. / `NotFound` 可恢复（调用方可补斜杠重试），
//! `TransferFailed` 表示操作失败，`ConfigInvalid` 在构造时即为致命错误。

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AdapterError>;

#[derive(Debug, Error)]
pub enum AdapterError {
    /// Path resolves to neither an object nor a prefix / 路径既不是对象也不是前缀
    #[error("路径不存在: {path}")]
    NotFound { path: String },

    /// Unexpected status from the object store / 对象存储返回异常状态
    #[error("S3传输失败 (HTTP {code}): {message}")]
    TransferFailed { code: u16, message: String },

    /// Raised once, when the adapter is built / 仅在构建适配器时抛出
    #[error("适配器配置无效: {0}")]
    ConfigInvalid(String),
}

impl AdapterError {
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    pub fn transfer(code: u16, message: impl Into<String>) -> Self {
        Self::TransferFailed { code, message: message.into() }
    }

    /// 判断是否为"不存在"错误（递归删除时按子项忽略）
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
