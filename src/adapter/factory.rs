//! 适配器工厂
//!
//! 连接配置以JSON形式传入；单个连接解析或校验失败只跳过该连接，
//! 不影响其余连接的装配。

use std::sync::Arc;

use serde_json::Value;

use crate::error::{AdapterError, Result};
use crate::preview::Preview;

use super::config::S3Config;
use super::driver::S3Adapter;

/// S3适配器工厂
pub struct S3AdapterFactory;

impl S3AdapterFactory {
    pub fn adapter_type(&self) -> &'static str {
        "s3"
    }

    /// 从单个连接配置创建适配器
    pub fn create_adapter(&self, connection: Value, preview: Arc<Preview>) -> Result<S3Adapter> {
        let config: S3Config = serde_json::from_value(connection)
            .map_err(|e| AdapterError::ConfigInvalid(format!("连接配置解析失败: {}", e)))?;

        S3Adapter::new(config, preview)
    }
}

/// 从连接数组装配全部适配器；坏连接跳过并记录
pub fn adapters_from_value(connections: &Value, preview: Arc<Preview>) -> Vec<S3Adapter> {
    let factory = S3AdapterFactory;
    let mut adapters = Vec::new();

    let Some(list) = connections.as_array() else {
        return adapters;
    };

    for connection in list {
        match factory.create_adapter(connection.clone(), preview.clone()) {
            Ok(adapter) => adapters.push(adapter),
            Err(e) => {
                tracing::warn!("跳过无效的S3连接配置: {}", e);
            }
        }
    }

    adapters
}
