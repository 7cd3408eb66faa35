//! 连接配置
//!
//! 每个连接对应宿主媒体管理器中的一个适配器实例。配置以 JSON 形式
//! 传入（serde 默认值补齐缺省字段），构建时规范化并校验。

use serde::{Deserialize, Serialize};

use crate::error::{AdapterError, Result};
use crate::utils;

/// S3连接配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    /// 连接类型: s3 / cloudfront / custom
    #[serde(rename = "type", default = "default_type")]
    pub connection_type: String,
    /// Access Key
    #[serde(default)]
    pub access_key: String,
    /// Secret Key
    #[serde(default)]
    pub secret_key: String,
    /// 存储桶名称（区分大小写）
    #[serde(default)]
    pub bucket: String,
    /// 区域
    #[serde(default = "default_region")]
    pub region: String,
    /// 自定义区域（region 为 "custom" 时生效）
    #[serde(default)]
    pub custom_region: String,
    /// 自定义端点（S3兼容服务，仅 type 为 "custom" 时生效）
    #[serde(default)]
    pub custom_endpoint: String,
    /// 存储桶内的根目录（无首尾斜杠）
    #[serde(default)]
    pub directory: String,
    /// 是否使用DualStack端点（仅无自定义端点时生效）
    #[serde(default = "default_true")]
    pub dual_stack: bool,
    /// 强制路径风格访问（MinIO等需要开启）
    #[serde(default)]
    pub path_access: bool,
    /// 签名版本: v2 / v4
    #[serde(default = "default_signature")]
    pub signature: String,
    /// 新对象的存储类别
    #[serde(default = "default_storage_class")]
    pub storage_class: String,
    /// CloudFront分发的CDN地址
    #[serde(default)]
    pub cdn_url: String,
    /// 适配器显示名称
    #[serde(default)]
    pub label: String,
}

fn default_type() -> String {
    "s3".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_signature() -> String {
    "v4".to_string()
}

fn default_storage_class() -> String {
    "STANDARD".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            connection_type: default_type(),
            access_key: String::new(),
            secret_key: String::new(),
            bucket: String::new(),
            region: default_region(),
            custom_region: String::new(),
            custom_endpoint: String::new(),
            directory: String::new(),
            dual_stack: true,
            path_access: false,
            signature: default_signature(),
            storage_class: default_storage_class(),
            cdn_url: String::new(),
            label: String::new(),
        }
    }
}

impl S3Config {
    /// 规范化并校验配置；适配器构建时调用一次
    pub fn prepare(&mut self) -> Result<()> {
        // 桶名不允许出现路径分隔符
        self.bucket = self.bucket.replace('/', "");
        self.directory = utils::normalize_directory(&self.directory);
        self.cdn_url = self.cdn_url.trim().to_string();

        if self.region == "custom" && !self.custom_region.is_empty() {
            self.region = self.custom_region.clone();
        }

        if self.signature != "v2" && self.signature != "v4" {
            self.signature = "v4".to_string();
        }

        if self.access_key.is_empty() {
            return Err(AdapterError::ConfigInvalid("未设置Access Key".to_string()));
        }

        if self.secret_key.is_empty() {
            return Err(AdapterError::ConfigInvalid("未设置Secret Key".to_string()));
        }

        if self.bucket.is_empty() {
            return Err(AdapterError::ConfigInvalid("未设置存储桶名称".to_string()));
        }

        Ok(())
    }

    /// 是否为CloudFront分发来源
    pub fn is_cloudfront(&self) -> bool {
        self.connection_type == "cloudfront" && !self.cdn_url.is_empty()
    }

    /// 计算客户端端点URL
    pub fn endpoint_url(&self) -> String {
        if self.connection_type == "custom" && !self.custom_endpoint.is_empty() {
            let endpoint = self.custom_endpoint.trim().trim_end_matches('/');

            if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
                return endpoint.to_string();
            }

            return format!("https://{}", endpoint);
        }

        if self.dual_stack {
            format!("https://s3.dualstack.{}.amazonaws.com", self.region)
        } else {
            format!("https://s3.{}.amazonaws.com", self.region)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> S3Config {
        S3Config {
            access_key: "AKIAEXAMPLE".to_string(),
            secret_key: "secret".to_string(),
            bucket: "media".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_prepare_normalizes() {
        let mut config = valid();
        config.bucket = "me/dia".to_string();
        config.directory = "\\assets\\img\\".to_string();
        config.signature = "v7".to_string();
        config.prepare().unwrap();
        assert_eq!(config.bucket, "media");
        assert_eq!(config.directory, "assets/img");
        assert_eq!(config.signature, "v4");
    }

    #[test]
    fn test_prepare_rejects_missing_fields() {
        for field in ["access_key", "secret_key", "bucket"] {
            let mut config = valid();
            match field {
                "access_key" => config.access_key.clear(),
                "secret_key" => config.secret_key.clear(),
                _ => config.bucket.clear(),
            }
            let err = config.prepare().unwrap_err();
            assert!(matches!(err, AdapterError::ConfigInvalid(_)), "{}", field);
        }
    }

    #[test]
    fn test_custom_region() {
        let mut config = valid();
        config.region = "custom".to_string();
        config.custom_region = "eu-central-2".to_string();
        config.prepare().unwrap();
        assert_eq!(config.region, "eu-central-2");
    }

    #[test]
    fn test_endpoint_url() {
        let mut config = valid();
        assert_eq!(
            config.endpoint_url(),
            "https://s3.dualstack.us-east-1.amazonaws.com"
        );

        config.dual_stack = false;
        assert_eq!(config.endpoint_url(), "https://s3.us-east-1.amazonaws.com");

        config.connection_type = "custom".to_string();
        config.custom_endpoint = "minio.local:9000/".to_string();
        assert_eq!(config.endpoint_url(), "https://minio.local:9000");

        config.custom_endpoint = "http://minio.local:9000".to_string();
        assert_eq!(config.endpoint_url(), "http://minio.local:9000");
    }

    #[test]
    fn test_is_cloudfront() {
        let mut config = valid();
        assert!(!config.is_cloudfront());
        config.connection_type = "cloudfront".to_string();
        assert!(!config.is_cloudfront());
        config.cdn_url = "https://cdn.example.com".to_string();
        assert!(config.is_cloudfront());
    }
}
