//! rust-s3 backed store client / 基于 rust-s3 的存储客户端实现

use std::time::Duration;

use s3::bucket::Bucket;
use s3::creds::Credentials;
use s3::Region;

use crate::adapter::config::S3Config;
use crate::error::{AdapterError, Result};
use crate::models::{parse_object_date, ObjectEntry};
use crate::store::{ObjectMeta, ObjectStore};

/// 所有远程调用的统一请求超时
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// S3客户端封装
pub struct S3ObjectStore {
    bucket: Box<Bucket>,
}

impl S3ObjectStore {
    /// 根据连接配置创建S3客户端
    pub fn new(config: &S3Config) -> Result<Self> {
        let credentials = Credentials::new(
            Some(&config.access_key),
            Some(&config.secret_key),
            None,
            None,
            None,
        )
        .map_err(|e| AdapterError::ConfigInvalid(format!("创建S3凭证失败: {}", e)))?;

        let region = Region::Custom {
            region: config.region.clone(),
            endpoint: config.endpoint_url(),
        };

        let mut bucket = Bucket::new(&config.bucket, region, credentials)
            .map_err(|e| AdapterError::ConfigInvalid(format!("创建S3 Bucket失败: {}", e)))?;

        if config.path_access {
            bucket = bucket.with_path_style();
        }

        bucket = bucket
            .with_request_timeout(REQUEST_TIMEOUT)
            .map_err(|e| AdapterError::ConfigInvalid(format!("设置S3请求超时失败: {}", e)))?;

        Ok(Self { bucket })
    }
}

/// 按响应码归类错误
fn status_error(path: &str, code: u16, context: &str) -> AdapterError {
    if code == 404 {
        AdapterError::not_found(path)
    } else {
        AdapterError::transfer(code, format!("{}: {}", context, path))
    }
}

/// rust-s3 在部分调用路径会把非2xx响应作为Err返回，这里统一归类
fn map_s3_error(path: &str, err: s3::error::S3Error) -> AdapterError {
    let message = err.to_string();

    if message.contains("404") {
        return AdapterError::not_found(path);
    }

    AdapterError::transfer(0, format!("{} ({})", message, path))
}

#[async_trait::async_trait]
impl ObjectStore for S3ObjectStore {
    async fn head(&self, key: &str) -> Result<ObjectMeta> {
        match self.bucket.head_object(key).await {
            Ok((meta, 200)) => Ok(ObjectMeta {
                size: meta.content_length.unwrap_or(0).max(0) as u64,
                last_modified: meta.last_modified.as_deref().and_then(parse_object_date),
                etag: meta.e_tag.clone(),
                content_type: meta.content_type.clone(),
            }),
            Ok((_, code)) => Err(status_error(key, code, "HEAD对象返回异常状态")),
            Err(e) => Err(map_s3_error(key, e)),
        }
    }

    async fn put(&self, key: &str, body: &[u8], content_type: Option<&str>) -> Result<()> {
        let response = match content_type {
            Some(ct) => self
                .bucket
                .put_object_with_content_type(key, body, ct)
                .await
                .map_err(|e| map_s3_error(key, e))?,
            None => self
                .bucket
                .put_object(key, body)
                .await
                .map_err(|e| map_s3_error(key, e))?,
        };

        let code = response.status_code();
        if !(200..300).contains(&code) {
            return Err(status_error(key, code, "写入S3对象失败"));
        }

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let response = self
            .bucket
            .delete_object(key)
            .await
            .map_err(|e| map_s3_error(key, e))?;

        let code = response.status_code();
        if !(200..300).contains(&code) && code != 404 {
            return Err(status_error(key, code, "删除S3对象失败"));
        }

        Ok(())
    }

    async fn copy(&self, from_key: &str, to_key: &str) -> Result<()> {
        // copy来源需要URL编码（中文等非ASCII字符）
        let encoded_src = urlencoding::encode(from_key);

        tracing::debug!(
            "S3 CopyObject: from={}, encoded={}, to={}",
            from_key,
            encoded_src,
            to_key
        );

        self.bucket
            .copy_object_internal(&encoded_src, to_key)
            .await
            .map_err(|e| map_s3_error(from_key, e))?;

        // 验证目标对象已落盘
        match self.bucket.head_object(to_key).await {
            Ok((_, 200)) => Ok(()),
            Ok((_, code)) => Err(AdapterError::transfer(
                code,
                format!("S3 CopyObject后目标对象不存在: {}", to_key),
            )),
            Err(e) => Err(map_s3_error(to_key, e)),
        }
    }

    async fn list(
        &self,
        prefix: &str,
        marker: Option<&str>,
        max_keys: usize,
        delimiter: Option<&str>,
    ) -> Result<Vec<ObjectEntry>> {
        let (page, code) = self
            .bucket
            .list_page(
                prefix.to_string(),
                delimiter.filter(|d| !d.is_empty()).map(|d| d.to_string()),
                None,
                marker.map(|m| m.to_string()),
                Some(max_keys),
            )
            .await
            .map_err(|e| map_s3_error(prefix, e))?;

        if code != 200 {
            return Err(status_error(prefix, code, "列出S3对象失败"));
        }

        let mut entries = Vec::new();

        for cp in page.common_prefixes.unwrap_or_default() {
            entries.push(ObjectEntry::Dir { prefix: cp.prefix });
        }

        for obj in page.contents {
            entries.push(ObjectEntry::File {
                size: obj.size as u64,
                last_modified: parse_object_date(&obj.last_modified),
                etag: obj.e_tag.clone(),
                content_type: None,
                key: obj.key,
            });
        }

        // 公共前缀与对象合并后保持键的字典序
        entries.sort_by(|a, b| a.key().cmp(b.key()));

        Ok(entries)
    }

    async fn get(&self, key: &str) -> Result<bytes::Bytes> {
        let response = self
            .bucket
            .get_object(key)
            .await
            .map_err(|e| map_s3_error(key, e))?;

        let code = response.status_code();
        if !(200..300).contains(&code) {
            return Err(status_error(key, code, "获取S3对象失败"));
        }

        Ok(bytes::Bytes::from(response.bytes().to_vec()))
    }

    async fn signed_url(&self, key: &str, ttl_secs: u32) -> Result<String> {
        self.bucket
            .presign_get(key, ttl_secs, None)
            .await
            .map_err(|e| map_s3_error(key, e))
    }
}
