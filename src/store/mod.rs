//! Object store client seam / 对象存储客户端接口
//!
//! The directory emulator only talks to this trait; the signed-request
//! machinery behind it is opaque. / 目录模拟器只依赖本 trait，底层的
//! 签名请求实现对其不可见。

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::ObjectEntry;

pub mod s3;

pub use s3::S3ObjectStore;

/// Listing page size, and the completion rule: a page with fewer entries
/// means the listing is done. / 列表页大小；返回条目少于该值即表示列表结束。
pub const MAX_KEYS_PER_PAGE: usize = 1000;

/// Metadata of a single object / 单个对象的元数据
#[derive(Debug, Clone, Default)]
pub struct ObjectMeta {
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
    pub etag: Option<String>,
    pub content_type: Option<String>,
}

/// Storage client primitives / 存储客户端原语
///
/// Every method issues at most one remote call. Pagination, recursion and
/// directory semantics live above this seam. / 每个方法最多发起一次远程
/// 调用；分页、递归与目录语义都在本接口之上实现。
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Metadata probe (HEAD) / 元数据探测
    async fn head(&self, key: &str) -> Result<ObjectMeta>;

    /// Write an object / 写入对象
    async fn put(&self, key: &str, body: &[u8], content_type: Option<&str>) -> Result<()>;

    /// Delete an object / 删除对象
    async fn delete(&self, key: &str) -> Result<()>;

    /// Server-side copy / 服务端复制
    async fn copy(&self, from_key: &str, to_key: &str) -> Result<()>;

    /// One listing page in lexicographic key order / 按键字典序返回一页列表
    ///
    /// `marker` continues a previous page; `delimiter` groups keys into
    /// common prefixes (emulated directories). / `marker` 续上一页；
    /// `delimiter` 将键分组为公共前缀（模拟目录）。
    async fn list(
        &self,
        prefix: &str,
        marker: Option<&str>,
        max_keys: usize,
        delimiter: Option<&str>,
    ) -> Result<Vec<ObjectEntry>>;

    /// Fetch object content / 获取对象内容
    async fn get(&self, key: &str) -> Result<Bytes>;

    /// Presigned GET URL / 预签名下载 URL
    async fn signed_url(&self, key: &str, ttl_secs: u32) -> Result<String>;
}
