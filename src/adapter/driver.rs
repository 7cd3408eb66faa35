//! S3目录模拟适配器核心实现
//!
//! 设计原则：
//! - 存储端只有扁平键，目录语义（存在性、递归复制/移动/删除、分页列表）
//!   全部在客户端编排，跨多次远程调用的操作都不是原子的
//! - 文件/目录判定使用两次HEAD探测，结果以显式类型返回而非异常控制流
//! - 移动 = 复制后删除源；中途失败可能留下源目标并存的状态，按文档化
//!   风险保留，不做补偿回滚

use std::io::{Seek, SeekFrom, Write};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::error::{AdapterError, Result};
use crate::models::{EntryKind, FsEntry, ObjectEntry};
use crate::preview::Preview;
use crate::store::{ObjectMeta, ObjectStore, MAX_KEYS_PER_PAGE};
use crate::utils;

/// 预签名URL有效期：SigV4允许的上限（7天）
const SIGNED_URL_TTL_SECS: u32 = 604_800;

/// 单个连接对应的适配器
pub struct S3Adapter {
    config: super::config::S3Config,
    store: Arc<dyn ObjectStore>,
    preview: Arc<Preview>,
}

impl std::fmt::Debug for S3Adapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Adapter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl S3Adapter {
    /// 创建适配器；配置在此处规范化并校验
    pub fn new(mut config: super::config::S3Config, preview: Arc<Preview>) -> Result<Self> {
        config.prepare()?;
        let store: Arc<dyn ObjectStore> = Arc::new(crate::store::S3ObjectStore::new(&config)?);
        Ok(Self {
            config,
            store,
            preview,
        })
    }

    /// 使用外部存储客户端构建（测试用）
    pub(crate) fn with_store(
        config: super::config::S3Config,
        store: Arc<dyn ObjectStore>,
        preview: Arc<Preview>,
    ) -> Self {
        Self {
            config,
            store,
            preview,
        }
    }

    /// 适配器显示名称（宿主媒体管理器用）
    pub fn adapter_name(&self) -> &str {
        &self.config.label
    }

    pub fn config(&self) -> &super::config::S3Config {
        &self.config
    }

    /// 相对路径映射为绝对对象键（不含尾随斜杠）
    fn object_key(&self, rel: &str) -> String {
        utils::absolute_key(rel, &self.config.directory)
    }

    /// 目录列表前缀（带尾随斜杠；根目录无前缀时为空）
    fn list_prefix(&self, rel: &str) -> String {
        let key = self.object_key(rel);
        if key.is_empty() {
            String::new()
        } else {
            format!("{}/", key)
        }
    }

    /// 两步探测：先按文件键HEAD，未命中再补斜杠按目录HEAD
    ///
    /// 存储端没有独立于"对象是否存在"的"前缀是否存在"原语，调用方
    /// 无法提前区分文件与目录。返回 None 表示两次探测都未命中；
    /// 非404错误原样上抛。
    async fn probe(&self, rel: &str) -> Result<Option<(EntryKind, ObjectMeta)>> {
        let key = self.object_key(rel);

        match self.store.head(&key).await {
            Ok(meta) => return Ok(Some((EntryKind::File, meta))),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        match self.store.head(&format!("{}/", key)).await {
            Ok(meta) => Ok(Some((EntryKind::Dir, meta))),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// 按分页契约合并所有列表页
    ///
    /// 单页不足1000条即为最后一页，否则以页内最后一个键作为下一页的
    /// 续传标记。顺序为存储端的键字典序。
    async fn list_all(&self, rel: &str, delimiter: Option<&str>) -> Result<Vec<ObjectEntry>> {
        let prefix = self.list_prefix(rel);
        let mut marker: Option<String> = None;
        let mut merged = Vec::new();

        loop {
            let page = self
                .store
                .list(&prefix, marker.as_deref(), MAX_KEYS_PER_PAGE, delimiter)
                .await?;

            let complete = page.len() < MAX_KEYS_PER_PAGE;
            marker = page.last().map(|e| e.key().to_string());
            merged.extend(page);

            if complete || marker.is_none() {
                break;
            }
        }

        Ok(merged)
    }

    /// 目录的直接子项（不生成缩略图）
    ///
    /// 目录自身的占位对象会出现在自己的子项列表里，这里按解析后路径
    /// 等于目录路径的条件剔除，递归复制/移动/删除依赖这一点避免自引用。
    async fn list_dir_entries(&self, rel: &str) -> Result<Vec<FsEntry>> {
        let raws = self.list_all(rel, Some("/")).await?;
        let own_path = utils::fix_and_clean_path(rel);

        Ok(raws
            .iter()
            .map(|raw| FsEntry::from_object(raw, &self.config.directory))
            .filter(|entry| entry.path != own_path)
            .collect())
    }

    /// 翻译单条记录并按需挂接缩略图
    ///
    /// 缩略图路径的任何失败都不会让列表失败。
    async fn to_fs_entry(&self, raw: &ObjectEntry) -> FsEntry {
        let mut entry = FsEntry::from_object(raw, &self.config.directory);

        if let ObjectEntry::File { last_modified, .. } = raw {
            if self
                .preview
                .should_preview(&entry.path, self.config.is_cloudfront())
            {
                match self.get_url(&entry.path).await {
                    Ok(url) => {
                        entry.thumbnail_path =
                            Some(self.preview.get_resized(&url, *last_modified).await);
                    }
                    Err(e) => {
                        tracing::debug!("生成预览地址失败，跳过缩略图: {} ({})", entry.path, e);
                    }
                }
            }
        }

        entry
    }

    /// 获取单个文件或目录的信息；两次探测都未命中则返回 NotFound
    pub async fn get_file(&self, path: &str) -> Result<FsEntry> {
        let rel = utils::fix_and_clean_path(path);

        if rel == "/" {
            return Ok(FsEntry::root());
        }

        let key = self.object_key(&rel);

        match self.probe(&rel).await? {
            Some((EntryKind::Dir, _)) => {
                let raw = ObjectEntry::Dir {
                    prefix: format!("{}/", key),
                };
                Ok(self.to_fs_entry(&raw).await)
            }
            Some((EntryKind::File, meta)) => {
                let raw = ObjectEntry::File {
                    key,
                    size: meta.size,
                    last_modified: meta.last_modified,
                    etag: meta.etag,
                    content_type: meta.content_type,
                };
                Ok(self.to_fs_entry(&raw).await)
            }
            None => Err(AdapterError::not_found(&rel)),
        }
    }

    /// 列出目录子项；传入文件路径时退化为单条结果
    pub async fn get_files(&self, path: &str) -> Result<Vec<FsEntry>> {
        let rel = utils::fix_and_clean_path(path);

        // 宿主会用同一个入口查询单个文件的元数据，先消除歧义
        if rel != "/" {
            let entry = self.get_file(&rel).await?;
            if entry.kind == EntryKind::File {
                return Ok(vec![entry]);
            }
        }

        let raws = self.list_all(&rel, Some("/")).await?;
        let mut entries = Vec::with_capacity(raws.len());

        for raw in &raws {
            let entry = self.to_fs_entry(raw).await;
            if entry.path != rel {
                entries.push(entry);
            }
        }

        Ok(entries)
    }

    /// 创建文件；返回清理后的实际文件名
    pub async fn create_file(&self, name: &str, path: &str, data: &[u8]) -> Result<String> {
        let safe = utils::make_safe_name(name);
        let rel = utils::fix_and_clean_path(path);
        let dir = rel.trim_matches('/');

        let logical = if dir.is_empty() {
            safe.clone()
        } else {
            format!("{}/{}", dir, safe)
        };
        let key = self.object_key(&logical);

        let content_type = mime_guess::from_path(&safe).first().map(|m| m.to_string());

        self.store
            .put(&key, data, content_type.as_deref())
            .await?;

        Ok(safe)
    }

    /// 创建目录：写入以斜杠结尾的零长度占位对象
    pub async fn create_folder(&self, name: &str, path: &str) -> Result<String> {
        let safe = utils::make_safe_name(name);
        let rel = utils::fix_and_clean_path(path);
        let dir = rel.trim_matches('/');

        let logical = if dir.is_empty() {
            safe.clone()
        } else {
            format!("{}/{}", dir, safe)
        };
        let key = format!("{}/", self.object_key(&logical));

        self.store.put(&key, &[], None).await?;

        Ok(safe)
    }

    /// 更新文件；对象存储中更新与创建等价
    ///
    /// 名字被清理改写时，旧键在新键写入后尽力删除，非事务。
    pub async fn update_file(&self, name: &str, path: &str, data: &[u8]) -> Result<()> {
        let new_name = self.create_file(name, path, data).await?;

        if new_name != name {
            let dir = utils::fix_and_clean_path(path);
            let old_rel = if dir == "/" {
                format!("/{}", name)
            } else {
                format!("{}/{}", dir, name)
            };

            if let Err(e) = self.delete(&old_rel).await {
                tracing::warn!("更新后清理旧对象失败: {} ({})", old_rel, e);
            }
        }

        Ok(())
    }

    /// 删除文件或目录；目录先递归删除全部子项
    pub async fn delete(&self, path: &str) -> Result<()> {
        self.delete_inner(utils::fix_and_clean_path(path)).await
    }

    fn delete_inner(&self, rel: String) -> BoxFuture<'_, Result<()>> {
        async move {
            let info = self.get_file(&rel).await?;

            if info.kind == EntryKind::Dir {
                let children = self.list_dir_entries(&rel).await?;

                for child in children {
                    match self.delete_inner(child.path.clone()).await {
                        Ok(()) => {}
                        // 子项在遍历途中消失（并发修改）不致命，继续删其余子项
                        Err(e) if e.is_not_found() => {
                            tracing::debug!("删除时子项已不存在，忽略: {}", child.path);
                        }
                        Err(e) => return Err(e),
                    }
                }
            }

            let mut key = self.object_key(&rel);
            if info.kind == EntryKind::Dir {
                key.push('/');
            }

            self.store.delete(&key).await
        }
        .boxed()
    }

    /// 复制文件或目录；返回清理后的目标路径（相对，无前导斜杠）
    ///
    /// 目录会递归复制全部子项；文件走一次服务端复制。`force` 不做
    /// 特殊处理，与存储端put语义一致为后写覆盖。
    pub async fn copy(&self, source: &str, destination: &str, force: bool) -> Result<String> {
        self.copy_inner(
            utils::fix_and_clean_path(source),
            utils::fix_and_clean_path(destination),
            force,
        )
        .await
    }

    fn copy_inner(
        &self,
        source: String,
        destination: String,
        force: bool,
    ) -> BoxFuture<'_, Result<String>> {
        async move {
            let info = self.get_file(&source).await?;

            // 清理目标文件名
            let dest_trim = destination.trim_matches('/');
            let (dir, file) = match dest_trim.rfind('/') {
                Some(pos) => (&dest_trim[..pos], &dest_trim[pos + 1..]),
                None => ("", dest_trim),
            };
            let safe = utils::make_safe_name(file);
            let dest_path = if dir.is_empty() {
                safe
            } else {
                format!("{}/{}", dir, safe)
            };

            if info.kind == EntryKind::Dir {
                let children = self.list_dir_entries(&source).await?;

                for child in children {
                    let sub = child.path[source.len()..].trim_matches('/');
                    let child_dest =
                        format!("/{}/{}", dest_path.trim_matches('/'), sub);
                    self.copy_inner(child.path.clone(), child_dest, force).await?;
                }
            }

            let mut from = self.object_key(&source);
            let mut to = utils::absolute_key(&dest_path, &self.config.directory);

            if info.kind == EntryKind::Dir {
                from.push('/');
                to.push('/');
            }

            self.store.copy(&from, &to).await?;

            tracing::debug!("S3复制完成: {} -> {}", from, to);

            Ok(dest_path)
        }
        .boxed()
    }

    /// 移动文件或目录：复制后删除源
    ///
    /// 没有原子改名。两步之间失败会留下源目标并存的状态，调用方可见。
    /// 源目录只因子项存在而成立（从未写入占位对象）时，子项照常移动，
    /// 仅跳过对不存在占位对象本身的复制与删除。
    pub async fn move_item(&self, source: &str, destination: &str, force: bool) -> Result<String> {
        self.move_inner(
            utils::fix_and_clean_path(source),
            utils::fix_and_clean_path(destination),
            force,
        )
        .await
    }

    fn move_inner(
        &self,
        source: String,
        destination: String,
        force: bool,
    ) -> BoxFuture<'_, Result<String>> {
        async move {
            let (is_dir, skip_source) = match self.probe(&source).await? {
                Some((EntryKind::Dir, _)) => (true, false),
                Some((EntryKind::File, _)) => (false, false),
                // 无占位对象的隐式目录
                None => (true, true),
            };

            if is_dir {
                let children = self.list_dir_entries(&source).await?;

                for child in children {
                    let sub = child.path[source.len()..].trim_matches('/');
                    let child_dest =
                        format!("{}/{}", destination.trim_end_matches('/'), sub);
                    self.move_inner(child.path.clone(), child_dest, force).await?;
                }
            }

            if skip_source {
                return Ok(utils::make_safe_name(utils::base_name(&destination)));
            }

            let new_name = self.copy_inner(source.clone(), destination, force).await?;

            if !new_name.is_empty() && new_name != source.trim_matches('/') {
                self.delete_inner(source).await?;
            }

            Ok(new_name)
        }
        .boxed()
    }

    /// 按shell通配符在路径下搜索条目名
    ///
    /// 递归搜索不传分组分隔符，整棵子树的键都会平铺返回。
    pub async fn search(&self, path: &str, pattern: &str, recursive: bool) -> Result<Vec<FsEntry>> {
        let rel = utils::fix_and_clean_path(path);
        let delimiter = if recursive { None } else { Some("/") };

        let matcher = match glob::Pattern::new(pattern) {
            Ok(m) => m,
            // 非法通配符当作无匹配处理
            Err(_) => return Ok(Vec::new()),
        };

        let raws = self.list_all(&rel, delimiter).await?;
        let mut entries = Vec::new();

        for raw in &raws {
            let name = utils::base_name(raw.key());

            if name.is_empty() || !matcher.matches(name) {
                continue;
            }

            let entry = self.to_fs_entry(raw).await;
            if entry.path != rel {
                entries.push(entry);
            }
        }

        Ok(entries)
    }

    /// 下载对象内容到匿名临时文件并返回句柄；句柄释放后文件自动回收
    pub async fn get_resource(&self, path: &str) -> Result<tokio::fs::File> {
        let rel = utils::fix_and_clean_path(path);
        let key = self.object_key(&rel);

        let bytes = self.store.get(&key).await?;

        let mut tmp = tempfile::tempfile()
            .map_err(|e| AdapterError::transfer(0, format!("创建临时文件失败: {}", e)))?;
        tmp.write_all(&bytes)
            .map_err(|e| AdapterError::transfer(0, format!("写入临时文件失败: {}", e)))?;
        tmp.seek(SeekFrom::Start(0))
            .map_err(|e| AdapterError::transfer(0, format!("写入临时文件失败: {}", e)))?;

        Ok(tokio::fs::File::from_std(tmp))
    }

    /// 对象的公开访问地址
    ///
    /// CloudFront连接直接拼CDN地址（空格编码为%20），否则生成预签名URL。
    pub async fn get_url(&self, path: &str) -> Result<String> {
        let rel = utils::fix_and_clean_path(path);

        if self.config.is_cloudfront() {
            let encoded = rel.trim_start_matches('/').replace(' ', "%20");
            return Ok(format!(
                "{}/{}",
                self.config.cdn_url.trim_end_matches('/'),
                encoded
            ));
        }

        let key = self.object_key(&rel);
        self.store.signed_url(&key, SIGNED_URL_TTL_SECS).await
    }
}
