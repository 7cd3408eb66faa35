//! 图片预览与缩略图缓存
//!
//! 每次预览请求在以下状态间流转：不适用（直接返回原图地址）、缓存命中、
//! 墓碑命中（零字节文件表示"本缓存键有效期内不要重试"）、超出时间预算
//! （跳过生成）、重新生成。本子系统的任何内部失败都只会退化为返回原图
//! 地址，绝不向调用方抛错；预览不能成为列表请求失败的原因。
//!
//! 缓存键 = md5(源地址 :: 最后修改时间)，源对象更新后键自然改变，旧条目
//! 成为孤儿留在磁盘上（无回收策略，已知空档）。

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::utils;

/// 可交给Lambda@Edge缩放的扩展名
const RESIZABLE: &[&str] = &[
    "bmp", "gif", "ico", "jpeg", "jpg", "png", "tif", "tiff", "webp",
];

/// 本地缓存支持的扩展名
const CACHEABLE: &[&str] = &["gif", "jpg", "jpeg", "png", "webp"];

/// 哈希扇出的目录层数与每层字符数
const FANOUT_LEVELS: usize = 3;
const FANOUT_CHARS: usize = 2;

/// 预览子系统配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewOptions {
    /// 何时启用预览: always / cloudfront / none
    #[serde(default = "default_preview")]
    pub preview: String,
    /// 启用预览的扩展名（逗号分隔；留空则按通用图片类型判断）
    #[serde(default = "default_preview_extensions")]
    pub preview_extensions: String,
    /// 缩略图边长（像素），限制在[100,400]并向下量化到100的倍数
    #[serde(default = "default_dimension")]
    pub resized_dimension: u32,
    /// 是否在本地生成并缓存缩略图
    #[serde(default)]
    pub cache_thumbnails: bool,
    /// 缩略图缓存目录
    #[serde(default)]
    pub cache_dir: String,
    /// 缓存目录对外服务的基础URL
    #[serde(default)]
    pub cache_url: String,
    /// 生成缩略图的累计时间预算（秒），限制在[1,120]
    #[serde(default = "default_max_thumbnail_time")]
    pub max_thumbnail_time: f64,
    /// 交给Lambda@Edge缩放（禁用本地缓存）
    #[serde(default)]
    pub lambda_resize: bool,
}

fn default_preview() -> String {
    "always".to_string()
}

fn default_preview_extensions() -> String {
    "png,gif,jpg,jpeg,bmp,webp,pdf,svg".to_string()
}

fn default_dimension() -> u32 {
    100
}

fn default_max_thumbnail_time() -> f64 {
    5.0
}

impl Default for PreviewOptions {
    fn default() -> Self {
        Self {
            preview: default_preview(),
            preview_extensions: default_preview_extensions(),
            resized_dimension: default_dimension(),
            cache_thumbnails: false,
            cache_dir: String::new(),
            cache_url: String::new(),
            max_thumbnail_time: default_max_thumbnail_time(),
            lambda_resize: false,
        }
    }
}

/// 预览启用范围
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PreviewMode {
    Always,
    CloudFrontOnly,
    Never,
}

impl PreviewMode {
    fn parse(raw: &str) -> Self {
        match raw {
            "always" => Self::Always,
            "cloudfront" => Self::CloudFrontOnly,
            _ => Self::Never,
        }
    }
}

/// 本地图片缩放能力探测
///
/// 启动时计算一次，显式传入 [`Preview::new`]。
pub fn can_resize_images() -> bool {
    let probe = image::DynamicImage::new_rgba8(1, 1);
    let mut buf = Vec::new();
    probe
        .write_with_encoder(image::codecs::webp::WebPEncoder::new_lossless(&mut buf))
        .is_ok()
}

/// 缩略图缓存
///
/// 时间预算从构造时刻起累计计量（整个请求共享一份预算），而不是每次
/// 调用单独计时。
pub struct Preview {
    mode: PreviewMode,
    extensions: Vec<String>,
    dimension: u32,
    cache_thumbnails: bool,
    cache_dir: PathBuf,
    cache_url: String,
    max_thumbnail_time: Duration,
    lambda_resize: bool,
    start: Instant,
    http: reqwest::Client,
}

impl Preview {
    /// 创建预览助手；`can_resize` 为启动时探测的本地缩放能力
    pub fn new(options: PreviewOptions, can_resize: bool) -> Self {
        let mode = PreviewMode::parse(&options.preview);

        let mut extensions: Vec<String> = options
            .preview_extensions
            .split(',')
            .map(|e| e.trim().trim_matches('.').to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        extensions.sort();
        extensions.dedup();

        let dimension = (options.resized_dimension.clamp(100, 400) / 100) * 100;
        let max_thumbnail_time =
            Duration::from_secs_f64(options.max_thumbnail_time.clamp(1.0, 120.0));

        let cache_dir = PathBuf::from(&options.cache_dir);
        let mut cache_thumbnails =
            options.cache_thumbnails && can_resize && !options.cache_dir.is_empty();

        // 缓存目录不可用时自动降级为直接返回原图
        if cache_thumbnails && std::fs::create_dir_all(&cache_dir).is_err() {
            tracing::warn!("缩略图缓存目录创建失败，禁用本地缓存: {:?}", cache_dir);
            cache_thumbnails = false;
        }
        if cache_thumbnails && tempfile::NamedTempFile::new_in(&cache_dir).is_err() {
            tracing::warn!("缩略图缓存目录不可写，禁用本地缓存: {:?}", cache_dir);
            cache_thumbnails = false;
        }

        Self {
            mode,
            extensions,
            dimension,
            cache_thumbnails,
            cache_dir,
            cache_url: options.cache_url.trim_end_matches('/').to_string(),
            max_thumbnail_time,
            lambda_resize: options.lambda_resize,
            start: Instant::now(),
            http: reqwest::Client::new(),
        }
    }

    /// 该文件是否应该生成预览
    pub fn should_preview(&self, path: &str, is_cloudfront: bool) -> bool {
        if !self.is_image(path) {
            return false;
        }

        match self.mode {
            PreviewMode::Always => true,
            PreviewMode::Never => false,
            PreviewMode::CloudFrontOnly => is_cloudfront,
        }
    }

    /// 按扩展名（或通用图片类型）判断是否为图片
    fn is_image(&self, path: &str) -> bool {
        let name = utils::base_name(path);

        if self.extensions.is_empty() {
            return mime_guess::from_path(name)
                .first()
                .map(|m| m.type_() == mime_guess::mime::IMAGE)
                .unwrap_or(false);
        }

        let ext = utils::get_ext(name);
        self.extensions.iter().any(|e| *e == ext)
    }

    /// 获取缩放后的预览地址；总是返回一个可用的URL，从不报错
    pub async fn get_resized(&self, url: &str, last_modified: Option<DateTime<Utc>>) -> String {
        if !self.lambda_resize && self.cache_thumbnails {
            return self.resized_local_url(url, last_modified).await;
        }

        if !self.lambda_resize {
            return url.to_string();
        }

        // Lambda@Edge模式：追加尺寸查询参数，由边缘函数完成缩放
        let Ok(mut parsed) = Url::parse(url) else {
            return url.to_string();
        };

        let ext = parsed
            .path_segments()
            .and_then(|segments| segments.last().map(utils::get_ext))
            .unwrap_or_default();

        if !RESIZABLE.contains(&ext.as_str()) {
            return url.to_string();
        }

        parsed
            .query_pairs_mut()
            .append_pair("d", &format!("{0}x{0}", self.dimension));

        parsed.to_string()
    }

    /// 缓存键与落盘位置
    ///
    /// 键里混入最后修改时间，源对象更新后键自动失效。
    fn cache_location(&self, url: &str, modified: &DateTime<Utc>) -> (PathBuf, String) {
        let hash = format!("{:x}", md5::compute(format!("{}::{}", url, modified.to_rfc2822())));
        let fanned = fan_out(&hash);
        let file = format!("{}.webp", hash);

        let path = self.cache_dir.join(&fanned).join(&file);
        let public = format!("{}/{}/{}", self.cache_url, fanned, file);

        (path, public)
    }

    /// 本地缓存流程：命中返回缓存地址，其余情况生成或退回原图
    async fn resized_local_url(&self, url: &str, last_modified: Option<DateTime<Utc>>) -> String {
        // 没有修改时间就无法构造缓存键
        let Some(modified) = last_modified else {
            return url.to_string();
        };

        let ext = Url::parse(url)
            .ok()
            .and_then(|u| u.path_segments().and_then(|s| s.last().map(utils::get_ext)))
            .unwrap_or_default();

        if !CACHEABLE.contains(&ext.as_str()) {
            return url.to_string();
        }

        let (path, public_url) = self.cache_location(url, &modified);

        if let Ok(meta) = tokio::fs::metadata(&path).await {
            if let Ok(mtime) = meta.modified() {
                if mtime >= SystemTime::from(modified) {
                    if meta.len() > 0 {
                        return public_url;
                    }
                    // 零字节墓碑：上次生成失败，本键有效期内不再重试
                    return url.to_string();
                }
            }
        }

        // 预算用尽：绝不让预览生成拖垮整个列表请求
        let elapsed = self.start.elapsed();
        if elapsed > self.max_thumbnail_time {
            return url.to_string();
        }

        match self
            .regenerate(url, &path, self.max_thumbnail_time - elapsed)
            .await
        {
            Ok(()) => public_url,
            Err(e) => {
                tracing::debug!("缩略图生成失败，写入墓碑: {} ({})", url, e);
                self.write_tombstone(&path).await;
                url.to_string()
            }
        }
    }

    /// 下载、缩放、编码并原子落盘
    async fn regenerate(&self, url: &str, dest: &Path, budget: Duration) -> anyhow::Result<()> {
        let response = self.http.get(url).timeout(budget).send().await?;

        if !response.status().is_success() {
            anyhow::bail!("下载源图失败: HTTP {}", response.status());
        }

        let body = response.bytes().await?;

        let img = image::load_from_memory(&body)?;
        let img = img.resize_exact(
            self.dimension,
            self.dimension,
            image::imageops::FilterType::Triangle,
        );
        // 无损WebP编码只接受8位RGB(A)
        let img = image::DynamicImage::ImageRgba8(img.to_rgba8());

        let mut encoded = Vec::new();
        img.write_with_encoder(image::codecs::webp::WebPEncoder::new_lossless(&mut encoded))?;

        let parent = dest.parent().unwrap_or(&self.cache_dir);
        tokio::fs::create_dir_all(parent).await?;

        // 写临时文件后改名，并发写同一缓存键时不会出现半截文件
        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        std::io::Write::write_all(&mut tmp, &encoded)?;
        tmp.persist(dest)?;

        Ok(())
    }

    /// 尽力写入零字节墓碑
    async fn write_tombstone(&self, path: &Path) {
        if let Some(parent) = path.parent() {
            let _ = tokio::fs::create_dir_all(parent).await;
        }
        let _ = tokio::fs::write(path, b"").await;
    }
}

/// 将哈希分配到子目录，限制单目录文件数
///
/// `0a1b2c3d...` 按3层、每层2字符扇出为 `0a/1b/2c`。
fn fan_out(hash: &str) -> String {
    let mut parts = Vec::with_capacity(FANOUT_LEVELS);

    for i in 0..FANOUT_LEVELS {
        let start = i * FANOUT_CHARS;
        parts.push(&hash[start..start + FANOUT_CHARS]);
    }

    parts.join("/")
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn options(dir: &str) -> PreviewOptions {
        PreviewOptions {
            preview: "always".to_string(),
            cache_thumbnails: true,
            cache_dir: dir.to_string(),
            cache_url: "https://host.example/cache".to_string(),
            max_thumbnail_time: 60.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_fan_out() {
        assert_eq!(fan_out("0a1b2c3d4e5f67890a1b2c3d4e5f6789"), "0a/1b/2c");
    }

    #[test]
    fn test_dimension_clamp_and_quantize() {
        for (input, expected) in [(466, 400), (150, 100), (399, 300), (10, 100), (400, 400)] {
            let preview = Preview::new(
                PreviewOptions {
                    resized_dimension: input,
                    ..Default::default()
                },
                true,
            );
            assert_eq!(preview.dimension, expected, "dimension {}", input);
        }
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!(PreviewMode::parse("always"), PreviewMode::Always);
        assert_eq!(PreviewMode::parse("cloudfront"), PreviewMode::CloudFrontOnly);
        assert_eq!(PreviewMode::parse("none"), PreviewMode::Never);
        assert_eq!(PreviewMode::parse("garbage"), PreviewMode::Never);
    }

    #[test]
    fn test_extension_list_parsing() {
        let preview = Preview::new(
            PreviewOptions {
                preview_extensions: " PNG, .jpg ,, jpg , webp".to_string(),
                ..Default::default()
            },
            true,
        );
        assert_eq!(preview.extensions, vec!["jpg", "png", "webp"]);
    }

    #[test]
    fn test_should_preview_modes() {
        let always = Preview::new(PreviewOptions::default(), true);
        assert!(always.should_preview("/pics/cat.png", false));
        assert!(!always.should_preview("/docs/cat.txt", false));

        let cf_only = Preview::new(
            PreviewOptions {
                preview: "cloudfront".to_string(),
                ..Default::default()
            },
            true,
        );
        assert!(cf_only.should_preview("/pics/cat.png", true));
        assert!(!cf_only.should_preview("/pics/cat.png", false));
    }

    #[test]
    fn test_generic_image_check_when_extensions_empty() {
        let preview = Preview::new(
            PreviewOptions {
                preview_extensions: String::new(),
                ..Default::default()
            },
            true,
        );
        assert!(preview.should_preview("/a.png", false));
        assert!(preview.should_preview("/a.tiff", false));
        assert!(!preview.should_preview("/a.txt", false));
    }

    #[test]
    fn test_cache_disabled_without_capability() {
        let dir = tempfile::tempdir().unwrap();
        let preview = Preview::new(options(dir.path().to_str().unwrap()), false);
        assert!(!preview.cache_thumbnails);
    }

    #[test]
    fn test_can_resize_images_probe() {
        assert!(can_resize_images());
    }

    #[tokio::test]
    async fn test_lambda_mode_appends_dimension() {
        let preview = Preview::new(
            PreviewOptions {
                lambda_resize: true,
                resized_dimension: 200,
                ..Default::default()
            },
            true,
        );

        let resized = preview
            .get_resized("https://cdn.example.com/img/cat.png?v=1", None)
            .await;
        assert_eq!(resized, "https://cdn.example.com/img/cat.png?v=1&d=200x200");

        // 不可缩放的扩展名原样返回
        let resized = preview
            .get_resized("https://cdn.example.com/doc.pdf", None)
            .await;
        assert_eq!(resized, "https://cdn.example.com/doc.pdf");
    }

    #[tokio::test]
    async fn test_plain_mode_returns_original() {
        let preview = Preview::new(PreviewOptions::default(), true);
        let url = "https://cdn.example.com/cat.png";
        assert_eq!(preview.get_resized(url, Some(Utc::now())).await, url);
    }

    #[tokio::test]
    async fn test_missing_timestamp_skips_cache() {
        let dir = tempfile::tempdir().unwrap();
        let preview = Preview::new(options(dir.path().to_str().unwrap()), true);
        let url = "https://cdn.example.com/cat.png";
        assert_eq!(preview.get_resized(url, None).await, url);
    }

    #[tokio::test]
    async fn test_cache_hit_returns_local_url() {
        let dir = tempfile::tempdir().unwrap();
        let preview = Preview::new(options(dir.path().to_str().unwrap()), true);

        let url = "https://cdn.example.com/cat.png";
        let modified = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();

        // 预置一个新鲜的非空缓存文件（mtime为当前，晚于源修改时间）
        let (path, public_url) = preview.cache_location(url, &modified);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"webp-bytes").unwrap();

        assert_eq!(preview.get_resized(url, Some(modified)).await, public_url);
        assert!(public_url.starts_with("https://host.example/cache/"));
        assert!(public_url.ends_with(".webp"));
    }

    #[tokio::test]
    async fn test_tombstone_suppresses_retry() {
        let dir = tempfile::tempdir().unwrap();
        let preview = Preview::new(options(dir.path().to_str().unwrap()), true);

        let url = "https://cdn.example.com/cat.png";
        let modified = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();

        let (path, _) = preview.cache_location(url, &modified);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"").unwrap();

        // 墓碑命中：直接退回原图，不触发下载
        assert_eq!(preview.get_resized(url, Some(modified)).await, url);
    }

    #[tokio::test]
    async fn test_failed_fetch_writes_tombstone() {
        let dir = tempfile::tempdir().unwrap();
        let preview = Preview::new(options(dir.path().to_str().unwrap()), true);

        // 连接必然被拒绝的地址
        let url = "http://127.0.0.1:1/cat.png";
        let modified = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();

        assert_eq!(preview.get_resized(url, Some(modified)).await, url);

        let (path, _) = preview.cache_location(url, &modified);
        let meta = std::fs::metadata(&path).unwrap();
        assert_eq!(meta.len(), 0);
    }

    #[tokio::test]
    async fn test_newer_source_invalidates_cache_key() {
        let dir = tempfile::tempdir().unwrap();
        let preview = Preview::new(options(dir.path().to_str().unwrap()), true);

        let url = "http://127.0.0.1:1/cat.png";
        let t1 = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2021, 6, 1, 0, 0, 0).unwrap();

        let (path1, _) = preview.cache_location(url, &t1);
        let (path2, _) = preview.cache_location(url, &t2);
        // 修改时间推进后缓存键必然改变
        assert_ne!(path1, path2);

        // t1 已有新鲜缓存，t2 仍会触发重新生成（此处失败落墓碑）
        std::fs::create_dir_all(path1.parent().unwrap()).unwrap();
        std::fs::write(&path1, b"webp-bytes").unwrap();

        assert_eq!(preview.get_resized(url, Some(t2)).await, url);
        assert_eq!(std::fs::metadata(&path2).unwrap().len(), 0);
        // 旧条目成为孤儿留在原地
        assert_eq!(std::fs::metadata(&path1).unwrap().len(), 10);
    }

    #[tokio::test]
    async fn test_deadline_exceeded_returns_original() {
        let dir = tempfile::tempdir().unwrap();
        let mut opts = options(dir.path().to_str().unwrap());
        opts.max_thumbnail_time = 0.5; // 实际被钳制到1秒
        let preview = Preview::new(opts, true);

        assert_eq!(preview.max_thumbnail_time, Duration::from_secs(1));

        tokio::time::sleep(Duration::from_millis(1100)).await;

        let url = "http://127.0.0.1:1/cat.png";
        let modified = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();

        assert_eq!(preview.get_resized(url, Some(modified)).await, url);

        // 预算耗尽时不生成也不写墓碑
        let (path, _) = preview.cache_location(url, &modified);
        assert!(std::fs::metadata(&path).is_err());
    }

    #[tokio::test]
    async fn test_max_thumbnail_time_clamped() {
        let preview = Preview::new(
            PreviewOptions {
                max_thumbnail_time: 600.0,
                ..Default::default()
            },
            true,
        );
        assert_eq!(preview.max_thumbnail_time, Duration::from_secs(120));
    }
}
