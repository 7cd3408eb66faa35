//! Listing records / 目录列表记录
//!
//! `ObjectEntry` is the raw store-side record, resolved into a tagged
//! file/dir variant exactly once at the listing boundary. `FsEntry` is the
//! public node handed to the host media manager, recomputed on every
//! listing and never persisted. / `ObjectEntry` 是存储侧原始记录，在列表
//! 边界处一次性解析为文件/目录变体；`FsEntry` 是暴露给宿主媒体管理器的
//! 节点，每次列表都重新计算，从不持久化。

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::utils;

/// Node type / 节点类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Dir,
}

/// Raw object-store listing record / 对象存储原始列表记录
///
/// A "common prefix" is the store's way of faking a folder; a zero-length
/// object whose key ends in `/` is the optional folder marker. / "公共前缀"
/// 是存储端伪造文件夹的方式；以 `/` 结尾的零长度对象是可选的目录占位。
#[derive(Debug, Clone)]
pub enum ObjectEntry {
    File {
        key: String,
        size: u64,
        last_modified: Option<DateTime<Utc>>,
        etag: Option<String>,
        content_type: Option<String>,
    },
    Dir {
        prefix: String,
    },
}

impl ObjectEntry {
    /// 条目对应的对象键（目录即其前缀）
    pub fn key(&self) -> &str {
        match self {
            ObjectEntry::File { key, .. } => key,
            ObjectEntry::Dir { prefix } => prefix,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, ObjectEntry::Dir { .. })
    }
}

/// Public-facing filesystem node / 暴露给宿主的文件系统节点
#[derive(Debug, Clone, Serialize)]
pub struct FsEntry {
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub name: String,
    /// Relative path, leading slash, no trailing slash except root /
    /// 相对路径，以 / 开头，除根目录外不带尾随斜杠
    pub path: String,
    pub extension: String,
    pub size: u64,
    /// ISO-8601, empty when unknown / ISO-8601 格式，未知时为空
    pub created_at: String,
    pub modified_at: String,
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_path: Option<String>,
}

impl FsEntry {
    /// Translate a raw store record into the public node / 将原始记录翻译为公开节点
    pub fn from_object(raw: &ObjectEntry, dir_prefix: &str) -> FsEntry {
        match raw {
            ObjectEntry::Dir { prefix } => {
                let path = utils::relative_path(prefix.trim_end_matches('/'), dir_prefix);
                FsEntry {
                    kind: EntryKind::Dir,
                    name: utils::base_name(&path).to_string(),
                    path,
                    extension: String::new(),
                    size: 0,
                    created_at: String::new(),
                    modified_at: String::new(),
                    mime_type: String::new(),
                    width: 0,
                    height: 0,
                    thumbnail_path: None,
                }
            }
            ObjectEntry::File {
                key,
                size,
                last_modified,
                content_type,
                ..
            } => {
                let path = utils::relative_path(key.trim_end_matches('/'), dir_prefix);
                let name = utils::base_name(&path).to_string();
                let date = last_modified
                    .as_ref()
                    .map(|d| d.to_rfc3339())
                    .unwrap_or_default();

                FsEntry {
                    kind: EntryKind::File,
                    extension: utils::get_ext(&name),
                    mime_type: resolve_mime(&name, content_type.as_deref()),
                    name,
                    path,
                    size: *size,
                    created_at: date.clone(),
                    modified_at: date,
                    width: 0,
                    height: 0,
                    thumbnail_path: None,
                }
            }
        }
    }

    /// 根节点（总是存在，无需探测）
    pub fn root() -> FsEntry {
        FsEntry {
            kind: EntryKind::Dir,
            name: String::new(),
            path: "/".to_string(),
            extension: String::new(),
            size: 0,
            created_at: String::new(),
            modified_at: String::new(),
            mime_type: String::new(),
            width: 0,
            height: 0,
            thumbnail_path: None,
        }
    }
}

/// Parse the store's timestamp formats / 解析存储端的两种时间格式
///
/// List responses carry RFC3339, HEAD responses carry RFC2822. /
/// 列表响应为 RFC3339，HEAD 响应为 RFC2822。
pub fn parse_object_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_rfc2822(raw))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// MIME resolution with extension fallback / 带扩展名回退的 MIME 解析
///
/// The store reports `application/octet-stream` for anything uploaded
/// without an explicit type; treat it as unknown. / 未显式指定类型的上传
/// 会被存储端报告为 `application/octet-stream`，视为未知。
pub fn resolve_mime(name: &str, content_type: Option<&str>) -> String {
    match content_type {
        Some(ct) if !ct.is_empty() && ct != "application/octet-stream" => ct.to_string(),
        _ => mime_guess::from_path(name)
            .first_or_octet_stream()
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dir_entry_translation() {
        let raw = ObjectEntry::Dir {
            prefix: "root/photos/".to_string(),
        };
        let entry = FsEntry::from_object(&raw, "root");
        assert_eq!(entry.kind, EntryKind::Dir);
        assert_eq!(entry.name, "photos");
        assert_eq!(entry.path, "/photos");
        assert_eq!(entry.extension, "");
        assert_eq!(entry.mime_type, "");
    }

    #[test]
    fn test_file_entry_translation() {
        let raw = ObjectEntry::File {
            key: "root/photos/cat.JPG".to_string(),
            size: 1234,
            last_modified: parse_object_date("2023-05-01T10:00:00Z"),
            etag: Some("abc".to_string()),
            content_type: None,
        };
        let entry = FsEntry::from_object(&raw, "root");
        assert_eq!(entry.kind, EntryKind::File);
        assert_eq!(entry.name, "cat.JPG");
        assert_eq!(entry.path, "/photos/cat.JPG");
        assert_eq!(entry.extension, "jpg");
        assert_eq!(entry.size, 1234);
        assert_eq!(entry.mime_type, "image/jpeg");
        assert!(entry.modified_at.starts_with("2023-05-01T10:00:00"));
    }

    #[test]
    fn test_resolve_mime_fallback() {
        // 显式类型优先
        assert_eq!(resolve_mime("a.png", Some("image/png")), "image/png");
        // octet-stream 按未知处理，回退扩展名推断
        assert_eq!(
            resolve_mime("a.png", Some("application/octet-stream")),
            "image/png"
        );
        assert_eq!(
            resolve_mime("unknown.zzz", None),
            "application/octet-stream"
        );
    }

    #[test]
    fn test_parse_object_date_formats() {
        let iso = parse_object_date("2023-05-01T10:00:00.000Z").unwrap();
        let http = parse_object_date("Mon, 01 May 2023 10:00:00 GMT").unwrap();
        assert_eq!(iso, http);
        assert!(parse_object_date("not a date").is_none());
    }
}
