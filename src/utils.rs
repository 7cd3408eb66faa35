/// Path and key mapping utility functions / 路径与对象键映射工具函数
///
/// The bucket only knows flat keys; every notion of "directory" in this
/// crate is derived from these pure functions. / 存储桶只有扁平键，
/// 本 crate 中所有"目录"概念都由这些纯函数推导。

/// Clean and normalize path / 清理和规范化路径
/// 1. Replace backslashes with forward slashes / 将反斜杠替换为正斜杠
/// 2. Ensure path starts with / / 确保路径以 / 开头
/// 3. Clean . and .. in path / 清理路径中的 . 和 ..
pub fn fix_and_clean_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    let path = if path.starts_with('/') {
        path
    } else {
        format!("/{}", path)
    };

    clean_path(&path)
}

/// Clean path, handle ., .. and duplicate / / 清理路径，处理 . 和 .. 和重复的 /
fn clean_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();

    for part in path.split('/') {
        match part {
            "" | "." => continue,
            ".." => {
                parts.pop();
            }
            _ => parts.push(part),
        }
    }

    if parts.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", parts.join("/"))
    }
}

/// Get file extension (lowercase) / 获取文件扩展名
pub fn get_ext(path: &str) -> String {
    std::path::Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

/// Base name of a path or key, trailing slash ignored / 取路径或键的最后一段，忽略尾随斜杠
pub fn base_name(path: &str) -> &str {
    path.trim_end_matches('/').rsplit('/').next().unwrap_or("")
}

/// Make a name safe for use as an object key segment / 清理文件名使其可用作对象键片段
///
/// Object keys may not end in a dot, and `/` inside a name would change the
/// key hierarchy, so it becomes `_`. Idempotent. / 对象键不能以点结尾，
/// 名字里的 `/` 会改变键层级，替换为 `_`。幂等。
pub fn make_safe_name(name: &str) -> String {
    name.trim_end_matches('.').replace('/', "_")
}

/// Normalize the configured root directory / 规范化连接配置中的根目录
///
/// No leading/trailing slash, no backslashes, no `//`. / 无首尾斜杠、
/// 无反斜杠、无 `//`。
pub fn normalize_directory(raw: &str) -> String {
    let mut dir = raw.trim().replace('\\', "/");

    while dir.contains("//") {
        dir = dir.replace("//", "/");
    }

    dir.trim_matches('/').to_string()
}

/// Map a relative path onto an absolute object key / 将相对路径映射为绝对对象键
///
/// `dir_prefix` is the normalized connection directory (may be empty).
/// The result never carries a trailing slash; callers append one for
/// directory keys. / `dir_prefix` 为规范化后的连接根目录（可为空）。
/// 结果不带尾随斜杠，目录键由调用方补斜杠。
pub fn absolute_key(path: &str, dir_prefix: &str) -> String {
    let p = path.trim_matches('/');

    if dir_prefix.is_empty() {
        p.to_string()
    } else if p.is_empty() {
        dir_prefix.to_string()
    } else {
        format!("{}/{}", dir_prefix, p)
    }
}

/// Inverse of [`absolute_key`] / [`absolute_key`] 的逆映射
///
/// Strips the prefix when present and always returns a leading-slash
/// path ("/" for the root itself). / 去掉前缀（若存在），总是返回以 /
/// 开头的路径（根目录为 "/"）。
pub fn relative_path(key: &str, dir_prefix: &str) -> String {
    let mut rel = key;

    if !dir_prefix.is_empty() {
        if let Some(rest) = key.strip_prefix(dir_prefix) {
            // 只在前缀边界落在 / 上时才算命中，避免 "pre2/x" 被 "pre" 误剥
            if rest.is_empty() || rest.starts_with('/') {
                rel = rest;
            }
        }
    }

    let rel = rel.trim_matches('/');

    if rel.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", rel)
    }
}
