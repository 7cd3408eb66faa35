//! S3 media filesystem adapter / S3媒体文件系统适配器
//!
//! Exposes an object-storage bucket through a hierarchical filesystem
//! abstraction for a host media manager, plus a deadline-bounded local
//! thumbnail cache. / 将对象存储桶以层级文件系统的形式暴露给宿主媒体
//! 管理器，并附带受时间预算约束的本地缩略图缓存。

pub mod adapter;
pub mod error;
pub mod models;
pub mod preview;
pub mod store;
pub mod utils;

pub use adapter::{adapters_from_value, S3Adapter, S3AdapterFactory, S3Config};
pub use error::{AdapterError, Result};
pub use models::{EntryKind, FsEntry, ObjectEntry};
pub use preview::{can_resize_images, Preview, PreviewOptions};
pub use store::{ObjectStore, S3ObjectStore};
