//! S3文件系统适配器 / S3 filesystem adapter
//!
//! One adapter per configured connection; the host media manager consumes
//! the facade in [`driver`]. / 每个连接配置对应一个适配器实例，宿主媒体
//! 管理器消费 [`driver`] 中的门面接口。

pub mod config;
pub mod driver;
pub mod factory;

pub use config::S3Config;
pub use driver::S3Adapter;
pub use factory::{adapters_from_value, S3AdapterFactory};
