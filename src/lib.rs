// YouTube Downloader Rust Library
// YouTube 视频下载/音频转换核心库

// 配置管理模块
pub mod config;

// 日志系统模块
pub mod logging;

// 公共工具模块
pub mod common;

// 资源解析边界（外部协作者接口）
pub mod resolver;

// 下载引擎模块
pub mod downloader;

// 导出常用类型
pub use common::sanitize_filename;
pub use config::{AppConfig, DownloadConfig, LogConfig};
pub use downloader::{
    convert_file_size, DownloadError, DownloadEvent, DownloadKind, DownloadManager, DownloadTask,
    SpeedEstimator, StagingArea, TaskStatus,
};
pub use resolver::{ResourceDescriptor, StreamResolver};
