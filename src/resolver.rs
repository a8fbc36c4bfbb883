// 资源解析边界（外部协作者接口）

use crate::downloader::DownloadError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// 资源描述
///
/// 由外部解析器把视频页面 URL 解析成可直接拉流的描述；一旦产出即不可变。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceDescriptor {
    /// 可流式拉取的下载地址
    pub fetch_url: String,
    /// 文件总大小（字节）
    pub total_size: u64,
    /// 建议的文件名（通常为视频标题，未净化）
    pub suggested_name: String,
}

/// 流解析器接口
///
/// 解析失败（资源不可用、地区限制、已删除等）以 `DownloadError::Resolution`
/// 返回，发生在任何任务创建之前。本 crate 不提供具体实现，
/// 由嵌入方注入（测试里用桩实现）。
#[async_trait]
pub trait StreamResolver: Send + Sync {
    /// 解析最高清晰度的视频流
    async fn resolve_video(&self, source_url: &str) -> Result<ResourceDescriptor, DownloadError>;

    /// 解析纯音频流（用于 mp3 转换管线）
    async fn resolve_audio(&self, source_url: &str) -> Result<ResourceDescriptor, DownloadError>;
}
