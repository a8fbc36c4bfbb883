// 下载模块错误类型定义

use thiserror::Error;

/// 下载错误类型
///
/// 校验、冲突错误在调用处同步返回；解析、网络、IO 错误在任务内部捕获后
/// 转为 Failed 终态，通过终态事件异步送达，不会被静默丢弃。
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DownloadError {
    /// 参数校验失败（URL 为空、保存目录为空或不可写等）
    #[error("参数校验失败: {0}")]
    Validation(String),
    /// 任务冲突（已有任务进行中，或没有可操作的任务）
    #[error("任务冲突: {0}")]
    Conflict(String),
    /// 资源解析失败（外部解析器无法获取资源描述）
    #[error("资源解析失败: {0}")]
    Resolution(String),
    /// 网络错误（连接中断、超时、HTTP 状态异常）
    #[error("网络错误: {0}")]
    Network(String),
    /// IO 错误（读写、重命名、移动失败，空间不足，权限不够）
    #[error("IO 错误: {0}")]
    Io(String),
}

impl From<std::io::Error> for DownloadError {
    fn from(e: std::io::Error) -> Self {
        DownloadError::Io(e.to_string())
    }
}

impl From<reqwest::Error> for DownloadError {
    fn from(e: reqwest::Error) -> Self {
        DownloadError::Network(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DownloadError::Validation("URL 为空".to_string());
        assert_eq!(err.to_string(), "参数校验失败: URL 为空");

        let err = DownloadError::Conflict("已有任务进行中".to_string());
        assert_eq!(err.to_string(), "任务冲突: 已有任务进行中");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: DownloadError = io_err.into();
        assert!(matches!(err, DownloadError::Io(_)));
    }
}
