// 下载事件定义（推送给嵌入方 UI 的通知载荷）

use crate::downloader::task::TaskStatus;
use serde::Serialize;
use std::path::PathBuf;

/// 下载事件
///
/// 任务执行协程通过无界通道发送，嵌入方在自己的事件循环里消费；
/// 引擎从不直接调用 UI 代码，单线程 UI 不会被并发触碰。
/// 终态事件（Completed / Cancelled / Failed）每个任务恰好一条。
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DownloadEvent {
    /// 进度更新（每个逻辑分块一条）
    Progress {
        task_id: String,
        downloaded_bytes: u64,
        total_bytes: u64,
        /// 平滑后的速度 (bytes/s)
        speed_bps: f64,
        /// 估算剩余秒数（速度为 0 时缺省）
        #[serde(skip_serializing_if = "Option::is_none")]
        eta_secs: Option<u64>,
    },
    /// 状态变更（暂停/恢复等非终态切换）
    StatusChanged {
        task_id: String,
        old_status: TaskStatus,
        new_status: TaskStatus,
    },
    /// 任务完成，携带最终文件路径
    Completed { task_id: String, path: PathBuf },
    /// 任务被用户取消（不是错误）
    Cancelled { task_id: String },
    /// 任务失败，携带失败原因
    Failed { task_id: String, error: String },
}

impl DownloadEvent {
    /// 是否为终态事件
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DownloadEvent::Completed { .. }
                | DownloadEvent::Cancelled { .. }
                | DownloadEvent::Failed { .. }
        )
    }
}
