// 下载任务定义（状态机）

use crate::resolver::ResourceDescriptor;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// 任务类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DownloadKind {
    /// 视频下载（最高清晰度流，直接落到保存目录）
    Video,
    /// 音频转换（抓取纯音频流到暂存目录，再改名搬移为 mp3）
    AudioMp3,
}

impl DownloadKind {
    /// 最终文件的扩展名
    pub fn final_extension(&self) -> &'static str {
        match self {
            DownloadKind::Video => "mp4",
            DownloadKind::AudioMp3 => "mp3",
        }
    }
}

/// 下载任务状态
///
/// 状态机：Idle → Running ⇄ Paused → {Completed | Cancelled | Failed}，
/// 取消经由 Cancelling 过渡（协作式，任务在下一个分块边界观察到取消标志）。
/// 终态没有出边，重新开始只能创建新任务。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// 未开始
    Idle,
    /// 下载中
    Running,
    /// 已暂停
    Paused,
    /// 取消中（已观察到取消标志，清理尚未完成）
    Cancelling,
    /// 已取消
    Cancelled,
    /// 已完成
    Completed,
    /// 失败
    Failed,
}

impl TaskStatus {
    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Cancelled | TaskStatus::Completed | TaskStatus::Failed
        )
    }

    /// 是否占用任务位（非 Idle 且未到终态）
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            TaskStatus::Running | TaskStatus::Paused | TaskStatus::Cancelling
        )
    }
}

/// 下载任务
///
/// 只由任务自身的执行协程修改；控制侧通过暂停/取消信号影响它，
/// 不直接改写字段。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadTask {
    /// 任务ID
    pub id: String,
    /// 任务类型
    pub kind: DownloadKind,
    /// 资源描述（外部解析器产出，任务期间不可变）
    pub descriptor: ResourceDescriptor,
    /// 本地保存目录
    pub destination_dir: PathBuf,
    /// 任务状态
    pub status: TaskStatus,
    /// 已下载大小
    pub downloaded_size: u64,
    /// 文件总大小
    pub total_size: u64,
    /// 平滑后的下载速度 (bytes/s)
    pub speed: f64,
    /// 创建时间 (Unix timestamp)
    pub created_at: i64,
    /// 开始时间 (Unix timestamp)
    pub started_at: Option<i64>,
    /// 最近一次进度采样时间 (Unix timestamp)
    pub last_sample_at: Option<i64>,
    /// 完成时间 (Unix timestamp)
    pub completed_at: Option<i64>,
    /// 错误信息
    pub error: Option<String>,
}

impl DownloadTask {
    pub fn new(kind: DownloadKind, descriptor: ResourceDescriptor, destination_dir: PathBuf) -> Self {
        let total_size = descriptor.total_size;
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            descriptor,
            destination_dir,
            status: TaskStatus::Idle,
            downloaded_size: 0,
            total_size,
            speed: 0.0,
            created_at: chrono::Utc::now().timestamp(),
            started_at: None,
            last_sample_at: None,
            completed_at: None,
            error: None,
        }
    }

    /// 计算进度百分比
    pub fn progress(&self) -> f64 {
        if self.total_size == 0 {
            return 0.0;
        }
        (self.downloaded_size as f64 / self.total_size as f64) * 100.0
    }

    /// 剩余字节数
    pub fn remaining_bytes(&self) -> u64 {
        self.total_size.saturating_sub(self.downloaded_size)
    }

    /// 标记为下载中（首次开始或暂停恢复）
    pub fn mark_running(&mut self) {
        self.status = TaskStatus::Running;
        if self.started_at.is_none() {
            self.started_at = Some(chrono::Utc::now().timestamp());
        }
    }

    /// 标记为已暂停
    pub fn mark_paused(&mut self) {
        self.status = TaskStatus::Paused;
    }

    /// 标记为取消中
    pub fn mark_cancelling(&mut self) {
        self.status = TaskStatus::Cancelling;
    }

    /// 标记为已取消
    pub fn mark_cancelled(&mut self) {
        self.status = TaskStatus::Cancelled;
        self.completed_at = Some(chrono::Utc::now().timestamp());
        self.speed = 0.0;
    }

    /// 标记为已完成
    pub fn mark_completed(&mut self) {
        self.status = TaskStatus::Completed;
        self.completed_at = Some(chrono::Utc::now().timestamp());
        self.downloaded_size = self.total_size;
    }

    /// 标记为失败
    pub fn mark_failed(&mut self, error: String) {
        self.status = TaskStatus::Failed;
        self.error = Some(error);
        self.completed_at = Some(chrono::Utc::now().timestamp());
        self.speed = 0.0;
    }

    /// 记录一次进度采样
    pub fn record_progress(&mut self, chunk_bytes: u64, speed_bps: f64) {
        self.downloaded_size += chunk_bytes;
        self.speed = speed_bps;
        self.last_sample_at = Some(chrono::Utc::now().timestamp());
    }
}
