// 下载管理器（单任务位控制器）

use crate::config::{DownloadConfig, PathValidator};
use crate::downloader::engine::{DownloadEngine, JobOutcome};
use crate::downloader::error::DownloadError;
use crate::downloader::events::DownloadEvent;
use crate::downloader::task::{DownloadKind, DownloadTask, TaskStatus};
use crate::resolver::{ResourceDescriptor, StreamResolver};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// 关闭时等待任务落到终态的上限
const SHUTDOWN_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// 活动任务位（任务 + 控制信号 + 执行句柄）
struct ActiveJob {
    task_id: String,
    task: Arc<Mutex<DownloadTask>>,
    cancel: CancellationToken,
    pause_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// 下载管理器
///
/// 同一时刻至多一个任务占用任务位：任务进行中再次 start 返回冲突错误，
/// 不排队。控制线程与任务协程只通过暂停/取消信号和事件通道交互，
/// 事件由嵌入方在自己的循环里消费。
pub struct DownloadManager {
    /// 下载引擎
    engine: Arc<DownloadEngine>,
    /// 单任务位（None 表示空闲）
    active: Arc<Mutex<Option<ActiveJob>>>,
    /// 事件发送端（接收端在 new 时交给嵌入方）
    event_tx: mpsc::UnboundedSender<DownloadEvent>,
    /// 默认下载目录
    download_dir: PathBuf,
}

impl DownloadManager {
    /// 创建新的下载管理器
    ///
    /// 返回管理器与事件接收端；默认下载目录不存在时自动创建。
    pub fn new(
        config: &DownloadConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<DownloadEvent>), DownloadError> {
        PathValidator::ensure_directory_exists(&config.download_dir)
            .map_err(|e| DownloadError::Io(e.to_string()))?;

        let engine = Arc::new(DownloadEngine::new(
            config.chunk_size_mb * 1024 * 1024,
            config.connect_timeout_secs,
        ));
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        info!(
            "创建下载管理器: 下载目录={:?}, 分块大小={}MB",
            config.download_dir, config.chunk_size_mb
        );

        Ok((
            Self {
                engine,
                active: Arc::new(Mutex::new(None)),
                event_tx,
                download_dir: config.download_dir.clone(),
            },
            event_rx,
        ))
    }

    /// 默认下载目录
    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    /// 启动一个下载任务
    ///
    /// 校验失败、任务位被占用时同步返回错误；否则把任务抛到后台协程，
    /// 立即返回任务 ID，进度与终态走事件通道。
    pub async fn start(
        &self,
        kind: DownloadKind,
        descriptor: ResourceDescriptor,
        destination_dir: &Path,
    ) -> Result<String, DownloadError> {
        Self::validate_inputs(&descriptor.fetch_url, destination_dir)?;

        let mut slot = self.active.lock().await;
        if let Some(job) = slot.as_ref() {
            let status = job.task.lock().await.status;
            if !status.is_terminal() {
                return Err(DownloadError::Conflict(format!(
                    "已有任务进行中: {} ({:?})",
                    job.task_id, status
                )));
            }
        }

        let task = Arc::new(Mutex::new(DownloadTask::new(
            kind,
            descriptor,
            destination_dir.to_path_buf(),
        )));
        let task_id = task.lock().await.id.clone();
        let cancel = CancellationToken::new();
        let (pause_tx, pause_rx) = watch::channel(false);

        let engine = self.engine.clone();
        let active = self.active.clone();
        let events = self.event_tx.clone();
        let job_task = task.clone();
        let job_cancel = cancel.clone();
        let job_id = task_id.clone();

        let handle = tokio::spawn(async move {
            let outcome = engine
                .run(job_task.clone(), pause_rx, job_cancel, events.clone())
                .await;

            // 标记终态，再释放任务位，最后发终态事件；事件处理方收到通知时
            // 任务位已空，可以立刻开始下一个任务，且不会读到残留进度
            let terminal_event = {
                let mut t = job_task.lock().await;
                match outcome {
                    Ok(JobOutcome::Completed(path)) => {
                        t.mark_completed();
                        info!("✓ 任务下载完成: {} -> {:?}", job_id, path);
                        DownloadEvent::Completed {
                            task_id: job_id.clone(),
                            path,
                        }
                    }
                    Ok(JobOutcome::Cancelled) => {
                        t.mark_cancelled();
                        info!("任务已取消: {}", job_id);
                        DownloadEvent::Cancelled {
                            task_id: job_id.clone(),
                        }
                    }
                    Err(e) => {
                        let cause = e.to_string();
                        t.mark_failed(cause.clone());
                        error!("✗ 任务下载失败: {}, 错误: {}", job_id, cause);
                        DownloadEvent::Failed {
                            task_id: job_id.clone(),
                            error: cause,
                        }
                    }
                }
            };

            {
                let mut slot = active.lock().await;
                // 任务位可能已被 shutdown 取走，只清理仍属于本任务的位
                if slot.as_ref().map(|j| j.task_id.as_str()) == Some(job_id.as_str()) {
                    *slot = None;
                }
            }
            let _ = events.send(terminal_event);
        });

        *slot = Some(ActiveJob {
            task_id: task_id.clone(),
            task,
            cancel,
            pause_tx,
            handle,
        });

        info!("任务已启动: {}", task_id);
        Ok(task_id)
    }

    /// 解析并启动
    ///
    /// 先经外部解析器把来源 URL 解析为资源描述（失败以 Resolution 错误
    /// 同步返回，任务不会创建），成功后走 start。
    pub async fn resolve_and_start(
        &self,
        resolver: &dyn StreamResolver,
        source_url: &str,
        destination_dir: &Path,
        kind: DownloadKind,
    ) -> Result<String, DownloadError> {
        if source_url.trim().is_empty() {
            return Err(DownloadError::Validation("URL 为空".to_string()));
        }

        let descriptor = match kind {
            DownloadKind::Video => resolver.resolve_video(source_url).await?,
            DownloadKind::AudioMp3 => resolver.resolve_audio(source_url).await?,
        };

        self.start(kind, descriptor, destination_dir).await
    }

    /// 请求暂停
    ///
    /// 只设置暂停标志；任务在下一个分块边界观察到并挂起，
    /// 不是同步保证。
    pub async fn pause(&self) -> Result<(), DownloadError> {
        let slot = self.active.lock().await;
        let job = Self::require_job(&slot)?;

        let status = job.task.lock().await.status;
        if status != TaskStatus::Running {
            return Err(DownloadError::Conflict(format!(
                "任务未在下载中: {:?}",
                status
            )));
        }

        let _ = job.pause_tx.send(true);
        info!("已请求暂停: {}", job.task_id);
        Ok(())
    }

    /// 请求恢复
    pub async fn resume(&self) -> Result<(), DownloadError> {
        let slot = self.active.lock().await;
        let job = Self::require_job(&slot)?;

        let status = job.task.lock().await.status;
        // 暂停请求可能尚未被任务观察到，此时状态仍是 Running 但标志已置位
        if status != TaskStatus::Paused && !*job.pause_tx.borrow() {
            return Err(DownloadError::Conflict(format!(
                "任务未暂停: {:?}",
                status
            )));
        }

        let _ = job.pause_tx.send(false);
        info!("已请求恢复: {}", job.task_id);
        Ok(())
    }

    /// 请求取消
    ///
    /// 设置取消标志后立即返回；清理异步进行，结束以 Cancelled 终态事件为准。
    pub async fn cancel(&self) -> Result<(), DownloadError> {
        let slot = self.active.lock().await;
        let job = Self::require_job(&slot)?;

        let status = job.task.lock().await.status;
        if status.is_terminal() {
            return Err(DownloadError::Conflict("任务已结束".to_string()));
        }

        job.cancel.cancel();
        info!("已请求取消: {}", job.task_id);
        Ok(())
    }

    /// 获取当前任务快照
    pub async fn get_task(&self) -> Option<DownloadTask> {
        let slot = self.active.lock().await;
        if let Some(job) = slot.as_ref() {
            Some(job.task.lock().await.clone())
        } else {
            None
        }
    }

    /// 是否有任务占用任务位
    pub async fn is_active(&self) -> bool {
        let slot = self.active.lock().await;
        if let Some(job) = slot.as_ref() {
            job.task.lock().await.status.is_active()
        } else {
            false
        }
    }

    /// 关闭管理器
    ///
    /// 先取消进行中的任务，再有界等待它落到终态（超时强制中止），
    /// 避免后台协程活过进程。
    pub async fn shutdown(&self) {
        let job = { self.active.lock().await.take() };
        if let Some(mut job) = job {
            info!("关闭请求: 取消进行中的任务 {}", job.task_id);
            job.cancel.cancel();

            if tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut job.handle)
                .await
                .is_err()
            {
                warn!("等待任务结束超时，强制中止: {}", job.task_id);
                job.handle.abort();
            }
        }
    }

    /// 输入校验（URL、保存目录）
    fn validate_inputs(fetch_url: &str, destination_dir: &Path) -> Result<(), DownloadError> {
        let url_empty = fetch_url.trim().is_empty();
        let dir_empty = destination_dir.as_os_str().is_empty();

        if url_empty && dir_empty {
            return Err(DownloadError::Validation(
                "下载地址与保存目录均为空".to_string(),
            ));
        }
        if url_empty {
            return Err(DownloadError::Validation("下载地址为空".to_string()));
        }
        if dir_empty {
            return Err(DownloadError::Validation("保存目录为空".to_string()));
        }

        let result = PathValidator::validate(destination_dir);
        if !result.valid {
            return Err(DownloadError::Validation(result.message));
        }
        Ok(())
    }

    fn require_job(slot: &Option<ActiveJob>) -> Result<&ActiveJob, DownloadError> {
        slot.as_ref()
            .ok_or_else(|| DownloadError::Conflict("当前没有进行中的任务".to_string()))
    }
}
