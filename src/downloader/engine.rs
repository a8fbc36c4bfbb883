// 下载引擎（分块拉流循环）

use crate::common::sanitize_filename;
use crate::downloader::error::DownloadError;
use crate::downloader::events::DownloadEvent;
use crate::downloader::progress::SpeedEstimator;
use crate::downloader::staging::StagingArea;
use crate::downloader::task::{DownloadKind, DownloadTask, TaskStatus};
use futures::{Stream, StreamExt};
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 默认分块大小: 1MB
pub const DEFAULT_CHUNK_SIZE: u64 = 1024 * 1024;

/// 任务结局（失败走 Err 分支并携带原因）
#[derive(Debug)]
pub enum JobOutcome {
    /// 正常完成，携带最终文件路径
    Completed(PathBuf),
    /// 被用户取消（清理已完成）
    Cancelled,
}

/// 拉流循环的内部结局
enum FetchOutcome {
    /// 流耗尽且大小校验通过
    Finished,
    /// 在分块边界观察到取消标志
    Cancelled,
}

/// 一次定长分块读取的结果
enum ChunkRead {
    /// 凑满（或流尾不足）一个分块
    Data(Vec<u8>),
    /// 流已耗尽且无残留数据
    Eof,
    /// 等待数据期间被取消
    Cancelled,
}

/// 下载引擎
///
/// 持有复用的 HTTP 客户端，驱动单个任务的分块拉流循环。
/// 每个分块迭代依次：检查取消标志 → 暂停挂起 → 读取定长分块 →
/// 顺序追加写入 → 推进计数 → 喂给速度估算器 → 发出进度通知。
/// 写入只追加不回退，单次任务内的暂停只挂起 IO，不重开连接。
#[derive(Debug, Clone)]
pub struct DownloadEngine {
    /// HTTP 客户端（全任务复用，保持连接池一致）
    client: Client,
    /// 分块大小（字节）
    chunk_size: u64,
}

impl DownloadEngine {
    /// 创建新的下载引擎
    pub fn new(chunk_size: u64, connect_timeout_secs: u64) -> Self {
        let chunk_size = if chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            chunk_size
        };
        let client = Client::builder()
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .connect_timeout(std::time::Duration::from_secs(connect_timeout_secs))
            .build()
            .expect("Failed to build HTTP client");

        Self { client, chunk_size }
    }

    /// 执行一个下载任务直到终局
    ///
    /// 视频任务直接流式写入保存目录；音频转换任务先写入暂存区，
    /// 完成后改名搬移为 mp3。所有退出路径都保证暂存资源被释放。
    pub async fn run(
        &self,
        task: Arc<Mutex<DownloadTask>>,
        mut pause_rx: watch::Receiver<bool>,
        cancel: CancellationToken,
        events: mpsc::UnboundedSender<DownloadEvent>,
    ) -> Result<JobOutcome, DownloadError> {
        let (task_id, kind, descriptor, dest_dir) = {
            let mut t = task.lock().await;
            t.mark_running();
            (
                t.id.clone(),
                t.kind,
                t.descriptor.clone(),
                t.destination_dir.clone(),
            )
        };
        let _ = events.send(DownloadEvent::StatusChanged {
            task_id: task_id.clone(),
            old_status: TaskStatus::Idle,
            new_status: TaskStatus::Running,
        });

        // 文件基础名：净化结果为空（或全空白）时回退为任务 ID
        let base_name = {
            let sanitized = sanitize_filename(&descriptor.suggested_name);
            if sanitized.trim().is_empty() {
                task_id.clone()
            } else {
                sanitized
            }
        };

        info!(
            "开始下载任务: id={}, kind={:?}, 总大小={} bytes",
            task_id, kind, descriptor.total_size
        );

        match kind {
            DownloadKind::Video => {
                let final_path = dest_dir.join(format!("{}.{}", base_name, kind.final_extension()));
                match self
                    .fetch_stream(
                        &task,
                        &task_id,
                        &descriptor.fetch_url,
                        descriptor.total_size,
                        &final_path,
                        &mut pause_rx,
                        &cancel,
                        &events,
                    )
                    .await
                {
                    Ok(FetchOutcome::Finished) => Ok(JobOutcome::Completed(final_path)),
                    Ok(FetchOutcome::Cancelled) => {
                        // 半截文件不留在保存目录里
                        let _ = fs::remove_file(&final_path).await;
                        Ok(JobOutcome::Cancelled)
                    }
                    Err(e) => Err(e),
                }
            }
            DownloadKind::AudioMp3 => {
                let staging = StagingArea::create().await?;
                let raw_path = staging.raw_media_path();
                match self
                    .fetch_stream(
                        &task,
                        &task_id,
                        &descriptor.fetch_url,
                        descriptor.total_size,
                        &raw_path,
                        &mut pause_rx,
                        &cancel,
                        &events,
                    )
                    .await
                {
                    Ok(FetchOutcome::Finished) => {
                        match staging
                            .finalize(&base_name, kind.final_extension(), &dest_dir)
                            .await
                        {
                            Ok(final_path) => Ok(JobOutcome::Completed(final_path)),
                            Err(e) => {
                                // 定稿中途失败也不能泄漏暂存目录
                                staging.discard().await;
                                Err(e)
                            }
                        }
                    }
                    Ok(FetchOutcome::Cancelled) => {
                        staging.discard().await;
                        Ok(JobOutcome::Cancelled)
                    }
                    Err(e) => {
                        staging.discard().await;
                        Err(e)
                    }
                }
            }
        }
    }

    /// 分块拉流循环
    #[allow(clippy::too_many_arguments)]
    async fn fetch_stream(
        &self,
        task: &Arc<Mutex<DownloadTask>>,
        task_id: &str,
        fetch_url: &str,
        total_size: u64,
        target: &Path,
        pause_rx: &mut watch::Receiver<bool>,
        cancel: &CancellationToken,
        events: &mpsc::UnboundedSender<DownloadEvent>,
    ) -> Result<FetchOutcome, DownloadError> {
        debug!("开始拉流: 目标={:?}, 总大小={} bytes", target, total_size);

        let resp = self.client.get(fetch_url).send().await?;
        if !resp.status().is_success() {
            return Err(DownloadError::Network(format!(
                "HTTP 状态异常: {}",
                resp.status()
            )));
        }

        let mut file = File::create(target).await?;
        let mut stream = resp.bytes_stream();
        let mut pending: Vec<u8> = Vec::with_capacity(self.chunk_size as usize);
        let mut stream_ended = false;
        let mut estimator = SpeedEstimator::new();
        let started = Instant::now();
        let mut downloaded: u64 = 0;

        loop {
            // 1. 取消检查（分块边界）
            if cancel.is_cancelled() {
                self.note_cancelling(task, task_id, events).await;
                return Ok(FetchOutcome::Cancelled);
            }

            // 2. 暂停挂起：不消费数据，挂在 watch 通道上等恢复；期间仍可被取消
            let pause_requested = *pause_rx.borrow();
            if pause_requested
                && !self
                    .park_while_paused(task, task_id, pause_rx, cancel, events)
                    .await
            {
                self.note_cancelling(task, task_id, events).await;
                return Ok(FetchOutcome::Cancelled);
            }

            // 3. 读取一个定长分块
            let chunk = match self
                .next_chunk(&mut stream, &mut pending, &mut stream_ended, cancel)
                .await?
            {
                ChunkRead::Data(chunk) => chunk,
                ChunkRead::Eof => break,
                ChunkRead::Cancelled => {
                    self.note_cancelling(task, task_id, events).await;
                    return Ok(FetchOutcome::Cancelled);
                }
            };
            let chunk_len = chunk.len() as u64;

            // 不变量：已下载字节数不能超过声明的总大小
            if total_size > 0 && downloaded + chunk_len > total_size {
                return Err(DownloadError::Network(format!(
                    "服务器返回数据超出声明大小: {} > {}",
                    downloaded + chunk_len,
                    total_size
                )));
            }

            // 4. 顺序追加写入
            file.write_all(&chunk).await?;

            // 5-6. 推进计数，喂给速度估算器
            downloaded += chunk_len;
            let speed = estimator.record_chunk(chunk_len, started.elapsed().as_secs_f64());

            // 7. 发出进度通知
            {
                let mut t = task.lock().await;
                t.record_progress(chunk_len, speed);
            }
            let _ = events.send(DownloadEvent::Progress {
                task_id: task_id.to_string(),
                downloaded_bytes: downloaded,
                total_bytes: total_size,
                speed_bps: speed,
                eta_secs: estimator.eta_secs(total_size.saturating_sub(downloaded)),
            });
        }

        file.flush().await?;

        // 完整性校验
        if total_size > 0 && downloaded != total_size {
            return Err(DownloadError::Network(format!(
                "下载数据不完整: 实际 {} bytes, 期望 {} bytes",
                downloaded, total_size
            )));
        }

        info!("拉流完成: {:?}, {} bytes", target, downloaded);
        Ok(FetchOutcome::Finished)
    }

    /// 从网络流凑出一个定长分块
    ///
    /// 网络分片大小不定，这里累积到 `chunk_size` 再整块吐出，
    /// 流尾不足一块时吐出剩余部分。等待数据时同时监听取消信号，
    /// 对端停滞不会阻塞取消。
    async fn next_chunk<S, B>(
        &self,
        stream: &mut S,
        pending: &mut Vec<u8>,
        stream_ended: &mut bool,
        cancel: &CancellationToken,
    ) -> Result<ChunkRead, DownloadError>
    where
        S: Stream<Item = Result<B, reqwest::Error>> + Unpin,
        B: AsRef<[u8]>,
    {
        let chunk_size = self.chunk_size as usize;

        while !*stream_ended && pending.len() < chunk_size {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(ChunkRead::Cancelled),
                piece = stream.next() => match piece {
                    Some(piece) => {
                        let piece = piece
                            .map_err(|e| DownloadError::Network(format!("读取数据流失败: {}", e)))?;
                        pending.extend_from_slice(piece.as_ref());
                    }
                    None => *stream_ended = true,
                },
            }
        }

        if pending.is_empty() {
            return Ok(ChunkRead::Eof);
        }
        let take = pending.len().min(chunk_size);
        Ok(ChunkRead::Data(pending.drain(..take).collect()))
    }

    /// 暂停期间挂起
    ///
    /// # 返回
    /// - true: 已恢复，继续下载
    /// - false: 暂停期间被取消
    async fn park_while_paused(
        &self,
        task: &Arc<Mutex<DownloadTask>>,
        task_id: &str,
        pause_rx: &mut watch::Receiver<bool>,
        cancel: &CancellationToken,
        events: &mpsc::UnboundedSender<DownloadEvent>,
    ) -> bool {
        {
            let mut t = task.lock().await;
            t.mark_paused();
        }
        let _ = events.send(DownloadEvent::StatusChanged {
            task_id: task_id.to_string(),
            old_status: TaskStatus::Running,
            new_status: TaskStatus::Paused,
        });
        info!("任务已暂停: {}", task_id);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return false,
                changed = pause_rx.changed() => {
                    // 发送端掉线按恢复处理，避免永久挂起
                    if changed.is_err() || !*pause_rx.borrow() {
                        break;
                    }
                }
            }
        }

        {
            let mut t = task.lock().await;
            t.mark_running();
        }
        let _ = events.send(DownloadEvent::StatusChanged {
            task_id: task_id.to_string(),
            old_status: TaskStatus::Paused,
            new_status: TaskStatus::Running,
        });
        info!("任务已恢复: {}", task_id);
        true
    }

    /// 观察到取消标志，进入取消中状态（只进一次）
    async fn note_cancelling(
        &self,
        task: &Arc<Mutex<DownloadTask>>,
        task_id: &str,
        events: &mpsc::UnboundedSender<DownloadEvent>,
    ) {
        let old_status = {
            let mut t = task.lock().await;
            if t.status == TaskStatus::Cancelling {
                return;
            }
            let old = t.status;
            t.mark_cancelling();
            old
        };
        let _ = events.send(DownloadEvent::StatusChanged {
            task_id: task_id.to_string(),
            old_status,
            new_status: TaskStatus::Cancelling,
        });
        warn!("任务取消中，开始清理: {}", task_id);
    }
}
