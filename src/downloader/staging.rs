// 暂存目录管理（转换管线的中转区）

use crate::downloader::error::DownloadError;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// 暂存目录里原始媒体流的固定文件名
const RAW_MEDIA_NAME: &str = "raw_media.mp4";

/// 暂存区
///
/// 系统临时目录下的独占子目录，由单个任务在其生命周期内独占。
/// 任务开始时创建，每条退出路径（完成、取消、失败）上恰好删除一次：
/// finalize 在把产物搬出后删除，discard 无条件删除且可重入。
#[derive(Debug)]
pub struct StagingArea {
    /// 暂存目录路径
    temp_dir: PathBuf,
}

impl StagingArea {
    /// 创建新的暂存区（唯一命名，互不共享）
    pub async fn create() -> Result<Self, DownloadError> {
        let temp_dir = std::env::temp_dir().join(format!("yt-staging-{}", Uuid::new_v4()));
        fs::create_dir_all(&temp_dir).await?;
        debug!("暂存目录已创建: {:?}", temp_dir);
        Ok(Self { temp_dir })
    }

    /// 暂存目录路径
    pub fn path(&self) -> &Path {
        &self.temp_dir
    }

    /// 原始媒体流的落盘路径（任务把拉到的流写到这里）
    pub fn raw_media_path(&self) -> PathBuf {
        self.temp_dir.join(RAW_MEDIA_NAME)
    }

    /// 定稿：改名 → 搬移 → 删除暂存目录
    ///
    /// 把原始媒体在暂存目录内改名为 `{base_name}.{ext}`，
    /// 再搬移到 `destination_dir`，最后递归删除暂存目录。
    /// 同名文件直接覆盖（后写者赢，与搬移替换语义一致）。
    ///
    /// # 返回
    /// 最终文件路径
    pub async fn finalize(
        &self,
        base_name: &str,
        ext: &str,
        destination_dir: &Path,
    ) -> Result<PathBuf, DownloadError> {
        if !destination_dir.is_dir() {
            return Err(DownloadError::Io(format!(
                "保存目录不存在或不是目录: {:?}",
                destination_dir
            )));
        }

        let raw_path = self.raw_media_path();
        let file_name = format!("{}.{}", base_name, ext);
        let staged_path = self.temp_dir.join(&file_name);
        let final_path = destination_dir.join(&file_name);

        // 1. 暂存目录内改名
        fs::rename(&raw_path, &staged_path)
            .await
            .map_err(|e| DownloadError::Io(format!("暂存文件改名失败: {}", e)))?;

        // 2. 搬移到保存目录；rename 不能跨文件系统，失败则退化为复制+删除
        if let Err(rename_err) = fs::rename(&staged_path, &final_path).await {
            debug!("rename 搬移失败（{}），改用复制+删除", rename_err);
            fs::copy(&staged_path, &final_path)
                .await
                .map_err(|e| DownloadError::Io(format!("搬移到保存目录失败: {}", e)))?;
            let _ = fs::remove_file(&staged_path).await;
        }

        // 3. 删除暂存目录
        self.discard().await;

        info!("定稿完成: {:?}", final_path);
        Ok(final_path)
    }

    /// 丢弃：无条件递归删除暂存目录
    ///
    /// 取消、失败路径上调用；目录已不存在时静默成功（可重入）。
    pub async fn discard(&self) {
        match fs::remove_dir_all(&self.temp_dir).await {
            Ok(_) => debug!("暂存目录已删除: {:?}", self.temp_dir),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("删除暂存目录失败: {:?}, 错误: {}", self.temp_dir, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_create_and_discard() {
        let staging = StagingArea::create().await.unwrap();
        assert!(staging.path().exists());

        staging.discard().await;
        assert!(!staging.path().exists());

        // 重复丢弃不报错
        staging.discard().await;
    }

    #[tokio::test]
    async fn test_staging_dirs_are_unique() {
        let a = StagingArea::create().await.unwrap();
        let b = StagingArea::create().await.unwrap();
        assert_ne!(a.path(), b.path());
        a.discard().await;
        b.discard().await;
    }

    #[tokio::test]
    async fn test_finalize_moves_and_cleans_up() {
        let dest = TempDir::new().unwrap();
        let staging = StagingArea::create().await.unwrap();
        fs::write(staging.raw_media_path(), b"audio-bytes")
            .await
            .unwrap();

        let final_path = staging
            .finalize("My Song", "mp3", dest.path())
            .await
            .unwrap();

        assert_eq!(final_path, dest.path().join("My Song.mp3"));
        assert_eq!(fs::read(&final_path).await.unwrap(), b"audio-bytes");
        // 定稿后暂存目录必须已删除
        assert!(!staging.path().exists());
    }

    #[tokio::test]
    async fn test_finalize_overwrites_existing() {
        // 后写者赢：同名文件被覆盖
        let dest = TempDir::new().unwrap();
        let existing = dest.path().join("Song.mp3");
        fs::write(&existing, b"old").await.unwrap();

        let staging = StagingArea::create().await.unwrap();
        fs::write(staging.raw_media_path(), b"new").await.unwrap();
        staging.finalize("Song", "mp3", dest.path()).await.unwrap();

        assert_eq!(fs::read(&existing).await.unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_finalize_missing_destination() {
        let staging = StagingArea::create().await.unwrap();
        fs::write(staging.raw_media_path(), b"x").await.unwrap();

        let err = staging
            .finalize("Song", "mp3", Path::new("/nonexistent/dir/12345"))
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::Io(_)));

        staging.discard().await;
    }
}
