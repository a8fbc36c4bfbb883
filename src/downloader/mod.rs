pub mod engine;
pub mod error;
pub mod events;
pub mod manager;
pub mod progress;
pub mod staging;
pub mod task;

pub use engine::{DownloadEngine, JobOutcome, DEFAULT_CHUNK_SIZE};
pub use error::DownloadError;
pub use events::DownloadEvent;
pub use manager::DownloadManager;
pub use progress::{convert_file_size, SpeedEstimator};
pub use staging::StagingArea;
pub use task::{DownloadKind, DownloadTask, TaskStatus};
