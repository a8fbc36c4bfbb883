// 进度估算模块（速度平滑与剩余时间计算）

/// 速度估算器
///
/// 维护指数加权平滑的平均速度：每收到一个分块，
/// `avg = (avg + instant) / 2`，其中 `instant = 分块字节数 / 距任务开始的秒数`。
/// 不是严格的算术平均，对最近的速度变化刻意更敏感。
#[derive(Debug, Clone, Default)]
pub struct SpeedEstimator {
    /// 平滑后的平均速度 (bytes/s)
    average_bps: f64,
}

impl SpeedEstimator {
    /// 创建新的速度估算器（初始平均速度为 0）
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一个分块样本，返回更新后的平均速度 (bytes/s)
    ///
    /// # 参数
    /// * `chunk_bytes` - 本次分块字节数
    /// * `elapsed_secs` - 距任务开始的秒数（<=0 时不更新，直接返回当前值）
    pub fn record_chunk(&mut self, chunk_bytes: u64, elapsed_secs: f64) -> f64 {
        if elapsed_secs > 0.0 {
            let instant = chunk_bytes as f64 / elapsed_secs;
            self.average_bps = (self.average_bps + instant) / 2.0;
        }
        self.average_bps
    }

    /// 当前平均速度 (bytes/s)
    pub fn average_bps(&self) -> f64 {
        self.average_bps
    }

    /// 估算剩余时间（秒）
    ///
    /// 平均速度为 0 时无法估算，返回 None
    pub fn eta_secs(&self, remaining_bytes: u64) -> Option<u64> {
        if self.average_bps > 0.0 {
            Some((remaining_bytes as f64 / self.average_bps) as u64)
        } else {
            None
        }
    }

    /// 重置估算状态（任务终态后清零，避免下个任务读到残留值）
    pub fn reset(&mut self) {
        self.average_bps = 0.0;
    }
}

/// 字节数单位表（1024 进制）
const SIZE_UNITS: [&str; 9] = ["B", "KB", "MB", "GB", "TB", "PB", "EB", "ZB", "YB"];

/// 格式化字节数为人类可读格式
///
/// 1024 进制，保留两位小数（去掉多余的尾零），0 返回 `"0B"`
pub fn convert_file_size(size_bytes: u64) -> String {
    if size_bytes == 0 {
        return "0B".to_string();
    }
    let i = ((size_bytes as f64).ln() / 1024f64.ln()).floor() as usize;
    let i = i.min(SIZE_UNITS.len() - 1);
    let p = 1024f64.powi(i as i32);
    let s = (size_bytes as f64 / p * 100.0).round() / 100.0;
    format!("{} {}", s, SIZE_UNITS[i])
}
