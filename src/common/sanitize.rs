// 文件名净化模块

/// 文件名允许保留的标点字符（字母和数字之外）
const ALLOWED_PUNCTUATION: &str = " .-_()";

/// 净化文件名
///
/// 逐字符替换：字母、数字（含 Unicode 字母数字）以及 ` .-_()` 原样保留，
/// 其余字符（路径分隔符、控制字符、非 ASCII 符号等）一律替换为 `_`。
/// 不改变长度，不折叠连续的分隔符；空输入返回空字符串，
/// 调用方需要自行兜底空结果（见 DownloadManager 的任务 ID 回退）。
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_alphanumeric() || ALLOWED_PUNCTUATION.contains(c) {
                c
            } else {
                '_'
            }
        })
        .collect()
}
