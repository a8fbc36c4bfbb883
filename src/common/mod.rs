// 公共模块（跨组件共享的纯函数工具）

pub mod sanitize;

pub use sanitize::sanitize_filename;
