//! 统一错误类型定义.
//!
//! 所有 Naliu crate 共用的错误类型, 支持跨模块传播.
//!
//! 错误分级约定:
//! - `MalformedBitstream` / `Sink` / `ParameterSet` 为致命错误, 中止导入;
//! - 解析器返回的 `InvalidData` 由调用方按上下文降级 (slice 解析失败仅跳过
//!   该 NAL, 不中止码流).

use thiserror::Error;

/// Naliu 统一错误类型
#[derive(Debug, Error)]
pub enum NaliuError {
    /// 无效参数
    #[error("无效参数: {0}")]
    InvalidArgument(String),

    /// 不支持的操作
    #[error("不支持的操作: {0}")]
    Unsupported(String),

    /// 码流格式非法 (找不到起始码 / NAL 头不可解析)
    #[error("码流格式非法: {0}")]
    MalformedBitstream(String),

    /// 参数集错误 (流结束时无任何可用 SPS/PPS)
    #[error("参数集错误: {0}")]
    ParameterSet(String),

    /// 容器写入被拒绝
    #[error("容器写入错误: {0}")]
    Sink(String),

    /// 无效数据 (损坏的语法元素等)
    #[error("无效数据: {0}")]
    InvalidData(String),

    /// I/O 错误
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 已到达流末尾
    #[error("已到达流末尾")]
    Eof,

    /// 内部错误 (不应发生)
    #[error("内部错误: {0}")]
    Internal(String),
}

/// Naliu 统一 Result 类型
pub type NaliuResult<T> = Result<T, NaliuError>;
