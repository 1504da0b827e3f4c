//! 错误类型定义模块

use thiserror::Error;

/// 连接池统一错误类型
///
/// 实现了 `Clone`，因为同一个结果单元可能被多个等待者读取，
/// 错误需要能够复制交付给每一个等待者。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PoolError {
    /// 连接池配置错误（构建阶段即失败）
    #[error("连接池配置错误: {message}")]
    ConfigError { message: String },

    /// 连接级错误（传输/套接字故障）
    #[error("连接错误: {message}")]
    ConnectionError { message: String },

    /// 应用级错误（操作本身执行失败，如非法请求、约束冲突）
    #[error("操作执行失败: {message}")]
    ApplicationError { message: String },

    /// 等待结果超时
    #[error("等待结果超时")]
    TimeoutError,

    /// 结果单元被重复写入
    #[error("结果状态非法: {message}")]
    IllegalStateError { message: String },

    /// 连接池已关闭，拒绝新请求
    #[error("连接池已关闭")]
    PoolClosed,
}

/// 连接池操作结果类型别名
pub type PoolResult<T> = Result<T, PoolError>;

/// 连接后端返回的调用错误
///
/// 后端必须区分连接级故障与应用级错误：
/// 连接级故障会触发工作器的重连重试流程，应用级错误直接交付给调用方。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CallError {
    /// 连接级故障（套接字断开、传输失败等）
    #[error("连接级故障: {message}")]
    Connection { message: String },

    /// 应用级错误（请求本身有问题，重试无意义）
    #[error("应用级错误: {message}")]
    Application { message: String },
}

impl CallError {
    /// 构造连接级故障
    pub fn connection(message: impl Into<String>) -> Self {
        CallError::Connection {
            message: message.into(),
        }
    }

    /// 构造应用级错误
    pub fn application(message: impl Into<String>) -> Self {
        CallError::Application {
            message: message.into(),
        }
    }
}

impl From<CallError> for PoolError {
    fn from(err: CallError) -> Self {
        match err {
            CallError::Connection { message } => PoolError::ConnectionError { message },
            CallError::Application { message } => PoolError::ApplicationError { message },
        }
    }
}
