//! rat_connpool - 通用连接池
//!
//! 以固定数量的独占有状态连接（数据库会话、RPC链路等）服务大量并发调用方：
//! 每个连接配一个任务队列和一个工作器，调用按 FIFO 串行执行，
//! 结果通过异步结果单元交付，连接本身不需要任何锁。
//!
//! 核心能力：
//! - 亲和路由：同一亲和ID的调用固定到同一连接并保持提交顺序（事务必需）
//! - 最短队列路由：无亲和ID时选择积压最少的工作器
//! - 断线重试：连接级故障时队头任务不丢失，重连成功后重新执行（至少一次语义）
//! - 发后即忘与并发 map 扇出

// 导出所有公共模块
pub mod config;
pub mod connection;
pub mod error;
pub mod future;
pub mod pool;
pub mod queue;
pub mod types;

mod worker;

// 重新导出常用类型
pub use config::{DrainMode, PoolConfig, PoolConfigBuilder};
pub use connection::{Connection, Connector};
pub use error::{CallError, PoolError, PoolResult};
pub use future::CallFuture;
pub use pool::{MapResults, Pool};
pub use queue::{Task, TaskConsumer, TaskQueue};
pub use types::{Value, json_value_to_value};

/// 初始化rat_connpool库
///
/// 注意：日志系统由调用者自行初始化，本库不自动初始化日志
pub fn init() {
    // 库的基本初始化逻辑
    // 日志系统由调用者负责初始化
}

/// 库版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 库名称
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// 获取库信息
pub fn get_info() -> String {
    format!("{} v{}", NAME, VERSION)
}
