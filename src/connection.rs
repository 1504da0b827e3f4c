//! 连接后端契约模块
//!
//! 连接池不关心后端的线协议，只消费这里定义的能力接口。
//! 数据库客户端、RPC 链路等有状态独占连接均以此接入。

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::CallError;
use crate::types::Value;

/// 有状态独占连接
///
/// 一个连接在整个生命周期内只被一个工作器持有，
/// 所有调用串行执行，实现方无需任何内部加锁。
///
/// 错误分类是契约的核心：`CallError::Connection` 表示传输级故障，
/// 会触发工作器的重连重试流程（队头任务不丢失）；
/// `CallError::Application` 表示操作本身失败，直接交付给调用方。
#[async_trait]
pub trait Connection: Send + 'static {
    /// 执行一次命名操作
    ///
    /// # 参数
    ///
    /// * `op` - 操作名，由后端自行解释
    /// * `args` - 位置参数
    /// * `kwargs` - 命名参数
    async fn call(
        &mut self,
        op: &str,
        args: &[Value],
        kwargs: &HashMap<String, Value>,
    ) -> Result<Value, CallError>;

    /// 尝试一次重建底层连接
    ///
    /// 必须幂等：对已恢复的连接再次调用应当无害。
    /// 单次尝试失败返回错误即可，按配置间隔反复调用直到成功
    /// 的循环由工作器驱动。
    async fn reconnect(&mut self) -> Result<(), CallError>;
}

/// 连接工厂
///
/// 连接池构造时为每个工作器创建一个连接，
/// 后端特有的连接参数由实现方自行持有并原样使用。
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// 工厂产出的连接类型
    type Connection: Connection;

    /// 建立一个新连接
    async fn connect(&self) -> Result<Self::Connection, CallError>;
}
