//! 连接池配置模块
//!
//! 提供连接池配置的构建器实现，支持链式调用和严格验证

use rat_logger::info;
use std::time::Duration;

use crate::error::{PoolError, PoolResult};

/// 关闭时对排队未开始任务的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainMode {
    /// 拒绝：未开始任务的结果单元以 `PoolClosed` 决议（默认）
    Reject,
    /// 排空：未开始任务执行完毕后工作器才退出
    Drain,
}

/// 连接池配置
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// 工作器/连接数量，固定不变
    pub size: usize,
    /// 重连尝试间隔；None 表示不重连，连接级故障直接交付调用方
    pub reconnect_delay: Option<Duration>,
    /// 关闭时的队列处理方式
    pub drain_mode: DrainMode,
}

impl PoolConfig {
    /// 创建连接池配置构建器
    pub fn builder() -> PoolConfigBuilder {
        PoolConfigBuilder::new()
    }

    /// 验证配置的合理性
    pub(crate) fn validate(&self) -> PoolResult<()> {
        if self.size == 0 {
            return Err(PoolError::ConfigError {
                message: "工作器数量必须大于零".to_string(),
            });
        }
        if let Some(delay) = self.reconnect_delay {
            if delay.is_zero() {
                return Err(PoolError::ConfigError {
                    message: "重连间隔必须大于零；不需要重连请不要设置重连间隔".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// 连接池配置构建器
///
/// 工作器数量必须显式设置，严禁使用默认值
#[derive(Debug)]
pub struct PoolConfigBuilder {
    size: Option<usize>,
    reconnect_delay: Option<Duration>,
    drain_mode: DrainMode,
}

impl PoolConfigBuilder {
    /// 创建新的构建器
    pub fn new() -> Self {
        Self {
            size: None,
            reconnect_delay: None,
            drain_mode: DrainMode::Reject,
        }
    }

    /// 设置工作器/连接数量
    ///
    /// # 参数
    ///
    /// * `size` - 工作器数量，必须大于零
    pub fn size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    /// 设置重连尝试间隔，同时启用连接级故障的重连重试
    ///
    /// 启用后连接级故障的任务保持在队头，重连成功后重新执行，
    /// 提供至少一次语义：远端已执行但确认丢失的操作可能重复执行，
    /// 需要精确一次语义的调用方必须保证操作幂等。
    ///
    /// # 参数
    ///
    /// * `delay` - 两次重连尝试之间的等待时间，必须大于零
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = Some(delay);
        self
    }

    /// 设置关闭时的队列处理方式
    ///
    /// # 参数
    ///
    /// * `mode` - 排空或拒绝，默认拒绝
    pub fn drain_mode(mut self, mode: DrainMode) -> Self {
        self.drain_mode = mode;
        self
    }

    /// 构建连接池配置
    ///
    /// # 错误
    ///
    /// 工作器数量未设置或为零、重连间隔为零时返回 `ConfigError`
    pub fn build(self) -> PoolResult<PoolConfig> {
        let size = self.size.ok_or_else(|| PoolError::ConfigError {
            message: "工作器数量必须设置".to_string(),
        })?;

        let config = PoolConfig {
            size,
            reconnect_delay: self.reconnect_delay,
            drain_mode: self.drain_mode,
        };
        config.validate()?;

        info!(
            "创建连接池配置: 工作器数量={}, 重连间隔={:?}, 关闭模式={:?}",
            config.size, config.reconnect_delay, config.drain_mode
        );

        Ok(config)
    }
}

impl Default for PoolConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
