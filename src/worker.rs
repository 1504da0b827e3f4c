//! 连接工作器模块
//!
//! 每个工作器独占一个连接和一个任务队列，按 FIFO 顺序串行执行任务。
//! 连接级故障时队头任务不移除，重连成功后重新执行同一个任务；
//! 应用级错误直接交付调用方并推进队列。

use rat_logger::{debug, error, info, warn};
use std::time::Duration;
use tokio::sync::watch;

use crate::config::DrainMode;
use crate::connection::Connection;
use crate::error::{CallError, PoolError, PoolResult};
use crate::queue::{Task, TaskConsumer};
use crate::types::Value;

/// 连接工作器
///
/// 状态在主循环中流转：空闲 → 执行中 → {成功/应用错误 → 空闲,
/// 连接故障 → 重连中 → 执行中}；收到关闭信号后先完成在途任务，
/// 再按配置的关闭模式处理剩余队列，然后退出。
pub(crate) struct Worker<C: Connection> {
    /// 工作器ID，同时是亲和路由的队列下标
    pub(crate) id: usize,
    /// 独占持有的连接，生命周期内不与任何其他组件共享
    pub(crate) connection: C,
    /// 独占消费的任务队列
    pub(crate) queue: TaskConsumer,
    /// 重连尝试间隔；None 表示连接级故障不重试
    pub(crate) reconnect_delay: Option<Duration>,
    /// 关闭时的队列处理方式
    pub(crate) drain_mode: DrainMode,
    /// 关闭信号
    pub(crate) shutdown: watch::Receiver<bool>,
}

impl<C: Connection> Worker<C> {
    /// 运行工作器主循环
    pub(crate) async fn run(mut self) {
        info!("工作器 {} 开始运行", self.id);

        loop {
            tokio::select! {
                // 关闭信号优先，保证在途任务完成后立即进入排空流程
                biased;
                _ = self.shutdown.changed() => break,
                _ = self.queue.wait_task() => {
                    self.process_head().await;
                }
            }
        }

        self.drain().await;
        // 关闭队列并清扫与关闭竞态落入的任务，之后的入队在入队端被拒绝
        self.queue.close();
        info!("工作器 {} 已停止", self.id);
    }

    /// 处理队头任务直到推进队列
    ///
    /// 只有两种出口：任务结果（值或应用/连接错误）已交付且队列已推进。
    /// 连接级故障且配置了重连间隔时在本方法内循环重试，不返回。
    async fn process_head(&mut self) {
        loop {
            let Some(task) = self.queue.head() else {
                return;
            };
            debug!("工作器 {} 执行操作: {} {:?}", self.id, task.op, task.args);

            let result = self
                .connection
                .call(&task.op, &task.args, &task.kwargs)
                .await;

            match result {
                Ok(value) => {
                    if let Some(task) = self.queue.advance() {
                        Self::deliver(self.id, task, Ok(value));
                    }
                    return;
                }
                Err(CallError::Application { message }) => {
                    // 应用级错误不重试，交付错误并推进队列
                    if let Some(task) = self.queue.advance() {
                        Self::deliver(
                            self.id,
                            task,
                            Err(PoolError::ApplicationError { message }),
                        );
                    }
                    return;
                }
                Err(CallError::Connection { message }) => match self.reconnect_delay {
                    None => {
                        // 未启用重连，连接级故障对该任务是终态
                        warn!("工作器 {} 连接故障且未启用重连: {}", self.id, message);
                        if let Some(task) = self.queue.advance() {
                            Self::deliver(
                                self.id,
                                task,
                                Err(PoolError::ConnectionError { message }),
                            );
                        }
                        return;
                    }
                    Some(delay) => {
                        // 队头不推进，重连成功后重新执行同一个任务。
                        // 至少一次语义：远端已执行但确认丢失的操作会重复执行
                        warn!(
                            "工作器 {} 连接故障，重连后重试队头任务: {}",
                            self.id, message
                        );
                        self.reconnect_loop(delay).await;
                    }
                },
            }
        }
    }

    /// 重连循环，反复尝试直到成功
    ///
    /// 故障后立即发起首次尝试，配置的间隔只隔开相邻的失败尝试。
    async fn reconnect_loop(&mut self, delay: Duration) {
        let mut attempt: u64 = 0;
        loop {
            attempt += 1;
            info!("工作器 {} 第 {} 次尝试重连", self.id, attempt);
            match self.connection.reconnect().await {
                Ok(()) => {
                    info!("工作器 {} 重连成功", self.id);
                    return;
                }
                Err(e) => {
                    error!("工作器 {} 重连失败: {}", self.id, e);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// 关闭阶段处理剩余队列
    async fn drain(&mut self) {
        match self.drain_mode {
            DrainMode::Drain => {
                let mut drained = 0usize;
                while self.queue.try_fill() {
                    self.process_head().await;
                    drained += 1;
                }
                if drained > 0 {
                    info!("工作器 {} 关闭前排空 {} 个任务", self.id, drained);
                }
            }
            DrainMode::Reject => {
                let mut rejected = 0usize;
                while self.queue.try_fill() {
                    if let Some(task) = self.queue.advance() {
                        match task.result {
                            Some(future) => {
                                if future.set_error(PoolError::PoolClosed).is_err() {
                                    debug!("工作器 {} 拒绝的任务结果单元已决议", self.id);
                                }
                            }
                            None => {
                                debug!("工作器 {} 丢弃发后即忘任务: {}", self.id, task.op);
                            }
                        }
                        rejected += 1;
                    }
                }
                if rejected > 0 {
                    info!("工作器 {} 关闭时拒绝 {} 个未开始任务", self.id, rejected);
                }
            }
        }
    }

    /// 交付任务结果
    ///
    /// 有结果单元则写入；发后即忘任务的错误只记日志。
    /// 调用方超时放弃等待后结果单元仍可写入，结果被丢弃；
    /// 这里的写入失败只可能是重复决议，记日志后忽略。
    fn deliver(id: usize, task: Task, result: PoolResult<Value>) {
        match task.result {
            Some(future) => {
                if let Err(e) = future.resolve(result) {
                    warn!("工作器 {} 交付结果失败: {}", id, e);
                }
            }
            None => {
                if let Err(e) = result {
                    error!("[最后调用]: {} {:?} 执行失败: {}", task.op, task.args, e);
                }
            }
        }
    }
}
