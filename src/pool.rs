//! 连接池核心模块
//!
//! 池在构造时创建固定数量的工作器，对外提供调用路由：
//! 指定亲和ID时路由到对应工作器（同一亲和ID的调用保持提交顺序，
//! 事务类多步操作必须使用），否则选择积压最少的队列。

use futures::future::join_all;
use rat_logger::{debug, error, info};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::PoolConfig;
use crate::connection::Connector;
use crate::error::{PoolError, PoolResult};
use crate::future::CallFuture;
use crate::queue::{Task, TaskQueue};
use crate::types::Value;
use crate::worker::Worker;

/// 工作器句柄 - 池侧持有的入队端
struct WorkerHandle {
    /// 工作器ID，即亲和路由下标
    id: usize,
    /// 任务队列入队端
    queue: TaskQueue,
}

/// 连接池
///
/// 池本身不持有任何连接状态，只负责路由；每个连接由其工作器独占，
/// 调用方之间不存在针对连接的锁竞争。
pub struct Pool {
    /// 工作器句柄列表，长度恒等于配置的 size
    workers: Vec<WorkerHandle>,
    /// 连接池配置
    config: PoolConfig,
    /// 关闭标志，置位后拒绝新请求
    closed: AtomicBool,
    /// 关闭信号发送端
    shutdown_tx: watch::Sender<bool>,
    /// 工作器任务句柄，关闭时等待退出
    join_handles: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

impl Pool {
    /// 使用配置和连接工厂创建连接池
    ///
    /// 为每个工作器建立一个连接，任一连接建立失败则整体失败。
    ///
    /// # 错误
    ///
    /// 配置非法返回 `ConfigError`，建连失败返回 `ConnectionError`
    pub async fn new<T: Connector>(config: PoolConfig, connector: T) -> PoolResult<Self> {
        config.validate()?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut workers = Vec::with_capacity(config.size);
        let mut join_handles = Vec::with_capacity(config.size);

        for id in 0..config.size {
            let connection =
                connector
                    .connect()
                    .await
                    .map_err(|e| PoolError::ConnectionError {
                        message: format!("工作器 {} 建立连接失败: {}", id, e),
                    })?;

            let (queue, consumer) = TaskQueue::unbounded();
            let worker = Worker {
                id,
                connection,
                queue: consumer,
                reconnect_delay: config.reconnect_delay,
                drain_mode: config.drain_mode,
                shutdown: shutdown_rx.clone(),
            };
            join_handles.push(tokio::spawn(worker.run()));
            workers.push(WorkerHandle { id, queue });
        }

        info!("连接池创建完成: {} 个工作器", config.size);

        Ok(Self {
            workers,
            config,
            closed: AtomicBool::new(false),
            shutdown_tx,
            join_handles: parking_lot::Mutex::new(join_handles),
        })
    }

    /// 工作器数量
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// 连接池是否已关闭
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// 各队列的待处理深度（近似值），下标即工作器ID
    pub fn queue_depths(&self) -> Vec<usize> {
        self.workers.iter().map(|w| w.queue.len()).collect()
    }

    /// 队列选择
    ///
    /// 指定亲和ID时路由到对应下标的队列；否则选择积压最少的队列，
    /// 深度相同取ID最小的工作器，保证路由确定性。
    fn select_queue(&self, qid: Option<usize>) -> PoolResult<&WorkerHandle> {
        match qid {
            Some(q) => self.workers.get(q).ok_or_else(|| PoolError::ConfigError {
                message: format!("亲和ID {} 超出范围 [0, {})", q, self.workers.len()),
            }),
            None => {
                // 构造时已验证 size > 0
                let mut best = &self.workers[0];
                for worker in &self.workers[1..] {
                    if worker.queue.len() < best.queue.len() {
                        best = worker;
                    }
                }
                Ok(best)
            }
        }
    }

    /// 提交调用，返回结果单元，不等待执行
    ///
    /// # 参数
    ///
    /// * `op` - 操作名
    /// * `args` - 位置参数
    /// * `kwargs` - 命名参数
    /// * `qid` - 亲和ID；同一亲和ID的调用由同一工作器按提交顺序执行
    ///
    /// # 错误
    ///
    /// 连接池已关闭返回 `PoolClosed`，亲和ID越界返回 `ConfigError`
    pub fn submit(
        &self,
        op: &str,
        args: Vec<Value>,
        kwargs: HashMap<String, Value>,
        qid: Option<usize>,
    ) -> PoolResult<CallFuture> {
        if self.is_closed() {
            return Err(PoolError::PoolClosed);
        }

        let future = CallFuture::new();
        let worker = self.select_queue(qid)?;
        debug!("提交操作 {} 到工作器 {}", op, worker.id);
        if worker
            .queue
            .push(Task::new(op, args, kwargs, Some(future.clone())))
            .is_err()
        {
            // 关闭标志检查之后工作器恰好退出，队列已拒收
            return Err(PoolError::PoolClosed);
        }
        Ok(future)
    }

    /// 执行调用并等待结果
    ///
    /// 启用重连重试时提供至少一次语义：连接级故障的任务不会丢失，
    /// 但远端已执行而确认丢失的操作可能重复执行，
    /// 需要精确一次语义的调用方必须保证操作幂等。
    pub async fn call(
        &self,
        op: &str,
        args: Vec<Value>,
        kwargs: HashMap<String, Value>,
        qid: Option<usize>,
    ) -> PoolResult<Value> {
        self.submit(op, args, kwargs, qid)?.get().await
    }

    /// 执行调用并带超时等待结果
    ///
    /// 超时只是放弃等待，在途任务仍会执行完成，结果被丢弃。
    ///
    /// # 错误
    ///
    /// 超时返回 `TimeoutError`
    pub async fn call_timeout(
        &self,
        op: &str,
        args: Vec<Value>,
        kwargs: HashMap<String, Value>,
        qid: Option<usize>,
        timeout: Duration,
    ) -> PoolResult<Value> {
        self.submit(op, args, kwargs, qid)?.get_timeout(timeout).await
    }

    /// 发后即忘调用
    ///
    /// 不创建结果单元，执行错误只记日志，绝不回传调用方。
    pub fn cast(
        &self,
        op: &str,
        args: Vec<Value>,
        kwargs: HashMap<String, Value>,
        qid: Option<usize>,
    ) -> PoolResult<()> {
        if self.is_closed() {
            return Err(PoolError::PoolClosed);
        }

        let worker = self.select_queue(qid)?;
        debug!("提交发后即忘操作 {} 到工作器 {}", op, worker.id);
        if worker.queue.push(Task::new(op, args, kwargs, None)).is_err() {
            return Err(PoolError::PoolClosed);
        }
        Ok(())
    }

    /// 并发 map - 对参数列表逐项发起调用
    ///
    /// 所有调用立即提交（未指定亲和ID时按队列深度分摊到各工作器），
    /// 返回的结果序列与输入顺序一致，与各工作器的完成顺序无关。
    ///
    /// # 参数
    ///
    /// * `op` - 操作名
    /// * `args_list` - 每项是一次调用的位置参数
    /// * `qid` - 亲和ID，作用于所有调用
    pub fn map(
        &self,
        op: &str,
        args_list: Vec<Vec<Value>>,
        qid: Option<usize>,
    ) -> PoolResult<MapResults> {
        let futures = args_list
            .into_iter()
            .map(|args| self.submit(op, args, HashMap::new(), qid))
            .collect::<PoolResult<Vec<_>>>()?;
        Ok(MapResults { futures, next: 0 })
    }

    /// 关闭连接池
    ///
    /// 幂等。置位关闭标志拒绝新请求，通知所有工作器，
    /// 等待每个工作器完成在途任务并按配置的关闭模式处理剩余队列后退出。
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("连接池开始关闭");

        let _ = self.shutdown_tx.send(true);

        let handles: Vec<JoinHandle<()>> = self.join_handles.lock().drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                error!("等待工作器退出失败: {}", e);
            }
        }

        info!("连接池已关闭");
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("size", &self.workers.len())
            .field("closed", &self.is_closed())
            .field("config", &self.config)
            .finish()
    }
}

/// map 调用的有序结果序列
///
/// 背后是已提交调用的结果单元，消费不会重新发起调用；
/// 序列有限且可重放（`rewind` 后再次消费返回同样的结果）。
#[derive(Debug)]
pub struct MapResults {
    futures: Vec<CallFuture>,
    next: usize,
}

impl MapResults {
    /// 结果数量
    pub fn len(&self) -> usize {
        self.futures.len()
    }

    /// 序列是否为空
    pub fn is_empty(&self) -> bool {
        self.futures.is_empty()
    }

    /// 按输入顺序取下一个结果，逐项独立等待
    pub async fn next(&mut self) -> Option<PoolResult<Value>> {
        let future = self.futures.get(self.next)?;
        let result = future.get().await;
        self.next += 1;
        Some(result)
    }

    /// 回到序列起点，再次消费不会重新发起调用
    pub fn rewind(&mut self) {
        self.next = 0;
    }

    /// 等待全部结果，按输入顺序返回
    pub async fn collect(&self) -> Vec<PoolResult<Value>> {
        join_all(self.futures.iter().map(|f| f.get())).await
    }

    /// 底层结果单元，按输入顺序排列
    pub fn futures(&self) -> &[CallFuture] {
        &self.futures
    }
}
