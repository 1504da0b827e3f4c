//! 任务队列模块
//!
//! 每个工作器独占一个无界 FIFO 队列。入队端可被任意多个调用方克隆，
//! 出队端仅由持有它的工作器消费。出队分为 peek（取头不移除）和
//! advance（移除头部）两步，连接故障重试时任务保持在队头不丢失。
//!
//! 队列关闭协议：工作器退出前先置关闭标志再做最终清扫；
//! 入队方在入队后复查关闭标志，发现已关闭就自己补一次清扫。
//! 两侧至少有一侧能看到竞态窗口里落入的任务，
//! 保证关闭后不存在永远无人决议的任务。

use crossbeam_queue::SegQueue;
use rat_logger::debug;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Notify;

use crate::error::PoolError;
use crate::future::CallFuture;
use crate::types::Value;

/// 排队等待执行的调用任务
///
/// 入队后不可变，由路由到的那个工作器独占消费，绝不在队列间迁移。
#[derive(Debug)]
pub struct Task {
    /// 操作名（后端识别的调用名）
    pub op: String,
    /// 位置参数
    pub args: Vec<Value>,
    /// 命名参数
    pub kwargs: HashMap<String, Value>,
    /// 结果单元；None 表示发后即忘，错误只记日志
    pub result: Option<CallFuture>,
}

impl Task {
    /// 创建任务
    pub fn new(
        op: impl Into<String>,
        args: Vec<Value>,
        kwargs: HashMap<String, Value>,
        result: Option<CallFuture>,
    ) -> Self {
        Self {
            op: op.into(),
            args,
            kwargs,
            result,
        }
    }
}

/// 队列共享内部结构
struct QueueInner {
    /// 无锁队列本体
    items: SegQueue<Task>,
    /// 待处理深度，含消费端已 peek 尚未 advance 的队头任务
    pending: AtomicUsize,
    /// 入队唤醒
    notify: Notify,
    /// 关闭标志；置位后消费端不再读取队列
    closed: AtomicBool,
}

impl QueueInner {
    /// 清扫队列中残留的任务，逐个以 `PoolClosed` 决议
    ///
    /// 仅在关闭标志置位后调用。此时消费端已永久退出，
    /// 多个清扫方并发弹出是安全的，每个任务只会被一方处置。
    fn reject_remaining(&self) {
        while let Some(task) = self.items.pop() {
            self.pending.fetch_sub(1, Ordering::Release);
            match task.result {
                Some(future) => {
                    if future.set_error(PoolError::PoolClosed).is_err() {
                        debug!("关闭清扫的任务结果单元已决议: {}", task.op);
                    }
                }
                None => {
                    debug!("关闭后丢弃发后即忘任务: {}", task.op);
                }
            }
        }
    }
}

/// 任务队列入队端
///
/// 可克隆给任意多个生产者；入队永不阻塞（无界），
/// 仅在队列关闭后拒绝并原样返还任务。
#[derive(Clone)]
pub struct TaskQueue {
    inner: Arc<QueueInner>,
}

impl TaskQueue {
    /// 创建队列，返回入队端和出队端
    pub fn unbounded() -> (TaskQueue, TaskConsumer) {
        let inner = Arc::new(QueueInner {
            items: SegQueue::new(),
            pending: AtomicUsize::new(0),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        });
        (
            TaskQueue {
                inner: inner.clone(),
            },
            TaskConsumer { inner, head: None },
        )
    }

    /// 入队任务
    ///
    /// 队列已关闭时原样返还任务，由调用方处置其结果单元。
    /// 入队成功后复查关闭标志：消费端可能恰在入队间隙完成了
    /// 最终清扫，此时由入队方补扫，刚入队的任务会以
    /// `PoolClosed` 决议而不是永远无人读取。
    pub fn push(&self, task: Task) -> Result<(), Task> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(task);
        }

        self.inner.pending.fetch_add(1, Ordering::Release);
        self.inner.items.push(task);
        self.inner.notify.notify_one();

        if self.inner.closed.load(Ordering::SeqCst) {
            self.inner.reject_remaining();
        }
        Ok(())
    }

    /// 待处理深度（近似值）
    ///
    /// 仅用于负载路由的启发式读数，与并发入队/出队的竞争可以接受。
    pub fn len(&self) -> usize {
        self.inner.pending.load(Ordering::Acquire)
    }

    /// 队列是否为空（近似值）
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 队列是否已关闭
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue")
            .field("pending", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// 任务队列出队端 - 单消费者
///
/// 队头任务通过 `wait_task`/`head` 暴露但不移除，
/// 只有显式 `advance` 才把它移出队列。
pub struct TaskConsumer {
    inner: Arc<QueueInner>,
    head: Option<Task>,
}

impl TaskConsumer {
    /// 等待队头有任务可用
    ///
    /// 队头已有任务时立即返回。取消安全：
    /// 弹出与写入队头在同一次轮询内完成，不存在丢任务的窗口。
    pub async fn wait_task(&mut self) {
        if self.head.is_some() {
            return;
        }
        loop {
            // 先注册唤醒再尝试弹出，避免错过通知
            let notified = self.inner.notify.notified();
            if let Some(task) = self.inner.items.pop() {
                self.head = Some(task);
                return;
            }
            notified.await;
        }
    }

    /// 查看队头任务，不移除
    pub fn head(&self) -> Option<&Task> {
        self.head.as_ref()
    }

    /// 移除并返回队头任务
    pub fn advance(&mut self) -> Option<Task> {
        let task = self.head.take();
        if task.is_some() {
            self.inner.pending.fetch_sub(1, Ordering::Release);
        }
        task
    }

    /// 非阻塞地补充队头，返回队头是否有任务
    ///
    /// 关闭排空阶段使用：此时不再有新任务入队，弹空即结束。
    pub fn try_fill(&mut self) -> bool {
        if self.head.is_some() {
            return true;
        }
        if let Some(task) = self.inner.items.pop() {
            self.head = Some(task);
            return true;
        }
        false
    }

    /// 关闭队列，消费端永久退出前的最后一步
    ///
    /// 置位关闭标志后做最终清扫：排空处理结束后、标志置位前
    /// 落入队列的任务在这里以 `PoolClosed` 决议；
    /// 标志置位后落入的任务由入队方的复查清扫兜底。
    pub fn close(&mut self) {
        if let Some(task) = self.advance() {
            // 正常流程关闭时队头已清空，这里仅兜底
            if let Some(future) = task.result {
                let _ = future.set_error(PoolError::PoolClosed);
            }
        }
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.reject_remaining();
    }

    /// 待处理深度（近似值）
    pub fn len(&self) -> usize {
        self.inner.pending.load(Ordering::Acquire)
    }

    /// 队列是否为空（近似值）
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for TaskConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskConsumer")
            .field("pending", &self.len())
            .field("head", &self.head.is_some())
            .finish()
    }
}
