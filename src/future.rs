//! 异步结果单元模块
//!
//! `CallFuture` 是单次写入、可多读者等待的结果单元，
//! 由工作器写入（值或错误），由调用方等待读取。
//! 写入方和读取方各持有一个克隆，内部状态共享。

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use crate::error::{PoolError, PoolResult};
use crate::types::Value;

/// 结果单元内部状态
struct FutureInner {
    /// None 表示尚未决议；Some 为终态，写入后不再改变
    state: Mutex<Option<PoolResult<Value>>>,
    /// 决议时唤醒所有等待者
    notify: Notify,
}

/// 异步结果单元
///
/// 写入遵循严格的单次决议契约：值和错误二选一，
/// 重复写入返回 `IllegalStateError` 而不是静默覆盖。
#[derive(Clone)]
pub struct CallFuture {
    inner: Arc<FutureInner>,
}

impl CallFuture {
    /// 创建未决议的结果单元
    pub fn new() -> Self {
        Self {
            inner: Arc::new(FutureInner {
                state: Mutex::new(None),
                notify: Notify::new(),
            }),
        }
    }

    /// 写入成功值，使所有等待者返回
    ///
    /// # 错误
    ///
    /// 结果单元已决议时返回 `IllegalStateError`
    pub fn set(&self, value: Value) -> PoolResult<()> {
        self.resolve(Ok(value))
    }

    /// 写入错误，使所有等待者返回
    ///
    /// # 错误
    ///
    /// 结果单元已决议时返回 `IllegalStateError`
    pub fn set_error(&self, error: PoolError) -> PoolResult<()> {
        self.resolve(Err(error))
    }

    /// 写入终态结果
    pub(crate) fn resolve(&self, result: PoolResult<Value>) -> PoolResult<()> {
        {
            let mut state = self.inner.state.lock();
            if state.is_some() {
                return Err(PoolError::IllegalStateError {
                    message: "结果单元已决议，禁止重复写入".to_string(),
                });
            }
            *state = Some(result);
        }
        self.inner.notify.notify_waiters();
        Ok(())
    }

    /// 判断是否已决议
    pub fn is_resolved(&self) -> bool {
        self.inner.state.lock().is_some()
    }

    /// 非阻塞读取，未决议返回 None
    pub fn try_get(&self) -> Option<PoolResult<Value>> {
        self.inner.state.lock().clone()
    }

    /// 等待直到决议，返回值或错误
    ///
    /// 结果单元是终态的，重复 `get` 返回同一结果。
    pub async fn get(&self) -> PoolResult<Value> {
        loop {
            // 必须先注册等待再检查状态，避免错过唤醒
            let notified = self.inner.notify.notified();
            if let Some(result) = self.try_get() {
                return result;
            }
            notified.await;
        }
    }

    /// 带超时等待
    ///
    /// 超时只是放弃等待，不取消在途任务；
    /// 任务仍会执行完成，其结果被写入后无人读取即被丢弃。
    ///
    /// # 错误
    ///
    /// 超时返回 `TimeoutError`
    pub async fn get_timeout(&self, timeout: Duration) -> PoolResult<Value> {
        match tokio::time::timeout(timeout, self.get()).await {
            Ok(result) => result,
            Err(_) => Err(PoolError::TimeoutError),
        }
    }
}

impl Default for CallFuture {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CallFuture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallFuture")
            .field("resolved", &self.is_resolved())
            .finish()
    }
}
