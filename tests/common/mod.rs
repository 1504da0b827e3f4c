//! 测试公用的模拟后端
//!
//! 模拟连接记录每次成功执行（连接ID、操作名、参数），
//! 并支持按预算注入连接级故障和重连失败，
//! 用于验证路由、顺序和重连重试语义。

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use rat_connpool::{CallError, Connection, Connector, Pool, PoolConfig, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

/// 一次成功执行的记录
#[derive(Debug, Clone)]
pub struct CallRecord {
    pub conn_id: usize,
    pub op: String,
    pub args: Vec<Value>,
}

/// 模拟后端共享状态，池中所有连接共用
#[derive(Default)]
pub struct BackendState {
    /// 成功执行记录，按完成顺序
    pub completed: Mutex<Vec<CallRecord>>,
    /// 剩余的连接级故障注入次数
    pub fail_times: AtomicUsize,
    /// 故障发生在执行之后（副作用已产生，确认丢失）
    pub fail_after_execute: AtomicBool,
    /// 重连成功次数
    pub reconnects: AtomicUsize,
    /// 剩余的重连失败注入次数
    pub reconnect_fail_times: AtomicUsize,
    /// 当前停驻在 park 操作里的连接数
    parked: AtomicUsize,
    /// park 操作的放行标志
    released: AtomicBool,
    /// park 操作的放行通知
    release: Notify,
}

impl BackendState {
    /// 指定操作的成功执行次数
    pub fn completed_count(&self, op: &str) -> usize {
        self.completed.lock().iter().filter(|r| r.op == op).count()
    }

    /// 成功执行记录快照
    pub fn records(&self) -> Vec<CallRecord> {
        self.completed.lock().clone()
    }

    /// 停驻在 park 操作里的连接数
    pub fn parked_count(&self) -> usize {
        self.parked.load(Ordering::Acquire)
    }

    /// 放行所有 park 操作，含尚未进入停驻的
    pub fn release_all(&self) {
        self.released.store(true, Ordering::Release);
        self.release.notify_waiters();
    }
}

/// 轮询等待条件成立，测试用状态同步点，不依赖墙钟时序
pub async fn wait_until(cond: impl Fn() -> bool) {
    while !cond() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

/// 消耗一次注入预算，预算为零返回 false
fn take_budget(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| v.checked_sub(1))
        .is_ok()
}

/// 模拟连接
pub struct MockConnection {
    pub id: usize,
    pub state: Arc<BackendState>,
}

impl MockConnection {
    fn record(&self, op: &str, args: &[Value]) {
        self.state.completed.lock().push(CallRecord {
            conn_id: self.id,
            op: op.to_string(),
            args: args.to_vec(),
        });
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn call(
        &mut self,
        op: &str,
        args: &[Value],
        kwargs: &HashMap<String, Value>,
    ) -> Result<Value, CallError> {
        // 命名参数 delay_ms 模拟慢操作
        if let Some(ms) = kwargs.get("delay_ms").and_then(|v| v.as_i64()) {
            tokio::time::sleep(Duration::from_millis(ms as u64)).await;
        }

        // 连接级故障注入
        if take_budget(&self.state.fail_times) {
            if self.state.fail_after_execute.load(Ordering::Acquire) {
                // 远端已执行，确认在传输中丢失
                self.record(op, args);
            }
            return Err(CallError::connection("模拟套接字断开"));
        }

        match op {
            "echo" => {
                self.record(op, args);
                Ok(args.first().cloned().unwrap_or(Value::Null))
            }
            "echo_delay" => {
                // args[0] 是返回值，args[1] 是执行耗时（毫秒）
                let ms = args.get(1).and_then(|v| v.as_i64()).unwrap_or(0);
                tokio::time::sleep(Duration::from_millis(ms as u64)).await;
                self.record(op, args);
                Ok(args.first().cloned().unwrap_or(Value::Null))
            }
            "conn_id" => {
                self.record(op, args);
                Ok(Value::Int(self.id as i64))
            }
            "park" => {
                // 停驻到测试显式放行，提供确定的"工作器在途"同步点
                self.state.parked.fetch_add(1, Ordering::AcqRel);
                loop {
                    let notified = self.state.release.notified();
                    if self.state.released.load(Ordering::Acquire) {
                        break;
                    }
                    notified.await;
                }
                self.record(op, args);
                Ok(args.first().cloned().unwrap_or(Value::Null))
            }
            "fail_app" => Err(CallError::application("模拟应用错误")),
            _ => Err(CallError::application(format!("未知操作: {}", op))),
        }
    }

    async fn reconnect(&mut self) -> Result<(), CallError> {
        if take_budget(&self.state.reconnect_fail_times) {
            return Err(CallError::connection("模拟重连失败"));
        }
        self.state.reconnects.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}

/// 模拟连接工厂，按建连顺序分配连接ID（与工作器ID一致）
pub struct MockConnector {
    state: Arc<BackendState>,
    next_id: AtomicUsize,
}

impl MockConnector {
    pub fn new(state: Arc<BackendState>) -> Self {
        Self {
            state,
            next_id: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Connection = MockConnection;

    async fn connect(&self) -> Result<MockConnection, CallError> {
        Ok(MockConnection {
            id: self.next_id.fetch_add(1, Ordering::AcqRel),
            state: self.state.clone(),
        })
    }
}

/// 默认配置（拒绝模式，不重连）的连接池
pub async fn make_pool(size: usize) -> (Pool, Arc<BackendState>) {
    let config = PoolConfig::builder()
        .size(size)
        .build()
        .expect("构建配置失败");
    make_pool_with(config).await
}

/// 指定配置的连接池
pub async fn make_pool_with(config: PoolConfig) -> (Pool, Arc<BackendState>) {
    let state = Arc::new(BackendState::default());
    let pool = Pool::new(config, MockConnector::new(state.clone()))
        .await
        .expect("创建连接池失败");
    (pool, state)
}
