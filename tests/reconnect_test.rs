//! 连接级故障重连与重试语义测试

mod common;

use common::{make_pool, make_pool_with};
use rat_connpool::{PoolConfig, PoolError, Value, args};
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::time::Duration;

fn retry_config(size: usize) -> PoolConfig {
    PoolConfig::builder()
        .size(size)
        .reconnect_delay(Duration::from_millis(30))
        .build()
        .expect("构建配置失败")
}

#[tokio::test]
async fn test_retry_after_single_connection_failure() {
    let (pool, state) = make_pool_with(retry_config(1)).await;

    // 第一次执行前连接断开，重连成功后同一个任务重新执行
    state.fail_times.store(1, Ordering::Release);

    let value = pool
        .call("echo", args![42], HashMap::new(), None)
        .await
        .expect("重连后任务应最终成功");
    assert_eq!(value, Value::Int(42));

    assert_eq!(state.reconnects.load(Ordering::Acquire), 1);
    // 至少一次语义：后端观察到一到两次执行，绝不会是零次
    let executed = state.completed_count("echo");
    assert!((1..=2).contains(&executed), "执行次数应为1或2，实际 {}", executed);

    pool.shutdown().await;
}

#[tokio::test]
async fn test_lost_ack_causes_duplicate_execution() {
    let (pool, state) = make_pool_with(retry_config(1)).await;

    // 远端已执行但确认丢失：重试导致重复执行，这是文档化的取舍
    state.fail_times.store(1, Ordering::Release);
    state.fail_after_execute.store(true, Ordering::Release);

    let value = pool
        .call("echo", args![7], HashMap::new(), None)
        .await
        .expect("重连后任务应最终成功");
    assert_eq!(value, Value::Int(7));
    assert_eq!(state.completed_count("echo"), 2);

    pool.shutdown().await;
}

#[tokio::test]
async fn test_reconnect_loop_keeps_trying() {
    let (pool, state) = make_pool_with(retry_config(1)).await;

    // 前两次重连失败，第三次成功，任务不丢失
    state.fail_times.store(1, Ordering::Release);
    state.reconnect_fail_times.store(2, Ordering::Release);

    let value = pool
        .call("echo", args![3], HashMap::new(), None)
        .await
        .expect("重连循环应坚持到成功");
    assert_eq!(value, Value::Int(3));
    assert_eq!(state.reconnects.load(Ordering::Acquire), 1);

    pool.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_first_reconnect_attempt_is_immediate() {
    let config = PoolConfig::builder()
        .size(1)
        .reconnect_delay(Duration::from_secs(5))
        .build()
        .expect("构建配置失败");
    let (pool, state) = make_pool_with(config).await;
    state.fail_times.store(1, Ordering::Release);

    // 故障后立即发起首次重连，不先等一个间隔
    let start = tokio::time::Instant::now();
    let value = pool
        .call("echo", args![9], HashMap::new(), None)
        .await
        .expect("重连后任务应最终成功");
    assert_eq!(value, Value::Int(9));
    assert!(
        start.elapsed() < Duration::from_secs(5),
        "首次重连不应等待间隔: {:?}",
        start.elapsed()
    );
    assert_eq!(state.reconnects.load(Ordering::Acquire), 1);

    pool.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_delay_separates_failed_reconnect_attempts() {
    let config = PoolConfig::builder()
        .size(1)
        .reconnect_delay(Duration::from_secs(5))
        .build()
        .expect("构建配置失败");
    let (pool, state) = make_pool_with(config).await;
    state.fail_times.store(1, Ordering::Release);
    state.reconnect_fail_times.store(1, Ordering::Release);

    // 首次重连失败后等一个间隔再试，恰好一个间隔后成功
    let start = tokio::time::Instant::now();
    let value = pool
        .call("echo", args![4], HashMap::new(), None)
        .await
        .expect("重连后任务应最终成功");
    assert_eq!(value, Value::Int(4));
    assert!(
        start.elapsed() >= Duration::from_secs(5),
        "失败的重连之间应间隔等待: {:?}",
        start.elapsed()
    );
    assert!(
        start.elapsed() < Duration::from_secs(10),
        "成功后不应再等待: {:?}",
        start.elapsed()
    );

    pool.shutdown().await;
}

#[tokio::test]
async fn test_no_reconnect_delay_fails_task_immediately() {
    // 未启用重连：连接级故障直接交付调用方，不重试
    let (pool, state) = make_pool(1).await;
    state.fail_times.store(1, Ordering::Release);

    let err = pool
        .call("echo", args![1], HashMap::new(), None)
        .await
        .expect_err("连接级故障应直接交付");
    assert!(matches!(err, PoolError::ConnectionError { .. }));
    assert_eq!(state.reconnects.load(Ordering::Acquire), 0);

    // 队列已推进，后续调用正常
    let value = pool
        .call("echo", args![2], HashMap::new(), None)
        .await
        .expect("后续调用失败");
    assert_eq!(value, Value::Int(2));

    pool.shutdown().await;
}

#[tokio::test]
async fn test_affinity_order_survives_retry() {
    let (pool, state) = make_pool_with(retry_config(2)).await;

    // 队头任务故障重试期间，同队列后续任务不越过它
    state.fail_times.store(1, Ordering::Release);

    let f1 = pool
        .submit("echo", args![1], HashMap::new(), Some(0))
        .expect("提交失败");
    let f2 = pool
        .submit("echo", args![2], HashMap::new(), Some(0))
        .expect("提交失败");

    assert_eq!(f1.get().await, Ok(Value::Int(1)));
    assert_eq!(f2.get().await, Ok(Value::Int(2)));

    let records = state.records();
    let positions: Vec<i64> = records
        .iter()
        .filter(|r| r.op == "echo")
        .filter_map(|r| r.args.first().and_then(|v| v.as_i64()))
        .collect();
    // 任务1的成功执行必须先于任务2
    let last_one = positions.iter().rposition(|&v| v == 1).expect("任务1应已执行");
    let first_two = positions.iter().position(|&v| v == 2).expect("任务2应已执行");
    assert!(last_one < first_two, "重试不得破坏亲和顺序: {:?}", positions);

    pool.shutdown().await;
}
