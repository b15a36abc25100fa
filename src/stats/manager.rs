//! 统计计数管理器
//!
//! 负责收集下载 / manifest 访问计数并刷盘到存储后端，支持：
//! - 高并发计数（使用 DashMap 缓冲区）
//! - 三种刷盘模式：同步（间隔为 0）、定时、禁用（仅手动）
//! - 阈值触发的紧急刷盘
//! - 刷盘失败时快照恢复，数据不丢失

use std::sync::{Arc, atomic::Ordering};

use chrono::{DateTime, Utc};
use strum::IntoEnumIterator;
use tokio::sync::Notify;
use tokio::time::{Duration, sleep};
use tracing::{debug, trace, warn};

use super::buffer::PendingBuffer;
use super::entry::{StatsKind, from_pending_key, to_pending_key};
use super::sink::StatsSink;
use super::{UNIVERSE_PACKAGE_NAME, UNIVERSE_PACKAGE_VERSION};
use crate::period::{PeriodType, period_value};

/// 刷盘调度模式，由配置的 flush_interval 毫秒数决定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushMode {
    /// 间隔为 0：每次计数调用都同步刷盘
    Immediate,
    /// 间隔为正：后台定时刷盘
    Periodic(Duration),
    /// 间隔为负：只响应手动 flush
    Disabled,
}

impl FlushMode {
    pub fn from_millis(ms: i64) -> Self {
        match ms {
            0 => FlushMode::Immediate,
            ms if ms < 0 => FlushMode::Disabled,
            ms => FlushMode::Periodic(Duration::from_millis(ms as u64)),
        }
    }
}

/// 计数管理器
///
/// 缓冲区是本子系统唯一的共享可变状态，外部只通过计数 API 访问。
#[derive(Clone)]
pub struct StatsManager {
    /// 待刷盘缓冲区（共享所有权）
    buffer: Arc<PendingBuffer>,
    /// 存储后端
    sink: Arc<dyn StatsSink>,
    /// 刷盘模式
    mode: FlushMode,
    /// 触发紧急刷盘的缓冲区键数阈值
    max_pending_entries: usize,
    /// 周桶标签是否采用 ISO-8601 规则
    iso_week: bool,
    /// 停机信号，让定时任务退出循环
    shutdown: Arc<Notify>,
}

impl StatsManager {
    pub fn new(
        sink: Arc<dyn StatsSink>,
        mode: FlushMode,
        max_pending_entries: usize,
        iso_week: bool,
    ) -> Self {
        Self {
            buffer: Arc::new(PendingBuffer::new()),
            sink,
            mode,
            max_pending_entries,
            iso_week,
            shutdown: Arc::new(Notify::new()),
        }
    }

    pub fn mode(&self) -> FlushMode {
        self.mode
    }

    /// 记录一次下载：全局总量、(包, 任意版本)、(包, 精确版本) 三个目标
    /// 各展开到所有周期粒度
    pub async fn add_download_count(&self, package_name: &str, version: &str) -> anyhow::Result<()> {
        let now = Utc::now();
        let targets = [
            (UNIVERSE_PACKAGE_NAME, UNIVERSE_PACKAGE_VERSION),
            (package_name, UNIVERSE_PACKAGE_VERSION),
            (package_name, version),
        ];

        let size = self.enqueue(StatsKind::Download, &targets, now)?;
        self.after_enqueue(size).await
    }

    /// 记录一次 manifest 访问；只有给出版本时才计入精确版本目标
    pub async fn add_manifest_view_count(
        &self,
        package_name: &str,
        version: Option<&str>,
    ) -> anyhow::Result<()> {
        let now = Utc::now();
        let mut targets = vec![
            (UNIVERSE_PACKAGE_NAME, UNIVERSE_PACKAGE_VERSION),
            (package_name, UNIVERSE_PACKAGE_VERSION),
        ];
        if let Some(version) = version {
            targets.push((package_name, version));
        }

        let size = self.enqueue(StatsKind::Manifest, &targets, now)?;
        self.after_enqueue(size).await
    }

    /// 启动后台定时刷盘任务（作为异步方法运行）
    ///
    /// 收到 [`request_shutdown`](Self::request_shutdown) 信号后退出循环；
    /// 正在执行的刷盘会先完成。
    pub async fn start_background_task(&self) {
        let FlushMode::Periodic(interval) = self.mode else {
            debug!("StatsManager: flush mode is not periodic, no background task");
            return;
        };

        loop {
            tokio::select! {
                _ = sleep(interval) => {}
                _ = self.shutdown.notified() => {
                    debug!("StatsManager: shutdown requested, stopping periodic flush");
                    return;
                }
            }

            if self.buffer.is_empty() {
                continue;
            }

            if let Ok(_guard) = self.buffer.flush_lock.try_lock() {
                trace!("StatsManager: starting scheduled flush");
                if let Err(e) = Self::flush_buffer(&self.buffer, &self.sink).await {
                    warn!("StatsManager: scheduled flush failed: {}", e);
                }
            } else {
                trace!("StatsManager: flush already in progress, skipping scheduled flush");
            }
        }
    }

    /// 通知定时刷盘任务退出
    ///
    /// Notify 会保留一个许可，任务哪怕正在刷盘中也不会错过信号。
    /// 调用方随后 await 任务句柄即可保证在途刷盘完整落盘。
    pub fn request_shutdown(&self) {
        self.shutdown.notify_one();
    }

    /// 手动触发刷盘（阻塞直到完成）
    ///
    /// 若已有刷盘在执行，这里会等它结束；届时缓冲区通常已空，
    /// 不会再开第二个存储事务。
    pub async fn flush(&self) -> anyhow::Result<()> {
        debug!("StatsManager: manual flush triggered");
        let _guard = self.buffer.flush_lock.lock().await;
        Self::flush_buffer(&self.buffer, &self.sink).await
    }

    /// 当前缓冲区不同周期键的数量（用于监控与测试）
    pub fn buffer_size(&self) -> usize {
        self.buffer.len()
    }

    fn enqueue(
        &self,
        kind: StatsKind,
        targets: &[(&str, &str)],
        now: DateTime<Utc>,
    ) -> anyhow::Result<usize> {
        let mut size = self.buffer.len();

        for (name, version) in targets {
            for period_type in PeriodType::iter() {
                let value = period_value(period_type, now, self.iso_week);
                let key = to_pending_key(kind, name, version, period_type, &value)?;
                size = self.buffer.add(key, 1);
            }
        }

        trace!("StatsManager: buffer now holds {} pending keys", size);
        Ok(size)
    }

    async fn after_enqueue(&self, size: usize) -> anyhow::Result<()> {
        if self.mode == FlushMode::Immediate {
            return self.flush().await;
        }

        // 阈值触发的紧急刷盘在后台执行，调用方不等待；
        // compare_exchange 保证同一时刻只 spawn 一个任务
        if size >= self.max_pending_entries
            && self
                .buffer
                .flush_pending
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::Relaxed)
                .is_ok()
        {
            let buffer = Arc::clone(&self.buffer);
            let sink = Arc::clone(&self.sink);
            tokio::spawn(async move {
                if let Ok(_guard) = buffer.flush_lock.try_lock() {
                    if let Err(e) = Self::flush_buffer(&buffer, &sink).await {
                        warn!("StatsManager: threshold flush failed: {}", e);
                    }
                } else {
                    trace!("StatsManager: flush already in progress, skipping threshold flush");
                }
                buffer.flush_pending.store(false, Ordering::Release);
            });
        }

        Ok(())
    }

    /// 执行实际的刷盘：drain 快照 -> 解码 -> 交给 sink；
    /// 任何失败都把快照合并回缓冲区，错误向上传播
    async fn flush_buffer(buffer: &PendingBuffer, sink: &Arc<dyn StatsSink>) -> anyhow::Result<()> {
        let updates = buffer.drain();

        if updates.is_empty() {
            trace!("StatsManager: nothing to flush");
            return Ok(());
        }

        let count = updates.len();
        let decoded: Result<Vec<_>, _> = updates
            .iter()
            .map(|(key, by)| from_pending_key(key, *by))
            .collect();

        let entries = match decoded {
            Ok(entries) => entries,
            Err(e) => {
                buffer.restore(updates);
                warn!("StatsManager: failed to decode pending key, {} entries restored: {}", count, e);
                return Err(e.into());
            }
        };

        match sink.flush_stats(entries).await {
            Ok(()) => {
                debug!("StatsManager: successfully flushed {} entries", count);
                Ok(())
            }
            Err(e) => {
                buffer.restore(updates);
                warn!(
                    "StatsManager: flush_stats failed: {}, {} entries restored to buffer",
                    e, count
                );
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::entry::PendingEntry;
    use std::sync::atomic::AtomicUsize;

    struct MockSink {
        flushed: std::sync::Mutex<Vec<PendingEntry>>,
        calls: AtomicUsize,
        fail_times: AtomicUsize,
        delay: Option<Duration>,
    }

    impl MockSink {
        fn new() -> Self {
            Self {
                flushed: std::sync::Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
                fail_times: AtomicUsize::new(0),
                delay: None,
            }
        }

        fn failing(times: usize) -> Self {
            let sink = Self::new();
            sink.fail_times.store(times, Ordering::SeqCst);
            sink
        }

        fn slow(delay: Duration) -> Self {
            let mut sink = Self::new();
            sink.delay = Some(delay);
            sink
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn get_flushed(&self) -> Vec<PendingEntry> {
            self.flushed.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl StatsSink for MockSink {
        async fn flush_stats(&self, entries: Vec<PendingEntry>) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                sleep(delay).await;
            }
            if self
                .fail_times
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                anyhow::bail!("simulated storage failure");
            }
            self.flushed.lock().unwrap().extend(entries);
            Ok(())
        }
    }

    fn manager(sink: Arc<MockSink>, mode: FlushMode) -> StatsManager {
        StatsManager::new(sink as Arc<dyn StatsSink>, mode, 100_000, false)
    }

    #[tokio::test]
    async fn test_download_fanout_and_idempotent_aggregation() {
        let sink = Arc::new(MockSink::new());
        let mgr = manager(Arc::clone(&sink), FlushMode::Disabled);

        mgr.add_download_count("foo", "1.0.0").await.unwrap();
        mgr.add_download_count("foo", "1.0.0").await.unwrap();

        // 3 个目标 × 5 个周期粒度，重复调用只累加不增键
        assert_eq!(mgr.buffer_size(), 15);

        mgr.flush().await.unwrap();
        assert_eq!(mgr.buffer_size(), 0);

        let flushed = sink.get_flushed();
        assert_eq!(flushed.len(), 15);
        assert!(flushed.iter().all(|e| e.by == 2));
        assert!(flushed.iter().all(|e| e.kind == StatsKind::Download));

        let universe = flushed
            .iter()
            .filter(|e| e.package_name == "**" && e.version == "*")
            .count();
        let any_version = flushed
            .iter()
            .filter(|e| e.package_name == "foo" && e.version == "*")
            .count();
        let exact = flushed
            .iter()
            .filter(|e| e.package_name == "foo" && e.version == "1.0.0")
            .count();
        assert_eq!((universe, any_version, exact), (5, 5, 5));
    }

    #[tokio::test]
    async fn test_manifest_view_without_version_has_two_targets() {
        let sink = Arc::new(MockSink::new());
        let mgr = manager(Arc::clone(&sink), FlushMode::Disabled);

        mgr.add_manifest_view_count("foo", None).await.unwrap();
        assert_eq!(mgr.buffer_size(), 10);

        mgr.flush().await.unwrap();
        let flushed = sink.get_flushed();
        assert_eq!(flushed.len(), 10);
        // 不存在精确版本目标
        assert!(flushed.iter().all(|e| e.version == "*"));
    }

    #[tokio::test]
    async fn test_manifest_view_with_version_has_three_targets() {
        let sink = Arc::new(MockSink::new());
        let mgr = manager(Arc::clone(&sink), FlushMode::Disabled);

        mgr.add_manifest_view_count("foo", Some("2.1.0")).await.unwrap();
        mgr.flush().await.unwrap();

        let flushed = sink.get_flushed();
        assert_eq!(flushed.len(), 15);
        assert_eq!(flushed.iter().filter(|e| e.version == "2.1.0").count(), 5);
    }

    #[tokio::test]
    async fn test_flush_failure_restores_and_next_flush_recovers() {
        let sink = Arc::new(MockSink::failing(1));
        let mgr = manager(Arc::clone(&sink), FlushMode::Disabled);

        mgr.add_download_count("foo", "1.0.0").await.unwrap();
        assert!(mgr.flush().await.is_err());

        // 快照已恢复，加上失败后新到的增量一起重试
        assert_eq!(mgr.buffer_size(), 15);
        mgr.add_download_count("foo", "1.0.0").await.unwrap();

        mgr.flush().await.unwrap();
        let flushed = sink.get_flushed();
        assert_eq!(flushed.len(), 15);
        assert!(flushed.iter().all(|e| e.by == 2));
    }

    #[tokio::test]
    async fn test_concurrent_flush_collapses_to_one_sink_call() {
        let sink = Arc::new(MockSink::slow(Duration::from_millis(50)));
        let mgr = Arc::new(manager(Arc::clone(&sink), FlushMode::Disabled));

        mgr.add_download_count("foo", "1.0.0").await.unwrap();

        let a = {
            let mgr = Arc::clone(&mgr);
            tokio::spawn(async move { mgr.flush().await })
        };
        let b = {
            let mgr = Arc::clone(&mgr);
            tokio::spawn(async move { mgr.flush().await })
        };

        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        // 第二次 flush 等锁后发现缓冲区已空，不再调用 sink
        assert_eq!(sink.calls(), 1);
    }

    #[tokio::test]
    async fn test_immediate_mode_flushes_on_every_call() {
        let sink = Arc::new(MockSink::new());
        let mgr = manager(Arc::clone(&sink), FlushMode::Immediate);

        mgr.add_download_count("foo", "1.0.0").await.unwrap();

        assert_eq!(mgr.buffer_size(), 0);
        assert_eq!(sink.calls(), 1);
        assert_eq!(sink.get_flushed().len(), 15);
    }

    #[tokio::test]
    async fn test_threshold_triggers_background_flush() {
        let sink = Arc::new(MockSink::new());
        let mgr = StatsManager::new(
            Arc::clone(&sink) as Arc<dyn StatsSink>,
            FlushMode::Disabled,
            10,
            false,
        );

        // 15 个键，超过阈值 10，会在后台 spawn 一次刷盘
        mgr.add_download_count("foo", "1.0.0").await.unwrap();

        for _ in 0..50 {
            if mgr.buffer_size() == 0 {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(mgr.buffer_size(), 0);
        assert_eq!(sink.calls(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_inflight_periodic_flush() {
        let sink = Arc::new(MockSink::slow(Duration::from_millis(100)));
        let mgr = manager(
            Arc::clone(&sink),
            FlushMode::Periodic(Duration::from_millis(20)),
        );

        let task = {
            let mgr = mgr.clone();
            tokio::spawn(async move { mgr.start_background_task().await })
        };

        mgr.add_download_count("foo", "1.0.0").await.unwrap();

        // 等到定时任务 drain 了缓冲区（刷盘在途，sink 还没返回）
        for _ in 0..50 {
            if mgr.buffer_size() == 0 {
                break;
            }
            sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(mgr.buffer_size(), 0);

        // 停机顺序与 StatsDatabase::close 一致：先等任务退出再补一次刷盘
        mgr.request_shutdown();
        task.await.unwrap();
        mgr.flush().await.unwrap();

        // 在途快照完整落盘，一条不丢
        assert_eq!(sink.get_flushed().len(), 15);
    }

    #[tokio::test]
    async fn test_request_shutdown_stops_periodic_task() {
        let sink = Arc::new(MockSink::new());
        let mgr = manager(
            Arc::clone(&sink),
            FlushMode::Periodic(Duration::from_millis(10)),
        );

        let task = {
            let mgr = mgr.clone();
            tokio::spawn(async move { mgr.start_background_task().await })
        };

        // 信号在任务睡眠中到达也能退出，不会挂死
        mgr.request_shutdown();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("periodic task did not stop after shutdown request")
            .unwrap();
    }

    #[tokio::test]
    async fn test_flush_on_empty_buffer_is_noop() {
        let sink = Arc::new(MockSink::new());
        let mgr = manager(Arc::clone(&sink), FlushMode::Disabled);

        mgr.flush().await.unwrap();
        assert_eq!(sink.calls(), 0);
    }
}
