//! 统计数据库门面
//!
//! 把连接、迁移、计数管理器和后台刷盘任务装配成宿主可直接使用的
//! 一个对象。宿主在启动时 `connect`，在响应完成钩子里调计数 API，
//! 在优雅停机时 `close`。

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::config::StatsConfig;
use crate::errors::{RegistryStatsError, Result};
use crate::stats::{FlushMode, StatsManager, StatsSink};
use crate::storage::StatsStorage;

pub struct StatsDatabase {
    storage: Arc<StatsStorage>,
    manager: StatsManager,
    /// 定时刷盘任务句柄，close 时等待其退出
    flush_task: parking_lot::Mutex<Option<tokio::task::JoinHandle<()>>>,
    /// 配置开关：是否统计 tarball 下载
    count_downloads: bool,
    /// 配置开关：是否统计 manifest 访问
    count_manifest_views: bool,
}

impl StatsDatabase {
    /// 校验配置、建立连接、执行迁移并启动刷盘调度
    pub async fn connect(config: &StatsConfig) -> Result<Self> {
        config.validate()?;
        let mode = config.flush_mode()?;

        let storage = Arc::new(
            StatsStorage::new(
                &config.database.database_url,
                config.database.pool_size,
                config.database.timeout,
            )
            .await?,
        );

        Ok(Self::assemble(storage, mode, config))
    }

    /// 用已有存储后端装配（测试用）
    pub fn with_storage(storage: Arc<StatsStorage>, config: &StatsConfig) -> Result<Self> {
        let mode = config.flush_mode()?;
        Ok(Self::assemble(storage, mode, config))
    }

    fn assemble(storage: Arc<StatsStorage>, mode: FlushMode, config: &StatsConfig) -> Self {
        let manager = StatsManager::new(
            Arc::clone(&storage) as Arc<dyn StatsSink>,
            mode,
            config.stats.max_pending_entries,
            config.stats.iso_week,
        );

        // 只有定时模式需要后台任务，保留句柄以便停机时取消
        let flush_task = if let FlushMode::Periodic(interval) = mode {
            let mgr = manager.clone();
            debug!("StatsDatabase: periodic flush every {:?}", interval);
            Some(tokio::spawn(async move {
                mgr.start_background_task().await;
            }))
        } else {
            None
        };

        Self {
            storage,
            manager,
            flush_task: parking_lot::Mutex::new(flush_task),
            count_downloads: config.stats.count_downloads,
            count_manifest_views: config.stats.count_manifest_views,
        }
    }

    /// 是否统计 tarball 下载（钩子据此短路）
    pub fn counts_downloads(&self) -> bool {
        self.count_downloads
    }

    /// 是否统计 manifest 访问（钩子据此短路）
    pub fn counts_manifest_views(&self) -> bool {
        self.count_manifest_views
    }

    /// 记录一次 tarball 下载
    pub async fn add_download_count(&self, package_name: &str, version: &str) -> Result<()> {
        self.manager
            .add_download_count(package_name, version)
            .await
            .map_err(|e| RegistryStatsError::database_operation(e.to_string()))
    }

    /// 记录一次 manifest 访问
    pub async fn add_manifest_view_count(
        &self,
        package_name: &str,
        version: Option<&str>,
    ) -> Result<()> {
        self.manager
            .add_manifest_view_count(package_name, version)
            .await
            .map_err(|e| RegistryStatsError::database_operation(e.to_string()))
    }

    /// 手动刷盘（优雅停机时调用）
    pub async fn flush(&self) -> Result<()> {
        self.manager
            .flush()
            .await
            .map_err(|e| RegistryStatsError::database_operation(e.to_string()))
    }

    /// 当前缓冲区待刷盘键数
    pub fn buffer_size(&self) -> usize {
        self.manager.buffer_size()
    }

    /// 回滚全部迁移
    pub async fn rollback(&self) -> Result<()> {
        self.storage.rollback_migrations().await
    }

    /// 停机：通知定时任务退出并等它结束 -> 最后一次刷盘 -> 关闭连接池
    ///
    /// 等待而不是 abort：定时任务可能正拿着已 drain 的快照在等存储 IO，
    /// 中途杀掉会把这批增量整个丢掉。
    pub async fn close(&self) -> Result<()> {
        let task = self.flush_task.lock().take();
        if let Some(task) = task {
            self.manager.request_shutdown();
            if let Err(e) = task.await {
                warn!("StatsDatabase: periodic flush task ended abnormally: {}", e);
            }
        }

        if let Err(e) = self.flush().await {
            // 连接仍要关闭，但刷盘失败必须让调用方知道
            error!("StatsDatabase: final flush failed on close: {}", e);
            let _ = self.storage.close().await;
            return Err(e);
        }

        self.storage.close().await
    }
}
