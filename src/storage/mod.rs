//! SeaORM storage backend
//!
//! This module provides database storage using SeaORM,
//! supporting SQLite, MySQL/MariaDB, and PostgreSQL.

mod connection;
mod stats_sink;

use sea_orm::DatabaseConnection;

use crate::errors::{RegistryStatsError, Result};

pub use connection::{connect_generic, connect_sqlite, run_migrations};

/// 从数据库 URL 推断数据库类型
pub fn infer_backend_from_url(database_url: &str) -> Result<String> {
    if database_url.starts_with("sqlite://")
        || database_url.ends_with(".db")
        || database_url.ends_with(".sqlite")
        || database_url == ":memory:"
    {
        Ok("sqlite".to_string())
    } else if database_url.starts_with("mysql://") || database_url.starts_with("mariadb://") {
        Ok("mysql".to_string())
    } else if database_url.starts_with("postgres://") || database_url.starts_with("postgresql://") {
        Ok("postgres".to_string())
    } else {
        Err(RegistryStatsError::database_config(format!(
            "无法从 URL 推断数据库类型: {}. 支持的 URL 格式: sqlite://, mysql://, mariadb://, postgres://",
            database_url
        )))
    }
}

/// 规范化 backend 名称
pub fn normalize_backend_name(backend: &str) -> String {
    match backend {
        "mariadb" => "mysql".to_string(),
        other => other.to_string(),
    }
}

/// SeaORM-based storage backend
#[derive(Clone)]
pub struct StatsStorage {
    db: DatabaseConnection,
    backend_name: String,
}

impl StatsStorage {
    /// 建立数据库连接并执行迁移
    pub async fn new(database_url: &str, pool_size: u32, timeout_secs: u64) -> Result<Self> {
        if database_url.is_empty() {
            return Err(RegistryStatsError::database_config(
                "database_url 未设置".to_string(),
            ));
        }

        let backend_name = infer_backend_from_url(database_url)?;
        let backend_name = normalize_backend_name(&backend_name);

        let db = match backend_name.as_str() {
            "sqlite" => connection::connect_sqlite(database_url, timeout_secs).await?,
            _ => {
                connection::connect_generic(database_url, &backend_name, pool_size, timeout_secs)
                    .await?
            }
        };

        connection::run_migrations(&db).await?;

        Ok(Self { db, backend_name })
    }

    /// 包装一个已有连接（测试用）
    pub fn from_connection(db: DatabaseConnection, backend_name: &str) -> Self {
        Self {
            db,
            backend_name: backend_name.to_string(),
        }
    }

    pub fn backend_name(&self) -> &str {
        &self.backend_name
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    /// 回滚全部迁移
    pub async fn rollback_migrations(&self) -> Result<()> {
        connection::rollback_migrations(&self.db).await
    }

    /// 关闭连接池
    pub async fn close(&self) -> Result<()> {
        self.db
            .clone()
            .close()
            .await
            .map_err(|e| RegistryStatsError::database_connection(format!("关闭连接失败: {}", e)))
    }
}
