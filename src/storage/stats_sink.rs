//! StatsSink implementation for StatsStorage
//!
//! 刷盘执行器：把一批待刷盘条目按包分组后，在单个事务内完成
//! ensure -> 回读 -> 批量 upsert。任何一步失败整个事务回滚，
//! 管理器会把快照合并回缓冲区等待下次重试。

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveValue::Set, ColumnTrait, Condition, DatabaseTransaction, EntityTrait, ExprTrait,
    QueryFilter, TransactionTrait,
};
use tracing::debug;

use super::StatsStorage;
use crate::stats::{GroupedEntry, PendingEntry, PeriodIncrement, StatsSink, group_entries};

use migration::entities::{download_stat, manifest_view_stat, package};

#[async_trait]
impl StatsSink for StatsStorage {
    async fn flush_stats(&self, entries: Vec<PendingEntry>) -> anyhow::Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let total = entries.len();
        let groups = group_entries(&entries);
        let now = Utc::now();

        let txn = self.db.begin().await?;

        // 1. 批量确保所有被引用的包行存在，已存在的跳过
        ensure_packages(&txn, &groups, now).await?;

        // 2. 回读包行拿 id，新建与已存在的走同一条路径
        let package_ids = find_package_ids(&txn, &groups).await?;

        // 3. 逐包、逐统计种类批量 upsert
        for group in &groups {
            let key = (group.package_name.clone(), group.version.clone());
            let package_id = *package_ids.get(&key).ok_or_else(|| {
                anyhow::anyhow!(
                    "Package {}@{} not found after ensure",
                    group.package_name,
                    group.version
                )
            })?;

            flush_download_increments(&txn, package_id, &group.downloads, now).await?;
            flush_manifest_increments(&txn, package_id, &group.manifest_views, now).await?;
        }

        txn.commit().await?;

        debug!(
            "Stats flushed to {} database ({} entries, {} packages)",
            self.backend_name.to_uppercase(),
            total,
            groups.len()
        );

        Ok(())
    }
}

/// 批量 insert-or-ignore 所有 (name, version) 包行
async fn ensure_packages(
    txn: &DatabaseTransaction,
    groups: &[GroupedEntry],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let models: Vec<package::ActiveModel> = groups
        .iter()
        .map(|group| package::ActiveModel {
            name: Set(group.package_name.clone()),
            version: Set(group.version.clone()),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        })
        .collect();

    package::Entity::insert_many(models)
        .on_conflict(
            OnConflict::columns([package::Column::Name, package::Column::Version])
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(txn)
        .await?;

    Ok(())
}

/// 批量回读包行的 id
async fn find_package_ids(
    txn: &DatabaseTransaction,
    groups: &[GroupedEntry],
) -> anyhow::Result<HashMap<(String, String), i64>> {
    let mut cond = Condition::any();
    for group in groups {
        cond = cond.add(
            Condition::all()
                .add(package::Column::Name.eq(group.package_name.as_str()))
                .add(package::Column::Version.eq(group.version.as_str())),
        );
    }

    let rows = package::Entity::find().filter(cond).all(txn).await?;

    Ok(rows
        .into_iter()
        .map(|row| ((row.name, row.version), row.id))
        .collect())
}

/// 批量 upsert 一个包的下载增量：缺失的桶批量插入，
/// 已存在的按相同增量分批，用 id 集合过滤一次更新
async fn flush_download_increments(
    txn: &DatabaseTransaction,
    package_id: i64,
    increments: &[PeriodIncrement],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    use download_stat::{ActiveModel, Column, Entity};

    if increments.is_empty() {
        return Ok(());
    }

    let mut cond = Condition::any();
    for inc in increments {
        cond = cond.add(
            Condition::all()
                .add(Column::PeriodType.eq(inc.period_type.as_ref()))
                .add(Column::PeriodValue.eq(inc.period_value.as_str())),
        );
    }

    let existing = Entity::find()
        .filter(Column::PackageId.eq(package_id))
        .filter(cond)
        .all(txn)
        .await?;

    let mut to_create: Vec<ActiveModel> = Vec::new();
    let mut increment_batches: HashMap<u64, Vec<i64>> = HashMap::new();

    for inc in increments {
        let found = existing.iter().find(|row| {
            row.period_type == inc.period_type.as_ref() && row.period_value == inc.period_value
        });

        match found {
            Some(row) => increment_batches.entry(inc.by).or_default().push(row.id),
            None => to_create.push(ActiveModel {
                package_id: Set(package_id),
                period_type: Set(inc.period_type.to_string()),
                period_value: Set(inc.period_value.clone()),
                count: Set(inc.by as i64),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            }),
        }
    }

    if !to_create.is_empty() {
        Entity::insert_many(to_create)
            .exec_without_returning(txn)
            .await?;
    }

    for (by, ids) in increment_batches {
        Entity::update_many()
            .col_expr(Column::Count, Expr::col(Column::Count).add(by as i64))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.is_in(ids))
            .exec(txn)
            .await?;
    }

    Ok(())
}

/// manifest 访问增量的 upsert，逻辑与下载相同但写另一张表
async fn flush_manifest_increments(
    txn: &DatabaseTransaction,
    package_id: i64,
    increments: &[PeriodIncrement],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    use manifest_view_stat::{ActiveModel, Column, Entity};

    if increments.is_empty() {
        return Ok(());
    }

    let mut cond = Condition::any();
    for inc in increments {
        cond = cond.add(
            Condition::all()
                .add(Column::PeriodType.eq(inc.period_type.as_ref()))
                .add(Column::PeriodValue.eq(inc.period_value.as_str())),
        );
    }

    let existing = Entity::find()
        .filter(Column::PackageId.eq(package_id))
        .filter(cond)
        .all(txn)
        .await?;

    let mut to_create: Vec<ActiveModel> = Vec::new();
    let mut increment_batches: HashMap<u64, Vec<i64>> = HashMap::new();

    for inc in increments {
        let found = existing.iter().find(|row| {
            row.period_type == inc.period_type.as_ref() && row.period_value == inc.period_value
        });

        match found {
            Some(row) => increment_batches.entry(inc.by).or_default().push(row.id),
            None => to_create.push(ActiveModel {
                package_id: Set(package_id),
                period_type: Set(inc.period_type.to_string()),
                period_value: Set(inc.period_value.clone()),
                count: Set(inc.by as i64),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            }),
        }
    }

    if !to_create.is_empty() {
        Entity::insert_many(to_create)
            .exec_without_returning(txn)
            .await?;
    }

    for (by, ids) in increment_batches {
        Entity::update_many()
            .col_expr(Column::Count, Expr::col(Column::Count).add(by as i64))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.is_in(ids))
            .exec(txn)
            .await?;
    }

    Ok(())
}
