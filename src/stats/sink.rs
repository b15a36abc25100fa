//! 刷盘目标抽象与分组聚合
//!
//! 存储后端只需实现 [`StatsSink`]：接收一批待刷盘条目并在单个事务内
//! 持久化。分组逻辑放在这里，方便后端实现与单元测试复用。

use std::collections::HashMap;

use super::entry::{PendingEntry, StatsKind};
use crate::period::PeriodType;

/// 待刷盘条目的持久化目标
#[async_trait::async_trait]
pub trait StatsSink: Send + Sync {
    /// 在单个存储事务内持久化全部条目；任何失败都应整体回滚
    async fn flush_stats(&self, entries: Vec<PendingEntry>) -> anyhow::Result<()>;
}

/// 单个周期桶的增量
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodIncrement {
    pub period_type: PeriodType,
    pub period_value: String,
    pub by: u64,
}

/// 按 (package_name, version) 分组后的条目，下载与 manifest 分开
#[derive(Debug, Clone, Default)]
pub struct GroupedEntry {
    pub package_name: String,
    pub version: String,
    pub downloads: Vec<PeriodIncrement>,
    pub manifest_views: Vec<PeriodIncrement>,
}

/// 把一批条目按包分组，同一 (period_type, period_value) 的增量合并。
/// 编解码正常时不会产生重复的逻辑键，这里的再聚合只是兜底。
pub fn group_entries(entries: &[PendingEntry]) -> Vec<GroupedEntry> {
    let mut groups: HashMap<(String, String), GroupedEntry> = HashMap::new();
    let mut order: Vec<(String, String)> = Vec::new();

    for entry in entries {
        let group_key = (entry.package_name.clone(), entry.version.clone());
        let group = groups.entry(group_key.clone()).or_insert_with(|| {
            order.push(group_key);
            GroupedEntry {
                package_name: entry.package_name.clone(),
                version: entry.version.clone(),
                ..Default::default()
            }
        });

        let increments = match entry.kind {
            StatsKind::Download => &mut group.downloads,
            StatsKind::Manifest => &mut group.manifest_views,
        };

        match increments.iter_mut().find(|inc| {
            inc.period_type == entry.period_type && inc.period_value == entry.period_value
        }) {
            Some(inc) => inc.by += entry.by,
            None => increments.push(PeriodIncrement {
                period_type: entry.period_type,
                period_value: entry.period_value.clone(),
                by: entry.by,
            }),
        }
    }

    order
        .into_iter()
        .filter_map(|key| groups.remove(&key))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(kind: StatsKind, name: &str, version: &str, pt: PeriodType, pv: &str, by: u64) -> PendingEntry {
        PendingEntry {
            kind,
            package_name: name.to_string(),
            version: version.to_string(),
            period_type: pt,
            period_value: pv.to_string(),
            by,
        }
    }

    #[test]
    fn test_groups_by_package_and_splits_kinds() {
        let entries = vec![
            entry(StatsKind::Download, "react", "18.0.0", PeriodType::Daily, "2023-05-17", 1),
            entry(StatsKind::Manifest, "react", "18.0.0", PeriodType::Daily, "2023-05-17", 2),
            entry(StatsKind::Download, "react", "*", PeriodType::Daily, "2023-05-17", 1),
        ];

        let groups = group_entries(&entries);
        assert_eq!(groups.len(), 2);

        let exact = groups.iter().find(|g| g.version == "18.0.0").unwrap();
        assert_eq!(exact.downloads.len(), 1);
        assert_eq!(exact.manifest_views.len(), 1);

        let any = groups.iter().find(|g| g.version == "*").unwrap();
        assert_eq!(any.downloads.len(), 1);
        assert!(any.manifest_views.is_empty());
    }

    #[test]
    fn test_merges_duplicate_period_pairs() {
        let entries = vec![
            entry(StatsKind::Download, "react", "18.0.0", PeriodType::Daily, "2023-05-17", 1),
            entry(StatsKind::Download, "react", "18.0.0", PeriodType::Daily, "2023-05-17", 3),
        ];

        let groups = group_entries(&entries);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].downloads.len(), 1);
        assert_eq!(groups[0].downloads[0].by, 4);
    }
}
