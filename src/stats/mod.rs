//! 计数聚合引擎
//!
//! - `entry`: 待刷盘条目与周期键编解码
//! - `buffer`: 并发缓冲区
//! - `manager`: 计数 API 与刷盘调度
//! - `sink`: 存储后端抽象与分组聚合

pub mod buffer;
pub mod entry;
pub mod manager;
pub mod sink;

pub use entry::{PendingEntry, StatsKind, from_pending_key, to_pending_key};
pub use manager::{FlushMode, StatsManager};
pub use sink::{GroupedEntry, PeriodIncrement, StatsSink, group_entries};

/// 代表「所有包」的哨兵包名，全局总量挂在它名下
pub const UNIVERSE_PACKAGE_NAME: &str = "**";

/// 代表「任意版本」的哨兵版本号
pub const UNIVERSE_PACKAGE_VERSION: &str = "*";
