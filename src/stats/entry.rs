//! 待刷盘条目与周期键编解码
//!
//! 缓冲区以单个字符串键聚合 (kind, package, version, period_type,
//! period_value) 五元组。分隔符使用控制字符 `\u{0001}`，包名、版本号和
//! 日期标签中都不会出现；编码时校验各分量，含分隔符的输入直接报错，
//! 避免解码时静默错位。

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumIter};

use crate::errors::{RegistryStatsError, Result};
use crate::period::PeriodType;

/// 键分隔符，选用不可能出现在分量中的控制字符
const KEY_SEP: char = '\u{0001}';

/// 统计种类：下载 / manifest 访问
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StatsKind {
    Download,
    Manifest,
}

impl std::fmt::Display for StatsKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_ref())
    }
}

impl std::str::FromStr for StatsKind {
    type Err = RegistryStatsError;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "download" => Ok(Self::Download),
            "manifest" => Ok(Self::Manifest),
            other => Err(RegistryStatsError::validation(format!(
                "Unknown stats kind: '{}'. Valid: download, manifest",
                other
            ))),
        }
    }
}

/// 一条待刷盘的累积增量
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEntry {
    pub kind: StatsKind,
    pub package_name: String,
    pub version: String,
    pub period_type: PeriodType,
    pub period_value: String,
    pub by: u64,
}

/// 编码五元组为缓冲区键
pub fn to_pending_key(
    kind: StatsKind,
    package_name: &str,
    version: &str,
    period_type: PeriodType,
    period_value: &str,
) -> Result<String> {
    for part in [package_name, version, period_value] {
        if part.contains(KEY_SEP) {
            return Err(RegistryStatsError::validation(format!(
                "Key component contains reserved separator (U+0001): {:?}",
                part
            )));
        }
    }

    Ok([
        kind.as_ref(),
        package_name,
        version,
        period_type.as_ref(),
        period_value,
    ]
    .join(&KEY_SEP.to_string()))
}

/// 解码缓冲区键，恢复五元组并附上累积量
pub fn from_pending_key(key: &str, by: u64) -> Result<PendingEntry> {
    let parts: Vec<&str> = key.split(KEY_SEP).collect();

    let [kind, package_name, version, period_type, period_value] = parts.as_slice() else {
        return Err(RegistryStatsError::validation(format!(
            "Malformed pending key: expected 5 parts, got {}",
            parts.len()
        )));
    };

    Ok(PendingEntry {
        kind: kind.parse()?,
        package_name: (*package_name).to_string(),
        version: (*version).to_string(),
        period_type: period_type.parse()?,
        period_value: (*period_value).to_string(),
        by,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let key = to_pending_key(StatsKind::Download, "react", "18.0.0", PeriodType::Weekly, "2023-W20")
            .unwrap();
        let entry = from_pending_key(&key, 7).unwrap();

        assert_eq!(entry.kind, StatsKind::Download);
        assert_eq!(entry.package_name, "react");
        assert_eq!(entry.version, "18.0.0");
        assert_eq!(entry.period_type, PeriodType::Weekly);
        assert_eq!(entry.period_value, "2023-W20");
        assert_eq!(entry.by, 7);
    }

    #[test]
    fn test_round_trip_with_separator_candidates() {
        // 分量里允许出现 ':'、'/'、'-' 等常见分隔符候选
        let key = to_pending_key(
            StatsKind::Manifest,
            "@scope/pkg-name",
            "1.0.0-beta.1",
            PeriodType::Daily,
            "2023-05-17",
        )
        .unwrap();
        let entry = from_pending_key(&key, 1).unwrap();

        assert_eq!(entry.package_name, "@scope/pkg-name");
        assert_eq!(entry.version, "1.0.0-beta.1");
    }

    #[test]
    fn test_encode_rejects_reserved_separator() {
        let err = to_pending_key(
            StatsKind::Download,
            "evil\u{0001}name",
            "1.0.0",
            PeriodType::Daily,
            "2023-05-17",
        )
        .unwrap_err();
        assert_eq!(err.code(), "E004");
    }

    #[test]
    fn test_decode_rejects_wrong_part_count() {
        assert!(from_pending_key("download\u{0001}react", 1).is_err());
    }

    #[test]
    fn test_decode_rejects_unknown_kind() {
        let key = ["view", "react", "1.0.0", "daily", "2023-05-17"].join("\u{0001}");
        assert!(from_pending_key(&key, 1).is_err());
    }
}
