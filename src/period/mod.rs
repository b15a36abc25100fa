//! 统计周期类型定义
//!
//! 每个计数事件都会被展开到所有周期粒度（overall / yearly / monthly /
//! weekly / daily），由 [`value`] 模块计算各粒度对应的桶标签。

pub mod value;

pub use value::{current_period_value, period_value};

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumIter};

use crate::errors::RegistryStatsError;

/// overall 周期的固定桶标签
pub const PERIOD_VALUE_TOTAL: &str = "total";

/// 统计周期粒度
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PeriodType {
    Overall,
    Yearly,
    Monthly,
    Weekly,
    Daily,
}

impl std::fmt::Display for PeriodType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_ref())
    }
}

impl std::str::FromStr for PeriodType {
    type Err = RegistryStatsError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "overall" => Ok(Self::Overall),
            "yearly" => Ok(Self::Yearly),
            "monthly" => Ok(Self::Monthly),
            "weekly" => Ok(Self::Weekly),
            "daily" => Ok(Self::Daily),
            other => Err(RegistryStatsError::unknown_period_type(format!(
                "Unknown period type: '{}'. Valid: overall, yearly, monthly, weekly, daily",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_period_type_round_trip() {
        for pt in PeriodType::iter() {
            let parsed: PeriodType = pt.as_ref().parse().unwrap();
            assert_eq!(parsed, pt);
        }
    }

    #[test]
    fn test_period_type_count() {
        assert_eq!(PeriodType::iter().count(), 5);
    }

    #[test]
    fn test_unknown_period_type() {
        let err = "hourly".parse::<PeriodType>().unwrap_err();
        assert_eq!(err.code(), "E005");
        assert!(err.message().contains("hourly"));
    }
}
