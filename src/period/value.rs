//! 周期桶标签计算
//!
//! 给定时间点和周期粒度，计算对应的桶标签字符串：
//! - daily: `YYYY-MM-DD`
//! - monthly: `YYYY-MM`
//! - yearly: `YYYY`
//! - weekly: `<周年份>-W<两位周号>`，ISO-8601 或美式（周日起始）规则
//! - overall: 固定为 `"total"`
//!
//! 两种周规则在年界附近会给出不同结果：12 月 31 日在 ISO 规则下可能
//! 属于当年第 52 周，而在美式规则下属于下一年第 1 周。

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};

use super::{PERIOD_VALUE_TOTAL, PeriodType};

/// 计算给定时间点在指定周期粒度下的桶标签
pub fn period_value(period_type: PeriodType, instant: DateTime<Utc>, iso_week: bool) -> String {
    match period_type {
        PeriodType::Overall => PERIOD_VALUE_TOTAL.to_string(),
        PeriodType::Daily => instant.format("%Y-%m-%d").to_string(),
        PeriodType::Monthly => instant.format("%Y-%m").to_string(),
        PeriodType::Yearly => instant.format("%Y").to_string(),
        PeriodType::Weekly => {
            if iso_week {
                iso_week_value(instant.date_naive())
            } else {
                gregorian_week_value(instant.date_naive())
            }
        }
    }
}

/// 以当前时间计算桶标签
pub fn current_period_value(period_type: PeriodType, iso_week: bool) -> String {
    period_value(period_type, Utc::now(), iso_week)
}

/// ISO-8601 周规则：周一起始，第 1 周为 1 月中包含至少 4 天的那一周
fn iso_week_value(date: NaiveDate) -> String {
    let iso = date.iso_week();
    format!("{}-W{:02}", iso.year(), iso.week())
}

/// 美式周规则：周日起始，包含 1 月 1 日的那一周为第 1 周
fn gregorian_week_value(date: NaiveDate) -> String {
    let offset = date.weekday().num_days_from_sunday() as i64;
    let week_start = date - Duration::days(offset);
    let week_end = week_start + Duration::days(6);

    // 跨年的周包含下一年的 1 月 1 日，归属下一年第 1 周
    if week_end.year() > week_start.year() {
        return format!("{}-W01", week_end.year());
    }

    let year = week_start.year();
    let jan1 = NaiveDate::from_ymd_opt(year, 1, 1).expect("Jan 1 is always a valid date");
    let jan1_week_start = jan1 - Duration::days(jan1.weekday().num_days_from_sunday() as i64);
    let week = (week_start - jan1_week_start).num_days() / 7 + 1;

    format!("{}-W{:02}", year, week)
}
