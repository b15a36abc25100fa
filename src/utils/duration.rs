//! 时长字符串解析
//!
//! 刷盘间隔支持多种写法：
//! - 纯数字：毫秒数，`0` 表示同步刷盘，负数表示禁用定时刷盘
//! - 带单位：`500ms`, `2s`, `1m`, `1h30m`, `1d`
//! - 组合格式：`1m30s`

use crate::errors::{RegistryStatsError, Result};

/// 解析时长字符串为毫秒数（可为负）
pub fn parse_duration_ms(input: &str) -> Result<i64> {
    let input = input.trim();

    let (sign, body) = match input.strip_prefix('-') {
        Some(rest) => (-1i64, rest),
        None => (1i64, input),
    };

    if body.is_empty() {
        return Err(RegistryStatsError::duration_parse(format!(
            "无效的时长格式: '{}'",
            input
        )));
    }

    // 纯数字按毫秒处理
    if body.chars().all(|c| c.is_ascii_digit()) {
        let ms: i64 = body
            .parse()
            .map_err(|_| RegistryStatsError::duration_parse(format!("无效的数字: '{}'", body)))?;
        return Ok(sign * ms);
    }

    let mut total_ms: i64 = 0;
    let mut remaining = body;

    while !remaining.is_empty() {
        // 提取数字
        let num_len = remaining.chars().take_while(|c| c.is_ascii_digit()).count();
        if num_len == 0 {
            return Err(RegistryStatsError::duration_parse(format!(
                "无效的时长格式: '{}'",
                input
            )));
        }
        let num: i64 = remaining[..num_len]
            .parse()
            .map_err(|_| {
                RegistryStatsError::duration_parse(format!("无效的数字: '{}'", &remaining[..num_len]))
            })?;
        remaining = &remaining[num_len..];

        // 提取单位
        let unit_len = remaining.chars().take_while(|c| c.is_alphabetic()).count();
        if unit_len == 0 {
            return Err(RegistryStatsError::duration_parse(format!(
                "缺少时间单位，数字 '{}' 后应跟时间单位",
                num
            )));
        }
        let unit = &remaining[..unit_len];
        remaining = &remaining[unit_len..];

        let ms = match unit {
            "ms" => num,
            "s" | "sec" | "second" | "seconds" => num * 1_000,
            "m" | "min" | "minute" | "minutes" => num * 60_000,
            "h" | "hour" | "hours" => num * 3_600_000,
            "d" | "day" | "days" => num * 86_400_000,
            _ => {
                return Err(RegistryStatsError::duration_parse(format!(
                    "不支持的时间单位: '{}'",
                    unit
                )));
            }
        };

        total_ms += ms;
    }

    Ok(sign * total_ms)
}
