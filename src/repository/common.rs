// ==========================================
// 仓库补货预测系统 - 仓储公共函数
// ==========================================
// 职责: IN 子句构建 + 文本列 ↔ 领域类型转换
// ==========================================

use crate::domain::types::YearMonth;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rusqlite::types::Type;

/// 构建 IN 子句的 SQL 片段
///
/// # 示例
/// ```
/// use warehouse_planner::repository::common::build_in_clause;
///
/// let warehouses = vec!["W1".to_string(), "W2".to_string()];
/// assert_eq!(build_in_clause("warehouse", &warehouses), "warehouse IN (?, ?)");
///
/// // 空列表返回永假条件
/// let empty: Vec<String> = vec![];
/// assert_eq!(build_in_clause("warehouse", &empty), "1 = 0");
/// ```
pub fn build_in_clause<T: AsRef<str>>(column_name: &str, values: &[T]) -> String {
    if values.is_empty() {
        return "1 = 0".to_string();
    }

    let placeholders = values.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
    format!("{} IN ({})", column_name, placeholders)
}

/// 解析 "YYYY-MM" 列（失败返回转换错误，不静默吞掉）
pub fn parse_year_month(idx: usize, raw: &str) -> rusqlite::Result<YearMonth> {
    YearMonth::parse(raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("无效的年月: {}", raw).into(),
        )
    })
}

/// 解析 "%Y-%m-%d" 日期列
pub fn parse_date(idx: usize, raw: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
    })
}

pub fn parse_opt_date(idx: usize, raw: Option<String>) -> rusqlite::Result<Option<NaiveDate>> {
    raw.map(|s| parse_date(idx, &s)).transpose()
}

/// 解析时间戳列（rfc3339 优先，兼容 SQLite datetime('now') 格式）
pub fn parse_datetime(raw: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw.trim()) {
        return dt.with_timezone(&Utc);
    }
    NaiveDateTime::parse_from_str(raw.trim(), "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .unwrap_or_default()
}

pub fn parse_opt_datetime(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.map(|s| parse_datetime(&s))
}

pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_datetime_formats() {
        let a = parse_datetime("2026-01-02T03:04:05+00:00");
        let b = parse_datetime("2026-01-02 03:04:05");
        assert_eq!(a, b);
        assert_eq!(parse_datetime("bad"), DateTime::<Utc>::default());
    }

    #[test]
    fn test_parse_year_month_error() {
        assert!(parse_year_month(0, "2026-02").is_ok());
        assert!(parse_year_month(0, "2026/02").is_err());
    }
}
