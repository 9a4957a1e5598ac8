// ==========================================
// 仓库补货预测系统 - 需求统计提供器
// ==========================================
// 职责: 把月度销售聚合为 (SKU, 仓库) 维度的修正需求序列与波动统计
// 输入: MonthlySalesRecord（批量）
// 输出: DemandStats（纯内存，按键查找）
// 红线: 纯聚合，不做预测判断
// ==========================================

use crate::domain::sales::{MonthlySalesRecord, CLEAN_AVAILABILITY_THRESHOLD};
use crate::domain::types::YearMonth;
use crate::engine::stats;
use std::collections::HashMap;
use tracing::instrument;

/// 序列中的单月数据点
#[derive(Debug, Clone, PartialEq)]
pub struct DemandPoint {
    pub year_month: YearMonth,
    pub units_sold: f64,
    pub corrected_demand: f64,
    pub availability: f64,
    pub recorded: bool, // false = 区间内缺失月份（按零需求补齐）
}

impl DemandPoint {
    pub fn is_clean(&self) -> bool {
        self.availability >= CLEAN_AVAILABILITY_THRESHOLD && self.corrected_demand > 0.0
    }
}

// ==========================================
// DemandStats - 单个 SKU/仓库 的需求统计
// ==========================================
#[derive(Debug, Clone)]
pub struct DemandStats {
    pub sku_id: String,
    pub warehouse: String,
    pub series: Vec<DemandPoint>, // 时间升序
    pub avg_monthly_demand: f64,  // 最近 12 个月均值（不足时用全部）
    pub std_dev: f64,
    pub cv: f64,
}

impl DemandStats {
    pub fn empty(sku_id: impl Into<String>, warehouse: impl Into<String>) -> Self {
        Self {
            sku_id: sku_id.into(),
            warehouse: warehouse.into(),
            series: Vec::new(),
            avg_monthly_demand: 0.0,
            std_dev: 0.0,
            cv: 0.0,
        }
    }

    pub fn months_of_history(&self) -> usize {
        self.series.len()
    }

    pub fn latest_month(&self) -> Option<YearMonth> {
        self.series.last().map(|p| p.year_month)
    }

    /// 修正需求序列（时间升序）
    pub fn corrected_series(&self) -> Vec<f64> {
        self.series.iter().map(|p| p.corrected_demand).collect()
    }

    /// 最近 n 个月修正需求（不足 n 个返回全部）
    pub fn recent(&self, n: usize) -> Vec<f64> {
        let start = self.series.len().saturating_sub(n);
        self.series[start..].iter().map(|p| p.corrected_demand).collect()
    }

    /// 最近 n 个月简单平均
    pub fn recent_mean(&self, n: usize) -> Option<f64> {
        if self.series.is_empty() {
            return None;
        }
        Some(stats::mean(&self.recent(n)))
    }

    /// 是否有任何正需求
    pub fn has_demand(&self) -> bool {
        self.series.iter().any(|p| p.corrected_demand > 0.0)
    }
}

// ==========================================
// DemandStatsProvider - 需求统计提供器
// ==========================================
pub struct DemandStatsProvider {
    avg_window_months: usize,
}

impl Default for DemandStatsProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl DemandStatsProvider {
    pub fn new() -> Self {
        Self {
            avg_window_months: 12,
        }
    }

    /// 批量构建统计
    ///
    /// # 参数
    /// - records: 任意顺序的销售记录
    /// - as_of: 序列截止月（通常为全局最新实际月）；None 时截止到各自最后一条记录
    ///
    /// 区间内没有记录的月份按零需求、满可用率补齐。
    #[instrument(skip(self, records), fields(count = records.len()))]
    pub fn build_all(
        &self,
        records: &[MonthlySalesRecord],
        as_of: Option<YearMonth>,
    ) -> HashMap<(String, String), DemandStats> {
        let mut grouped: HashMap<(String, String), Vec<&MonthlySalesRecord>> = HashMap::new();
        for r in records {
            if as_of.map_or(false, |end| r.year_month > end) {
                continue;
            }
            grouped
                .entry((r.sku_id.clone(), r.warehouse.clone()))
                .or_default()
                .push(r);
        }

        grouped
            .into_iter()
            .map(|(key, rows)| {
                let stats = self.build(&key.0, &key.1, rows, as_of);
                (key, stats)
            })
            .collect()
    }

    /// 构建单个 SKU/仓库 的统计
    pub fn build(
        &self,
        sku_id: &str,
        warehouse: &str,
        mut rows: Vec<&MonthlySalesRecord>,
        as_of: Option<YearMonth>,
    ) -> DemandStats {
        if rows.is_empty() {
            return DemandStats::empty(sku_id, warehouse);
        }
        rows.sort_by_key(|r| r.year_month);

        let first = rows[0].year_month;
        let last = as_of
            .filter(|end| *end >= rows[rows.len() - 1].year_month)
            .unwrap_or(rows[rows.len() - 1].year_month);

        let by_month: HashMap<YearMonth, &MonthlySalesRecord> =
            rows.iter().map(|r| (r.year_month, *r)).collect();

        let span = first.months_between(&last).max(0) as usize + 1;
        let series: Vec<DemandPoint> = (0..span)
            .map(|i| {
                let ym = first.add_months(i as i32);
                match by_month.get(&ym) {
                    Some(r) => DemandPoint {
                        year_month: ym,
                        units_sold: r.units_sold,
                        corrected_demand: r.corrected_demand,
                        availability: r.availability_rate(),
                        recorded: true,
                    },
                    None => DemandPoint {
                        year_month: ym,
                        units_sold: 0.0,
                        corrected_demand: 0.0,
                        availability: 1.0,
                        recorded: false,
                    },
                }
            })
            .collect();

        let values: Vec<f64> = series.iter().map(|p| p.corrected_demand).collect();
        let window_start = values.len().saturating_sub(self.avg_window_months);
        let window = &values[window_start..];

        DemandStats {
            sku_id: sku_id.to_string(),
            warehouse: warehouse.to_string(),
            avg_monthly_demand: stats::mean(window),
            std_dev: stats::std_dev(window),
            cv: stats::coefficient_of_variation(window),
            series,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ym(y: i32, m: u32) -> YearMonth {
        YearMonth::new(y, m).unwrap()
    }

    #[test]
    fn test_gap_filled_and_sorted() {
        let records = vec![
            MonthlySalesRecord::new("S1", "W1", ym(2025, 3), 30.0, 0),
            MonthlySalesRecord::new("S1", "W1", ym(2025, 1), 10.0, 0),
        ];
        let all = DemandStatsProvider::new().build_all(&records, Some(ym(2025, 4)));
        let stats = &all[&("S1".to_string(), "W1".to_string())];

        assert_eq!(stats.months_of_history(), 4, "1 月到 4 月共 4 个月");
        assert_eq!(stats.corrected_series(), vec![10.0, 0.0, 30.0, 0.0]);
        assert!(!stats.series[1].recorded);
        assert_eq!(stats.latest_month(), Some(ym(2025, 4)));
        assert!((stats.avg_monthly_demand - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_average_uses_last_twelve_months() {
        let mut records = Vec::new();
        for i in 0..18 {
            let qty = if i < 6 { 1000.0 } else { 100.0 };
            records.push(MonthlySalesRecord::new("S1", "W1", ym(2024, 1).add_months(i), qty, 0));
        }
        let all = DemandStatsProvider::new().build_all(&records, None);
        let stats = &all[&("S1".to_string(), "W1".to_string())];
        assert!((stats.avg_monthly_demand - 100.0).abs() < 1e-9, "只看最近 12 个月");
        assert_eq!(stats.cv, 0.0);
        assert_eq!(stats.recent_mean(3), Some(100.0));
    }

    #[test]
    fn test_stockout_month_not_clean() {
        // 30 天中缺货 25 天 → 可用率 < 0.3
        let records = vec![MonthlySalesRecord::new("S1", "W1", ym(2025, 4), 5.0, 25)];
        let all = DemandStatsProvider::new().build_all(&records, None);
        let stats = &all[&("S1".to_string(), "W1".to_string())];
        assert!(!stats.series[0].is_clean());
        assert!(stats.series[0].corrected_demand >= 5.0);
    }
}
