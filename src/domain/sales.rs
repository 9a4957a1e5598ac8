// ==========================================
// 仓库补货预测系统 - 月度销售领域模型
// ==========================================
// 职责: 月度销售记录 + 缺货修正需求口径
// 红线: 可用率 < 30% 时按 30% 封底修正，防止过度放大
// ==========================================

use crate::domain::types::YearMonth;
use serde::{Deserialize, Serialize};

/// "干净月"可用率阈值
pub const CLEAN_AVAILABILITY_THRESHOLD: f64 = 0.3;

/// 可用率 = (当月天数 - 缺货天数) / 当月天数
pub fn availability_rate(stockout_days: u32, days_in_month: u32) -> f64 {
    if days_in_month == 0 {
        return 1.0;
    }
    let stockout = stockout_days.min(days_in_month) as f64;
    (days_in_month as f64 - stockout) / days_in_month as f64
}

/// 缺货修正需求
///
/// - 无缺货: 原销量
/// - 有缺货: 原销量 / max(可用率, 0.3)，且不低于原销量
pub fn corrected_demand(units_sold: f64, stockout_days: u32, days_in_month: u32) -> f64 {
    let units = units_sold.max(0.0);
    if stockout_days == 0 {
        return units;
    }
    let availability = availability_rate(stockout_days, days_in_month);
    let effective = availability.max(CLEAN_AVAILABILITY_THRESHOLD);
    (units / effective).max(units)
}

// ==========================================
// MonthlySalesRecord - 月度销售记录
// ==========================================
// 主键: (sku_id, warehouse, year_month)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthlySalesRecord {
    pub sku_id: String,
    pub warehouse: String,
    pub year_month: YearMonth,
    pub units_sold: f64,        // 原始销量
    pub stockout_days: u32,     // 当月缺货天数
    pub corrected_demand: f64,  // 修正需求
}

impl MonthlySalesRecord {
    /// 创建记录并计算修正需求
    pub fn new(
        sku_id: impl Into<String>,
        warehouse: impl Into<String>,
        year_month: YearMonth,
        units_sold: f64,
        stockout_days: u32,
    ) -> Self {
        let corrected = corrected_demand(units_sold, stockout_days, year_month.days_in_month());
        Self {
            sku_id: sku_id.into(),
            warehouse: warehouse.into(),
            year_month,
            units_sold,
            stockout_days,
            corrected_demand: corrected,
        }
    }

    pub fn availability_rate(&self) -> f64 {
        availability_rate(self.stockout_days, self.year_month.days_in_month())
    }

    /// 可用率 ≥ 0.3 视为干净月
    pub fn is_clean(&self) -> bool {
        self.availability_rate() >= CLEAN_AVAILABILITY_THRESHOLD
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ym(y: i32, m: u32) -> YearMonth {
        YearMonth::new(y, m).unwrap()
    }

    #[test]
    fn test_corrected_demand_no_stockout() {
        let r = MonthlySalesRecord::new("S1", "W1", ym(2025, 6), 100.0, 0);
        assert_eq!(r.corrected_demand, 100.0);
        assert!(r.is_clean());
    }

    #[test]
    fn test_corrected_demand_partial_stockout() {
        // 30 天中缺货 15 天 → 可用率 0.5 → 修正为 200
        let r = MonthlySalesRecord::new("S1", "W1", ym(2025, 6), 100.0, 15);
        assert!((r.corrected_demand - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_corrected_demand_floor_at_thirty_percent() {
        // 30 天缺货 27 天 → 可用率 0.1，按 0.3 封底 → 100 / 0.3
        let r = MonthlySalesRecord::new("S1", "W1", ym(2025, 6), 100.0, 27);
        assert!((r.corrected_demand - 100.0 / 0.3).abs() < 1e-9, "修正不应超过 30% 封底");
        assert!(!r.is_clean(), "可用率 0.1 不是干净月");
    }

    #[test]
    fn test_stockout_days_clamped_to_month_length() {
        assert_eq!(availability_rate(40, 30), 0.0);
        assert_eq!(corrected_demand(0.0, 30, 30), 0.0);
    }
}
