// ==========================================
// 仓库补货预测系统 - 预测批次与预测明细领域模型
// ==========================================
// 红线:
// - 预测明细一经写入不可变（新批次覆盖旧批次，不修改旧批次）
// - 合计/均值字段由 12 个月分量派生，禁止独立估算
// ==========================================

use crate::domain::types::{
    CalculationMethod, ForecastRunStatus, GrowthRateSource, SeasonalPatternType, YearMonth,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ==========================================
// ForecastRequest - 预测请求
// ==========================================
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForecastRequest {
    /// 仓库范围（None = 全部仓库）
    pub warehouses: Option<Vec<String>>,
    /// 年化增长率人工覆盖（优先于任何计算值）
    pub growth_override: Option<f64>,
    /// 请求人
    pub requested_by: Option<String>,
}

// ==========================================
// ForecastRun - 预测批次
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastRun {
    pub run_id: String,
    pub created_at: DateTime<Utc>,
    pub requested_by: Option<String>,
    pub warehouses: Option<Vec<String>>,
    pub status: ForecastRunStatus,
    pub growth_override: Option<f64>,
    pub forecast_start: Option<YearMonth>, // 预测起始月（最新实际销售月的下一个月）

    // ===== 进度 =====
    pub total_count: i64,
    pub processed_count: i64,
    pub failed_count: i64,

    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl ForecastRun {
    /// 由请求创建新批次（状态由队列决定）
    pub fn new(request: &ForecastRequest, status: ForecastRunStatus) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            requested_by: request.requested_by.clone(),
            warehouses: request.warehouses.clone(),
            status,
            growth_override: request.growth_override,
            forecast_start: None,
            total_count: 0,
            processed_count: 0,
            failed_count: 0,
            started_at: None,
            completed_at: None,
            error_message: None,
        }
    }

    /// 还原请求（排队批次启动时使用）
    pub fn to_request(&self) -> ForecastRequest {
        ForecastRequest {
            warehouses: self.warehouses.clone(),
            growth_override: self.growth_override,
            requested_by: self.requested_by.clone(),
        }
    }
}

// ==========================================
// ForecastDetail - 预测明细
// ==========================================
// 主键: (run_id, sku_id, warehouse)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastDetail {
    pub run_id: String,
    pub sku_id: String,
    pub warehouse: String,
    pub start_month: YearMonth,
    pub monthly_qty: Vec<f64>,      // 12 个月数量（均 ≥ 0）
    pub monthly_revenue: Vec<f64>,  // 12 个月收入

    // ===== 审计字段 =====
    pub base_demand: f64,
    pub safety_multiplier: f64,
    pub method_used: CalculationMethod,
    pub growth_rate_applied: f64,   // 年化
    pub growth_rate_source: GrowthRateSource,
    pub seasonal_pattern_applied: SeasonalPatternType,
    pub seasonal_applied: bool,
    pub confidence_score: f64,
    pub calc_reason: String,        // 规则命中记录（JSON）
    pub created_at: DateTime<Utc>,
}

impl ForecastDetail {
    pub fn total_qty(&self) -> f64 {
        self.monthly_qty.iter().sum()
    }

    pub fn total_revenue(&self) -> f64 {
        self.monthly_revenue.iter().sum()
    }

    pub fn avg_monthly_qty(&self) -> f64 {
        if self.monthly_qty.is_empty() {
            0.0
        } else {
            self.total_qty() / self.monthly_qty.len() as f64
        }
    }

    /// 指定月份的预测数量（超出展望返回 None）
    pub fn qty_for(&self, period: YearMonth) -> Option<f64> {
        let offset = self.start_month.months_between(&period);
        if offset < 0 {
            return None;
        }
        self.monthly_qty.get(offset as usize).copied()
    }

    /// 覆盖的所有月份
    pub fn periods(&self) -> Vec<YearMonth> {
        (0..self.monthly_qty.len())
            .map(|i| self.start_month.add_months(i as i32))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detail() -> ForecastDetail {
        ForecastDetail {
            run_id: "R1".to_string(),
            sku_id: "S1".to_string(),
            warehouse: "W1".to_string(),
            start_month: YearMonth::new(2025, 11).unwrap(),
            monthly_qty: (1..=12).map(|i| i as f64).collect(),
            monthly_revenue: (1..=12).map(|i| i as f64 * 2.0).collect(),
            base_demand: 1.0,
            safety_multiplier: 1.0,
            method_used: CalculationMethod::Simple3m,
            growth_rate_applied: 0.0,
            growth_rate_source: GrowthRateSource::Default,
            seasonal_pattern_applied: SeasonalPatternType::None,
            seasonal_applied: false,
            confidence_score: 0.5,
            calc_reason: "{}".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_totals_derived_from_components() {
        let d = detail();
        assert_eq!(d.total_qty(), 78.0);
        assert_eq!(d.total_revenue(), 156.0);
        assert!((d.avg_monthly_qty() - 6.5).abs() < 1e-9);
    }

    #[test]
    fn test_qty_for_period_crosses_year() {
        let d = detail();
        assert_eq!(d.qty_for(YearMonth::new(2025, 11).unwrap()), Some(1.0));
        assert_eq!(d.qty_for(YearMonth::new(2026, 2).unwrap()), Some(4.0));
        assert_eq!(d.qty_for(YearMonth::new(2025, 10).unwrap()), None);
        assert_eq!(d.qty_for(YearMonth::new(2026, 11).unwrap()), None);
        assert_eq!(d.periods().len(), 12);
    }
}
