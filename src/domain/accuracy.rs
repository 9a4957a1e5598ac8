// ==========================================
// 仓库补货预测系统 - 预测准确率与学习调整领域模型
// ==========================================
// 红线:
// - 缺货 且 实际 < 预测 → 排除出 MAPE（供应失败，不是预测失败）
// - 学习调整仅在 applied=true 时生效，置信度不参与激活
// ==========================================

use crate::domain::types::{AdjustmentType, CalculationMethod, YearMonth};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// ForecastAccuracyRecord - 预测准确率记录
// ==========================================
// 主键: (sku_id, warehouse, period)
// 生命周期: 预测生成时写入预测值；期间实际到位后更新一次，之后不再重算
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastAccuracyRecord {
    pub sku_id: String,
    pub warehouse: String,
    pub period: YearMonth,
    pub run_id: String,
    pub method_used: CalculationMethod,
    pub predicted_demand: f64,
    pub actual_demand: Option<f64>,
    pub absolute_error: Option<f64>,
    pub percentage_error: Option<f64>, // 百分比（如 33.3）
    pub stockout_affected: bool,
    pub is_actual_recorded: bool,
    pub created_at: DateTime<Utc>,
    pub recorded_at: Option<DateTime<Utc>>,
}

impl ForecastAccuracyRecord {
    /// 仅含预测值的新记录
    pub fn predicted_only(
        sku_id: impl Into<String>,
        warehouse: impl Into<String>,
        period: YearMonth,
        run_id: impl Into<String>,
        method_used: CalculationMethod,
        predicted_demand: f64,
    ) -> Self {
        Self {
            sku_id: sku_id.into(),
            warehouse: warehouse.into(),
            period,
            run_id: run_id.into(),
            method_used,
            predicted_demand,
            actual_demand: None,
            absolute_error: None,
            percentage_error: None,
            stockout_affected: false,
            is_actual_recorded: false,
            created_at: Utc::now(),
            recorded_at: None,
        }
    }

    /// 是否排除出汇总 MAPE
    ///
    /// 未记录实际值、或无法计算百分比误差的记录同样不参与汇总。
    pub fn is_excluded_from_mape(&self) -> bool {
        let actual = match (self.is_actual_recorded, self.actual_demand) {
            (true, Some(a)) => a,
            _ => return true,
        };
        if self.percentage_error.is_none() {
            return true;
        }
        self.stockout_affected && actual < self.predicted_demand
    }
}

/// 百分比误差（以预测值为分母）
///
/// - predicted > 0: |actual - predicted| / predicted × 100
/// - predicted = 0 且 actual = 0: None
/// - predicted = 0 且 actual > 0: 100
pub fn percentage_error(predicted: f64, actual: f64) -> Option<f64> {
    if predicted > 0.0 {
        Some((actual - predicted).abs() / predicted * 100.0)
    } else if actual > 0.0 {
        Some(100.0)
    } else {
        None
    }
}

// ==========================================
// LearningAdjustment - 学习调整建议
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningAdjustment {
    pub adjustment_id: String,
    pub sku_id: Option<String>,        // SKU 级建议
    pub category: Option<String>,      // 品类级建议
    pub warehouse: Option<String>,
    pub adjustment_type: AdjustmentType,
    pub current_value: f64,
    pub proposed_value: f64,
    pub adjustment_magnitude: f64,
    pub confidence_score: f64,         // 仅供审核参考
    pub mape_before: Option<f64>,
    pub mape_expected_after: Option<f64>,
    pub sample_size: i64,
    pub reason: String,

    // ===== 审批 =====
    pub applied: bool,
    pub rejected: bool,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    /// 被同目标同类型的新建议取代（取代后 applied=false）
    pub superseded_by: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LearningAdjustment {
    /// 待审批（未生效且未驳回）
    pub fn is_pending(&self) -> bool {
        !self.applied && !self.rejected && self.superseded_by.is_none()
    }

    /// 同一目标同一类型视为同一建议
    pub fn same_target(&self, other: &LearningAdjustment) -> bool {
        self.adjustment_type == other.adjustment_type
            && self.sku_id == other.sku_id
            && self.category == other.category
            && self.warehouse == other.warehouse
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorded(predicted: f64, actual: f64, stockout: bool) -> ForecastAccuracyRecord {
        let mut r = ForecastAccuracyRecord::predicted_only(
            "S1",
            "W1",
            YearMonth::new(2025, 9).unwrap(),
            "R1",
            CalculationMethod::Simple3m,
            predicted,
        );
        r.actual_demand = Some(actual);
        r.absolute_error = Some((actual - predicted).abs());
        r.percentage_error = percentage_error(predicted, actual);
        r.stockout_affected = stockout;
        r.is_actual_recorded = true;
        r
    }

    #[test]
    fn test_stockout_shortfall_excluded() {
        // 预测 90，实际 30，缺货 → 排除
        assert!(recorded(90.0, 30.0, true).is_excluded_from_mape());
    }

    #[test]
    fn test_stockout_overshoot_included() {
        // 预测 90，实际 120，缺货 → 纳入，误差 33.3%
        let r = recorded(90.0, 120.0, true);
        assert!(!r.is_excluded_from_mape());
        assert!((r.percentage_error.unwrap() - 100.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_stockout_always_included() {
        assert!(!recorded(90.0, 30.0, false).is_excluded_from_mape());
        assert!(!recorded(90.0, 120.0, false).is_excluded_from_mape());
    }

    #[test]
    fn test_percentage_error_zero_values() {
        assert_eq!(percentage_error(0.0, 0.0), None);
        assert_eq!(percentage_error(0.0, 10.0), Some(100.0));
        assert_eq!(percentage_error(10.0, 0.0), Some(100.0));
    }

    #[test]
    fn test_unrecorded_excluded() {
        let r = ForecastAccuracyRecord::predicted_only(
            "S1",
            "W1",
            YearMonth::new(2025, 9).unwrap(),
            "R1",
            CalculationMethod::Simple3m,
            10.0,
        );
        assert!(r.is_excluded_from_mape(), "未记录实际值不参与 MAPE");
    }
}
