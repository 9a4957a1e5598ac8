// ==========================================
// 仓库补货预测系统 - 季节画像领域模型
// ==========================================

use crate::domain::types::{SeasonalPatternType, YearMonth};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// SeasonalProfile - 季节画像
// ==========================================
// 主键: (sku_id, warehouse)；由 ≥24 个月修正需求周期性重算
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeasonalProfile {
    pub sku_id: String,
    pub warehouse: String,
    pub factors: Vec<f64>,                    // 12 个月乘数（均值≈1.0）
    pub pattern_type: SeasonalPatternType,    // 模式标签
    pub peak_months: Vec<u32>,                // 峰值月份（1..=12）
    pub pattern_strength: f64,                // 模式强度 0..1
    pub overall_confidence: f64,              // 综合置信度 0..1
    pub is_significant: bool,                 // 统计显著性
    pub months_analyzed: u32,                 // 参与拟合的月数
    pub computed_at: DateTime<Utc>,
}

impl SeasonalProfile {
    /// 无季节性的中性画像
    pub fn neutral(sku_id: impl Into<String>, warehouse: impl Into<String>) -> Self {
        Self {
            sku_id: sku_id.into(),
            warehouse: warehouse.into(),
            factors: vec![1.0; 12],
            pattern_type: SeasonalPatternType::None,
            peak_months: Vec::new(),
            pattern_strength: 0.0,
            overall_confidence: 0.0,
            is_significant: false,
            months_analyzed: 0,
            computed_at: Utc::now(),
        }
    }

    /// 某月份的季节因子（缺失返回 1.0）
    pub fn factor_for(&self, ym: YearMonth) -> f64 {
        self.factors.get(ym.month_index()).copied().unwrap_or(1.0)
    }

    /// 置信度是否超过阈值（严格大于）
    pub fn is_reliable(&self, threshold: f64) -> bool {
        self.overall_confidence > threshold
    }

    /// 订货月是否为峰值月或峰值前一个月
    pub fn is_peak_window(&self, order_month: YearMonth) -> bool {
        let current = order_month.month();
        let following = order_month.next().month();
        self.peak_months
            .iter()
            .any(|&p| p == current || p == following)
    }
}
