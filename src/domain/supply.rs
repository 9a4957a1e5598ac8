// ==========================================
// 仓库补货预测系统 - 供应侧领域模型
// ==========================================
// 职责: 当前库存 / 在途订单 / 供应商提前期画像 / 缺货模式
// 红线: 这些数据由外部流程维护，补货引擎只读
// ==========================================

use crate::domain::types::{ConfidenceLevel, PendingOrderStatus, StockoutPatternType};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// 当前库存
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryLevel {
    pub sku_id: String,
    pub warehouse: String,
    pub on_hand: f64,
}

// ==========================================
// PendingOrder - 在途采购订单
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingOrder {
    pub order_id: String,
    pub sku_id: String,
    pub warehouse: String,
    pub supplier: Option<String>,
    pub quantity: f64,
    pub order_date: NaiveDate,
    pub expected_arrival: NaiveDate,
    pub status: PendingOrderStatus,
}

// ==========================================
// SupplierLeadTimeProfile - 供应商提前期画像
// ==========================================
// 主键: (supplier, warehouse)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupplierLeadTimeProfile {
    pub supplier: String,
    pub warehouse: String,
    pub avg_lead_time_days: f64,
    pub p95_lead_time_days: Option<f64>,
    pub min_lead_time_days: Option<f64>,
    pub reliability_score: f64,               // 准时率 0..1
    pub avg_delay_days_when_late: Option<f64>, // 迟到时平均延误天数
    pub shipments_observed: i64,
}

impl SupplierLeadTimeProfile {
    /// 计划用提前期：P95 优先，缺失用均值
    pub fn planning_lead_time_days(&self) -> Option<i64> {
        self.p95_lead_time_days
            .filter(|d| *d > 0.0)
            .or(Some(self.avg_lead_time_days).filter(|d| *d > 0.0))
            .map(|d| d.ceil() as i64)
    }

    /// 是否有迟到历史
    pub fn delay_history(&self) -> Option<f64> {
        self.avg_delay_days_when_late.filter(|d| *d > 0.0)
    }
}

// ==========================================
// StockoutPattern - 缺货模式
// ==========================================
// 仅用于抬升紧急等级，不参与需求计算
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockoutPattern {
    pub sku_id: String,
    pub pattern_type: StockoutPatternType,
    pub frequency_score: f64, // 0..100
    pub confidence_level: ConfidenceLevel,
    pub pattern_value: Option<String>,
}

impl StockoutPattern {
    /// 长期缺货信号：频次 > 70 且高置信
    pub fn is_chronic_signal(&self) -> bool {
        self.frequency_score > 70.0 && self.confidence_level == ConfidenceLevel::High
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> SupplierLeadTimeProfile {
        SupplierLeadTimeProfile {
            supplier: "SUP1".to_string(),
            warehouse: "W1".to_string(),
            avg_lead_time_days: 40.0,
            p95_lead_time_days: Some(52.4),
            min_lead_time_days: Some(30.0),
            reliability_score: 0.9,
            avg_delay_days_when_late: None,
            shipments_observed: 20,
        }
    }

    #[test]
    fn test_planning_lead_time_prefers_p95() {
        assert_eq!(profile().planning_lead_time_days(), Some(53));

        let mut p = profile();
        p.p95_lead_time_days = None;
        assert_eq!(p.planning_lead_time_days(), Some(40));

        p.avg_lead_time_days = 0.0;
        assert_eq!(p.planning_lead_time_days(), None);
    }

    #[test]
    fn test_chronic_signal_boundary() {
        let mut pattern = StockoutPattern {
            sku_id: "S1".to_string(),
            pattern_type: StockoutPatternType::Chronic,
            frequency_score: 70.0,
            confidence_level: ConfidenceLevel::High,
            pattern_value: None,
        };
        assert!(!pattern.is_chronic_signal(), "频次 70 不满足 > 70");
        pattern.frequency_score = 71.0;
        assert!(pattern.is_chronic_signal());
        pattern.confidence_level = ConfidenceLevel::Medium;
        assert!(!pattern.is_chronic_signal(), "中置信不触发");
    }
}
