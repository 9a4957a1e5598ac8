use crate::config::service_level::ServiceLevelTable;
use serde::{Deserialize, Serialize};

/// 计划参数快照
///
/// 每个批次开始时读取一次，计算阶段只读此结构、不再查库。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanningParameters {
    /// 月度复盘周期（天）
    pub review_period_days: i64,
    /// 在途订单拉取展望（天）
    pub pending_fetch_horizon_days: i64,
    /// 缺失供应商画像时的可靠度
    pub default_supplier_reliability: f64,
    /// 缺失提前期时的默认值（天）
    pub default_lead_time_days: i64,
    /// 缺失波动数据时的默认变异系数
    pub default_demand_cv: f64,

    // ===== 置信度混合 =====
    pub blend_low_confidence: f64,
    pub blend_high_confidence: f64,

    // ===== 增长率边界（年化） =====
    pub growth_cap_annual: f64,
    pub viral_growth_floor_annual: f64,
    pub declining_growth_cap_annual: f64,

    /// 季节因子生效阈值（严格大于）
    pub seasonal_confidence_threshold: f64,

    // ===== 逾期在途 =====
    pub overdue_delay_confidence: f64,
    pub overdue_unknown_confidence: f64,

    pub include_death_row: bool,
    pub forecast_parallelism: usize,
    pub default_order_multiple: i64,

    #[serde(default)]
    pub service_levels: ServiceLevelTable,
}

impl Default for PlanningParameters {
    fn default() -> Self {
        Self {
            review_period_days: 30,
            pending_fetch_horizon_days: 180,
            default_supplier_reliability: 0.8,
            default_lead_time_days: 60,
            default_demand_cv: 0.5,
            blend_low_confidence: 0.5,
            blend_high_confidence: 0.75,
            growth_cap_annual: 0.5,
            viral_growth_floor_annual: 0.2,
            declining_growth_cap_annual: -0.1,
            seasonal_confidence_threshold: 0.5,
            overdue_delay_confidence: 0.8,
            overdue_unknown_confidence: 0.5,
            include_death_row: true,
            forecast_parallelism: 4,
            default_order_multiple: 1,
            service_levels: ServiceLevelTable::default(),
        }
    }
}
