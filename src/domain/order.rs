// ==========================================
// 仓库补货预测系统 - 补货确认单领域模型
// ==========================================
// 主键: (sku_id, warehouse, order_month)
// 红线:
// - 重复生成只能 upsert，禁止重复行
// - 锁定行的 confirmed_qty / lead_time_override / arrival_override 不可被覆盖
// ==========================================

use crate::domain::types::{DemandSource, PendingBucket, UrgencyLevel, YearMonth};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// OrderConfirmation - 月度补货确认单
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderConfirmation {
    pub sku_id: String,
    pub warehouse: String,
    pub order_month: YearMonth,

    // ===== 数量 =====
    pub suggested_qty: f64,          // 系统建议
    pub confirmed_qty: Option<f64>,  // 人工确认（锁定后不可改）

    // ===== 库存位置 =====
    pub current_inventory: f64,
    pub effective_pending: f64,       // 时间分桶加权后的在途
    pub raw_pending: f64,             // 在途原始合计（展望内）
    pub future_pending_ignored: f64,  // 超出展望、未计入的在途

    // ===== 需求 =====
    pub monthly_demand: f64,
    pub demand_source: DemandSource,
    pub forecast_demand: Option<f64>,
    pub historical_demand: f64,
    pub forecast_confidence: Option<f64>,
    pub blend_weight: Option<f64>,
    pub learning_adjustment: f64,

    // ===== 安全库存与再订货点 =====
    pub safety_stock: f64,
    pub reorder_point: f64,
    pub coverage_days: Option<f64>,   // 需求为 0 时为 None
    pub lead_time_days: i64,
    pub lead_time_override: Option<i64>,
    pub arrival_override: Option<NaiveDate>,
    pub expected_arrival: NaiveDate,
    pub seasonal_multiplier: f64,

    // ===== 紧急等级 =====
    pub urgency: UrgencyLevel,
    pub urgency_reason: String,       // JSON
    pub stockout_escalated: bool,

    // ===== 锁定 =====
    pub locked: bool,
    pub locked_by: Option<String>,
    pub locked_at: Option<DateTime<Utc>>,

    pub generated_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderConfirmation {
    /// 当前库存位置 = 现有库存 + 有效在途
    pub fn current_position(&self) -> f64 {
        self.current_inventory + self.effective_pending
    }

    /// 最终下单数量：人工确认优先
    pub fn final_qty(&self) -> f64 {
        self.confirmed_qty.unwrap_or(self.suggested_qty)
    }
}

/// 人工编辑项（仅未锁定行可改）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfirmationEdit {
    pub confirmed_qty: Option<f64>,
    pub lead_time_override: Option<i64>,
    pub arrival_override: Option<NaiveDate>,
}

// ==========================================
// 在途时间分桶报告
// ==========================================

/// 单张在途订单的计入明细
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingContribution {
    pub order_id: String,
    pub quantity: f64,
    pub expected_arrival: NaiveDate,
    pub revised_arrival: Option<NaiveDate>, // 逾期单按历史延误修正后的到货日
    pub days_out: i64,
    pub bucket: PendingBucket,
    pub confidence: f64,
    pub effective_qty: f64,
}

/// 某 SKU/仓库 的在途计入汇总
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PendingTimingReport {
    pub counted: Vec<PendingContribution>,
    pub future_ignored: Vec<PendingContribution>,
    pub effective_qty: f64,
    pub raw_qty: f64,
}

impl PendingTimingReport {
    pub fn future_ignored_qty(&self) -> f64 {
        self.future_ignored.iter().map(|c| c.quantity).sum()
    }
}
