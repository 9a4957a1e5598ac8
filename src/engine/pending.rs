// ==========================================
// 仓库补货预测系统 - 有效在途库存计算
// ==========================================
// 职责: 在途订单按到货时间分桶，并按置信度折算有效数量
// 分桶（days_out = 预计到货 - 今天，展望 = 提前期 + 盘点周期）:
// - overdue   (< 0)          有延误历史 → 修正到货；展望内 80%，否则视为 future；无历史 50%
// - imminent  (0..=R)        100%
// - covered   (R+1..=展望)   可靠度 × (1 - 0.2 × days_out / 展望)
// - future    (> 展望)       不计入，单独报告
// ==========================================

use crate::config::PlanningParameters;
use crate::domain::order::{PendingContribution, PendingTimingReport};
use crate::domain::supply::{PendingOrder, SupplierLeadTimeProfile};
use crate::domain::types::PendingBucket;
use chrono::{Duration, NaiveDate};
use std::collections::HashMap;

const COVERED_DECAY: f64 = 0.2;

/// 供应商画像索引: (supplier, warehouse) → profile
pub type SupplierProfileIndex = HashMap<(String, String), SupplierLeadTimeProfile>;

// ==========================================
// PendingInventoryCalculator - 有效在途计算
// ==========================================
pub struct PendingInventoryCalculator {
    review_period_days: i64,
    default_reliability: f64,
    overdue_delay_confidence: f64,
    overdue_unknown_confidence: f64,
}

impl PendingInventoryCalculator {
    pub fn new(params: &PlanningParameters) -> Self {
        Self {
            review_period_days: params.review_period_days,
            default_reliability: params.default_supplier_reliability,
            overdue_delay_confidence: params.overdue_delay_confidence,
            overdue_unknown_confidence: params.overdue_unknown_confidence,
        }
    }

    /// 计算单个 SKU/仓库 的有效在途
    ///
    /// # 参数
    /// - orders: 该 SKU/仓库 的在途订单（非 ordered/shipped 状态忽略）
    /// - lead_time_days: 该行采用的提前期
    pub fn calculate(
        &self,
        orders: &[&PendingOrder],
        profiles: &SupplierProfileIndex,
        lead_time_days: i64,
        today: NaiveDate,
    ) -> PendingTimingReport {
        let horizon = (lead_time_days + self.review_period_days).max(1);
        let mut report = PendingTimingReport::default();

        for order in orders.iter().filter(|o| o.status.is_open()) {
            let profile = order
                .supplier
                .as_ref()
                .and_then(|s| profiles.get(&(s.clone(), order.warehouse.clone())));
            let contribution = self.classify(order, profile, horizon, today);

            if contribution.bucket == PendingBucket::Future {
                report.future_ignored.push(contribution);
            } else {
                report.raw_qty += contribution.quantity;
                report.effective_qty += contribution.effective_qty;
                report.counted.push(contribution);
            }
        }

        report
    }

    /// 单个订单分桶
    pub fn classify(
        &self,
        order: &PendingOrder,
        profile: Option<&SupplierLeadTimeProfile>,
        horizon: i64,
        today: NaiveDate,
    ) -> PendingContribution {
        let quantity = order.quantity.max(0.0);
        let days_out = (order.expected_arrival - today).num_days();
        let mut revised_arrival = None;

        let (bucket, confidence) = if days_out < 0 {
            match profile.and_then(|p| p.delay_history()) {
                Some(delay) => {
                    let revised = order.expected_arrival + Duration::days(delay.ceil() as i64);
                    revised_arrival = Some(revised);
                    if (revised - today).num_days() <= horizon {
                        (PendingBucket::Overdue, self.overdue_delay_confidence)
                    } else {
                        (PendingBucket::Future, 0.0)
                    }
                }
                None => (PendingBucket::Overdue, self.overdue_unknown_confidence),
            }
        } else if days_out <= self.review_period_days {
            (PendingBucket::Imminent, 1.0)
        } else if days_out <= horizon {
            let reliability = profile
                .map(|p| p.reliability_score)
                .filter(|r| r.is_finite())
                .unwrap_or(self.default_reliability)
                .clamp(0.0, 1.0);
            let decay = 1.0 - COVERED_DECAY * days_out as f64 / horizon as f64;
            (PendingBucket::Covered, (reliability * decay).max(0.0))
        } else {
            (PendingBucket::Future, 0.0)
        };

        PendingContribution {
            order_id: order.order_id.clone(),
            quantity,
            expected_arrival: order.expected_arrival,
            revised_arrival,
            days_out,
            bucket,
            confidence,
            effective_qty: quantity * confidence,
        }
    }
}
