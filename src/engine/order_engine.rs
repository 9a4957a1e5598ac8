// ==========================================
// 仓库补货预测系统 - 月度补货引擎
// ==========================================
// 职责: 对每个可补货 SKU×仓库 计算完整的补货确认单
// 流程: 批量取数(服务层) → OrderPlanningSnapshot → 纯计算 → 批量 upsert(服务层)
// 红线:
// - 计算阶段禁止访问存储，所有参考数据来自同一快照
// - 预测置信度 < 0.5 用历史；[0.5, 0.75] 混合；> 0.75 用预测
// - 学习调整只读取 applied=true
// - 淘汰 SKU 被降为 skip 时建议量为 0
// ==========================================

use crate::config::PlanningParameters;
use crate::domain::accuracy::LearningAdjustment;
use crate::domain::forecast::ForecastDetail;
use crate::domain::order::OrderConfirmation;
use crate::domain::seasonal::SeasonalProfile;
use crate::domain::sku::Sku;
use crate::domain::supply::{PendingOrder, StockoutPattern};
use crate::domain::types::{AdjustmentType, DemandSource, UrgencyLevel, YearMonth};
use crate::engine::demand_stats::DemandStats;
use crate::engine::pending::{PendingInventoryCalculator, SupplierProfileIndex};
use crate::engine::safety_stock::SafetyStockCalculator;
use crate::engine::urgency::UrgencyEngine;
use chrono::{Duration, NaiveDate, Utc};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::instrument;

/// 日需求折算天数
const DAYS_PER_MONTH: f64 = 30.0;

/// (sku_id, warehouse)
pub type PairKey = (String, String);

// ==========================================
// OrderPlanningSnapshot - 批次参考数据快照
// ==========================================
#[derive(Debug, Default)]
pub struct OrderPlanningSnapshot {
    pub skus: HashMap<String, Sku>,
    pub inventory: HashMap<PairKey, f64>,
    pub pending: HashMap<PairKey, Vec<PendingOrder>>,
    pub forecasts: HashMap<PairKey, ForecastDetail>,
    pub supplier_profiles: SupplierProfileIndex,
    pub demand: HashMap<PairKey, DemandStats>,
    pub seasonal: HashMap<PairKey, SeasonalProfile>,
    pub stockout_patterns: Vec<StockoutPattern>,
    pub applied_adjustments: Vec<LearningAdjustment>,
    /// 本月已存在的确认单（读取用户字段）
    pub existing: HashMap<PairKey, OrderConfirmation>,
}

impl OrderPlanningSnapshot {
    /// 需要计算的 SKU×仓库（有销售/库存/在途/预测/已有行之一，且 SKU 可补货）
    pub fn planning_pairs(&self, include_death_row: bool) -> Vec<PairKey> {
        let mut pairs: BTreeSet<PairKey> = BTreeSet::new();
        pairs.extend(self.demand.keys().cloned());
        pairs.extend(self.inventory.keys().cloned());
        pairs.extend(self.pending.keys().cloned());
        pairs.extend(self.forecasts.keys().cloned());
        pairs.extend(self.existing.keys().cloned());

        pairs
            .into_iter()
            .filter(|(sku_id, _)| {
                self.skus
                    .get(sku_id)
                    .map_or(false, |s| s.is_orderable(include_death_row))
            })
            .collect()
    }

    /// 存在长期缺货信号的 SKU
    pub fn chronic_skus(&self) -> HashSet<&str> {
        self.stockout_patterns
            .iter()
            .filter(|p| p.is_chronic_signal())
            .map(|p| p.sku_id.as_str())
            .collect()
    }
}

/// 需求来源选择结果
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DemandBlend {
    pub monthly_demand: f64,
    pub source: DemandSource,
    pub forecast_demand: Option<f64>,
    pub forecast_confidence: Option<f64>,
    pub blend_weight: Option<f64>,
}

// ==========================================
// MonthlyOrderEngine - 月度补货引擎
// ==========================================
pub struct MonthlyOrderEngine {
    pending: PendingInventoryCalculator,
    safety: SafetyStockCalculator,
    urgency: UrgencyEngine,
    blend_low: f64,
    blend_high: f64,
    default_lead_time_days: i64,
    default_order_multiple: i64,
    include_death_row: bool,
}

impl MonthlyOrderEngine {
    pub fn new(params: &PlanningParameters) -> Self {
        Self {
            pending: PendingInventoryCalculator::new(params),
            safety: SafetyStockCalculator::new(params),
            urgency: UrgencyEngine::new(),
            blend_low: params.blend_low_confidence,
            blend_high: params.blend_high_confidence,
            default_lead_time_days: params.default_lead_time_days,
            default_order_multiple: params.default_order_multiple.max(1),
            include_death_row: params.include_death_row,
        }
    }

    // ==========================================
    // 核心方法
    // ==========================================

    /// 全量计算（纯函数，不访问存储）
    #[instrument(skip(self, snapshot), fields(order_month = %order_month, skus = snapshot.skus.len()))]
    pub fn compute_all(
        &self,
        snapshot: &OrderPlanningSnapshot,
        order_month: YearMonth,
        today: NaiveDate,
    ) -> Vec<OrderConfirmation> {
        let chronic = snapshot.chronic_skus();
        let pairs = snapshot.planning_pairs(self.include_death_row);

        let rows: Vec<OrderConfirmation> = pairs
            .iter()
            .filter_map(|key| {
                let sku = snapshot.skus.get(&key.0)?;
                Some(self.compute_one(
                    snapshot,
                    sku,
                    &key.1,
                    order_month,
                    today,
                    chronic.contains(key.0.as_str()),
                ))
            })
            .collect();

        tracing::info!(rows = rows.len(), "补货建议计算完成");
        rows
    }

    /// 单个 SKU/仓库
    pub fn compute_one(
        &self,
        snapshot: &OrderPlanningSnapshot,
        sku: &Sku,
        warehouse: &str,
        order_month: YearMonth,
        today: NaiveDate,
        chronic_stockout: bool,
    ) -> OrderConfirmation {
        let key: PairKey = (sku.sku_id.clone(), warehouse.to_string());
        let existing = snapshot.existing.get(&key);
        let demand_stats = snapshot.demand.get(&key);
        let profile = sku
            .supplier
            .as_ref()
            .and_then(|s| snapshot.supplier_profiles.get(&(s.clone(), warehouse.to_string())));

        // 1. 提前期与到货日（用户覆写优先）
        let lead_time_override = existing.and_then(|e| e.lead_time_override);
        let arrival_override = existing.and_then(|e| e.arrival_override);
        let lead_time_days = self.resolve_lead_time(
            lead_time_override,
            profile.and_then(|p| p.planning_lead_time_days()),
        );
        let expected_arrival = arrival_override
            .unwrap_or_else(|| order_month.first_day() + Duration::days(lead_time_days));

        // 2. 有效在途
        let orders: Vec<&PendingOrder> = snapshot
            .pending
            .get(&key)
            .map(|v| v.iter().collect())
            .unwrap_or_default();
        let timing = self
            .pending
            .calculate(&orders, &snapshot.supplier_profiles, lead_time_days, today);

        // 3. 需求
        let historical = demand_stats.map(|d| d.avg_monthly_demand).unwrap_or(0.0).max(0.0);
        let forecast = snapshot.forecasts.get(&key).map(|f| {
            let qty = f.qty_for(order_month).unwrap_or_else(|| f.avg_monthly_qty());
            (qty, f.confidence_score)
        });
        let learning = Self::learning_delta(&snapshot.applied_adjustments, sku, warehouse, historical);
        let blend = self.blend_demand(forecast, historical, learning);

        // 4. 安全库存 / 再订货点
        let daily = blend.monthly_demand / DAYS_PER_MONTH;
        let seasonal = snapshot.seasonal.get(&key);
        let ss = self.safety.calculate(
            daily,
            demand_stats.filter(|d| d.has_demand()).map(|d| d.cv),
            lead_time_days,
            sku.classification(),
            seasonal,
            order_month,
        );
        let reorder_point = self.safety.reorder_point(daily, lead_time_days, ss.safety_stock);

        // 5. 覆盖天数与紧急等级
        let on_hand = snapshot.inventory.get(&key).copied().unwrap_or(0.0);
        let position = on_hand + timing.effective_qty;
        let coverage_days = if daily > 0.0 { Some(position / daily) } else { None };
        let decision = self
            .urgency
            .evaluate(coverage_days, lead_time_days, chronic_stockout, sku.is_death_row());

        // 6. 建议数量
        let multiple = if sku.order_multiple > 0 {
            sku.order_multiple
        } else {
            self.default_order_multiple
        };
        let suggested_qty = if sku.is_death_row() && decision.level == UrgencyLevel::Skip {
            0.0
        } else {
            Self::round_to_multiple((reorder_point - position).max(0.0), multiple)
        };

        let now = Utc::now();
        OrderConfirmation {
            sku_id: sku.sku_id.clone(),
            warehouse: warehouse.to_string(),
            order_month,
            suggested_qty,
            confirmed_qty: existing.and_then(|e| e.confirmed_qty),
            current_inventory: on_hand,
            effective_pending: timing.effective_qty,
            raw_pending: timing.raw_qty,
            future_pending_ignored: timing.future_ignored_qty(),
            monthly_demand: blend.monthly_demand,
            demand_source: blend.source,
            forecast_demand: blend.forecast_demand,
            historical_demand: historical,
            forecast_confidence: blend.forecast_confidence,
            blend_weight: blend.blend_weight,
            learning_adjustment: learning,
            safety_stock: ss.safety_stock,
            reorder_point,
            coverage_days,
            lead_time_days,
            lead_time_override,
            arrival_override,
            expected_arrival,
            seasonal_multiplier: ss.seasonal_multiplier,
            urgency: decision.level,
            urgency_reason: decision.reason,
            stockout_escalated: decision.stockout_escalated,
            locked: existing.map_or(false, |e| e.locked),
            locked_by: existing.and_then(|e| e.locked_by.clone()),
            locked_at: existing.and_then(|e| e.locked_at),
            generated_at: existing.map_or(now, |e| e.generated_at),
            updated_at: now,
        }
    }

    /// 需求来源选择
    ///
    /// 学习调整同时加到预测值与历史值上，再做置信度混合；
    /// 无论落在哪个来源，已生效调整都完整计入。
    pub fn blend_demand(
        &self,
        forecast: Option<(f64, f64)>,
        historical: f64,
        learning_delta: f64,
    ) -> DemandBlend {
        let historical = (historical + learning_delta).max(0.0);
        let (forecast_qty, confidence) = match forecast {
            Some((qty, conf)) => (qty, conf),
            None => {
                return DemandBlend {
                    monthly_demand: historical,
                    source: DemandSource::Historical,
                    forecast_demand: None,
                    forecast_confidence: None,
                    blend_weight: None,
                }
            }
        };
        let adjusted = (forecast_qty + learning_delta).max(0.0);

        if confidence < self.blend_low {
            DemandBlend {
                monthly_demand: historical,
                source: DemandSource::Historical,
                forecast_demand: Some(adjusted),
                forecast_confidence: Some(confidence),
                blend_weight: None,
            }
        } else if confidence <= self.blend_high {
            DemandBlend {
                monthly_demand: adjusted * confidence + historical * (1.0 - confidence),
                source: DemandSource::Blended,
                forecast_demand: Some(adjusted),
                forecast_confidence: Some(confidence),
                blend_weight: Some(confidence),
            }
        } else {
            DemandBlend {
                monthly_demand: adjusted,
                source: DemandSource::Forecast,
                forecast_demand: Some(adjusted),
                forecast_confidence: Some(confidence),
                blend_weight: None,
            }
        }
    }

    /// 已生效学习调整折算为 件/月
    ///
    /// - growth-rate (SKU 级): adjustment_magnitude 即 件/月
    /// - category-default: adjustment_magnitude 为比例，按历史需求折算
    /// - 其余类型不改变需求数值
    pub fn learning_delta(
        adjustments: &[LearningAdjustment],
        sku: &Sku,
        warehouse: &str,
        historical: f64,
    ) -> f64 {
        adjustments
            .iter()
            .filter(|a| a.applied)
            .filter(|a| a.warehouse.as_deref().map_or(true, |w| w == warehouse))
            .map(|a| match a.adjustment_type {
                AdjustmentType::GrowthRate if a.sku_id.as_deref() == Some(sku.sku_id.as_str()) => {
                    a.adjustment_magnitude
                }
                AdjustmentType::CategoryDefault
                    if a.sku_id.is_none()
                        && a.category.is_some()
                        && a.category == sku.category =>
                {
                    a.adjustment_magnitude * historical
                }
                _ => 0.0,
            })
            .sum()
    }

    /// 提前期: 覆写 → 供应商 P95/均值 → 默认
    pub fn resolve_lead_time(&self, lead_time_override: Option<i64>, supplier: Option<i64>) -> i64 {
        lead_time_override
            .filter(|d| *d >= 0)
            .or(supplier)
            .unwrap_or(self.default_lead_time_days)
    }

    /// 向上取整到订货倍数
    pub fn round_to_multiple(qty: f64, multiple: i64) -> f64 {
        if qty <= 0.0 {
            return 0.0;
        }
        let m = multiple.max(1) as f64;
        (qty / m - 1e-9).ceil().max(1.0) * m
    }
}

// ==========================================
// 单元测试
// ==========================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::sales::MonthlySalesRecord;
    use crate::domain::supply::SupplierLeadTimeProfile;
    use crate::domain::types::{
        ConfidenceLevel, GrowthStatus, PendingOrderStatus, SkuStatus, StockoutPatternType,
    };
    use crate::engine::demand_stats::DemandStatsProvider;

    fn engine() -> MonthlyOrderEngine {
        MonthlyOrderEngine::new(&PlanningParameters::default())
    }

    fn order_month() -> YearMonth {
        YearMonth::new(2025, 3).unwrap()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()
    }

    fn base_sku() -> Sku {
        Sku {
            sku_id: "SKU001".to_string(),
            description: None,
            category: Some("CAT1".to_string()),
            abc_code: Some("C".to_string()),
            xyz_code: Some("X".to_string()),
            status: SkuStatus::Active,
            unit_cost: 5.0,
            unit_price: 10.0,
            supplier: Some("SUP1".to_string()),
            growth_status: GrowthStatus::Normal,
            order_multiple: 25,
        }
    }

    fn flat_stats(monthly: f64) -> DemandStats {
        let start = YearMonth::new(2024, 1).unwrap();
        let records: Vec<MonthlySalesRecord> = (0..14)
            .map(|i| MonthlySalesRecord::new("SKU001", "W1", start.add_months(i), monthly, 0))
            .collect();
        let refs: Vec<&MonthlySalesRecord> = records.iter().collect();
        DemandStatsProvider::new().build("SKU001", "W1", refs, None)
    }

    fn base_snapshot() -> OrderPlanningSnapshot {
        let mut snapshot = OrderPlanningSnapshot::default();
        let key = ("SKU001".to_string(), "W1".to_string());
        snapshot.skus.insert("SKU001".to_string(), base_sku());
        snapshot.demand.insert(key.clone(), flat_stats(300.0));
        snapshot.inventory.insert(key, 400.0);
        snapshot
    }

    fn adjustment(adjustment_type: AdjustmentType, magnitude: f64, applied: bool) -> LearningAdjustment {
        LearningAdjustment {
            adjustment_id: "ADJ1".to_string(),
            sku_id: Some("SKU001".to_string()),
            category: None,
            warehouse: None,
            adjustment_type,
            current_value: 300.0,
            proposed_value: 300.0 + magnitude,
            adjustment_magnitude: magnitude,
            confidence_score: 0.95,
            mape_before: None,
            mape_expected_after: None,
            sample_size: 6,
            reason: "{}".to_string(),
            applied,
            rejected: false,
            approved_by: None,
            approved_at: None,
            superseded_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_blend_boundaries() {
        // 场景: 0.49 历史 / 0.50 混合 / 0.76 预测
        let e = engine();
        let low = e.blend_demand(Some((200.0, 0.49)), 100.0, 0.0);
        assert_eq!(low.source, DemandSource::Historical);
        assert_eq!(low.monthly_demand, 100.0);

        let mid = e.blend_demand(Some((200.0, 0.50)), 100.0, 0.0);
        assert_eq!(mid.source, DemandSource::Blended);
        assert_eq!(mid.blend_weight, Some(0.50));
        assert!((mid.monthly_demand - 150.0).abs() < 1e-9);

        let upper = e.blend_demand(Some((200.0, 0.75)), 100.0, 0.0);
        assert_eq!(upper.source, DemandSource::Blended);
        assert!((upper.monthly_demand - (200.0 * 0.75 + 100.0 * 0.25)).abs() < 1e-9);

        let high = e.blend_demand(Some((200.0, 0.76)), 100.0, 0.0);
        assert_eq!(high.source, DemandSource::Forecast);
        assert_eq!(high.monthly_demand, 200.0);

        let none = e.blend_demand(None, 100.0, 0.0);
        assert_eq!(none.source, DemandSource::Historical);
    }

    #[test]
    fn test_learning_delta_counts_in_every_source() {
        let e = engine();

        // 场景1: 无预测 → 历史 + 修正
        let none = e.blend_demand(None, 100.0, -30.0);
        assert_eq!(none.source, DemandSource::Historical);
        assert_eq!(none.monthly_demand, 70.0);

        // 场景2: 低置信度预测存在 → 仍是历史 + 修正
        let low = e.blend_demand(Some((100.0, 0.49)), 100.0, -30.0);
        assert_eq!(low.source, DemandSource::Historical);
        assert_eq!(low.monthly_demand, 70.0, "低置信度预测不能吞掉已生效修正");

        // 场景3: 混合 → 两侧都修正，结果整体平移
        let mid = e.blend_demand(Some((200.0, 0.60)), 100.0, -30.0);
        assert_eq!(mid.source, DemandSource::Blended);
        assert!((mid.monthly_demand - (170.0 * 0.6 + 70.0 * 0.4)).abs() < 1e-9);

        // 场景4: 高置信度 → 预测 + 修正
        let high = e.blend_demand(Some((200.0, 0.90)), 100.0, -30.0);
        assert_eq!(high.monthly_demand, 170.0);

        // 修正不会把需求压成负数
        assert_eq!(e.blend_demand(None, 10.0, -30.0).monthly_demand, 0.0);
    }

    #[test]
    fn test_learning_only_applied() {
        let sku = base_sku();
        let pending = adjustment(AdjustmentType::GrowthRate, 50.0, false);
        let applied = adjustment(AdjustmentType::GrowthRate, -30.0, true);
        let delta = MonthlyOrderEngine::learning_delta(&[pending, applied], &sku, "W1", 300.0);
        assert_eq!(delta, -30.0, "未审批的建议不得生效");

        let mut category = adjustment(AdjustmentType::CategoryDefault, 0.1, true);
        category.sku_id = None;
        category.category = Some("CAT1".to_string());
        let delta = MonthlyOrderEngine::learning_delta(&[category], &sku, "W1", 300.0);
        assert!((delta - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_round_to_multiple() {
        assert_eq!(MonthlyOrderEngine::round_to_multiple(0.0, 25), 0.0);
        assert_eq!(MonthlyOrderEngine::round_to_multiple(1.0, 25), 25.0);
        assert_eq!(MonthlyOrderEngine::round_to_multiple(50.0, 25), 50.0);
        assert_eq!(MonthlyOrderEngine::round_to_multiple(50.5, 25), 75.0);
        assert_eq!(MonthlyOrderEngine::round_to_multiple(7.2, 1), 8.0);
    }

    #[test]
    fn test_compute_must_order_row() {
        // 月需求 300 → 日需求 10；现有 400 → 覆盖 40 天 < 60+30 → must_order
        let snapshot = base_snapshot();
        let rows = engine().compute_all(&snapshot, order_month(), today());
        assert_eq!(rows.len(), 1);
        let row = &rows[0];

        assert_eq!(row.demand_source, DemandSource::Historical);
        assert_eq!(row.lead_time_days, 60);
        assert_eq!(row.urgency, UrgencyLevel::MustOrder);
        assert!((row.coverage_days.unwrap() - 40.0).abs() < 1e-9);
        assert!(row.suggested_qty > 0.0);
        assert_eq!(row.suggested_qty % 25.0, 0.0, "按订货倍数取整");
        assert!(row.suggested_qty + row.current_position() >= row.reorder_point);
        assert_eq!(row.expected_arrival, order_month().first_day() + Duration::days(60));
        assert!(row.confirmed_qty.is_none());
    }

    #[test]
    fn test_compute_uses_supplier_and_pending() {
        let mut snapshot = base_snapshot();
        let key = ("SKU001".to_string(), "W1".to_string());
        snapshot.supplier_profiles.insert(
            ("SUP1".to_string(), "W1".to_string()),
            SupplierLeadTimeProfile {
                supplier: "SUP1".to_string(),
                warehouse: "W1".to_string(),
                avg_lead_time_days: 30.0,
                p95_lead_time_days: Some(45.0),
                min_lead_time_days: None,
                reliability_score: 0.9,
                avg_delay_days_when_late: None,
                shipments_observed: 10,
            },
        );
        snapshot.pending.insert(
            key,
            vec![
                PendingOrder {
                    order_id: "PO1".to_string(),
                    sku_id: "SKU001".to_string(),
                    warehouse: "W1".to_string(),
                    supplier: Some("SUP1".to_string()),
                    quantity: 1000.0,
                    order_date: today() - Duration::days(20),
                    expected_arrival: today() + Duration::days(10),
                    status: PendingOrderStatus::Ordered,
                },
                PendingOrder {
                    order_id: "PO2".to_string(),
                    sku_id: "SKU001".to_string(),
                    warehouse: "W1".to_string(),
                    supplier: Some("SUP1".to_string()),
                    quantity: 800.0,
                    order_date: today(),
                    expected_arrival: today() + Duration::days(200),
                    status: PendingOrderStatus::Ordered,
                },
            ],
        );

        let rows = engine().compute_all(&snapshot, order_month(), today());
        let row = &rows[0];
        assert_eq!(row.lead_time_days, 45, "P95 优先");
        assert_eq!(row.effective_pending, 1000.0);
        assert_eq!(row.future_pending_ignored, 800.0);
        // 位置 1400 / 日需求 10 = 140 天 ≥ 45+90 → skip
        assert_eq!(row.urgency, UrgencyLevel::Skip);
    }

    #[test]
    fn test_death_row_and_chronic() {
        let mut snapshot = base_snapshot();
        let key = ("SKU001".to_string(), "W1".to_string());
        // 覆盖 100 天 → should_order
        snapshot.inventory.insert(key, 1000.0);
        if let Some(sku) = snapshot.skus.get_mut("SKU001") {
            sku.status = SkuStatus::DeathRow;
        }
        let rows = engine().compute_all(&snapshot, order_month(), today());
        assert_eq!(rows[0].urgency, UrgencyLevel::Skip);
        assert_eq!(rows[0].suggested_qty, 0.0, "淘汰降级后建议量为 0");

        // 长期缺货抬升到 must_order → 淘汰不再降级
        snapshot.stockout_patterns.push(StockoutPattern {
            sku_id: "SKU001".to_string(),
            pattern_type: StockoutPatternType::Chronic,
            frequency_score: 85.0,
            confidence_level: ConfidenceLevel::High,
            pattern_value: None,
        });
        let rows = engine().compute_all(&snapshot, order_month(), today());
        assert_eq!(rows[0].urgency, UrgencyLevel::MustOrder);
        assert!(rows[0].stockout_escalated);
    }

    #[test]
    fn test_user_overrides_respected() {
        let mut snapshot = base_snapshot();
        let key = ("SKU001".to_string(), "W1".to_string());
        let mut existing = engine().compute_all(&snapshot, order_month(), today()).remove(0);
        existing.lead_time_override = Some(20);
        existing.arrival_override = NaiveDate::from_ymd_opt(2025, 4, 15);
        existing.confirmed_qty = Some(75.0);
        snapshot.existing.insert(key, existing);

        let row = engine().compute_all(&snapshot, order_month(), today()).remove(0);
        assert_eq!(row.lead_time_days, 20);
        assert_eq!(row.expected_arrival, NaiveDate::from_ymd_opt(2025, 4, 15).unwrap());
        assert_eq!(row.final_qty(), 75.0);
    }

    #[test]
    fn test_discontinued_excluded() {
        let mut snapshot = base_snapshot();
        if let Some(sku) = snapshot.skus.get_mut("SKU001") {
            sku.status = SkuStatus::Discontinued;
        }
        assert!(engine().compute_all(&snapshot, order_month(), today()).is_empty());
    }
}
