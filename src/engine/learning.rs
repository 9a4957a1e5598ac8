// ==========================================
// 仓库补货预测系统 - 学习调整建议引擎
// ==========================================
// 职责: 扫描准确率历史，识别系统性偏差并生成调整建议
// 红线:
// - 至少 3 条计入 MAPE 的记录才提建议
// - 建议一律 applied=false，置信度只供审核参考，永不自动生效
// - 同一 (目标, 类型) 的待审建议刷新而不重复
// - 偏差按已生效调整修正后的预测计算；新建议是整体替换量，审批后取代旧调整
// ==========================================

use crate::domain::accuracy::{percentage_error, ForecastAccuracyRecord, LearningAdjustment};
use crate::domain::sku::Sku;
use crate::domain::types::{AdjustmentType, CalculationMethod};
use crate::engine::order_engine::MonthlyOrderEngine;
use crate::engine::stats;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use tracing::instrument;
use uuid::Uuid;

pub const MIN_SAMPLE_SIZE: usize = 3;
const BIAS_THRESHOLD: f64 = 0.15;
const METHOD_SWITCH_MAPE: f64 = 40.0;
const VOLATILITY_STD_PCT: f64 = 50.0;
const MIN_CATEGORY_SKUS: usize = 3;
const MAX_CONFIDENCE: f64 = 0.95;

/// SKU 级偏差统计
#[derive(Debug, Clone, PartialEq)]
pub struct SkuBias {
    pub sku_id: String,
    pub warehouse: String,
    pub bias: f64,
    pub samples: usize,
    pub mape: Option<f64>,
}

// ==========================================
// LearningRecommender - 学习调整建议
// ==========================================
#[derive(Default)]
pub struct LearningRecommender;

impl LearningRecommender {
    pub fn new() -> Self {
        Self
    }

    /// 生成建议
    ///
    /// # 参数
    /// - records: 已记录实际值的准确率记录
    /// - skus: SKU 主数据（品类聚合用）
    /// - recent_demand: (sku, 仓库) → 近期月均需求
    /// - applied: 已生效调整（准确率记录保存的是未调整的预测值）
    #[instrument(skip_all, fields(records = records.len(), applied = applied.len()))]
    pub fn recommend(
        &self,
        records: &[ForecastAccuracyRecord],
        skus: &HashMap<String, Sku>,
        recent_demand: &HashMap<(String, String), f64>,
        applied: &[LearningAdjustment],
        now: DateTime<Utc>,
    ) -> Vec<LearningAdjustment> {
        // 按 (sku, 仓库) 分组，只取计入 MAPE 的记录
        let mut groups: BTreeMap<(String, String), Vec<&ForecastAccuracyRecord>> = BTreeMap::new();
        for r in records.iter().filter(|r| !r.is_excluded_from_mape()) {
            groups
                .entry((r.sku_id.clone(), r.warehouse.clone()))
                .or_default()
                .push(r);
        }

        let mut proposals = Vec::new();
        let mut biases = Vec::new();
        for ((sku_id, warehouse), group) in &groups {
            if group.len() < MIN_SAMPLE_SIZE {
                continue;
            }
            let recent = recent_demand
                .get(&(sku_id.clone(), warehouse.clone()))
                .copied()
                .unwrap_or_else(|| stats::mean(&Self::actuals(group)));

            let growth_applied = Self::applied_growth(applied, sku_id, warehouse);
            let offset = match skus.get(sku_id) {
                Some(sku) => MonthlyOrderEngine::learning_delta(applied, sku, warehouse, recent),
                None => growth_applied,
            };

            if let Some(bias) = Self::sku_bias(sku_id, warehouse, group, offset) {
                let base_offset = offset - growth_applied;
                if let Some(adj) =
                    self.growth_proposal(&bias, group, recent, growth_applied, base_offset, now)
                {
                    proposals.push(adj);
                }
                biases.push(bias);
            }
            proposals.extend(self.method_switch_proposals(sku_id, warehouse, group, now));
            if let Some(adj) = self.volatility_proposal(sku_id, warehouse, group, now) {
                proposals.push(adj);
            }
        }

        proposals.extend(self.category_proposals(&biases, skus, applied, now));

        // 说明类建议已生效过则不再重复提出
        proposals.retain(|p| {
            !(Self::is_informational(p.adjustment_type)
                && applied.iter().any(|a| a.applied && a.same_target(p)))
        });
        tracing::info!(proposals = proposals.len(), "学习调整建议生成完成");
        proposals
    }

    fn is_informational(adjustment_type: AdjustmentType) -> bool {
        matches!(
            adjustment_type,
            AdjustmentType::MethodSwitch | AdjustmentType::VolatilityAdjustment
        )
    }

    /// 已生效的 SKU 级 growth-rate 修正量（件/月）
    fn applied_growth(applied: &[LearningAdjustment], sku_id: &str, warehouse: &str) -> f64 {
        applied
            .iter()
            .filter(|a| a.applied && a.adjustment_type == AdjustmentType::GrowthRate)
            .filter(|a| a.sku_id.as_deref() == Some(sku_id))
            .filter(|a| a.warehouse.as_deref().map_or(true, |w| w == warehouse))
            .map(|a| a.adjustment_magnitude)
            .sum()
    }

    /// 已生效的品类比例
    fn applied_category(applied: &[LearningAdjustment], category: &str) -> f64 {
        applied
            .iter()
            .filter(|a| a.applied && a.adjustment_type == AdjustmentType::CategoryDefault)
            .filter(|a| a.sku_id.is_none() && a.category.as_deref() == Some(category))
            .map(|a| a.adjustment_magnitude)
            .sum()
    }

    /// 与待审建议合并：同目标同类型沿用原 ID
    pub fn merge_with_pending(
        &self,
        proposals: Vec<LearningAdjustment>,
        pending: &[LearningAdjustment],
    ) -> Vec<LearningAdjustment> {
        proposals
            .into_iter()
            .map(|mut p| {
                if let Some(existing) = pending.iter().find(|e| e.is_pending() && e.same_target(&p)) {
                    p.adjustment_id = existing.adjustment_id.clone();
                    p.created_at = existing.created_at;
                }
                p
            })
            .collect()
    }

    // ==========================================
    // 偏差统计
    // ==========================================

    /// 平均有符号偏差 = mean((预测 + offset - 实际) / 实际)，实际为 0 的记录不参与
    ///
    /// offset 为已生效调整的修正量（件/月）。
    pub fn sku_bias(
        sku_id: &str,
        warehouse: &str,
        group: &[&ForecastAccuracyRecord],
        offset: f64,
    ) -> Option<SkuBias> {
        let ratios: Vec<f64> = group
            .iter()
            .filter_map(|r| match r.actual_demand {
                Some(actual) if actual > 0.0 => {
                    Some(((r.predicted_demand + offset).max(0.0) - actual) / actual)
                }
                _ => None,
            })
            .collect();
        if ratios.len() < MIN_SAMPLE_SIZE {
            return None;
        }
        let errors: Vec<f64> = group.iter().filter_map(|r| r.percentage_error).collect();
        Some(SkuBias {
            sku_id: sku_id.to_string(),
            warehouse: warehouse.to_string(),
            bias: stats::mean(&ratios),
            samples: ratios.len(),
            mape: if errors.is_empty() { None } else { Some(stats::mean(&errors)) },
        })
    }

    fn actuals(group: &[&ForecastAccuracyRecord]) -> Vec<f64> {
        group.iter().filter_map(|r| r.actual_demand).collect()
    }

    fn confidence(samples: usize) -> f64 {
        (0.5 + samples as f64 * 0.05).min(MAX_CONFIDENCE)
    }

    // ==========================================
    // 各类建议
    // ==========================================

    /// growth-rate: 剩余 |偏差| ≥ 15% → 需求修正 = 已生效修正 - 剩余偏差 × 近期月均
    ///
    /// 返回的是整体替换量：审批后取代同目标旧调整，而不是叠加。
    fn growth_proposal(
        &self,
        bias: &SkuBias,
        group: &[&ForecastAccuracyRecord],
        recent: f64,
        growth_applied: f64,
        base_offset: f64,
        now: DateTime<Utc>,
    ) -> Option<LearningAdjustment> {
        if bias.bias.abs() < BIAS_THRESHOLD {
            return None;
        }
        let delta = growth_applied - bias.bias * recent;

        // 用修正后的预测重算 MAPE 作为预期
        let corrected: Vec<f64> = group
            .iter()
            .filter_map(|r| {
                let actual = r.actual_demand?;
                percentage_error((r.predicted_demand + base_offset + delta).max(0.0), actual)
            })
            .collect();
        let expected_after = if corrected.is_empty() {
            None
        } else {
            Some(stats::mean(&corrected))
        };

        let direction = if bias.bias > 0.0 { "OVER_FORECAST" } else { "UNDER_FORECAST" };
        let reason = json!({
            "primary_reason": direction,
            "factors": [format!("bias={:.3}", bias.bias), format!("samples={}", bias.samples)],
            "details": { "recent_avg_demand": recent, "applied_delta": growth_applied },
        });

        Some(Self::proposal(
            Some(bias.sku_id.clone()),
            None,
            Some(bias.warehouse.clone()),
            AdjustmentType::GrowthRate,
            recent + growth_applied,
            recent + delta,
            delta,
            Self::confidence(bias.samples),
            bias.mape,
            expected_after,
            bias.samples,
            reason.to_string(),
            now,
        ))
    }

    /// method-switch: 长窗口方法 MAPE > 40% → 建议 3 个月窗口
    fn method_switch_proposals(
        &self,
        sku_id: &str,
        warehouse: &str,
        group: &[&ForecastAccuracyRecord],
        now: DateTime<Utc>,
    ) -> Vec<LearningAdjustment> {
        let mut by_method: BTreeMap<&'static str, (CalculationMethod, Vec<f64>)> = BTreeMap::new();
        for r in group {
            if let Some(pct) = r.percentage_error {
                by_method
                    .entry(r.method_used.as_str())
                    .or_insert_with(|| (r.method_used, Vec::new()))
                    .1
                    .push(pct);
            }
        }

        by_method
            .into_values()
            .filter(|(method, errors)| {
                Self::is_long_window(*method)
                    && errors.len() >= MIN_SAMPLE_SIZE
                    && stats::mean(errors) > METHOD_SWITCH_MAPE
            })
            .map(|(method, errors)| {
                let mape = stats::mean(&errors);
                let current = method.window_months().unwrap_or(6) as f64;
                let target = CalculationMethod::Simple3m;
                let proposed = target.window_months().unwrap_or(3) as f64;
                let reason = json!({
                    "primary_reason": "HIGH_MAPE_LONG_WINDOW",
                    "factors": [format!("mape={:.1}", mape)],
                    "details": { "from": method.as_str(), "to": target.as_str() },
                });
                Self::proposal(
                    Some(sku_id.to_string()),
                    None,
                    Some(warehouse.to_string()),
                    AdjustmentType::MethodSwitch,
                    current,
                    proposed,
                    proposed - current,
                    Self::confidence(errors.len()),
                    Some(mape),
                    None,
                    errors.len(),
                    reason.to_string(),
                    now,
                )
            })
            .collect()
    }

    fn is_long_window(method: CalculationMethod) -> bool {
        matches!(method, CalculationMethod::Weighted6m | CalculationMethod::Simple6m)
    }

    /// volatility-adjustment: 百分比误差标准差 > 50%
    fn volatility_proposal(
        &self,
        sku_id: &str,
        warehouse: &str,
        group: &[&ForecastAccuracyRecord],
        now: DateTime<Utc>,
    ) -> Option<LearningAdjustment> {
        let errors: Vec<f64> = group.iter().filter_map(|r| r.percentage_error).collect();
        if errors.len() < MIN_SAMPLE_SIZE {
            return None;
        }
        let spread = stats::std_dev(&errors);
        if spread <= VOLATILITY_STD_PCT {
            return None;
        }
        let reason = json!({
            "primary_reason": "ERROR_VOLATILITY",
            "factors": [format!("error_std={:.1}", spread)],
            "details": { "threshold": VOLATILITY_STD_PCT },
        });
        Some(Self::proposal(
            Some(sku_id.to_string()),
            None,
            Some(warehouse.to_string()),
            AdjustmentType::VolatilityAdjustment,
            spread,
            VOLATILITY_STD_PCT,
            VOLATILITY_STD_PCT - spread,
            Self::confidence(errors.len()),
            Some(stats::mean(&errors)),
            None,
            errors.len(),
            reason.to_string(),
            now,
        ))
    }

    /// category-default: 同品类 ≥3 个 SKU 偏差同向且平均 |偏差| ≥ 15%
    ///
    /// adjustment_magnitude 为比例（已生效比例 - 剩余平均偏差），由补货引擎按历史需求折算。
    fn category_proposals(
        &self,
        biases: &[SkuBias],
        skus: &HashMap<String, Sku>,
        applied: &[LearningAdjustment],
        now: DateTime<Utc>,
    ) -> Vec<LearningAdjustment> {
        let mut by_category: BTreeMap<String, Vec<&SkuBias>> = BTreeMap::new();
        for b in biases {
            if let Some(category) = skus.get(&b.sku_id).and_then(|s| s.category.clone()) {
                by_category.entry(category).or_default().push(b);
            }
        }

        let mut proposals = Vec::new();
        for (category, members) in by_category {
            let over: Vec<f64> = members.iter().filter(|b| b.bias > 0.0).map(|b| b.bias).collect();
            let under: Vec<f64> = members.iter().filter(|b| b.bias < 0.0).map(|b| b.bias).collect();
            let side = if over.len() >= under.len() { over } else { under };
            if side.len() < MIN_CATEGORY_SKUS {
                continue;
            }
            let mean_bias = stats::mean(&side);
            if mean_bias.abs() < BIAS_THRESHOLD {
                continue;
            }
            let reason = json!({
                "primary_reason": "CATEGORY_SYSTEMATIC_BIAS",
                "factors": [format!("skus={}", side.len()), format!("mean_bias={:.3}", mean_bias)],
                "details": { "category": category },
            });
            let current = Self::applied_category(applied, &category);
            proposals.push(Self::proposal(
                None,
                Some(category),
                None,
                AdjustmentType::CategoryDefault,
                current,
                current - mean_bias,
                current - mean_bias,
                Self::confidence(side.len()),
                None,
                None,
                side.len(),
                reason.to_string(),
                now,
            ));
        }
        proposals
    }

    #[allow(clippy::too_many_arguments)]
    fn proposal(
        sku_id: Option<String>,
        category: Option<String>,
        warehouse: Option<String>,
        adjustment_type: AdjustmentType,
        current_value: f64,
        proposed_value: f64,
        adjustment_magnitude: f64,
        confidence_score: f64,
        mape_before: Option<f64>,
        mape_expected_after: Option<f64>,
        sample_size: usize,
        reason: String,
        now: DateTime<Utc>,
    ) -> LearningAdjustment {
        LearningAdjustment {
            adjustment_id: Uuid::new_v4().to_string(),
            sku_id,
            category,
            warehouse,
            adjustment_type,
            current_value,
            proposed_value,
            adjustment_magnitude,
            confidence_score,
            mape_before,
            mape_expected_after,
            sample_size: sample_size as i64,
            reason,
            applied: false,
            rejected: false,
            approved_by: None,
            approved_at: None,
            superseded_by: None,
            created_at: now,
            updated_at: now,
        }
    }
}
