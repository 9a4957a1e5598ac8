// ==========================================
// 仓库补货预测系统 - 补货紧急等级判定引擎
// ==========================================
// 红线: 紧急等级是"等级制",不是评分制
// ==========================================
// 职责: 按覆盖天数 vs (提前期 + N×30) 判定补货等级
// 输入: 覆盖天数 / 提前期 / 长期缺货信号 / 淘汰标记
// 输出: UrgencyDecision (level + urgency_reason JSON)
// ==========================================

use crate::domain::types::UrgencyLevel;
use serde_json::json;

/// 月度周期（天）
const CYCLE_DAYS: f64 = 30.0;

/// 判定结果
#[derive(Debug, Clone, PartialEq)]
pub struct UrgencyDecision {
    pub level: UrgencyLevel,
    pub reason: String,
    pub stockout_escalated: bool,
    pub death_row_downgraded: bool,
}

// ==========================================
// UrgencyEngine - 补货紧急等级判定引擎
// ==========================================
#[derive(Default)]
pub struct UrgencyEngine;

impl UrgencyEngine {
    pub fn new() -> Self {
        Self
    }

    // ==========================================
    // 核心方法
    // ==========================================

    /// 判定紧急等级
    ///
    /// 顺序:
    /// 1) 覆盖天数分层: < L+30 must / < L+60 should / < L+90 optional / 其他 skip
    /// 2) 长期缺货抬升一级（skip 不抬升，永不降级）
    /// 3) 淘汰 SKU 降为 skip（已是 must_order 除外），在抬升后的等级上判断
    pub fn evaluate(
        &self,
        coverage_days: Option<f64>,
        lead_time_days: i64,
        chronic_stockout: bool,
        death_row: bool,
    ) -> UrgencyDecision {
        let mut factors = Vec::new();

        // 规则1: 覆盖分层
        let tier = Self::tier_for_coverage(coverage_days, lead_time_days);
        match coverage_days {
            Some(days) => factors.push(format!(
                "coverage: {:.1} days vs lead_time={} → {}",
                days, lead_time_days, tier
            )),
            None => factors.push("coverage: no demand".to_string()),
        }

        // 规则2: 长期缺货抬升
        let mut level = tier;
        let mut stockout_escalated = false;
        if chronic_stockout {
            let escalated = Self::escalate(tier);
            if escalated != tier {
                factors.push(format!("chronic_stockout: elevated from {} to {}", tier, escalated));
                level = escalated;
                stockout_escalated = true;
            }
        }

        // 规则3: 淘汰降级
        let mut death_row_downgraded = false;
        if death_row && level != UrgencyLevel::MustOrder && level != UrgencyLevel::Skip {
            factors.push(format!("death_row: downgraded from {} to skip", level));
            level = UrgencyLevel::Skip;
            death_row_downgraded = true;
        }

        let primary_reason = if death_row_downgraded {
            "DEATH_ROW"
        } else if stockout_escalated {
            "CHRONIC_STOCKOUT"
        } else if coverage_days.is_none() {
            "NO_DEMAND"
        } else {
            "COVERAGE"
        };

        let reason = json!({
            "level": level.as_str(),
            "primary_reason": primary_reason,
            "factors": factors,
            "details": {
                "coverage_days": coverage_days,
                "lead_time_days": lead_time_days,
                "coverage_tier": tier.as_str(),
                "chronic_stockout": chronic_stockout,
                "death_row": death_row,
            }
        });

        UrgencyDecision {
            level,
            reason: reason.to_string(),
            stockout_escalated,
            death_row_downgraded,
        }
    }

    /// 覆盖天数分层（无需求 → skip）
    pub fn tier_for_coverage(coverage_days: Option<f64>, lead_time_days: i64) -> UrgencyLevel {
        let days = match coverage_days {
            Some(d) if d.is_finite() => d,
            _ => return UrgencyLevel::Skip,
        };
        let lead = lead_time_days as f64;
        if days < lead + CYCLE_DAYS {
            UrgencyLevel::MustOrder
        } else if days < lead + 2.0 * CYCLE_DAYS {
            UrgencyLevel::ShouldOrder
        } else if days < lead + 3.0 * CYCLE_DAYS {
            UrgencyLevel::Optional
        } else {
            UrgencyLevel::Skip
        }
    }

    /// 抬升一级（skip 与 must_order 不变）
    fn escalate(level: UrgencyLevel) -> UrgencyLevel {
        match level {
            UrgencyLevel::Optional => UrgencyLevel::ShouldOrder,
            UrgencyLevel::ShouldOrder => UrgencyLevel::MustOrder,
            other => other,
        }
    }
}

// ==========================================
// 单元测试
// ==========================================
#[cfg(test)]
mod tests {
    use super::*;

    const LEAD: i64 = 60;

    fn engine() -> UrgencyEngine {
        UrgencyEngine::new()
    }

    #[test]
    fn test_scenario_1_coverage_tiers() {
        // 场景1: 提前期 60 天的四个分层
        let e = engine();
        assert_eq!(e.evaluate(Some(80.0), LEAD, false, false).level, UrgencyLevel::MustOrder);
        assert_eq!(e.evaluate(Some(100.0), LEAD, false, false).level, UrgencyLevel::ShouldOrder);
        assert_eq!(e.evaluate(Some(130.0), LEAD, false, false).level, UrgencyLevel::Optional);
        assert_eq!(e.evaluate(Some(150.0), LEAD, false, false).level, UrgencyLevel::Skip);
    }

    #[test]
    fn test_scenario_2_boundaries_exclusive() {
        // 场景2: 边界值落入较低等级
        assert_eq!(UrgencyEngine::tier_for_coverage(Some(90.0), LEAD), UrgencyLevel::ShouldOrder);
        assert_eq!(UrgencyEngine::tier_for_coverage(Some(120.0), LEAD), UrgencyLevel::Optional);
        assert_eq!(UrgencyEngine::tier_for_coverage(Some(150.0), LEAD), UrgencyLevel::Skip);
    }

    #[test]
    fn test_scenario_3_monotonic() {
        // 场景3: 覆盖天数递增 → 等级不升
        let mut previous = UrgencyLevel::MustOrder;
        for days in 0..300 {
            let level = UrgencyEngine::tier_for_coverage(Some(days as f64), LEAD);
            assert!(level <= previous, "days={} 等级不应上升", days);
            previous = level;
        }
    }

    #[test]
    fn test_scenario_4_chronic_escalation() {
        let e = engine();
        let d = e.evaluate(Some(130.0), LEAD, true, false);
        assert_eq!(d.level, UrgencyLevel::ShouldOrder);
        assert!(d.stockout_escalated);

        let d = e.evaluate(Some(100.0), LEAD, true, false);
        assert_eq!(d.level, UrgencyLevel::MustOrder);

        // skip 不抬升
        let d = e.evaluate(Some(200.0), LEAD, true, false);
        assert_eq!(d.level, UrgencyLevel::Skip);
        assert!(!d.stockout_escalated);

        // 抬升不会降级
        for days in [10.0, 100.0, 130.0, 200.0] {
            let plain = e.evaluate(Some(days), LEAD, false, false).level;
            let escalated = e.evaluate(Some(days), LEAD, true, false).level;
            assert!(escalated >= plain);
        }
    }

    #[test]
    fn test_scenario_5_death_row() {
        let e = engine();
        // 淘汰 + should → skip
        let d = e.evaluate(Some(100.0), LEAD, false, true);
        assert_eq!(d.level, UrgencyLevel::Skip);
        assert!(d.death_row_downgraded);

        // 淘汰 + must → 保持
        let d = e.evaluate(Some(10.0), LEAD, false, true);
        assert_eq!(d.level, UrgencyLevel::MustOrder);
        assert!(!d.death_row_downgraded);

        // 抬升后为 must → 保持
        let d = e.evaluate(Some(100.0), LEAD, true, true);
        assert_eq!(d.level, UrgencyLevel::MustOrder);
    }

    #[test]
    fn test_scenario_6_no_demand_and_reason_json() {
        let d = engine().evaluate(None, LEAD, true, false);
        assert_eq!(d.level, UrgencyLevel::Skip);

        let parsed: serde_json::Value = serde_json::from_str(&d.reason).unwrap();
        assert_eq!(parsed["level"], "skip");
        assert_eq!(parsed["primary_reason"], "NO_DEMAND");
        assert!(parsed["factors"].is_array());
    }
}
