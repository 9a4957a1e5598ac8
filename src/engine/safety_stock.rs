// ==========================================
// 仓库补货预测系统 - 安全库存 / 再订货点
// ==========================================
// 职责: z × 日标准差 × √(提前期 + 盘点周期) + 固定周期缓冲 + 季节峰值乘数
// 红线:
// - A 类、B 类(Y/Z) 额外加 1 周日需求缓冲
// - 季节乘数四个条件同时满足才应用
// ==========================================

use crate::config::PlanningParameters;
use crate::config::service_level::ServiceLevelTable;
use crate::domain::seasonal::SeasonalProfile;
use crate::domain::types::{AbcCode, Classification, XyzCode, YearMonth};
use serde::Serialize;

const REVIEW_BUFFER_DAYS: f64 = 7.0;
const SEASONAL_MIN_STRENGTH: f64 = 0.3;
const SEASONAL_MIN_CONFIDENCE: f64 = 0.6;
const SEASONAL_BASE_MULTIPLIER: f64 = 1.2;
const SEASONAL_STRENGTH_SCALE: f64 = 0.1;

/// 计算结果（各组成部分分别保留，便于审计）
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SafetyStockResult {
    pub z_score: f64,
    pub base: f64,
    pub review_buffer: f64,
    pub seasonal_multiplier: f64,
    pub safety_stock: f64,
}

// ==========================================
// SafetyStockCalculator - 安全库存计算器
// ==========================================
pub struct SafetyStockCalculator {
    service_levels: ServiceLevelTable,
    review_period_days: i64,
    default_cv: f64,
}

impl SafetyStockCalculator {
    pub fn new(params: &PlanningParameters) -> Self {
        Self {
            service_levels: params.service_levels.clone(),
            review_period_days: params.review_period_days,
            default_cv: params.default_demand_cv,
        }
    }

    /// 计算安全库存
    ///
    /// # 参数
    /// - daily_demand: 日需求（月需求 / 30）
    /// - cv: 需求变异系数；None 表示无统计，用默认值
    /// - lead_time_days: 采用的提前期
    pub fn calculate(
        &self,
        daily_demand: f64,
        cv: Option<f64>,
        lead_time_days: i64,
        classification: Option<Classification>,
        seasonal: Option<&SeasonalProfile>,
        order_month: YearMonth,
    ) -> SafetyStockResult {
        let daily = daily_demand.max(0.0);
        let cv = cv.filter(|c| c.is_finite() && *c >= 0.0).unwrap_or(self.default_cv);
        let z = self.service_levels.z_for(classification);

        // 1. 基础: z × 日标准差 × √(L + R)
        let exposure_days = (lead_time_days + self.review_period_days).max(0) as f64;
        let daily_std = daily * cv;
        let base = z * daily_std * exposure_days.sqrt();

        // 2. 周期缓冲
        let review_buffer = if Self::needs_review_buffer(classification) {
            REVIEW_BUFFER_DAYS * daily
        } else {
            0.0
        };

        // 3. 季节峰值
        let seasonal_multiplier = Self::seasonal_multiplier(seasonal, order_month);

        SafetyStockResult {
            z_score: z,
            base,
            review_buffer,
            seasonal_multiplier,
            safety_stock: (base + review_buffer) * seasonal_multiplier,
        }
    }

    /// 再订货点 = 日需求 × (L + R) + 安全库存
    pub fn reorder_point(&self, daily_demand: f64, lead_time_days: i64, safety_stock: f64) -> f64 {
        let exposure_days = (lead_time_days + self.review_period_days).max(0) as f64;
        daily_demand.max(0.0) * exposure_days + safety_stock
    }

    fn needs_review_buffer(classification: Option<Classification>) -> bool {
        let cell = classification.unwrap_or_else(Classification::most_conservative);
        match cell.abc {
            AbcCode::A => true,
            AbcCode::B => matches!(cell.xyz, XyzCode::Y | XyzCode::Z),
            AbcCode::C => false,
        }
    }

    /// 季节乘数 1.2 ~ 1.3
    pub fn seasonal_multiplier(seasonal: Option<&SeasonalProfile>, order_month: YearMonth) -> f64 {
        match seasonal {
            Some(p)
                if p.pattern_strength > SEASONAL_MIN_STRENGTH
                    && p.overall_confidence > SEASONAL_MIN_CONFIDENCE
                    && p.is_significant
                    && p.is_peak_window(order_month) =>
            {
                SEASONAL_BASE_MULTIPLIER + SEASONAL_STRENGTH_SCALE * p.pattern_strength.min(1.0)
            }
            _ => 1.0,
        }
    }
}
