// ==========================================
// 仓库补货预测系统 - 需求预测引擎
// ==========================================
// 职责: 编排 需求统计 / 季节 / 增长 / 新品模式，生成 12 个月数量与收入预测
// 输入: ForecastInput（单 SKU/仓库 的内存快照）
// 输出: ForecastDetail（含方法、增长来源、季节、置信度等审计字段）
// 红线:
// - 新品 (<12 个月) 先走 Test & Learn；命中后基线不与任何其他来源混合
// - 季节因子只在画像置信度 > 阈值时应用
// - method_used / growth_rate_source 每行必填
// - 无可用数据 → 全零预测、置信度 0，不报错
// ==========================================

use crate::config::PlanningParameters;
use crate::domain::forecast::ForecastDetail;
use crate::domain::seasonal::SeasonalProfile;
use crate::domain::sku::Sku;
use crate::domain::types::{CalculationMethod, GrowthRateSource, SeasonalPatternType, YearMonth};
use crate::engine::classification::CellPolicy;
use crate::engine::demand_stats::DemandStats;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::growth::{GrowthEstimate, GrowthRateEstimator, TrendFit};
use crate::engine::new_sku::{
    LaunchPattern, TestLaunchPatternDetector, NEW_SKU_HISTORY_MONTHS, TEST_LAUNCH_CONFIDENCE,
    TEST_LAUNCH_SAFETY_MULTIPLIER,
};
use crate::FORECAST_HORIZON_MONTHS;
use chrono::Utc;
use serde::Serialize;
use serde_json::json;

pub const LIMITED_DATA_CONFIDENCE: f64 = 0.45;
const SHORT_HISTORY_MONTHS: usize = 24;
const SHORT_HISTORY_PENALTY: f64 = 0.05;
const SEASONAL_APPLIED_BONUS: f64 = 0.05;

/// 单 SKU/仓库 的预测输入（批次开始前一次性准备）
#[derive(Debug, Clone, Copy)]
pub struct ForecastInput<'a> {
    pub sku: &'a Sku,
    pub warehouse: &'a str,
    pub demand: Option<&'a DemandStats>,
    pub seasonal: Option<&'a SeasonalProfile>,
    pub category_growth: Option<f64>,
    pub growth_override: Option<f64>,
}

/// 基础需求阶段结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BaseDemand {
    pub value: f64,
    pub method: CalculationMethod,
    pub safety_multiplier: f64,
    pub confidence: f64,
    pub policy: CellPolicy,
    pub launch: Option<LaunchPattern>,
}

// ==========================================
// ForecastEngine - 需求预测引擎
// ==========================================
pub struct ForecastEngine {
    growth: GrowthRateEstimator,
    detector: TestLaunchPatternDetector,
    seasonal_threshold: f64,
}

impl ForecastEngine {
    pub fn new(params: &PlanningParameters) -> Self {
        Self {
            growth: GrowthRateEstimator::new(params),
            detector: TestLaunchPatternDetector::new(),
            seasonal_threshold: params.seasonal_confidence_threshold,
        }
    }

    pub fn growth_estimator(&self) -> &GrowthRateEstimator {
        &self.growth
    }

    /// SKU 自身趋势（批次第一阶段用于汇总品类中位数）
    pub fn sku_trend(&self, input: &ForecastInput<'_>) -> Option<TrendFit> {
        let demand = input.demand?;
        let xyz = input.sku.classification().map(|c| c.xyz);
        self.growth.fit_trend(demand, xyz, input.seasonal)
    }

    // ==========================================
    // 核心方法
    // ==========================================

    /// 生成单个 SKU/仓库 的 12 个月预测
    pub fn forecast(
        &self,
        run_id: &str,
        start_month: YearMonth,
        input: &ForecastInput<'_>,
    ) -> EngineResult<ForecastDetail> {
        let base = self.select_base_demand(input);
        if !base.value.is_finite() || base.value < 0.0 {
            return Err(EngineError::InvalidInput(format!(
                "基础需求异常: sku={}, warehouse={}, value={}",
                input.sku.sku_id, input.warehouse, base.value
            )));
        }

        let growth = self.select_growth(input, &base);

        // 季节: 画像置信度 > 阈值才应用
        let seasonal = input
            .seasonal
            .filter(|p| p.is_reliable(self.seasonal_threshold));
        let seasonal_applied = seasonal.is_some() && base.method != CalculationMethod::NoData;

        let mut confidence = base.confidence;
        if seasonal_applied && base.launch.is_none() && base.method != CalculationMethod::LimitedDataFallback {
            confidence += SEASONAL_APPLIED_BONUS;
        }
        let confidence = confidence.clamp(0.0, 1.0);

        let price = input.sku.revenue_price();
        let mut monthly_qty = Vec::with_capacity(FORECAST_HORIZON_MONTHS);
        let mut monthly_revenue = Vec::with_capacity(FORECAST_HORIZON_MONTHS);
        for i in 0..FORECAST_HORIZON_MONTHS {
            let period = start_month.add_months(i as i32);
            let factor = match (seasonal_applied, seasonal) {
                (true, Some(profile)) => profile.factor_for(period),
                _ => 1.0,
            };
            let compounding = (1.0 + growth.monthly_rate).powi(i as i32 + 1);
            let qty = (base.value * base.safety_multiplier * factor * compounding).max(0.0);
            monthly_qty.push(qty);
            monthly_revenue.push(qty * price);
        }

        let seasonal_pattern_applied = match (seasonal_applied, seasonal) {
            (true, Some(profile)) => profile.pattern_type,
            _ => SeasonalPatternType::None,
        };

        let calc_reason = json!({
            "method": base.method.as_str(),
            "primary_reason": Self::primary_reason(&base),
            "factors": {
                "classification": base.policy.classification.cell(),
                "classification_fallback": base.policy.fallback_used,
                "months_of_history": input.demand.map(|d| d.months_of_history()).unwrap_or(0),
                "base_demand": base.value,
                "safety_multiplier": base.safety_multiplier,
                "growth_annual": growth.annual_rate,
                "growth_source": growth.source.as_str(),
                "seasonal_applied": seasonal_applied,
            },
            "details": {
                "launch_pattern": base.launch,
                "start_month": start_month.to_string(),
            }
        });

        Ok(ForecastDetail {
            run_id: run_id.to_string(),
            sku_id: input.sku.sku_id.clone(),
            warehouse: input.warehouse.to_string(),
            start_month,
            monthly_qty,
            monthly_revenue,
            base_demand: base.value,
            safety_multiplier: base.safety_multiplier,
            method_used: base.method,
            growth_rate_applied: growth.annual_rate,
            growth_rate_source: growth.source,
            seasonal_pattern_applied,
            seasonal_applied,
            confidence_score: confidence,
            calc_reason: calc_reason.to_string(),
            created_at: Utc::now(),
        })
    }

    /// 选择基础需求
    ///
    /// 顺序:
    /// 1) 无可用需求 → no-data
    /// 2) 历史 < 12 个月 → Test & Learn；未识别 → limited-data-fallback
    /// 3) 其余 → 九宫格策略
    pub fn select_base_demand(&self, input: &ForecastInput<'_>) -> BaseDemand {
        let policy = CellPolicy::lookup(input.sku.classification());

        let demand = match input.demand.filter(|d| d.has_demand()) {
            Some(d) => d,
            None => {
                return BaseDemand {
                    value: 0.0,
                    method: CalculationMethod::NoData,
                    safety_multiplier: 1.0,
                    confidence: 0.0,
                    policy,
                    launch: None,
                }
            }
        };

        let series = demand.corrected_series();
        let history = demand.months_of_history();

        if history < NEW_SKU_HISTORY_MONTHS {
            let launch = self.detector.detect_from_stats(demand);
            if launch.detected {
                return BaseDemand {
                    value: launch.baseline,
                    method: CalculationMethod::TestLaunchPattern,
                    safety_multiplier: TEST_LAUNCH_SAFETY_MULTIPLIER,
                    confidence: TEST_LAUNCH_CONFIDENCE,
                    policy,
                    launch: Some(launch),
                };
            }
            return BaseDemand {
                value: policy.base_demand(&series).unwrap_or(0.0),
                method: CalculationMethod::LimitedDataFallback,
                safety_multiplier: policy.limited_data_multiplier(),
                confidence: LIMITED_DATA_CONFIDENCE,
                policy,
                launch: None,
            };
        }

        let mut confidence = policy.start_confidence;
        if history < SHORT_HISTORY_MONTHS {
            confidence -= SHORT_HISTORY_PENALTY;
        }
        BaseDemand {
            value: policy.base_demand(&series).unwrap_or(0.0),
            method: policy.method,
            safety_multiplier: 1.0,
            confidence,
            policy,
            launch: None,
        }
    }

    /// 选择增长率
    fn select_growth(&self, input: &ForecastInput<'_>, base: &BaseDemand) -> GrowthEstimate {
        match base.method {
            CalculationMethod::NoData => GrowthEstimate::none(),
            CalculationMethod::TestLaunchPattern => {
                let rate = input.growth_override.unwrap_or(0.0);
                let boosted = base
                    .launch
                    .as_ref()
                    .map_or(false, |l| l.stockout_boost_applied);
                let source = if boosted {
                    GrowthRateSource::ProvenDemandStockout
                } else if input.growth_override.is_some() {
                    GrowthRateSource::ManualOverride
                } else {
                    GrowthRateSource::Default
                };
                GrowthEstimate::new(rate, source)
            }
            _ => self.growth.resolve(
                input.growth_override,
                self.sku_trend(input),
                input.category_growth,
                input.sku.growth_status,
            ),
        }
    }

    fn primary_reason(base: &BaseDemand) -> &'static str {
        match base.method {
            CalculationMethod::NoData => "NO_USABLE_DEMAND",
            CalculationMethod::TestLaunchPattern => "NEW_SKU_PATTERN",
            CalculationMethod::LimitedDataFallback => "NEW_SKU_LIMITED_DATA",
            _ if base.policy.fallback_used => "CLASSIFICATION_FALLBACK",
            _ => "CLASSIFICATION_POLICY",
        }
    }
}
