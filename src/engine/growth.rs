// ==========================================
// 仓库补货预测系统 - 增长率估计引擎
// ==========================================
// 职责: SKU 自身趋势（加权回归）/ 品类中位数回退 / 人工覆写 / 状态上下限
// 红线:
// - 人工覆写永远优先
// - 计算得到的年化增长率一律钳制在 ±50%
// - 季节性明显时先去季节再拟合趋势
// ==========================================

use crate::config::PlanningParameters;
use crate::domain::seasonal::SeasonalProfile;
use crate::domain::types::{GrowthRateSource, GrowthStatus, SeasonalPatternType, XyzCode};
use crate::engine::demand_stats::DemandStats;
use crate::engine::stats;
use serde::Serialize;

pub const MIN_MONTHS_FOR_TREND: usize = 6;
pub const MIN_MONTHS_FOR_CATEGORY_PEER: usize = 12;
const TREND_WINDOW_MONTHS: usize = 12;
const DESEASONALIZE_CV_THRESHOLD: f64 = 0.25;
const X_OUTLIER_SIGMA: f64 = 2.0;

/// 增长率估计结果（年化与月化同时携带）
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GrowthEstimate {
    pub annual_rate: f64,
    pub monthly_rate: f64,
    pub source: GrowthRateSource,
}

impl GrowthEstimate {
    pub fn new(annual_rate: f64, source: GrowthRateSource) -> Self {
        Self {
            annual_rate,
            monthly_rate: GrowthRateEstimator::monthly_from_annual(annual_rate),
            source,
        }
    }

    pub fn none() -> Self {
        Self::new(0.0, GrowthRateSource::Default)
    }
}

/// SKU 自身趋势（未加状态上下限）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendFit {
    pub annual_rate: f64,
    pub deseasonalized: bool,
    pub points_used: usize,
}

// ==========================================
// GrowthRateEstimator - 增长率估计
// ==========================================
pub struct GrowthRateEstimator {
    cap_annual: f64,
    viral_floor_annual: f64,
    declining_cap_annual: f64,
}

impl GrowthRateEstimator {
    pub fn new(params: &PlanningParameters) -> Self {
        Self {
            cap_annual: params.growth_cap_annual.abs(),
            viral_floor_annual: params.viral_growth_floor_annual,
            declining_cap_annual: params.declining_growth_cap_annual,
        }
    }

    /// 年化 → 月化复利: (1 + annual)^(1/12) - 1
    pub fn monthly_from_annual(annual: f64) -> f64 {
        let base = (1.0 + annual).max(0.0);
        base.powf(1.0 / 12.0) - 1.0
    }

    /// SKU 自身趋势
    ///
    /// # 返回
    /// - None: 历史不足 6 个月
    pub fn fit_trend(
        &self,
        demand: &DemandStats,
        xyz: Option<XyzCode>,
        seasonal: Option<&SeasonalProfile>,
    ) -> Option<TrendFit> {
        if demand.months_of_history() < MIN_MONTHS_FOR_TREND {
            return None;
        }
        let start = demand.series.len().saturating_sub(TREND_WINDOW_MONTHS);
        let window = &demand.series[start..];
        let raw: Vec<f64> = window.iter().map(|p| p.corrected_demand).collect();

        // 1. 去季节（CV > 25% 且有季节画像）
        let seasonal = seasonal.filter(|p| p.pattern_type != SeasonalPatternType::None);
        let deseasonalize = demand.cv > DESEASONALIZE_CV_THRESHOLD && seasonal.is_some();
        let values: Vec<f64> = match (deseasonalize, seasonal) {
            (true, Some(profile)) => window
                .iter()
                .map(|p| {
                    let factor = profile.factor_for(p.year_month);
                    if factor > 0.0 {
                        p.corrected_demand / factor
                    } else {
                        p.corrected_demand
                    }
                })
                .collect(),
            _ => raw,
        };

        // 2. 稳定型 (X) 剔除 2σ 之外的点
        let xyz = xyz.unwrap_or(XyzCode::Z);
        let kept: Vec<usize> = if xyz == XyzCode::X {
            stats::indices_within_z(&values, X_OUTLIER_SIGMA)
        } else {
            (0..values.len()).collect()
        };
        if kept.len() < 2 {
            return None;
        }

        // 3. 按 XYZ 加权的线性回归
        let n = values.len();
        let xs: Vec<f64> = kept.iter().map(|&i| i as f64).collect();
        let ys: Vec<f64> = kept.iter().map(|&i| values[i]).collect();
        let weights: Vec<f64> = kept.iter().map(|&i| Self::weight(xyz, i, n)).collect();

        let (slope, level) = stats::weighted_linear_slope(&xs, &ys, &weights)?;
        let annual = if level > 0.0 { slope / level * 12.0 } else { 0.0 };

        Some(TrendFit {
            annual_rate: annual,
            deseasonalized: deseasonalize,
            points_used: kept.len(),
        })
    }

    /// 回归权重（i 为窗口内下标，越大越新）
    ///
    /// - X: 线性，最老 1.0 → 最新 2.0
    /// - Y: 0.75^age
    /// - Z: 0.5^age
    fn weight(xyz: XyzCode, i: usize, n: usize) -> f64 {
        let age = (n - 1 - i) as i32;
        match xyz {
            XyzCode::X => {
                if n <= 1 {
                    1.0
                } else {
                    1.0 + i as f64 / (n - 1) as f64
                }
            }
            XyzCode::Y => 0.75f64.powi(age),
            XyzCode::Z => 0.5f64.powi(age),
        }
    }

    /// 品类中位数（同品类、≥12 个月历史的同伴）
    pub fn category_median(&self, peer_rates: &[f64]) -> Option<f64> {
        stats::median(peer_rates).map(|r| self.clamp(r))
    }

    /// 汇总增长率
    ///
    /// 顺序: 人工覆写 → SKU 趋势 → 品类中位数 → 默认 0；随后应用爆款下限 / 衰退上限，最后钳制 ±cap。
    pub fn resolve(
        &self,
        manual_override: Option<f64>,
        trend: Option<TrendFit>,
        category_rate: Option<f64>,
        growth_status: GrowthStatus,
    ) -> GrowthEstimate {
        if let Some(rate) = manual_override {
            return GrowthEstimate::new(rate, GrowthRateSource::ManualOverride);
        }

        let (mut rate, mut source) = match (trend, category_rate) {
            (Some(fit), _) if fit.deseasonalized => {
                (fit.annual_rate, GrowthRateSource::SkuTrendDeseasonalized)
            }
            (Some(fit), _) => (fit.annual_rate, GrowthRateSource::SkuTrend),
            (None, Some(rate)) => (rate, GrowthRateSource::CategoryMedian),
            (None, None) => (0.0, GrowthRateSource::Default),
        };

        match growth_status {
            GrowthStatus::Viral if rate < self.viral_floor_annual => {
                rate = self.viral_floor_annual;
                source = GrowthRateSource::ViralFloor;
            }
            GrowthStatus::Declining if rate > self.declining_cap_annual => {
                rate = self.declining_cap_annual;
                source = GrowthRateSource::DecliningCap;
            }
            _ => {}
        }

        GrowthEstimate::new(self.clamp(rate), source)
    }

    fn clamp(&self, rate: f64) -> f64 {
        if !rate.is_finite() {
            return 0.0;
        }
        rate.clamp(-self.cap_annual, self.cap_annual)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::sales::MonthlySalesRecord;
    use crate::domain::types::YearMonth;
    use crate::engine::demand_stats::DemandStatsProvider;

    fn estimator() -> GrowthRateEstimator {
        GrowthRateEstimator::new(&PlanningParameters::default())
    }

    fn build(values: &[f64]) -> DemandStats {
        let start = YearMonth::new(2024, 1).unwrap();
        let records: Vec<MonthlySalesRecord> = values
            .iter()
            .enumerate()
            .map(|(i, v)| MonthlySalesRecord::new("S1", "W1", start.add_months(i as i32), *v, 0))
            .collect();
        let refs: Vec<&MonthlySalesRecord> = records.iter().collect();
        DemandStatsProvider::new().build("S1", "W1", refs, None)
    }

    fn fit(annual: f64) -> Option<TrendFit> {
        Some(TrendFit {
            annual_rate: annual,
            deseasonalized: false,
            points_used: 12,
        })
    }

    #[test]
    fn test_trend_clamped_to_cap() {
        // 场景: 计算得 +80%/年 → 钳制到 +50%
        let est = estimator().resolve(None, fit(0.8), None, GrowthStatus::Normal);
        assert_eq!(est.annual_rate, 0.5);
        assert_eq!(est.source, GrowthRateSource::SkuTrend);
    }

    #[test]
    fn test_viral_floor() {
        // 场景: 爆款计算得 -5%/年 → 抬到 +20%
        let est = estimator().resolve(None, fit(-0.05), None, GrowthStatus::Viral);
        assert!((est.annual_rate - 0.2).abs() < 1e-12);
        assert_eq!(est.source, GrowthRateSource::ViralFloor);
    }

    #[test]
    fn test_declining_cap() {
        let est = estimator().resolve(None, fit(0.3), None, GrowthStatus::Declining);
        assert!((est.annual_rate + 0.1).abs() < 1e-12);
        assert_eq!(est.source, GrowthRateSource::DecliningCap);
    }

    #[test]
    fn test_manual_override_wins() {
        let est = estimator().resolve(Some(0.05), fit(0.4), Some(0.1), GrowthStatus::Viral);
        assert_eq!(est.annual_rate, 0.05);
        assert_eq!(est.source, GrowthRateSource::ManualOverride);
    }

    #[test]
    fn test_category_fallback_and_default() {
        let e = estimator();
        let median = e.category_median(&[0.02, 0.9, 0.04]);
        assert_eq!(median, Some(0.04), "中位数对单个极端同伴稳健");
        let est = e.resolve(None, None, median, GrowthStatus::Normal);
        assert_eq!(est.source, GrowthRateSource::CategoryMedian);

        let none = e.resolve(None, None, None, GrowthStatus::Normal);
        assert_eq!(none.annual_rate, 0.0);
        assert_eq!(none.source, GrowthRateSource::Default);
    }

    #[test]
    fn test_fit_linear_growth() {
        // 每月 +2，均值 111 → 月增长 ≈ 1.8%，年化 ≈ 21.6%
        let values: Vec<f64> = (0..12).map(|i| 100.0 + 2.0 * i as f64).collect();
        let fit = estimator().fit_trend(&build(&values), Some(XyzCode::Y), None).unwrap();
        assert!(fit.annual_rate > 0.15 && fit.annual_rate < 0.3, "annual={}", fit.annual_rate);
        assert!(!fit.deseasonalized);
    }

    #[test]
    fn test_fit_requires_six_months() {
        assert!(estimator().fit_trend(&build(&[10.0; 5]), None, None).is_none());
        assert!(estimator().fit_trend(&build(&[10.0; 6]), None, None).is_some());
    }

    #[test]
    fn test_monthly_compounding() {
        let monthly = GrowthRateEstimator::monthly_from_annual(0.12);
        assert!(((1.0 + monthly).powi(12) - 1.12).abs() < 1e-9);
    }
}
