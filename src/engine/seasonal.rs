// ==========================================
// 仓库补货预测系统 - 季节模式识别引擎
// ==========================================
// 职责: 由 ≥24 个月修正需求计算 12 个月季节因子、强度、置信度、显著性
// 输入: DemandStats
// 输出: SeasonalProfile
// 红线: 历史不足 24 个月 → 中性画像（因子全 1.0，置信度 0）
// ==========================================

use crate::domain::seasonal::SeasonalProfile;
use crate::domain::types::SeasonalPatternType;
use crate::engine::demand_stats::DemandStats;
use crate::engine::stats;
use chrono::Utc;
use tracing::instrument;

pub const MIN_MONTHS_FOR_SEASONALITY: usize = 24;
const OUTLIER_Z_THRESHOLD: f64 = 2.5;
const SIGNIFICANCE_F_THRESHOLD: f64 = 2.0;
const PATTERN_STRENGTH_FLOOR: f64 = 0.15;
const PEAK_FACTOR_THRESHOLD: f64 = 1.2;

// ==========================================
// SeasonalPatternDetector - 季节模式识别
// ==========================================
pub struct SeasonalPatternDetector {
    min_months: usize,
    outlier_z: f64,
}

impl Default for SeasonalPatternDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl SeasonalPatternDetector {
    pub fn new() -> Self {
        Self {
            min_months: MIN_MONTHS_FOR_SEASONALITY,
            outlier_z: OUTLIER_Z_THRESHOLD,
        }
    }

    /// 批量识别
    #[instrument(skip(self, all_stats), fields(count = all_stats.len()))]
    pub fn detect_batch(&self, all_stats: &[&DemandStats]) -> Vec<SeasonalProfile> {
        all_stats.iter().map(|s| self.detect(s)).collect()
    }

    /// 识别单个 SKU/仓库 的季节画像
    pub fn detect(&self, demand: &DemandStats) -> SeasonalProfile {
        let mut profile = SeasonalProfile::neutral(&demand.sku_id, &demand.warehouse);
        profile.months_analyzed = demand.series.len() as u32;
        if demand.series.len() < self.min_months {
            return profile;
        }

        // 1. 剔除 |z| > 2.5 的离群点
        let values = demand.corrected_series();
        let kept = stats::indices_within_z(&values, self.outlier_z);
        let mut buckets: Vec<Vec<f64>> = vec![Vec::new(); 12];
        for &i in &kept {
            let point = &demand.series[i];
            buckets[point.year_month.month_index()].push(point.corrected_demand);
        }
        let kept_values: Vec<f64> = kept.iter().map(|&i| values[i]).collect();
        let overall_mean = stats::mean(&kept_values);
        profile.months_analyzed = kept_values.len() as u32;
        if overall_mean <= 0.0 {
            return profile;
        }

        // 2. 月度因子（无数据月份 1.0），归一化到均值 1.0
        let mut factors: Vec<f64> = buckets
            .iter()
            .map(|b| if b.is_empty() { 1.0 } else { stats::mean(b) / overall_mean })
            .collect();
        let factor_mean = stats::mean(&factors);
        if factor_mean > 0.0 {
            for f in factors.iter_mut() {
                *f /= factor_mean;
            }
        }

        // 3. 强度
        let max = factors.iter().cloned().fold(f64::MIN, f64::max);
        let min = factors.iter().cloned().fold(f64::MAX, f64::min);
        let strength = ((max - min) / 2.0).clamp(0.0, 1.0);

        // 4. 显著性（月间方差 / 月内方差）
        let years = kept_values.len() as f64 / 12.0;
        let f_ratio = Self::between_within_ratio(&buckets);
        let is_significant = f_ratio >= SIGNIFICANCE_F_THRESHOLD && years >= 2.0;

        // 5. 置信度
        let mut confidence = (years / 3.0).min(1.0) * (0.5 + 0.5 * strength);
        if !is_significant {
            confidence *= 0.5;
        }

        // 6. 峰值与模式
        let peak_months: Vec<u32> = factors
            .iter()
            .enumerate()
            .filter(|(_, f)| **f >= PEAK_FACTOR_THRESHOLD)
            .map(|(i, _)| i as u32 + 1)
            .collect();
        let pattern_type = if strength < PATTERN_STRENGTH_FLOOR {
            SeasonalPatternType::None
        } else {
            Self::classify_peaks(&peak_months)
        };

        profile.factors = factors;
        profile.pattern_strength = strength;
        profile.is_significant = is_significant;
        profile.overall_confidence = confidence.clamp(0.0, 1.0);
        profile.peak_months = peak_months;
        profile.pattern_type = pattern_type;
        profile.computed_at = Utc::now();
        profile
    }

    /// 单因素方差比: 月均值的方差 / (月内方差 / 每月平均样本数)
    fn between_within_ratio(buckets: &[Vec<f64>]) -> f64 {
        let filled: Vec<&Vec<f64>> = buckets.iter().filter(|b| !b.is_empty()).collect();
        if filled.len() < 2 {
            return 0.0;
        }
        let month_means: Vec<f64> = filled.iter().map(|b| stats::mean(b)).collect();
        let between = stats::variance(&month_means);

        let within_parts: Vec<f64> = filled
            .iter()
            .filter(|b| b.len() >= 2)
            .map(|b| stats::variance(b))
            .collect();
        let within = stats::mean(&within_parts);
        let avg_obs = filled.iter().map(|b| b.len()).sum::<usize>() as f64 / filled.len() as f64;

        if within <= f64::EPSILON {
            return if between > f64::EPSILON { f64::INFINITY } else { 0.0 };
        }
        between / (within / avg_obs.max(1.0))
    }

    /// 峰值月份 → 模式标签
    fn classify_peaks(peaks: &[u32]) -> SeasonalPatternType {
        if peaks.is_empty() {
            return SeasonalPatternType::Other;
        }
        let season_of = |m: u32| match m {
            3..=5 => 0,
            6..=8 => 1,
            9..=11 => 2,
            _ => 3,
        };
        let mut seasons: Vec<u8> = peaks.iter().map(|&m| season_of(m)).collect();
        seasons.sort_unstable();
        seasons.dedup();
        if seasons.len() >= 2 {
            return SeasonalPatternType::MultiPeak;
        }
        match seasons[0] {
            0 => SeasonalPatternType::SpringPeak,
            1 => SeasonalPatternType::SummerPeak,
            2 => SeasonalPatternType::FallPeak,
            _ => SeasonalPatternType::WinterPeak,
        }
    }
}
