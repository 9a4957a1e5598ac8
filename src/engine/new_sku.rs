// ==========================================
// 仓库补货预测系统 - 新品 "Test & Learn" 模式识别
// ==========================================
// 职责: 历史 < 12 个月的新品，识别上市尖峰 / 早期缺货，并由干净月推导需求基线
// 红线:
// - 缺货证明需求被压制 → 基线只升不降（×1.2）
// - 基线直接作为 base_demand，禁止与分类统计或相似 SKU 混合
// ==========================================

use crate::domain::sales::CLEAN_AVAILABILITY_THRESHOLD;
use crate::engine::demand_stats::DemandStats;
use crate::engine::stats;
use serde::Serialize;

pub const NEW_SKU_HISTORY_MONTHS: usize = 12;
pub const TEST_LAUNCH_SAFETY_MULTIPLIER: f64 = 1.1;
pub const TEST_LAUNCH_CONFIDENCE: f64 = 0.55;
const LAUNCH_SPIKE_RATIO: f64 = 1.3;
const EARLY_STOCKOUT_BOOST: f64 = 1.2;
const SPIKE_DISCOUNT: f64 = 1.5;
const NO_SPIKE_DISCOUNT: f64 = 1.2;

/// 识别结果（所有元数据随结果显式传递）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LaunchPattern {
    pub detected: bool,
    pub launch_spike: bool,
    pub early_stockout: bool,
    pub clean_months: usize,
    pub baseline: f64,
    pub stockout_boost_applied: bool,
}

impl LaunchPattern {
    fn not_detected(clean_months: usize) -> Self {
        Self {
            detected: false,
            launch_spike: false,
            early_stockout: false,
            clean_months,
            baseline: 0.0,
            stockout_boost_applied: false,
        }
    }
}

// ==========================================
// TestLaunchPatternDetector - 新品模式识别
// ==========================================
#[derive(Default)]
pub struct TestLaunchPatternDetector;

impl TestLaunchPatternDetector {
    pub fn new() -> Self {
        Self
    }

    /// 由需求统计识别
    pub fn detect_from_stats(&self, demand: &DemandStats) -> LaunchPattern {
        let points: Vec<(f64, f64)> = demand
            .series
            .iter()
            .map(|p| (p.corrected_demand, p.availability))
            .collect();
        self.detect(&points)
    }

    /// 识别上市模式
    ///
    /// # 参数
    /// - points: 时间升序的 (需求, 可用率)
    pub fn detect(&self, points: &[(f64, f64)]) -> LaunchPattern {
        // 1. 干净月: 可用率 ≥ 0.3 且需求 > 0
        let clean: Vec<f64> = points
            .iter()
            .filter(|(demand, avail)| *avail >= CLEAN_AVAILABILITY_THRESHOLD && *demand > 0.0)
            .map(|(demand, _)| *demand)
            .collect();

        // 2. 上市尖峰: 最大干净月 > 1.3 × 其余干净月均值
        let launch_spike = Self::has_launch_spike(&clean);

        // 3. 早期缺货: 前 max(3, n/2) 个日历月中存在可用率 < 0.3
        let early_window = (points.len() / 2).max(3).min(points.len());
        let early_stockout = points[..early_window]
            .iter()
            .any(|(_, avail)| *avail < CLEAN_AVAILABILITY_THRESHOLD);

        // 4. 都未识别 → 交回分类路径
        if !(launch_spike || early_stockout) || clean.is_empty() {
            return LaunchPattern::not_detected(clean.len());
        }

        // 5. 基线
        let mut baseline = Self::baseline(&clean, launch_spike);
        if early_stockout {
            baseline *= EARLY_STOCKOUT_BOOST;
        }

        LaunchPattern {
            detected: true,
            launch_spike,
            early_stockout,
            clean_months: clean.len(),
            baseline,
            stockout_boost_applied: early_stockout,
        }
    }

    fn has_launch_spike(clean: &[f64]) -> bool {
        if clean.len() < 2 {
            return false;
        }
        let (max_idx, max) = clean
            .iter()
            .enumerate()
            .fold((0, f64::MIN), |acc, (i, v)| if *v > acc.1 { (i, *v) } else { acc });
        let others: Vec<f64> = clean
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != max_idx)
            .map(|(_, v)| *v)
            .collect();
        max > LAUNCH_SPIKE_RATIO * stats::mean(&others)
    }

    /// 干净月基线（未含缺货加成）
    ///
    /// - ≤3 个干净月: 最大值 ÷ (尖峰 1.5 / 否则 1.2)
    /// - ≥6 个干净月: 0.7 × 最近 3 个均值 + 0.3 × 更早均值
    /// - 其他: 全部均值
    fn baseline(clean: &[f64], launch_spike: bool) -> f64 {
        let n = clean.len();
        if n <= 3 {
            let max = clean.iter().cloned().fold(0.0, f64::max);
            let discount = if launch_spike { SPIKE_DISCOUNT } else { NO_SPIKE_DISCOUNT };
            max / discount
        } else if n >= 6 {
            let recent = stats::mean(&clean[n - 3..]);
            let earlier = stats::mean(&clean[..n - 3]);
            0.7 * recent + 0.3 * earlier
        } else {
            stats::mean(clean)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clean(values: &[f64]) -> Vec<(f64, f64)> {
        values.iter().map(|v| (*v, 1.0)).collect()
    }

    #[test]
    fn test_scenario_end_to_end_baseline() {
        // 场景: 9 个月，早期一个月可用率 < 30%，干净需求 [24,133,100,38,14,31]
        let points = vec![
            (0.0, 1.0),
            (15.0, 0.1), // 早期缺货月
            (24.0, 1.0),
            (133.0, 1.0),
            (100.0, 1.0),
            (0.0, 1.0),
            (38.0, 1.0),
            (14.0, 1.0),
            (31.0, 1.0),
        ];
        let result = TestLaunchPatternDetector::new().detect(&points);

        assert!(result.detected);
        assert!(result.early_stockout);
        assert!(result.stockout_boost_applied);
        assert_eq!(result.clean_months, 6);
        // 0.7 × 27.67 + 0.3 × 85.67 = 45.07，×1.2 = 54.08
        assert!((result.baseline - 54.08).abs() < 0.01, "baseline={}", result.baseline);
        let adjusted = result.baseline * TEST_LAUNCH_SAFETY_MULTIPLIER;
        assert!(adjusted > 59.0 && adjusted < 60.0, "最终需求不应被稀释");
    }

    #[test]
    fn test_stockout_boost_monotonic() {
        // 同一组干净月，有早期缺货的基线不得低于无缺货
        let base = [50.0, 120.0, 60.0, 55.0];
        let mut with_stockout = vec![(5.0, 0.1)];
        with_stockout.extend(clean(&base));
        let mut without = vec![(0.0, 1.0)];
        without.extend(clean(&base));

        let detector = TestLaunchPatternDetector::new();
        let a = detector.detect(&with_stockout);
        let b = detector.detect(&without);
        assert!(a.detected && b.detected, "两者都有上市尖峰");
        assert!(a.baseline >= b.baseline);
        assert!((a.baseline - b.baseline * 1.2).abs() < 1e-9);
    }

    #[test]
    fn test_few_clean_months_discount_spike() {
        // 3 个干净月，尖峰 → 最大值 / 1.5
        let result = TestLaunchPatternDetector::new().detect(&clean(&[30.0, 150.0, 40.0]));
        assert!(result.launch_spike);
        assert!(!result.early_stockout);
        assert!((result.baseline - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_pattern_returns_not_detected() {
        let result = TestLaunchPatternDetector::new().detect(&clean(&[50.0, 52.0, 48.0, 51.0]));
        assert!(!result.detected);
        assert_eq!(result.baseline, 0.0);
    }

    #[test]
    fn test_empty_series() {
        let result = TestLaunchPatternDetector::new().detect(&[]);
        assert!(!result.detected);
        assert_eq!(result.clean_months, 0);
    }
}
