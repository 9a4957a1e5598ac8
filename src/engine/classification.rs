// ==========================================
// 仓库补货预测系统 - ABC×XYZ 九宫格策略表
// ==========================================
// 职责: (价值层, 波动层) → 基础需求统计方法 + 起始置信度
// 红线: 九宫格策略只在此处定义；非法/缺失分类按 C-Z 处理
// ==========================================

use crate::domain::types::{AbcCode, CalculationMethod, Classification, XyzCode};
use crate::engine::stats;
use serde::Serialize;

/// 单个格子的策略
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CellPolicy {
    pub classification: Classification,
    pub method: CalculationMethod,
    pub start_confidence: f64,
    pub fallback_used: bool, // 原始分类缺失或非法
}

impl CellPolicy {
    /// 查表
    pub fn lookup(classification: Option<Classification>) -> Self {
        let fallback_used = classification.is_none();
        let cell = classification.unwrap_or_else(Classification::most_conservative);
        let (method, start_confidence) = match (cell.abc, cell.xyz) {
            (AbcCode::A, XyzCode::X) => (CalculationMethod::Weighted6m, 0.90),
            (AbcCode::A, XyzCode::Y) => (CalculationMethod::Weighted6m, 0.80),
            (AbcCode::A, XyzCode::Z) => (CalculationMethod::Simple3m, 0.65),
            (AbcCode::B, XyzCode::X) => (CalculationMethod::Weighted6m, 0.80),
            (AbcCode::B, XyzCode::Y) => (CalculationMethod::Simple6m, 0.70),
            (AbcCode::B, XyzCode::Z) => (CalculationMethod::Simple3m, 0.55),
            (AbcCode::C, XyzCode::X) => (CalculationMethod::Simple6m, 0.65),
            (AbcCode::C, XyzCode::Y) => (CalculationMethod::Simple3m, 0.50),
            (AbcCode::C, XyzCode::Z) => (CalculationMethod::LastMonth, 0.40),
        };
        Self {
            classification: cell,
            method,
            start_confidence,
            fallback_used,
        }
    }

    /// 按本格方法计算基础需求
    ///
    /// # 参数
    /// - series: 时间升序的修正需求
    ///
    /// # 返回
    /// - None: 序列为空
    pub fn base_demand(&self, series: &[f64]) -> Option<f64> {
        if series.is_empty() {
            return None;
        }
        let window = self.method.window_months().unwrap_or(1);
        let start = series.len().saturating_sub(window);
        let recent = &series[start..];

        let value = match self.method {
            // 权重 1..k，最新月最大
            CalculationMethod::Weighted6m => {
                let weights: Vec<f64> = (1..=recent.len()).map(|w| w as f64).collect();
                stats::weighted_mean(recent, &weights)?
            }
            CalculationMethod::LastMonth => *recent.last()?,
            _ => stats::mean(recent),
        };
        Some(value.max(0.0))
    }

    /// 新品未识别出模式时的安全系数（A 类 1.5，其余 1.3）
    pub fn limited_data_multiplier(&self) -> f64 {
        if self.classification.abc == AbcCode::A {
            1.5
        } else {
            1.3
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(abc: AbcCode, xyz: XyzCode) -> CellPolicy {
        CellPolicy::lookup(Some(Classification::new(abc, xyz)))
    }

    #[test]
    fn test_table_corners() {
        let ax = policy(AbcCode::A, XyzCode::X);
        assert_eq!(ax.method, CalculationMethod::Weighted6m);
        assert_eq!(ax.start_confidence, 0.90);

        let cz = policy(AbcCode::C, XyzCode::Z);
        assert_eq!(cz.method, CalculationMethod::LastMonth);
        assert_eq!(cz.start_confidence, 0.40);
    }

    #[test]
    fn test_missing_classification_most_conservative() {
        let p = CellPolicy::lookup(None);
        assert!(p.fallback_used);
        assert_eq!(p.method, CalculationMethod::LastMonth);
        assert_eq!(p.start_confidence, 0.40);
    }

    #[test]
    fn test_window_statistics() {
        let series = [10.0, 10.0, 10.0, 10.0, 20.0, 30.0, 40.0, 50.0];

        // 加权 6 个月: (10×1 + 10×2 + 20×3 + 30×4 + 40×5 + 50×6) / 21
        let weighted = policy(AbcCode::A, XyzCode::X).base_demand(&series).unwrap();
        assert!((weighted - 710.0 / 21.0).abs() < 1e-9);

        let simple3 = policy(AbcCode::A, XyzCode::Z).base_demand(&series).unwrap();
        assert!((simple3 - 40.0).abs() < 1e-9);

        let last = policy(AbcCode::C, XyzCode::Z).base_demand(&series).unwrap();
        assert_eq!(last, 50.0);

        assert_eq!(policy(AbcCode::B, XyzCode::Y).base_demand(&[]), None);
    }

    #[test]
    fn test_limited_data_multiplier() {
        assert_eq!(policy(AbcCode::A, XyzCode::Z).limited_data_multiplier(), 1.5);
        assert_eq!(policy(AbcCode::B, XyzCode::X).limited_data_multiplier(), 1.3);
    }
}
