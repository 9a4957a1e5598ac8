// ==========================================
// 仓库补货预测系统 - 统计工具函数
// ==========================================
// 约定: 空输入返回 0 或 None，不返回 NaN（下游直接参与乘法）
// ==========================================

/// 算术平均（空切片返回 0）
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// 样本方差（n-1 分母；少于 2 个点返回 0）
pub fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let sum_sq: f64 = values.iter().map(|x| (x - m).powi(2)).sum();
    sum_sq / (values.len() - 1) as f64
}

pub fn std_dev(values: &[f64]) -> f64 {
    variance(values).sqrt()
}

/// 变异系数 = 标准差 / 均值（均值 ≤ 0 返回 0）
pub fn coefficient_of_variation(values: &[f64]) -> f64 {
    let m = mean(values);
    if m <= 0.0 {
        return 0.0;
    }
    std_dev(values) / m
}

/// 中位数（对单个极端值稳健）
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = sorted.len();
    if n % 2 == 0 {
        Some((sorted[n / 2 - 1] + sorted[n / 2]) / 2.0)
    } else {
        Some(sorted[n / 2])
    }
}

/// 加权平均（权重和 ≤ 0 返回 None）
pub fn weighted_mean(values: &[f64], weights: &[f64]) -> Option<f64> {
    let total_weight: f64 = weights.iter().take(values.len()).sum();
    if total_weight <= 0.0 || values.is_empty() {
        return None;
    }
    let sum: f64 = values.iter().zip(weights).map(|(v, w)| v * w).sum();
    Some(sum / total_weight)
}

/// 加权最小二乘斜率
///
/// # 返回
/// - Some((slope, weighted_mean_y))
/// - None: 点数 < 2 或自变量无离散度
pub fn weighted_linear_slope(xs: &[f64], ys: &[f64], weights: &[f64]) -> Option<(f64, f64)> {
    let n = xs.len().min(ys.len()).min(weights.len());
    if n < 2 {
        return None;
    }
    let x_bar = weighted_mean(&xs[..n], &weights[..n])?;
    let y_bar = weighted_mean(&ys[..n], &weights[..n])?;

    let mut num = 0.0;
    let mut den = 0.0;
    for i in 0..n {
        let dx = xs[i] - x_bar;
        num += weights[i] * dx * (ys[i] - y_bar);
        den += weights[i] * dx * dx;
    }
    if den <= f64::EPSILON {
        return None;
    }
    Some((num / den, y_bar))
}

/// 保留 |z| ≤ threshold 的点的下标（标准差为 0 时全部保留）
pub fn indices_within_z(values: &[f64], threshold: f64) -> Vec<usize> {
    let m = mean(values);
    let s = std_dev(values);
    if s <= f64::EPSILON {
        return (0..values.len()).collect();
    }
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| ((*v - m) / s).abs() <= threshold)
        .map(|(i, _)| i)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_stats() {
        assert_eq!(mean(&[]), 0.0);
        assert!((mean(&[1.0, 2.0, 3.0]) - 2.0).abs() < 1e-12);
        assert!((std_dev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]) - 2.138).abs() < 1e-3);
        assert_eq!(coefficient_of_variation(&[0.0, 0.0]), 0.0);
        assert_eq!(median(&[5.0, 1.0, 3.0]), Some(3.0));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn test_weighted_slope() {
        // y = 10 + 2x，任意权重下斜率都为 2
        let xs = [0.0, 1.0, 2.0, 3.0];
        let ys = [10.0, 12.0, 14.0, 16.0];
        let (slope, _) = weighted_linear_slope(&xs, &ys, &[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert!((slope - 2.0).abs() < 1e-9);

        assert!(weighted_linear_slope(&[1.0], &[1.0], &[1.0]).is_none());
        assert!(weighted_linear_slope(&[1.0, 1.0], &[1.0, 2.0], &[1.0, 1.0]).is_none());
    }

    #[test]
    fn test_z_filter() {
        let mut values = vec![10.0; 20];
        values.push(500.0);
        let kept = indices_within_z(&values, 2.5);
        assert_eq!(kept.len(), 20, "极端值应被剔除");
        assert_eq!(indices_within_z(&[3.0, 3.0], 2.5), vec![0, 1]);
    }
}
