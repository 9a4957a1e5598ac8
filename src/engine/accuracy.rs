// ==========================================
// 仓库补货预测系统 - 预测准确率跟踪
// ==========================================
// 职责: 期间结束后，将预测值与修正后的实际需求对比，生成准确率记录并汇总 MAPE
// 红线:
// - 缺货 且 实际 < 预测 → 排除出 MAPE
// - 每个 (SKU, 仓库, 期间) 只生成一条记录
// ==========================================

use crate::domain::accuracy::{percentage_error, ForecastAccuracyRecord};
use crate::domain::forecast::ForecastDetail;
use crate::domain::sales::MonthlySalesRecord;
use crate::domain::types::YearMonth;
use crate::engine::stats;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::instrument;

/// 单方法汇总
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MethodAccuracy {
    pub records: usize,
    pub included: usize,
    pub mape: Option<f64>,
}

/// 准确率汇总
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AccuracySummary {
    pub records: usize,
    pub included: usize,
    pub excluded: usize,
    pub mape: Option<f64>,
    pub by_method: BTreeMap<String, MethodAccuracy>,
}

// ==========================================
// AccuracyTracker - 准确率跟踪
// ==========================================
#[derive(Default)]
pub struct AccuracyTracker;

impl AccuracyTracker {
    pub fn new() -> Self {
        Self
    }

    /// 生成某期间的实际值记录
    ///
    /// # 参数
    /// - details: 覆盖该期间的预测明细（同一 SKU/仓库 只取第一条）
    /// - sales: 该期间的销售记录；缺失视为实际 0
    #[instrument(skip(self, details, sales), fields(period = %period, details = details.len()))]
    pub fn build_actuals(
        &self,
        period: YearMonth,
        details: &[ForecastDetail],
        sales: &[MonthlySalesRecord],
        recorded_at: DateTime<Utc>,
    ) -> Vec<ForecastAccuracyRecord> {
        let sales_index: HashMap<(&str, &str), &MonthlySalesRecord> = sales
            .iter()
            .filter(|r| r.year_month == period)
            .map(|r| ((r.sku_id.as_str(), r.warehouse.as_str()), r))
            .collect();

        let mut seen: HashSet<(&str, &str)> = HashSet::new();
        let mut records = Vec::new();
        for detail in details {
            let key = (detail.sku_id.as_str(), detail.warehouse.as_str());
            if !seen.insert(key) {
                continue;
            }
            let predicted = match detail.qty_for(period) {
                Some(q) => q,
                None => continue,
            };
            let sale = sales_index.get(&key);
            let actual = sale.map(|s| s.corrected_demand).unwrap_or(0.0);

            let mut record = ForecastAccuracyRecord::predicted_only(
                &detail.sku_id,
                &detail.warehouse,
                period,
                &detail.run_id,
                detail.method_used,
                predicted,
            );
            record.actual_demand = Some(actual);
            record.absolute_error = Some((actual - predicted).abs());
            record.percentage_error = percentage_error(predicted, actual);
            record.stockout_affected = sale.map_or(false, |s| s.stockout_days > 0);
            record.is_actual_recorded = true;
            record.recorded_at = Some(recorded_at);
            records.push(record);
        }
        records
    }

    /// 汇总 MAPE（按排除规则）
    pub fn summarize(&self, records: &[ForecastAccuracyRecord]) -> AccuracySummary {
        let recorded: Vec<&ForecastAccuracyRecord> =
            records.iter().filter(|r| r.is_actual_recorded).collect();
        let included: Vec<f64> = recorded
            .iter()
            .filter(|r| !r.is_excluded_from_mape())
            .filter_map(|r| r.percentage_error)
            .collect();

        let mut by_method: BTreeMap<String, MethodAccuracy> = BTreeMap::new();
        let mut method_errors: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for r in &recorded {
            let key = r.method_used.as_str().to_string();
            by_method.entry(key.clone()).or_default().records += 1;
            if !r.is_excluded_from_mape() {
                if let Some(pct) = r.percentage_error {
                    method_errors.entry(key).or_default().push(pct);
                }
            }
        }
        for (method, errors) in method_errors {
            if let Some(entry) = by_method.get_mut(&method) {
                entry.included = errors.len();
                entry.mape = Some(stats::mean(&errors));
            }
        }

        AccuracySummary {
            records: recorded.len(),
            included: included.len(),
            excluded: recorded.len() - included.len(),
            mape: if included.is_empty() {
                None
            } else {
                Some(stats::mean(&included))
            },
            by_method,
        }
    }
}
