// ==========================================
// 仓库补货预测系统 - 准确率回填服务
// ==========================================
// 职责: 期间结束后回填实际需求，汇总 MAPE
// 红线:
// - 只接受已完整结束的月份（月末 < 今天）
// - 实际值只写一次，重复回填不覆盖
// ==========================================

use crate::domain::types::YearMonth;
use crate::engine::accuracy::{AccuracySummary, AccuracyTracker};
use crate::perf::PerfGuard;
use crate::repository::{AccuracyRepository, ForecastDetailRepository, SalesRepository};
use crate::services::error::{ServiceError, ServiceResult};
use crate::FORECAST_HORIZON_MONTHS;
use chrono::{NaiveDate, Utc};
use rusqlite::Connection;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tracing::{info, instrument};

/// 回填结果
#[derive(Debug, Clone, Serialize)]
pub struct AccuracyUpdateReport {
    pub period: YearMonth,
    pub written: usize,
    pub summary: AccuracySummary,
}

pub struct AccuracyService {
    tracker: AccuracyTracker,
    detail_repo: ForecastDetailRepository,
    sales_repo: SalesRepository,
    accuracy_repo: AccuracyRepository,
}

impl AccuracyService {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self {
            tracker: AccuracyTracker::new(),
            detail_repo: ForecastDetailRepository::from_connection(conn.clone()),
            sales_repo: SalesRepository::from_connection(conn.clone()),
            accuracy_repo: AccuracyRepository::from_connection(conn),
        }
    }

    /// 回填某期间的实际需求
    ///
    /// # 参数
    /// - period: 目标月份
    /// - today: 当前日期（期间月末必须早于该日期）
    #[instrument(skip(self), fields(period = %period))]
    pub fn update_period(
        &self,
        period: YearMonth,
        today: NaiveDate,
    ) -> ServiceResult<AccuracyUpdateReport> {
        if period.last_day() >= today {
            return Err(ServiceError::InvalidTargetPeriod {
                period: period.to_string(),
                reason: format!("期间尚未结束（月末 {}，今天 {}）", period.last_day(), today),
            });
        }
        let _perf = PerfGuard::new("accuracy_update");

        let details = self
            .detail_repo
            .list_latest_completed_covering(period, FORECAST_HORIZON_MONTHS)?;
        let sales = self.sales_repo.list_for_period(period)?;
        let records = self
            .tracker
            .build_actuals(period, &details, &sales, Utc::now());
        let written = self.accuracy_repo.batch_record_actuals(&records)?;

        let summary = self
            .tracker
            .summarize(&self.accuracy_repo.list_for_period(period)?);
        info!(
            written,
            skipped = records.len() - written,
            mape = ?summary.mape,
            "准确率回填完成"
        );
        Ok(AccuracyUpdateReport {
            period,
            written,
            summary,
        })
    }

    /// 汇总已记录实际值的准确率
    pub fn summary(&self, since: Option<YearMonth>) -> ServiceResult<AccuracySummary> {
        let records = self.accuracy_repo.list_recorded(since)?;
        Ok(self.tracker.summarize(&records))
    }
}
