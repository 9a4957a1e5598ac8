// ==========================================
// 仓库补货预测系统 - 预测批次 / 预测明细 仓储
// ==========================================
// 红线:
// - Repository 不含业务逻辑
// - 预测明细只插入不修改（新批次覆盖旧批次）
// ==========================================

use crate::domain::forecast::{ForecastDetail, ForecastRun};
use crate::domain::types::{
    CalculationMethod, ForecastRunStatus, GrowthRateSource, SeasonalPatternType, YearMonth,
};
use crate::repository::common::{parse_datetime, parse_opt_datetime, parse_year_month};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex};

const RUN_COLUMNS: &str = r#"
    run_id, created_at, requested_by, warehouses_json, status, growth_override,
    forecast_start, total_count, processed_count, failed_count,
    started_at, completed_at, error_message
"#;

fn map_run(row: &Row<'_>) -> SqliteResult<ForecastRun> {
    let warehouses_json: Option<String> = row.get(3)?;
    let forecast_start: Option<String> = row.get(6)?;
    Ok(ForecastRun {
        run_id: row.get(0)?,
        created_at: parse_datetime(&row.get::<_, String>(1)?),
        requested_by: row.get(2)?,
        warehouses: warehouses_json.and_then(|s| serde_json::from_str(&s).ok()),
        status: ForecastRunStatus::from_str(&row.get::<_, String>(4)?),
        growth_override: row.get(5)?,
        forecast_start: forecast_start
            .map(|s| parse_year_month(6, &s))
            .transpose()?,
        total_count: row.get(7)?,
        processed_count: row.get(8)?,
        failed_count: row.get(9)?,
        started_at: parse_opt_datetime(row.get(10)?),
        completed_at: parse_opt_datetime(row.get(11)?),
        error_message: row.get(12)?,
    })
}

// ==========================================
// ForecastRunRepository - 预测批次仓储
// ==========================================
pub struct ForecastRunRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ForecastRunRepository {
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 创建批次记录
    pub fn insert(&self, run: &ForecastRun) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let warehouses_json = run
            .warehouses
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        conn.execute(
            r#"
            INSERT INTO forecast_run (
                run_id, created_at, requested_by, warehouses_json, status, growth_override,
                forecast_start, total_count, processed_count, failed_count,
                started_at, completed_at, error_message
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
            params![
                run.run_id,
                run.created_at.to_rfc3339(),
                run.requested_by,
                warehouses_json,
                run.status.as_str(),
                run.growth_override,
                run.forecast_start.map(|m| m.to_string()),
                run.total_count,
                run.processed_count,
                run.failed_count,
                run.started_at.map(|t| t.to_rfc3339()),
                run.completed_at.map(|t| t.to_rfc3339()),
                run.error_message,
            ],
        )?;
        Ok(())
    }

    /// 按 run_id 查询
    pub fn find_by_id(&self, run_id: &str) -> RepositoryResult<Option<ForecastRun>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM forecast_run WHERE run_id = ?1", RUN_COLUMNS);
        Ok(conn.query_row(&sql, params![run_id], map_run).optional()?)
    }

    /// 按状态查询（按创建时间升序，即 FIFO 顺序）
    pub fn list_by_status(&self, status: ForecastRunStatus) -> RepositoryResult<Vec<ForecastRun>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM forecast_run WHERE status = ?1 ORDER BY created_at ASC, rowid ASC",
            RUN_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let runs = stmt
            .query_map(params![status.as_str()], map_run)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(runs)
    }

    /// 最近一次完成的批次
    pub fn latest_completed(&self) -> RepositoryResult<Option<ForecastRun>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM forecast_run WHERE status = 'completed' ORDER BY completed_at DESC, created_at DESC LIMIT 1",
            RUN_COLUMNS
        );
        Ok(conn.query_row(&sql, [], map_run).optional()?)
    }

    /// 状态迁移（仅更新状态）
    pub fn update_status(&self, run_id: &str, status: ForecastRunStatus) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            "UPDATE forecast_run SET status = ?1 WHERE run_id = ?2",
            params![status.as_str(), run_id],
        )?;
        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "ForecastRun".to_string(),
                id: run_id.to_string(),
            });
        }
        Ok(())
    }

    /// 标记开始执行
    pub fn mark_started(
        &self,
        run_id: &str,
        forecast_start: Option<YearMonth>,
        total_count: i64,
        started_at: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            UPDATE forecast_run
            SET status = 'running', forecast_start = ?1, total_count = ?2,
                processed_count = 0, failed_count = 0, started_at = ?3
            WHERE run_id = ?4
            "#,
            params![
                forecast_start.map(|m| m.to_string()),
                total_count,
                started_at.to_rfc3339(),
                run_id
            ],
        )?;
        Ok(())
    }

    /// 更新进度计数
    pub fn update_progress(
        &self,
        run_id: &str,
        processed_count: i64,
        failed_count: i64,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "UPDATE forecast_run SET processed_count = ?1, failed_count = ?2 WHERE run_id = ?3",
            params![processed_count, failed_count, run_id],
        )?;
        Ok(())
    }

    /// 标记终态（完成/失败/取消）
    pub fn mark_finished(
        &self,
        run_id: &str,
        status: ForecastRunStatus,
        error_message: Option<&str>,
        completed_at: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        if !status.is_terminal() {
            return Err(RepositoryError::ValidationError(format!(
                "非终态不能作为结束状态: {}",
                status
            )));
        }
        let conn = self.get_conn()?;
        conn.execute(
            "UPDATE forecast_run SET status = ?1, error_message = ?2, completed_at = ?3 WHERE run_id = ?4",
            params![status.as_str(), error_message, completed_at.to_rfc3339(), run_id],
        )?;
        Ok(())
    }

    /// 仅当仍处于排队状态时取消
    ///
    /// # 返回
    /// - Ok(true): 已取消
    /// - Ok(false): 批次不存在或已不在排队
    pub fn cancel_if_queued(&self, run_id: &str) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            "UPDATE forecast_run SET status = 'cancelled', completed_at = ?1 WHERE run_id = ?2 AND status = 'queued'",
            params![Utc::now().to_rfc3339(), run_id],
        )?;
        Ok(affected > 0)
    }

    /// 启动恢复：遗留的 running 批次标记为 failed
    pub fn fail_stale_running(&self, message: &str) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            "UPDATE forecast_run SET status = 'failed', error_message = ?1, completed_at = ?2 WHERE status = 'running'",
            params![message, Utc::now().to_rfc3339()],
        )?;
        Ok(affected)
    }
}

// ==========================================
// ForecastDetailRepository - 预测明细仓储
// ==========================================

const DETAIL_COLUMNS: &str = r#"
    d.run_id, d.sku_id, d.warehouse, d.start_month, d.monthly_qty_json, d.monthly_revenue_json,
    d.base_demand, d.safety_multiplier, d.method_used, d.growth_rate_applied,
    d.growth_rate_source, d.seasonal_pattern_applied, d.seasonal_applied,
    d.confidence_score, d.calc_reason, d.created_at
"#;

/// 数据库行（JSON 列尚未解析）
struct ForecastDetailRow {
    run_id: String,
    sku_id: String,
    warehouse: String,
    start_month: YearMonth,
    monthly_qty_json: String,
    monthly_revenue_json: String,
    base_demand: f64,
    safety_multiplier: f64,
    method_used: String,
    growth_rate_applied: f64,
    growth_rate_source: String,
    seasonal_pattern_applied: String,
    seasonal_applied: bool,
    confidence_score: f64,
    calc_reason: Option<String>,
    created_at: String,
}

fn map_detail_row(row: &Row<'_>) -> SqliteResult<ForecastDetailRow> {
    Ok(ForecastDetailRow {
        run_id: row.get(0)?,
        sku_id: row.get(1)?,
        warehouse: row.get(2)?,
        start_month: parse_year_month(3, &row.get::<_, String>(3)?)?,
        monthly_qty_json: row.get(4)?,
        monthly_revenue_json: row.get(5)?,
        base_demand: row.get(6)?,
        safety_multiplier: row.get(7)?,
        method_used: row.get(8)?,
        growth_rate_applied: row.get(9)?,
        growth_rate_source: row.get(10)?,
        seasonal_pattern_applied: row.get(11)?,
        seasonal_applied: row.get(12)?,
        confidence_score: row.get(13)?,
        calc_reason: row.get(14)?,
        created_at: row.get(15)?,
    })
}

impl ForecastDetailRow {
    fn into_detail(self) -> RepositoryResult<ForecastDetail> {
        Ok(ForecastDetail {
            run_id: self.run_id,
            sku_id: self.sku_id,
            warehouse: self.warehouse,
            start_month: self.start_month,
            monthly_qty: serde_json::from_str(&self.monthly_qty_json)?,
            monthly_revenue: serde_json::from_str(&self.monthly_revenue_json)?,
            base_demand: self.base_demand,
            safety_multiplier: self.safety_multiplier,
            method_used: CalculationMethod::from_str(&self.method_used),
            growth_rate_applied: self.growth_rate_applied,
            growth_rate_source: GrowthRateSource::from_str(&self.growth_rate_source),
            seasonal_pattern_applied: SeasonalPatternType::from_str(&self.seasonal_pattern_applied),
            seasonal_applied: self.seasonal_applied,
            confidence_score: self.confidence_score,
            calc_reason: self.calc_reason.unwrap_or_default(),
            created_at: parse_datetime(&self.created_at),
        })
    }
}

pub struct ForecastDetailRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ForecastDetailRepository {
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 批量插入预测明细（单事务）
    ///
    /// 合计/均值列由月度分量派生后写入，供报表直接读取。
    pub fn batch_insert(&self, details: &[ForecastDetail]) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;
        for d in details {
            tx.execute(
                r#"
                INSERT INTO forecast_detail (
                    run_id, sku_id, warehouse, start_month, monthly_qty_json, monthly_revenue_json,
                    total_qty_forecast, total_revenue_forecast, avg_monthly_qty,
                    base_demand, safety_multiplier, method_used, growth_rate_applied,
                    growth_rate_source, seasonal_pattern_applied, seasonal_applied,
                    confidence_score, calc_reason, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)
                "#,
                params![
                    d.run_id,
                    d.sku_id,
                    d.warehouse,
                    d.start_month.to_string(),
                    serde_json::to_string(&d.monthly_qty)?,
                    serde_json::to_string(&d.monthly_revenue)?,
                    d.total_qty(),
                    d.total_revenue(),
                    d.avg_monthly_qty(),
                    d.base_demand,
                    d.safety_multiplier,
                    d.method_used.as_str(),
                    d.growth_rate_applied,
                    d.growth_rate_source.as_str(),
                    d.seasonal_pattern_applied.as_str(),
                    d.seasonal_applied,
                    d.confidence_score,
                    d.calc_reason,
                    d.created_at.to_rfc3339(),
                ],
            )?;
        }
        tx.commit()?;
        Ok(details.len())
    }

    /// 查询某批次的全部明细
    pub fn list_by_run(&self, run_id: &str) -> RepositoryResult<Vec<ForecastDetail>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM forecast_detail d WHERE d.run_id = ?1 ORDER BY d.sku_id, d.warehouse",
            DETAIL_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![run_id], map_detail_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        rows.into_iter().map(ForecastDetailRow::into_detail).collect()
    }

    /// 每个 (sku, 仓库) 最近一次已完成批次的明细
    pub fn list_latest_completed(&self) -> RepositoryResult<Vec<ForecastDetail>> {
        let conn = self.get_conn()?;
        let sql = format!(
            r#"
            SELECT {} FROM (
                SELECT d.*, ROW_NUMBER() OVER (
                    PARTITION BY d.sku_id, d.warehouse
                    ORDER BY r.completed_at DESC, r.created_at DESC
                ) AS rn
                FROM forecast_detail d
                JOIN forecast_run r ON r.run_id = d.run_id
                WHERE r.status = 'completed'
            ) d
            WHERE d.rn = 1
            ORDER BY d.sku_id, d.warehouse
            "#,
            DETAIL_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], map_detail_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        rows.into_iter().map(ForecastDetailRow::into_detail).collect()
    }

    /// 每个 (sku, 仓库) 覆盖指定月份的最近一次已完成批次明细
    pub fn list_latest_completed_covering(
        &self,
        period: YearMonth,
        horizon_months: usize,
    ) -> RepositoryResult<Vec<ForecastDetail>> {
        let earliest_start = period.add_months(-(horizon_months as i32 - 1));
        let conn = self.get_conn()?;
        let sql = format!(
            r#"
            SELECT {} FROM (
                SELECT d.*, ROW_NUMBER() OVER (
                    PARTITION BY d.sku_id, d.warehouse
                    ORDER BY r.completed_at DESC, r.created_at DESC
                ) AS rn
                FROM forecast_detail d
                JOIN forecast_run r ON r.run_id = d.run_id
                WHERE r.status = 'completed'
                  AND d.start_month <= ?1
                  AND d.start_month >= ?2
            ) d
            WHERE d.rn = 1
            ORDER BY d.sku_id, d.warehouse
            "#,
            DETAIL_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(
                params![period.to_string(), earliest_start.to_string()],
                map_detail_row,
            )?
            .collect::<SqliteResult<Vec<_>>>()?;
        rows.into_iter().map(ForecastDetailRow::into_detail).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_schema;
    use crate::domain::forecast::ForecastRequest;

    fn setup_test_db() -> Arc<Mutex<Connection>> {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        Arc::new(Mutex::new(conn))
    }

    fn ym(y: i32, m: u32) -> YearMonth {
        YearMonth::new(y, m).unwrap()
    }

    fn make_detail(run_id: &str, sku: &str, start: YearMonth, qty: f64) -> ForecastDetail {
        ForecastDetail {
            run_id: run_id.to_string(),
            sku_id: sku.to_string(),
            warehouse: "W1".to_string(),
            start_month: start,
            monthly_qty: vec![qty; 12],
            monthly_revenue: vec![qty * 2.0; 12],
            base_demand: qty,
            safety_multiplier: 1.0,
            method_used: CalculationMethod::Weighted6m,
            growth_rate_applied: 0.0,
            growth_rate_source: GrowthRateSource::SkuTrend,
            seasonal_pattern_applied: SeasonalPatternType::None,
            seasonal_applied: false,
            confidence_score: 0.8,
            calc_reason: "{}".to_string(),
            created_at: Utc::now(),
        }
    }

    fn completed_run(repo: &ForecastRunRepository, completed_at: &str) -> String {
        let run = ForecastRun::new(&ForecastRequest::default(), ForecastRunStatus::Running);
        repo.insert(&run).unwrap();
        let at = DateTime::parse_from_rfc3339(completed_at).unwrap().with_timezone(&Utc);
        repo.mark_finished(&run.run_id, ForecastRunStatus::Completed, None, at)
            .unwrap();
        run.run_id
    }

    #[test]
    fn test_run_lifecycle() {
        let conn = setup_test_db();
        let repo = ForecastRunRepository::from_connection(conn);

        let run = ForecastRun::new(&ForecastRequest::default(), ForecastRunStatus::Queued);
        repo.insert(&run).unwrap();
        assert_eq!(repo.list_by_status(ForecastRunStatus::Queued).unwrap().len(), 1);

        repo.mark_started(&run.run_id, Some(ym(2025, 7)), 10, Utc::now()).unwrap();
        repo.update_progress(&run.run_id, 7, 1).unwrap();
        let loaded = repo.find_by_id(&run.run_id).unwrap().unwrap();
        assert_eq!(loaded.status, ForecastRunStatus::Running);
        assert_eq!(loaded.forecast_start, Some(ym(2025, 7)));
        assert_eq!((loaded.processed_count, loaded.failed_count), (7, 1));

        assert!(!repo.cancel_if_queued(&run.run_id).unwrap(), "运行中的批次不可取消");

        assert_eq!(repo.fail_stale_running("进程中断").unwrap(), 1);
        let loaded = repo.find_by_id(&run.run_id).unwrap().unwrap();
        assert_eq!(loaded.status, ForecastRunStatus::Failed);
        assert_eq!(loaded.processed_count, 7, "失败批次保留已处理进度");
    }

    #[test]
    fn test_mark_finished_rejects_non_terminal() {
        let repo = ForecastRunRepository::from_connection(setup_test_db());
        let result = repo.mark_finished("X", ForecastRunStatus::Running, None, Utc::now());
        assert!(matches!(result, Err(RepositoryError::ValidationError(_))));
    }

    #[test]
    fn test_latest_completed_detail_per_sku() {
        let conn = setup_test_db();
        let runs = ForecastRunRepository::from_connection(conn.clone());
        let details = ForecastDetailRepository::from_connection(conn);

        let old_run = completed_run(&runs, "2025-06-01T00:00:00Z");
        let new_run = completed_run(&runs, "2025-07-01T00:00:00Z");

        details
            .batch_insert(&[
                make_detail(&old_run, "S1", ym(2025, 6), 10.0),
                make_detail(&old_run, "S2", ym(2025, 6), 5.0),
                make_detail(&new_run, "S1", ym(2025, 7), 20.0),
            ])
            .unwrap();

        let latest = details.list_latest_completed().unwrap();
        assert_eq!(latest.len(), 2);
        let s1 = latest.iter().find(|d| d.sku_id == "S1").unwrap();
        assert_eq!(s1.run_id, new_run, "应取最近完成批次");
        let s2 = latest.iter().find(|d| d.sku_id == "S2").unwrap();
        assert_eq!(s2.run_id, old_run);

        // 2025-06 只被旧批次覆盖
        let covering = details.list_latest_completed_covering(ym(2025, 6), 12).unwrap();
        assert!(covering.iter().all(|d| d.run_id == old_run));
        assert_eq!(covering.len(), 2);
    }

    #[test]
    fn test_detail_metadata_round_trip() {
        let conn = setup_test_db();
        let runs = ForecastRunRepository::from_connection(conn.clone());
        let details = ForecastDetailRepository::from_connection(conn);
        let run_id = completed_run(&runs, "2025-06-01T00:00:00Z");

        let mut d = make_detail(&run_id, "S1", ym(2025, 6), 10.0);
        d.method_used = CalculationMethod::TestLaunchPattern;
        d.growth_rate_source = GrowthRateSource::ProvenDemandStockout;
        details.batch_insert(&[d]).unwrap();

        let loaded = details.list_by_run(&run_id).unwrap();
        assert_eq!(loaded[0].method_used, CalculationMethod::TestLaunchPattern);
        assert_eq!(loaded[0].growth_rate_source, GrowthRateSource::ProvenDemandStockout);
        assert_eq!(loaded[0].total_qty(), 120.0);
    }
}
