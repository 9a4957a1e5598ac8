// ==========================================
// 仓库补货预测系统 - 预测准确率仓储
// ==========================================
// 红线:
// - 已记录实际值的行永不重算（所有写入均带 is_actual_recorded = 0 条件）
// - 主键 (sku_id, warehouse, period) 保证不重复
// ==========================================

use crate::domain::accuracy::ForecastAccuracyRecord;
use crate::domain::types::{CalculationMethod, YearMonth};
use crate::repository::common::{parse_datetime, parse_opt_datetime, parse_year_month};
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex};

const ACCURACY_COLUMNS: &str = r#"
    sku_id, warehouse, period, run_id, method_used, predicted_demand, actual_demand,
    absolute_error, percentage_error, stockout_affected, is_actual_recorded,
    created_at, recorded_at
"#;

fn map_accuracy(row: &Row<'_>) -> SqliteResult<ForecastAccuracyRecord> {
    Ok(ForecastAccuracyRecord {
        sku_id: row.get(0)?,
        warehouse: row.get(1)?,
        period: parse_year_month(2, &row.get::<_, String>(2)?)?,
        run_id: row.get(3)?,
        method_used: CalculationMethod::from_str(&row.get::<_, String>(4)?),
        predicted_demand: row.get(5)?,
        actual_demand: row.get(6)?,
        absolute_error: row.get(7)?,
        percentage_error: row.get(8)?,
        stockout_affected: row.get(9)?,
        is_actual_recorded: row.get(10)?,
        created_at: parse_datetime(&row.get::<_, String>(11)?),
        recorded_at: parse_opt_datetime(row.get(12)?),
    })
}

// ==========================================
// AccuracyRepository - 预测准确率仓储
// ==========================================
pub struct AccuracyRepository {
    conn: Arc<Mutex<Connection>>,
}

impl AccuracyRepository {
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 批量写入预测值（预测批次完成时调用）
    ///
    /// 已记录实际值的行保持不变；未记录的行由新批次的预测值覆盖。
    pub fn batch_upsert_predicted(
        &self,
        records: &[ForecastAccuracyRecord],
    ) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;
        let mut written = 0;
        for r in records {
            written += tx.execute(
                r#"
                INSERT INTO forecast_accuracy (
                    sku_id, warehouse, period, run_id, method_used, predicted_demand,
                    stockout_affected, is_actual_recorded, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, 0, ?7)
                ON CONFLICT(sku_id, warehouse, period) DO UPDATE SET
                    run_id = excluded.run_id,
                    method_used = excluded.method_used,
                    predicted_demand = excluded.predicted_demand,
                    created_at = excluded.created_at
                WHERE forecast_accuracy.is_actual_recorded = 0
                "#,
                params![
                    r.sku_id,
                    r.warehouse,
                    r.period.to_string(),
                    r.run_id,
                    r.method_used.as_str(),
                    r.predicted_demand,
                    r.created_at.to_rfc3339(),
                ],
            )?;
        }
        tx.commit()?;
        Ok(written)
    }

    /// 批量记录实际值（单事务，只写一次）
    ///
    /// # 返回
    /// - 实际写入的行数（已记录过的行不计）
    pub fn batch_record_actuals(
        &self,
        records: &[ForecastAccuracyRecord],
    ) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;
        let mut written = 0;
        for r in records {
            written += tx.execute(
                r#"
                INSERT INTO forecast_accuracy (
                    sku_id, warehouse, period, run_id, method_used, predicted_demand,
                    actual_demand, absolute_error, percentage_error,
                    stockout_affected, is_actual_recorded, created_at, recorded_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 1, ?11, ?12)
                ON CONFLICT(sku_id, warehouse, period) DO UPDATE SET
                    run_id = excluded.run_id,
                    method_used = excluded.method_used,
                    predicted_demand = excluded.predicted_demand,
                    actual_demand = excluded.actual_demand,
                    absolute_error = excluded.absolute_error,
                    percentage_error = excluded.percentage_error,
                    stockout_affected = excluded.stockout_affected,
                    is_actual_recorded = 1,
                    recorded_at = excluded.recorded_at
                WHERE forecast_accuracy.is_actual_recorded = 0
                "#,
                params![
                    r.sku_id,
                    r.warehouse,
                    r.period.to_string(),
                    r.run_id,
                    r.method_used.as_str(),
                    r.predicted_demand,
                    r.actual_demand,
                    r.absolute_error,
                    r.percentage_error,
                    r.stockout_affected,
                    r.created_at.to_rfc3339(),
                    r.recorded_at.map(|t| t.to_rfc3339()),
                ],
            )?;
        }
        tx.commit()?;
        Ok(written)
    }

    /// 查询某月份的全部准确率记录
    pub fn list_for_period(&self, period: YearMonth) -> RepositoryResult<Vec<ForecastAccuracyRecord>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM forecast_accuracy WHERE period = ?1 ORDER BY sku_id, warehouse",
            ACCURACY_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map(params![period.to_string()], map_accuracy)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(records)
    }

    /// 查询已记录实际值的记录（可选起始月份）
    pub fn list_recorded(&self, since: Option<YearMonth>) -> RepositoryResult<Vec<ForecastAccuracyRecord>> {
        let conn = self.get_conn()?;
        let since = since.map(|m| m.to_string()).unwrap_or_default();
        let sql = format!(
            "SELECT {} FROM forecast_accuracy WHERE is_actual_recorded = 1 AND period >= ?1 ORDER BY sku_id, warehouse, period",
            ACCURACY_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map(params![since], map_accuracy)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_schema;
    use chrono::Utc;

    fn setup() -> AccuracyRepository {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        AccuracyRepository::from_connection(Arc::new(Mutex::new(conn)))
    }

    fn period() -> YearMonth {
        YearMonth::new(2025, 5).unwrap()
    }

    fn predicted(run: &str, qty: f64) -> ForecastAccuracyRecord {
        ForecastAccuracyRecord::predicted_only("S1", "W1", period(), run, CalculationMethod::Simple3m, qty)
    }

    fn with_actual(mut r: ForecastAccuracyRecord, actual: f64) -> ForecastAccuracyRecord {
        r.actual_demand = Some(actual);
        r.absolute_error = Some((actual - r.predicted_demand).abs());
        r.percentage_error = crate::domain::accuracy::percentage_error(r.predicted_demand, actual);
        r.is_actual_recorded = true;
        r.recorded_at = Some(Utc::now());
        r
    }

    #[test]
    fn test_actual_written_once() {
        let repo = setup();
        repo.batch_upsert_predicted(&[predicted("R1", 100.0)]).unwrap();

        assert_eq!(repo.batch_record_actuals(&[with_actual(predicted("R1", 100.0), 80.0)]).unwrap(), 1);
        // 再次写入（不同实际值）必须被忽略
        assert_eq!(repo.batch_record_actuals(&[with_actual(predicted("R1", 100.0), 10.0)]).unwrap(), 0);

        let rows = repo.list_for_period(period()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].actual_demand, Some(80.0));
        assert!(rows[0].is_actual_recorded);
    }

    #[test]
    fn test_predicted_refresh_stops_after_recording() {
        let repo = setup();
        repo.batch_upsert_predicted(&[predicted("R1", 100.0)]).unwrap();
        repo.batch_upsert_predicted(&[predicted("R2", 120.0)]).unwrap();
        assert_eq!(repo.list_for_period(period()).unwrap()[0].predicted_demand, 120.0);

        repo.batch_record_actuals(&[with_actual(predicted("R2", 120.0), 110.0)]).unwrap();
        repo.batch_upsert_predicted(&[predicted("R3", 999.0)]).unwrap();

        let row = &repo.list_for_period(period()).unwrap()[0];
        assert_eq!(row.predicted_demand, 120.0, "已记录行的预测值不可被新批次覆盖");
        assert_eq!(row.run_id, "R2");
        assert_eq!(repo.list_recorded(None).unwrap().len(), 1);
    }
}
