// ==========================================
// 仓库补货预测系统 - 月度销售仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 约束: 批次读取一次查全量，禁止逐 SKU 查询
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::sales::MonthlySalesRecord;
use crate::domain::types::YearMonth;
use crate::repository::common::{build_in_clause, parse_year_month};
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, params_from_iter, Connection, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex};

fn map_sales(row: &Row<'_>) -> SqliteResult<MonthlySalesRecord> {
    Ok(MonthlySalesRecord {
        sku_id: row.get(0)?,
        warehouse: row.get(1)?,
        year_month: parse_year_month(2, &row.get::<_, String>(2)?)?,
        units_sold: row.get(3)?,
        stockout_days: row.get::<_, i64>(4)?.max(0) as u32,
        corrected_demand: row.get(5)?,
    })
}

// ==========================================
// SalesRepository - 月度销售仓储
// ==========================================
pub struct SalesRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SalesRepository {
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 批量写入月度销售（同月覆盖，latest-wins）
    pub fn batch_upsert(&self, records: &[MonthlySalesRecord]) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;
        for r in records {
            tx.execute(
                r#"
                INSERT INTO monthly_sales (
                    sku_id, warehouse, year_month, units_sold, stockout_days, corrected_demand
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(sku_id, warehouse, year_month) DO UPDATE SET
                    units_sold = excluded.units_sold,
                    stockout_days = excluded.stockout_days,
                    corrected_demand = excluded.corrected_demand
                "#,
                params![
                    r.sku_id,
                    r.warehouse,
                    r.year_month.to_string(),
                    r.units_sold,
                    r.stockout_days as i64,
                    r.corrected_demand,
                ],
            )?;
        }
        tx.commit()?;
        Ok(records.len())
    }

    /// 查询全部销售记录（按 sku/仓库/月份 排序）
    ///
    /// # 参数
    /// - warehouses: 仓库范围（None = 全部）
    pub fn list_all(&self, warehouses: Option<&[String]>) -> RepositoryResult<Vec<MonthlySalesRecord>> {
        let conn = self.get_conn()?;
        let base = "SELECT sku_id, warehouse, year_month, units_sold, stockout_days, corrected_demand FROM monthly_sales";
        let order = "ORDER BY sku_id, warehouse, year_month";

        let records = match warehouses {
            Some(list) => {
                let sql = format!("{} WHERE {} {}", base, build_in_clause("warehouse", list), order);
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(params_from_iter(list.iter()), map_sales)?
                    .collect::<SqliteResult<Vec<_>>>()?;
                rows
            }
            None => {
                let sql = format!("{} {}", base, order);
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map([], map_sales)?
                    .collect::<SqliteResult<Vec<_>>>()?;
                rows
            }
        };
        Ok(records)
    }

    /// 查询某月份的全部销售记录
    pub fn list_for_period(&self, period: YearMonth) -> RepositoryResult<Vec<MonthlySalesRecord>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT sku_id, warehouse, year_month, units_sold, stockout_days, corrected_demand
            FROM monthly_sales
            WHERE year_month = ?1
            ORDER BY sku_id, warehouse
            "#,
        )?;
        let records = stmt
            .query_map(params![period.to_string()], map_sales)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(records)
    }

    /// 最新有实际销售数据的月份
    pub fn latest_month(&self) -> RepositoryResult<Option<YearMonth>> {
        let conn = self.get_conn()?;
        let raw: Option<String> =
            conn.query_row("SELECT MAX(year_month) FROM monthly_sales", [], |row| row.get(0))?;
        match raw {
            Some(s) => Ok(Some(parse_year_month(0, &s)?)),
            None => Ok(None),
        }
    }

    /// 出现过销售的全部仓库
    pub fn list_warehouses(&self) -> RepositoryResult<Vec<String>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT warehouse FROM monthly_sales
            UNION
            SELECT warehouse FROM inventory_current
            ORDER BY warehouse
            "#,
        )?;
        let warehouses = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(warehouses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_schema;

    fn setup_test_db() -> Arc<Mutex<Connection>> {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        Arc::new(Mutex::new(conn))
    }

    fn ym(y: i32, m: u32) -> YearMonth {
        YearMonth::new(y, m).unwrap()
    }

    #[test]
    fn test_upsert_latest_wins() {
        let repo = SalesRepository::from_connection(setup_test_db());
        repo.batch_upsert(&[MonthlySalesRecord::new("S1", "W1", ym(2025, 1), 10.0, 0)])
            .unwrap();
        repo.batch_upsert(&[MonthlySalesRecord::new("S1", "W1", ym(2025, 1), 12.0, 0)])
            .unwrap();

        let all = repo.list_all(None).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].units_sold, 12.0);
    }

    #[test]
    fn test_list_filters_and_latest_month() {
        let repo = SalesRepository::from_connection(setup_test_db());
        repo.batch_upsert(&[
            MonthlySalesRecord::new("S1", "W1", ym(2025, 2), 10.0, 0),
            MonthlySalesRecord::new("S1", "W1", ym(2025, 1), 10.0, 0),
            MonthlySalesRecord::new("S1", "W2", ym(2025, 3), 10.0, 3),
        ])
        .unwrap();

        let w1 = repo.list_all(Some(&["W1".to_string()])).unwrap();
        assert_eq!(w1.len(), 2);
        assert!(w1[0].year_month < w1[1].year_month, "应按月份升序");

        assert_eq!(repo.latest_month().unwrap(), Some(ym(2025, 3)));
        assert_eq!(repo.list_for_period(ym(2025, 3)).unwrap()[0].stockout_days, 3);
        assert_eq!(repo.list_warehouses().unwrap(), vec!["W1", "W2"]);
    }

    #[test]
    fn test_latest_month_empty() {
        let repo = SalesRepository::from_connection(setup_test_db());
        assert_eq!(repo.latest_month().unwrap(), None);
    }
}
