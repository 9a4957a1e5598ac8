// ==========================================
// 仓库补货预测系统 - 供应侧仓储
// ==========================================
// 职责: 在途订单 / 供应商提前期画像 / 缺货模式
// 红线: Repository 不含业务逻辑；分桶与置信度在引擎层计算
// ==========================================

use crate::domain::supply::{PendingOrder, StockoutPattern, SupplierLeadTimeProfile};
use crate::domain::types::{ConfidenceLevel, PendingOrderStatus, StockoutPatternType};
use crate::repository::common::{format_date, parse_date};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDate;
use rusqlite::{params, Connection, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex};

fn map_pending(row: &Row<'_>) -> SqliteResult<PendingOrder> {
    Ok(PendingOrder {
        order_id: row.get(0)?,
        sku_id: row.get(1)?,
        warehouse: row.get(2)?,
        supplier: row.get(3)?,
        quantity: row.get(4)?,
        order_date: parse_date(5, &row.get::<_, String>(5)?)?,
        expected_arrival: parse_date(6, &row.get::<_, String>(6)?)?,
        status: PendingOrderStatus::from_str(&row.get::<_, String>(7)?),
    })
}

// ==========================================
// PendingOrderRepository - 在途订单仓储
// ==========================================
pub struct PendingOrderRepository {
    conn: Arc<Mutex<Connection>>,
}

impl PendingOrderRepository {
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    pub fn batch_upsert(&self, orders: &[PendingOrder]) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;
        for o in orders {
            tx.execute(
                r#"
                INSERT INTO pending_order (
                    order_id, sku_id, warehouse, supplier, quantity, order_date, expected_arrival, status
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ON CONFLICT(order_id) DO UPDATE SET
                    quantity = excluded.quantity,
                    supplier = excluded.supplier,
                    expected_arrival = excluded.expected_arrival,
                    status = excluded.status
                "#,
                params![
                    o.order_id,
                    o.sku_id,
                    o.warehouse,
                    o.supplier,
                    o.quantity,
                    format_date(o.order_date),
                    format_date(o.expected_arrival),
                    o.status.as_str(),
                ],
            )?;
        }
        tx.commit()?;
        Ok(orders.len())
    }

    /// 查询未完结在途订单（预计到货日不晚于 horizon_end）
    ///
    /// 逾期单（到货日早于今天）同样返回，由引擎分桶。
    pub fn list_open_until(&self, horizon_end: NaiveDate) -> RepositoryResult<Vec<PendingOrder>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT order_id, sku_id, warehouse, supplier, quantity, order_date, expected_arrival, status
            FROM pending_order
            WHERE status IN ('ordered', 'shipped')
              AND expected_arrival <= ?1
            ORDER BY sku_id, warehouse, expected_arrival, order_id
            "#,
        )?;
        let orders = stmt
            .query_map(params![format_date(horizon_end)], map_pending)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(orders)
    }
}

// ==========================================
// SupplierLeadTimeRepository - 供应商提前期仓储
// ==========================================
pub struct SupplierLeadTimeRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SupplierLeadTimeRepository {
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    pub fn batch_upsert(&self, profiles: &[SupplierLeadTimeProfile]) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;
        for p in profiles {
            tx.execute(
                r#"
                INSERT INTO supplier_lead_time (
                    supplier, warehouse, avg_lead_time_days, p95_lead_time_days, min_lead_time_days,
                    reliability_score, avg_delay_days_when_late, shipments_observed, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, datetime('now'))
                ON CONFLICT(supplier, warehouse) DO UPDATE SET
                    avg_lead_time_days = excluded.avg_lead_time_days,
                    p95_lead_time_days = excluded.p95_lead_time_days,
                    min_lead_time_days = excluded.min_lead_time_days,
                    reliability_score = excluded.reliability_score,
                    avg_delay_days_when_late = excluded.avg_delay_days_when_late,
                    shipments_observed = excluded.shipments_observed,
                    updated_at = excluded.updated_at
                "#,
                params![
                    p.supplier,
                    p.warehouse,
                    p.avg_lead_time_days,
                    p.p95_lead_time_days,
                    p.min_lead_time_days,
                    p.reliability_score,
                    p.avg_delay_days_when_late,
                    p.shipments_observed,
                ],
            )?;
        }
        tx.commit()?;
        Ok(profiles.len())
    }

    pub fn list_all(&self) -> RepositoryResult<Vec<SupplierLeadTimeProfile>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT supplier, warehouse, avg_lead_time_days, p95_lead_time_days, min_lead_time_days,
                   reliability_score, avg_delay_days_when_late, shipments_observed
            FROM supplier_lead_time
            ORDER BY supplier, warehouse
            "#,
        )?;
        let profiles = stmt
            .query_map([], |row| {
                Ok(SupplierLeadTimeProfile {
                    supplier: row.get(0)?,
                    warehouse: row.get(1)?,
                    avg_lead_time_days: row.get(2)?,
                    p95_lead_time_days: row.get(3)?,
                    min_lead_time_days: row.get(4)?,
                    reliability_score: row.get(5)?,
                    avg_delay_days_when_late: row.get(6)?,
                    shipments_observed: row.get(7)?,
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(profiles)
    }
}

// ==========================================
// StockoutPatternRepository - 缺货模式仓储
// ==========================================
pub struct StockoutPatternRepository {
    conn: Arc<Mutex<Connection>>,
}

impl StockoutPatternRepository {
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    pub fn batch_upsert(&self, patterns: &[StockoutPattern]) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;
        for p in patterns {
            tx.execute(
                r#"
                INSERT INTO stockout_pattern (
                    sku_id, pattern_type, frequency_score, confidence_level, pattern_value, detected_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, datetime('now'))
                ON CONFLICT(sku_id, pattern_type) DO UPDATE SET
                    frequency_score = excluded.frequency_score,
                    confidence_level = excluded.confidence_level,
                    pattern_value = excluded.pattern_value,
                    detected_at = excluded.detected_at
                "#,
                params![
                    p.sku_id,
                    p.pattern_type.as_str(),
                    p.frequency_score,
                    p.confidence_level.as_str(),
                    p.pattern_value,
                ],
            )?;
        }
        tx.commit()?;
        Ok(patterns.len())
    }

    pub fn list_all(&self) -> RepositoryResult<Vec<StockoutPattern>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT sku_id, pattern_type, frequency_score, confidence_level, pattern_value
            FROM stockout_pattern
            ORDER BY sku_id, pattern_type
            "#,
        )?;
        let patterns = stmt
            .query_map([], |row| {
                Ok(StockoutPattern {
                    sku_id: row.get(0)?,
                    pattern_type: StockoutPatternType::from_str(&row.get::<_, String>(1)?),
                    frequency_score: row.get(2)?,
                    confidence_level: ConfidenceLevel::from_str(&row.get::<_, String>(3)?),
                    pattern_value: row.get(4)?,
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(patterns)
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

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn order(id: &str, arrival: NaiveDate, status: PendingOrderStatus) -> PendingOrder {
        PendingOrder {
            order_id: id.to_string(),
            sku_id: "S1".to_string(),
            warehouse: "W1".to_string(),
            supplier: Some("SUP1".to_string()),
            quantity: 50.0,
            order_date: date(2025, 1, 1),
            expected_arrival: arrival,
            status,
        }
    }

    #[test]
    fn test_open_orders_within_horizon() {
        let repo = PendingOrderRepository::from_connection(setup_test_db());
        repo.batch_upsert(&[
            order("PO1", date(2025, 2, 1), PendingOrderStatus::Ordered),
            order("PO2", date(2025, 3, 1), PendingOrderStatus::Shipped),
            order("PO3", date(2025, 12, 1), PendingOrderStatus::Ordered),
            order("PO4", date(2025, 2, 1), PendingOrderStatus::Received),
        ])
        .unwrap();

        let open = repo.list_open_until(date(2025, 6, 30)).unwrap();
        let ids: Vec<_> = open.iter().map(|o| o.order_id.as_str()).collect();
        assert_eq!(ids, vec!["PO1", "PO2"], "展望外与已收货订单不返回");
    }

    #[test]
    fn test_lead_time_and_patterns_round_trip() {
        let conn = setup_test_db();
        let lead = SupplierLeadTimeRepository::from_connection(conn.clone());
        lead.batch_upsert(&[SupplierLeadTimeProfile {
            supplier: "SUP1".to_string(),
            warehouse: "W1".to_string(),
            avg_lead_time_days: 40.0,
            p95_lead_time_days: Some(55.0),
            min_lead_time_days: None,
            reliability_score: 0.7,
            avg_delay_days_when_late: Some(12.0),
            shipments_observed: 9,
        }])
        .unwrap();
        let profiles = lead.list_all().unwrap();
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].planning_lead_time_days(), Some(55));

        let patterns = StockoutPatternRepository::from_connection(conn);
        patterns
            .batch_upsert(&[StockoutPattern {
                sku_id: "S1".to_string(),
                pattern_type: StockoutPatternType::Chronic,
                frequency_score: 85.0,
                confidence_level: ConfidenceLevel::High,
                pattern_value: None,
            }])
            .unwrap();
        let loaded = patterns.list_all().unwrap();
        assert!(loaded[0].is_chronic_signal());
    }
}
