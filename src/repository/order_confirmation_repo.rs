// ==========================================
// 仓库补货预测系统 - 补货确认单仓储
// ==========================================
// 红线:
// - 重新生成只刷新系统字段；confirmed_qty / 覆盖项 / 锁定字段永不被生成覆盖
// - 锁定行拒绝人工编辑（RowLocked）
// ==========================================

use crate::domain::order::{ConfirmationEdit, OrderConfirmation};
use crate::domain::types::{DemandSource, UrgencyLevel, YearMonth};
use crate::repository::common::{format_date, parse_date, parse_datetime, parse_opt_date, parse_opt_datetime, parse_year_month};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex};

const CONFIRMATION_COLUMNS: &str = r#"
    sku_id, warehouse, order_month, suggested_qty, confirmed_qty,
    current_inventory, effective_pending, raw_pending, future_pending_ignored,
    monthly_demand, demand_source, forecast_demand, historical_demand,
    forecast_confidence, blend_weight, learning_adjustment,
    safety_stock, reorder_point, coverage_days, lead_time_days,
    lead_time_override, arrival_override, expected_arrival,
    urgency, urgency_reason, stockout_escalated, seasonal_multiplier,
    locked, locked_by, locked_at, generated_at, updated_at
"#;

fn map_confirmation(row: &Row<'_>) -> SqliteResult<OrderConfirmation> {
    Ok(OrderConfirmation {
        sku_id: row.get(0)?,
        warehouse: row.get(1)?,
        order_month: parse_year_month(2, &row.get::<_, String>(2)?)?,
        suggested_qty: row.get(3)?,
        confirmed_qty: row.get(4)?,
        current_inventory: row.get(5)?,
        effective_pending: row.get(6)?,
        raw_pending: row.get(7)?,
        future_pending_ignored: row.get(8)?,
        monthly_demand: row.get(9)?,
        demand_source: DemandSource::from_str(&row.get::<_, String>(10)?),
        forecast_demand: row.get(11)?,
        historical_demand: row.get(12)?,
        forecast_confidence: row.get(13)?,
        blend_weight: row.get(14)?,
        learning_adjustment: row.get(15)?,
        safety_stock: row.get(16)?,
        reorder_point: row.get(17)?,
        coverage_days: row.get(18)?,
        lead_time_days: row.get(19)?,
        lead_time_override: row.get(20)?,
        arrival_override: parse_opt_date(21, row.get(21)?)?,
        expected_arrival: parse_date(22, &row.get::<_, String>(22)?)?,
        urgency: UrgencyLevel::from_str(&row.get::<_, String>(23)?),
        urgency_reason: row.get::<_, Option<String>>(24)?.unwrap_or_default(),
        stockout_escalated: row.get(25)?,
        seasonal_multiplier: row.get(26)?,
        locked: row.get(27)?,
        locked_by: row.get(28)?,
        locked_at: parse_opt_datetime(row.get(29)?),
        generated_at: parse_datetime(&row.get::<_, String>(30)?),
        updated_at: parse_datetime(&row.get::<_, String>(31)?),
    })
}

// ==========================================
// OrderConfirmationRepository - 补货确认单仓储
// ==========================================
pub struct OrderConfirmationRepository {
    conn: Arc<Mutex<Connection>>,
}

impl OrderConfirmationRepository {
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 批量写入生成结果（单事务 upsert）
    ///
    /// 冲突时只更新系统计算字段，人工字段与锁定状态原样保留。
    pub fn batch_upsert_generated(&self, rows: &[OrderConfirmation]) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;
        for r in rows {
            tx.execute(
                r#"
                INSERT INTO order_confirmation (
                    sku_id, warehouse, order_month, suggested_qty,
                    current_inventory, effective_pending, raw_pending, future_pending_ignored,
                    monthly_demand, demand_source, forecast_demand, historical_demand,
                    forecast_confidence, blend_weight, learning_adjustment,
                    safety_stock, reorder_point, coverage_days, lead_time_days, expected_arrival,
                    urgency, urgency_reason, stockout_escalated, seasonal_multiplier,
                    generated_at, updated_at
                ) VALUES (
                    ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13,
                    ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26
                )
                ON CONFLICT(sku_id, warehouse, order_month) DO UPDATE SET
                    suggested_qty = excluded.suggested_qty,
                    current_inventory = excluded.current_inventory,
                    effective_pending = excluded.effective_pending,
                    raw_pending = excluded.raw_pending,
                    future_pending_ignored = excluded.future_pending_ignored,
                    monthly_demand = excluded.monthly_demand,
                    demand_source = excluded.demand_source,
                    forecast_demand = excluded.forecast_demand,
                    historical_demand = excluded.historical_demand,
                    forecast_confidence = excluded.forecast_confidence,
                    blend_weight = excluded.blend_weight,
                    learning_adjustment = excluded.learning_adjustment,
                    safety_stock = excluded.safety_stock,
                    reorder_point = excluded.reorder_point,
                    coverage_days = excluded.coverage_days,
                    lead_time_days = excluded.lead_time_days,
                    expected_arrival = excluded.expected_arrival,
                    urgency = excluded.urgency,
                    urgency_reason = excluded.urgency_reason,
                    stockout_escalated = excluded.stockout_escalated,
                    seasonal_multiplier = excluded.seasonal_multiplier,
                    generated_at = excluded.generated_at,
                    updated_at = excluded.updated_at
                "#,
                params![
                    r.sku_id,
                    r.warehouse,
                    r.order_month.to_string(),
                    r.suggested_qty,
                    r.current_inventory,
                    r.effective_pending,
                    r.raw_pending,
                    r.future_pending_ignored,
                    r.monthly_demand,
                    r.demand_source.as_str(),
                    r.forecast_demand,
                    r.historical_demand,
                    r.forecast_confidence,
                    r.blend_weight,
                    r.learning_adjustment,
                    r.safety_stock,
                    r.reorder_point,
                    r.coverage_days,
                    r.lead_time_days,
                    format_date(r.expected_arrival),
                    r.urgency.as_str(),
                    r.urgency_reason,
                    r.stockout_escalated,
                    r.seasonal_multiplier,
                    r.generated_at.to_rfc3339(),
                    r.updated_at.to_rfc3339(),
                ],
            )?;
        }
        tx.commit()?;
        Ok(rows.len())
    }

    pub fn find(
        &self,
        sku_id: &str,
        warehouse: &str,
        order_month: YearMonth,
    ) -> RepositoryResult<Option<OrderConfirmation>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM order_confirmation WHERE sku_id = ?1 AND warehouse = ?2 AND order_month = ?3",
            CONFIRMATION_COLUMNS
        );
        Ok(conn
            .query_row(&sql, params![sku_id, warehouse, order_month.to_string()], map_confirmation)
            .optional()?)
    }

    /// 查询某月全部确认单（紧急度高的在前）
    pub fn list_by_month(&self, order_month: YearMonth) -> RepositoryResult<Vec<OrderConfirmation>> {
        let conn = self.get_conn()?;
        let sql = format!(
            r#"
            SELECT {} FROM order_confirmation
            WHERE order_month = ?1
            ORDER BY CASE urgency
                WHEN 'must_order' THEN 0
                WHEN 'should_order' THEN 1
                WHEN 'optional' THEN 2
                ELSE 3 END,
                sku_id, warehouse
            "#,
            CONFIRMATION_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![order_month.to_string()], map_confirmation)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }

    /// 人工编辑（未锁定行）
    ///
    /// # 错误
    /// - NotFound: 确认单不存在
    /// - RowLocked: 已锁定
    pub fn apply_edit(
        &self,
        sku_id: &str,
        warehouse: &str,
        order_month: YearMonth,
        edit: &ConfirmationEdit,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let key = format!("{}/{}/{}", sku_id, warehouse, order_month);
        let locked: Option<bool> = conn
            .query_row(
                "SELECT locked FROM order_confirmation WHERE sku_id = ?1 AND warehouse = ?2 AND order_month = ?3",
                params![sku_id, warehouse, order_month.to_string()],
                |row| row.get(0),
            )
            .optional()?;

        match locked {
            None => Err(RepositoryError::NotFound {
                entity: "OrderConfirmation".to_string(),
                id: key,
            }),
            Some(true) => Err(RepositoryError::RowLocked(key)),
            Some(false) => {
                conn.execute(
                    r#"
                    UPDATE order_confirmation
                    SET confirmed_qty = ?1, lead_time_override = ?2, arrival_override = ?3, updated_at = ?4
                    WHERE sku_id = ?5 AND warehouse = ?6 AND order_month = ?7 AND locked = 0
                    "#,
                    params![
                        edit.confirmed_qty,
                        edit.lead_time_override,
                        edit.arrival_override.map(format_date),
                        Utc::now().to_rfc3339(),
                        sku_id,
                        warehouse,
                        order_month.to_string(),
                    ],
                )?;
                Ok(())
            }
        }
    }

    /// 锁定 / 解锁
    ///
    /// # 返回
    /// - Ok(false): 确认单不存在
    pub fn set_locked(
        &self,
        sku_id: &str,
        warehouse: &str,
        order_month: YearMonth,
        locked_by: Option<&str>,
        at: DateTime<Utc>,
    ) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let affected = match locked_by {
            Some(user) => conn.execute(
                r#"
                UPDATE order_confirmation
                SET locked = 1, locked_by = ?1, locked_at = ?2, updated_at = ?2
                WHERE sku_id = ?3 AND warehouse = ?4 AND order_month = ?5
                "#,
                params![user, at.to_rfc3339(), sku_id, warehouse, order_month.to_string()],
            )?,
            None => conn.execute(
                r#"
                UPDATE order_confirmation
                SET locked = 0, locked_by = NULL, locked_at = NULL, updated_at = ?1
                WHERE sku_id = ?2 AND warehouse = ?3 AND order_month = ?4
                "#,
                params![at.to_rfc3339(), sku_id, warehouse, order_month.to_string()],
            )?,
        };
        Ok(affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_schema;
    use chrono::NaiveDate;

    fn setup() -> OrderConfirmationRepository {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        OrderConfirmationRepository::from_connection(Arc::new(Mutex::new(conn)))
    }

    fn month() -> YearMonth {
        YearMonth::new(2025, 10).unwrap()
    }

    fn base_row(suggested: f64) -> OrderConfirmation {
        OrderConfirmation {
            sku_id: "S1".to_string(),
            warehouse: "W1".to_string(),
            order_month: month(),
            suggested_qty: suggested,
            confirmed_qty: None,
            current_inventory: 100.0,
            effective_pending: 20.0,
            raw_pending: 25.0,
            future_pending_ignored: 0.0,
            monthly_demand: 90.0,
            demand_source: DemandSource::Forecast,
            forecast_demand: Some(90.0),
            historical_demand: 80.0,
            forecast_confidence: Some(0.8),
            blend_weight: None,
            learning_adjustment: 0.0,
            safety_stock: 30.0,
            reorder_point: 300.0,
            coverage_days: Some(40.0),
            lead_time_days: 60,
            lead_time_override: None,
            arrival_override: None,
            expected_arrival: NaiveDate::from_ymd_opt(2025, 11, 30).unwrap(),
            seasonal_multiplier: 1.0,
            urgency: UrgencyLevel::ShouldOrder,
            urgency_reason: "{}".to_string(),
            stockout_escalated: false,
            locked: false,
            locked_by: None,
            locked_at: None,
            generated_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    // 场景1: 重复生成不产生重复行，人工确认量保留
    #[test]
    fn test_regenerate_keeps_user_fields() {
        let repo = setup();
        repo.batch_upsert_generated(&[base_row(180.0)]).unwrap();
        repo.apply_edit(
            "S1",
            "W1",
            month(),
            &ConfirmationEdit {
                confirmed_qty: Some(150.0),
                lead_time_override: Some(45),
                arrival_override: None,
            },
        )
        .unwrap();

        repo.batch_upsert_generated(&[base_row(200.0)]).unwrap();

        let rows = repo.list_by_month(month()).unwrap();
        assert_eq!(rows.len(), 1, "不可产生重复行");
        assert_eq!(rows[0].suggested_qty, 200.0);
        assert_eq!(rows[0].confirmed_qty, Some(150.0));
        assert_eq!(rows[0].lead_time_override, Some(45));
    }

    // 场景2: 锁定行拒绝编辑，重新生成也不解锁
    #[test]
    fn test_locked_row_rejects_edit() {
        let repo = setup();
        repo.batch_upsert_generated(&[base_row(180.0)]).unwrap();
        assert!(repo.set_locked("S1", "W1", month(), Some("planner"), Utc::now()).unwrap());

        let err = repo
            .apply_edit("S1", "W1", month(), &ConfirmationEdit::default())
            .unwrap_err();
        assert!(matches!(err, RepositoryError::RowLocked(_)));

        repo.batch_upsert_generated(&[base_row(210.0)]).unwrap();
        let row = repo.find("S1", "W1", month()).unwrap().unwrap();
        assert!(row.locked, "重新生成不得解锁");
        assert_eq!(row.locked_by.as_deref(), Some("planner"));

        assert!(repo.set_locked("S1", "W1", month(), None, Utc::now()).unwrap());
        repo.apply_edit("S1", "W1", month(), &ConfirmationEdit::default()).unwrap();
    }

    #[test]
    fn test_edit_missing_row() {
        let repo = setup();
        let err = repo
            .apply_edit("NOPE", "W1", month(), &ConfirmationEdit::default())
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound { .. }));
    }
}
