// ==========================================
// 仓库补货预测系统 - 学习调整仓储
// ==========================================
// 红线: 生效只看 applied 字段；仓储不做任何置信度判断
// ==========================================

use crate::domain::accuracy::LearningAdjustment;
use crate::domain::types::AdjustmentType;
use crate::repository::common::{parse_datetime, parse_opt_datetime};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex};

const ADJUSTMENT_COLUMNS: &str = r#"
    adjustment_id, sku_id, category, warehouse, adjustment_type,
    current_value, proposed_value, adjustment_magnitude, confidence_score,
    mape_before, mape_expected_after, sample_size, reason,
    applied, rejected, approved_by, approved_at, superseded_by, created_at, updated_at
"#;

fn map_adjustment(row: &Row<'_>) -> SqliteResult<LearningAdjustment> {
    Ok(LearningAdjustment {
        adjustment_id: row.get(0)?,
        sku_id: row.get(1)?,
        category: row.get(2)?,
        warehouse: row.get(3)?,
        adjustment_type: AdjustmentType::from_str(&row.get::<_, String>(4)?),
        current_value: row.get(5)?,
        proposed_value: row.get(6)?,
        adjustment_magnitude: row.get(7)?,
        confidence_score: row.get(8)?,
        mape_before: row.get(9)?,
        mape_expected_after: row.get(10)?,
        sample_size: row.get(11)?,
        reason: row.get::<_, Option<String>>(12)?.unwrap_or_default(),
        applied: row.get(13)?,
        rejected: row.get(14)?,
        approved_by: row.get(15)?,
        approved_at: parse_opt_datetime(row.get(16)?),
        superseded_by: row.get(17)?,
        created_at: parse_datetime(&row.get::<_, String>(18)?),
        updated_at: parse_datetime(&row.get::<_, String>(19)?),
    })
}

// ==========================================
// LearningAdjustmentRepository - 学习调整仓储
// ==========================================
pub struct LearningAdjustmentRepository {
    conn: Arc<Mutex<Connection>>,
}

impl LearningAdjustmentRepository {
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 批量保存建议（按 adjustment_id upsert，单事务）
    ///
    /// 已审批、已驳回或已被取代的行不会被刷新。
    pub fn batch_save(&self, adjustments: &[LearningAdjustment]) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;
        for a in adjustments {
            tx.execute(
                r#"
                INSERT INTO learning_adjustment (
                    adjustment_id, sku_id, category, warehouse, adjustment_type,
                    current_value, proposed_value, adjustment_magnitude, confidence_score,
                    mape_before, mape_expected_after, sample_size, reason,
                    applied, rejected, approved_by, approved_at, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)
                ON CONFLICT(adjustment_id) DO UPDATE SET
                    current_value = excluded.current_value,
                    proposed_value = excluded.proposed_value,
                    adjustment_magnitude = excluded.adjustment_magnitude,
                    confidence_score = excluded.confidence_score,
                    mape_before = excluded.mape_before,
                    mape_expected_after = excluded.mape_expected_after,
                    sample_size = excluded.sample_size,
                    reason = excluded.reason,
                    updated_at = excluded.updated_at
                WHERE learning_adjustment.applied = 0
                  AND learning_adjustment.rejected = 0
                  AND learning_adjustment.superseded_by IS NULL
                "#,
                params![
                    a.adjustment_id,
                    a.sku_id,
                    a.category,
                    a.warehouse,
                    a.adjustment_type.as_str(),
                    a.current_value,
                    a.proposed_value,
                    a.adjustment_magnitude,
                    a.confidence_score,
                    a.mape_before,
                    a.mape_expected_after,
                    a.sample_size,
                    a.reason,
                    a.applied,
                    a.rejected,
                    a.approved_by,
                    a.approved_at.map(|t| t.to_rfc3339()),
                    a.created_at.to_rfc3339(),
                    a.updated_at.to_rfc3339(),
                ],
            )?;
        }
        tx.commit()?;
        Ok(adjustments.len())
    }

    pub fn find_by_id(&self, adjustment_id: &str) -> RepositoryResult<Option<LearningAdjustment>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM learning_adjustment WHERE adjustment_id = ?1",
            ADJUSTMENT_COLUMNS
        );
        Ok(conn.query_row(&sql, params![adjustment_id], map_adjustment).optional()?)
    }

    /// 待审批建议
    pub fn list_pending(&self) -> RepositoryResult<Vec<LearningAdjustment>> {
        self.list_where("applied = 0 AND rejected = 0 AND superseded_by IS NULL")
    }

    /// 已生效建议（补货引擎只读这一组）
    pub fn list_applied(&self) -> RepositoryResult<Vec<LearningAdjustment>> {
        self.list_where("applied = 1")
    }

    fn list_where(&self, condition: &str) -> RepositoryResult<Vec<LearningAdjustment>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM learning_adjustment WHERE {} ORDER BY created_at, adjustment_id",
            ADJUSTMENT_COLUMNS, condition
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], map_adjustment)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }

    /// 审批生效（单事务）
    ///
    /// 同目标同类型此前已生效的调整被取代：applied 置 0，superseded_by 指向本条。
    /// 任一 (目标, 类型) 同一时刻最多一条生效。
    ///
    /// # 返回
    /// - Ok(true): 已生效
    /// - Ok(false): 建议不存在或已处理
    pub fn approve(
        &self,
        adjustment_id: &str,
        approver: &str,
        approved_at: DateTime<Utc>,
    ) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;
        let affected = tx.execute(
            r#"
            UPDATE learning_adjustment
            SET applied = 1, approved_by = ?1, approved_at = ?2, updated_at = ?2
            WHERE adjustment_id = ?3 AND applied = 0 AND rejected = 0 AND superseded_by IS NULL
            "#,
            params![approver, approved_at.to_rfc3339(), adjustment_id],
        )?;
        if affected == 0 {
            return Ok(false);
        }

        let superseded = tx.execute(
            r#"
            UPDATE learning_adjustment
            SET applied = 0, superseded_by = ?1, updated_at = ?2
            WHERE applied = 1
              AND adjustment_id <> ?1
              AND EXISTS (
                  SELECT 1 FROM learning_adjustment n
                  WHERE n.adjustment_id = ?1
                    AND n.adjustment_type = learning_adjustment.adjustment_type
                    AND n.sku_id IS learning_adjustment.sku_id
                    AND n.category IS learning_adjustment.category
                    AND n.warehouse IS learning_adjustment.warehouse
              )
            "#,
            params![adjustment_id, approved_at.to_rfc3339()],
        )?;
        tx.commit()?;
        if superseded > 0 {
            tracing::debug!(adjustment_id, superseded, "同目标旧调整已被取代");
        }
        Ok(true)
    }

    /// 驳回
    pub fn reject(&self, adjustment_id: &str) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            r#"
            UPDATE learning_adjustment
            SET rejected = 1, updated_at = ?1
            WHERE adjustment_id = ?2 AND applied = 0 AND rejected = 0 AND superseded_by IS NULL
            "#,
            params![Utc::now().to_rfc3339(), adjustment_id],
        )?;
        Ok(affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_schema;

    fn setup() -> LearningAdjustmentRepository {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        LearningAdjustmentRepository::from_connection(Arc::new(Mutex::new(conn)))
    }

    fn make(id: &str, confidence: f64) -> LearningAdjustment {
        LearningAdjustment {
            adjustment_id: id.to_string(),
            sku_id: Some("S1".to_string()),
            category: None,
            warehouse: Some("W1".to_string()),
            adjustment_type: AdjustmentType::GrowthRate,
            current_value: 0.0,
            proposed_value: 5.0,
            adjustment_magnitude: 5.0,
            confidence_score: confidence,
            mape_before: Some(30.0),
            mape_expected_after: Some(15.0),
            sample_size: 4,
            reason: "{}".to_string(),
            applied: false,
            rejected: false,
            approved_by: None,
            approved_at: None,
            superseded_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_high_confidence_not_applied_until_approved() {
        let repo = setup();
        repo.batch_save(&[make("A1", 0.95)]).unwrap();

        assert!(repo.list_applied().unwrap().is_empty(), "高置信度也不能自动生效");
        assert_eq!(repo.list_pending().unwrap().len(), 1);

        assert!(repo.approve("A1", "planner", Utc::now()).unwrap());
        let applied = repo.list_applied().unwrap();
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].approved_by.as_deref(), Some("planner"));
        assert!(!repo.approve("A1", "planner", Utc::now()).unwrap(), "重复审批无效");
    }

    #[test]
    fn test_approve_supersedes_previous_applied() {
        let repo = setup();
        repo.batch_save(&[make("A1", 0.7)]).unwrap();
        repo.approve("A1", "planner", Utc::now()).unwrap();

        // 同目标同类型的新建议生效后，旧调整退出
        let mut second = make("A2", 0.8);
        second.adjustment_magnitude = -20.0;
        repo.batch_save(&[second]).unwrap();
        assert!(repo.approve("A2", "planner", Utc::now()).unwrap());

        let applied = repo.list_applied().unwrap();
        assert_eq!(applied.len(), 1, "同一目标只保留一条生效调整");
        assert_eq!(applied[0].adjustment_id, "A2");

        let old = repo.find_by_id("A1").unwrap().unwrap();
        assert!(!old.applied);
        assert_eq!(old.superseded_by.as_deref(), Some("A2"));
        assert!(!old.is_pending(), "被取代的调整不回到待审");
        assert!(repo.list_pending().unwrap().is_empty());

        // 其他仓库的调整不受影响
        let mut other = make("B1", 0.7);
        other.warehouse = Some("W2".to_string());
        repo.batch_save(&[other]).unwrap();
        repo.approve("B1", "planner", Utc::now()).unwrap();
        assert_eq!(repo.list_applied().unwrap().len(), 2);
    }

    #[test]
    fn test_reject_and_refresh_guard() {
        let repo = setup();
        repo.batch_save(&[make("A1", 0.6)]).unwrap();
        assert!(repo.reject("A1").unwrap());

        // 已驳回的行不可被刷新
        let mut refreshed = make("A1", 0.9);
        refreshed.proposed_value = 42.0;
        repo.batch_save(&[refreshed]).unwrap();

        let loaded = repo.find_by_id("A1").unwrap().unwrap();
        assert!(loaded.rejected);
        assert_eq!(loaded.proposed_value, 5.0);
        assert!(!repo.approve("A1", "planner", Utc::now()).unwrap(), "已驳回不可审批");
    }
}
