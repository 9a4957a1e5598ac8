// ==========================================
// 仓库补货预测系统 - 季节画像仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================

use crate::domain::seasonal::SeasonalProfile;
use crate::domain::types::SeasonalPatternType;
use crate::repository::common::parse_datetime;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, Result as SqliteResult};
use std::sync::{Arc, Mutex};

/// 数据库行（JSON 列尚未解析）
struct SeasonalProfileRow {
    sku_id: String,
    warehouse: String,
    factors_json: String,
    pattern_type: String,
    peak_months_json: String,
    pattern_strength: f64,
    overall_confidence: f64,
    is_significant: bool,
    months_analyzed: i64,
    computed_at: String,
}

impl SeasonalProfileRow {
    fn into_profile(self) -> RepositoryResult<SeasonalProfile> {
        Ok(SeasonalProfile {
            sku_id: self.sku_id,
            warehouse: self.warehouse,
            factors: serde_json::from_str(&self.factors_json)?,
            pattern_type: SeasonalPatternType::from_str(&self.pattern_type),
            peak_months: serde_json::from_str(&self.peak_months_json)?,
            pattern_strength: self.pattern_strength,
            overall_confidence: self.overall_confidence,
            is_significant: self.is_significant,
            months_analyzed: self.months_analyzed.max(0) as u32,
            computed_at: parse_datetime(&self.computed_at),
        })
    }
}

// ==========================================
// SeasonalProfileRepository - 季节画像仓储
// ==========================================
pub struct SeasonalProfileRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SeasonalProfileRepository {
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 批量 upsert 季节画像（单事务）
    pub fn batch_upsert(&self, profiles: &[SeasonalProfile]) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;
        for p in profiles {
            tx.execute(
                r#"
                INSERT INTO seasonal_profile (
                    sku_id, warehouse, factors_json, pattern_type, peak_months_json,
                    pattern_strength, overall_confidence, is_significant, months_analyzed, computed_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                ON CONFLICT(sku_id, warehouse) DO UPDATE SET
                    factors_json = excluded.factors_json,
                    pattern_type = excluded.pattern_type,
                    peak_months_json = excluded.peak_months_json,
                    pattern_strength = excluded.pattern_strength,
                    overall_confidence = excluded.overall_confidence,
                    is_significant = excluded.is_significant,
                    months_analyzed = excluded.months_analyzed,
                    computed_at = excluded.computed_at
                "#,
                params![
                    p.sku_id,
                    p.warehouse,
                    serde_json::to_string(&p.factors)?,
                    p.pattern_type.as_str(),
                    serde_json::to_string(&p.peak_months)?,
                    p.pattern_strength,
                    p.overall_confidence,
                    p.is_significant,
                    p.months_analyzed as i64,
                    p.computed_at.to_rfc3339(),
                ],
            )?;
        }
        tx.commit()?;
        Ok(profiles.len())
    }

    /// 查询全部季节画像（批量读取）
    pub fn list_all(&self) -> RepositoryResult<Vec<SeasonalProfile>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT sku_id, warehouse, factors_json, pattern_type, peak_months_json,
                   pattern_strength, overall_confidence, is_significant, months_analyzed, computed_at
            FROM seasonal_profile
            ORDER BY sku_id, warehouse
            "#,
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(SeasonalProfileRow {
                    sku_id: row.get(0)?,
                    warehouse: row.get(1)?,
                    factors_json: row.get(2)?,
                    pattern_type: row.get(3)?,
                    peak_months_json: row.get(4)?,
                    pattern_strength: row.get(5)?,
                    overall_confidence: row.get(6)?,
                    is_significant: row.get(7)?,
                    months_analyzed: row.get(8)?,
                    computed_at: row.get(9)?,
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;

        rows.into_iter().map(SeasonalProfileRow::into_profile).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_schema;

    #[test]
    fn test_upsert_and_list() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        let repo = SeasonalProfileRepository::from_connection(Arc::new(Mutex::new(conn)));

        let mut profile = SeasonalProfile::neutral("S1", "W1");
        profile.factors[6] = 1.4;
        profile.peak_months = vec![7];
        profile.pattern_type = SeasonalPatternType::SummerPeak;
        repo.batch_upsert(&[profile.clone()]).unwrap();

        profile.overall_confidence = 0.7;
        repo.batch_upsert(&[profile]).unwrap();

        let all = repo.list_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].pattern_type, SeasonalPatternType::SummerPeak);
        assert_eq!(all[0].peak_months, vec![7]);
        assert!((all[0].factors[6] - 1.4).abs() < 1e-9);
        assert_eq!(all[0].overall_confidence, 0.7);
    }
}
