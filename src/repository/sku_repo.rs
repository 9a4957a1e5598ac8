// ==========================================
// 仓库补货预测系统 - SKU 主数据 / 当前库存 仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::sku::Sku;
use crate::domain::supply::InventoryLevel;
use crate::domain::types::{GrowthStatus, SkuStatus};
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex};

const SKU_COLUMNS: &str = r#"
    sku_id, description, category, abc_code, xyz_code, status,
    unit_cost, unit_price, supplier, growth_status, order_multiple
"#;

fn map_sku(row: &Row<'_>) -> SqliteResult<Sku> {
    Ok(Sku {
        sku_id: row.get(0)?,
        description: row.get(1)?,
        category: row.get(2)?,
        abc_code: row.get(3)?,
        xyz_code: row.get(4)?,
        status: SkuStatus::from_str(&row.get::<_, String>(5)?),
        unit_cost: row.get(6)?,
        unit_price: row.get(7)?,
        supplier: row.get(8)?,
        growth_status: GrowthStatus::from_str(&row.get::<_, String>(9)?),
        order_multiple: row.get(10)?,
    })
}

// ==========================================
// SkuRepository - SKU 主数据仓储
// ==========================================
pub struct SkuRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SkuRepository {
    /// 创建新的 SkuRepository 实例
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建仓储实例
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 批量 upsert SKU（单事务）
    pub fn batch_upsert(&self, skus: &[Sku]) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;

        let mut count = 0;
        for sku in skus {
            tx.execute(
                r#"
                INSERT INTO sku_master (
                    sku_id, description, category, abc_code, xyz_code, status,
                    unit_cost, unit_price, supplier, growth_status, order_multiple,
                    created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, datetime('now'), datetime('now'))
                ON CONFLICT(sku_id) DO UPDATE SET
                    description = excluded.description,
                    category = excluded.category,
                    abc_code = excluded.abc_code,
                    xyz_code = excluded.xyz_code,
                    status = excluded.status,
                    unit_cost = excluded.unit_cost,
                    unit_price = excluded.unit_price,
                    supplier = excluded.supplier,
                    growth_status = excluded.growth_status,
                    order_multiple = excluded.order_multiple,
                    updated_at = datetime('now')
                "#,
                params![
                    sku.sku_id,
                    sku.description,
                    sku.category,
                    sku.abc_code,
                    sku.xyz_code,
                    sku.status.as_str(),
                    sku.unit_cost,
                    sku.unit_price,
                    sku.supplier,
                    sku.growth_status.as_str(),
                    sku.order_multiple,
                ],
            )?;
            count += 1;
        }

        tx.commit()?;
        Ok(count)
    }

    /// 按 sku_id 查询
    pub fn find_by_id(&self, sku_id: &str) -> RepositoryResult<Option<Sku>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM sku_master WHERE sku_id = ?1", SKU_COLUMNS);
        let sku = conn.query_row(&sql, params![sku_id], map_sku).optional()?;
        Ok(sku)
    }

    /// 查询全部 SKU（批量读取）
    pub fn list_all(&self) -> RepositoryResult<Vec<Sku>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM sku_master ORDER BY sku_id", SKU_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let skus = stmt
            .query_map([], map_sku)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(skus)
    }

    /// 更新生命周期状态
    pub fn update_status(&self, sku_id: &str, status: SkuStatus) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            "UPDATE sku_master SET status = ?1, updated_at = datetime('now') WHERE sku_id = ?2",
            params![status.as_str(), sku_id],
        )?;
        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "Sku".to_string(),
                id: sku_id.to_string(),
            });
        }
        Ok(())
    }
}

// ==========================================
// InventoryRepository - 当前库存仓储
// ==========================================
pub struct InventoryRepository {
    conn: Arc<Mutex<Connection>>,
}

impl InventoryRepository {
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 批量 upsert 当前库存
    pub fn batch_upsert(&self, levels: &[InventoryLevel]) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;
        for level in levels {
            tx.execute(
                r#"
                INSERT INTO inventory_current (sku_id, warehouse, on_hand, updated_at)
                VALUES (?1, ?2, ?3, datetime('now'))
                ON CONFLICT(sku_id, warehouse) DO UPDATE SET
                    on_hand = excluded.on_hand,
                    updated_at = datetime('now')
                "#,
                params![level.sku_id, level.warehouse, level.on_hand],
            )?;
        }
        tx.commit()?;
        Ok(levels.len())
    }

    /// 查询全部库存（批量读取）
    pub fn list_all(&self) -> RepositoryResult<Vec<InventoryLevel>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT sku_id, warehouse, on_hand FROM inventory_current ORDER BY sku_id, warehouse",
        )?;
        let levels = stmt
            .query_map([], |row| {
                Ok(InventoryLevel {
                    sku_id: row.get(0)?,
                    warehouse: row.get(1)?,
                    on_hand: row.get(2)?,
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(levels)
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

    fn make_sku(id: &str) -> Sku {
        Sku {
            sku_id: id.to_string(),
            description: Some("测试商品".to_string()),
            category: Some("CAT1".to_string()),
            abc_code: Some("A".to_string()),
            xyz_code: Some("X".to_string()),
            status: SkuStatus::Active,
            unit_cost: 10.0,
            unit_price: 15.0,
            supplier: Some("SUP1".to_string()),
            growth_status: GrowthStatus::Normal,
            order_multiple: 25,
        }
    }

    #[test]
    fn test_upsert_and_find() {
        let repo = SkuRepository::from_connection(setup_test_db());
        repo.batch_upsert(&[make_sku("S1"), make_sku("S2")]).unwrap();

        let mut s1 = make_sku("S1");
        s1.status = SkuStatus::DeathRow;
        repo.batch_upsert(&[s1]).unwrap();

        let all = repo.list_all().unwrap();
        assert_eq!(all.len(), 2, "upsert 不应产生重复行");

        let found = repo.find_by_id("S1").unwrap().unwrap();
        assert_eq!(found.status, SkuStatus::DeathRow);
        assert_eq!(found.order_multiple, 25);
        assert!(repo.find_by_id("NOPE").unwrap().is_none());
    }

    #[test]
    fn test_update_status_missing_sku() {
        let repo = SkuRepository::from_connection(setup_test_db());
        let err = repo.update_status("NOPE", SkuStatus::Discontinued).unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound { .. }));
    }

    #[test]
    fn test_inventory_upsert() {
        let conn = setup_test_db();
        let repo = InventoryRepository::from_connection(conn);
        let level = |qty| InventoryLevel {
            sku_id: "S1".to_string(),
            warehouse: "W1".to_string(),
            on_hand: qty,
        };
        repo.batch_upsert(&[level(10.0)]).unwrap();
        repo.batch_upsert(&[level(25.0)]).unwrap();

        let all = repo.list_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].on_hand, 25.0);
    }
}
