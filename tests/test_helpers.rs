// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 临时数据库初始化 + 主数据/销售数据构造
// ==========================================

#![allow(dead_code)]

use rusqlite::Connection;
use std::error::Error;
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;
use warehouse_planner::db::{init_schema, open_sqlite_connection};
use warehouse_planner::domain::{MonthlySalesRecord, Sku};
use warehouse_planner::repository::{SalesRepository, SkuRepository};
use warehouse_planner::{GrowthStatus, SkuStatus, YearMonth};

/// 创建临时测试数据库并初始化 schema
///
/// # 返回
/// - NamedTempFile: 临时数据库文件（需要保持存活）
/// - Arc<Mutex<Connection>>: 共享连接
pub fn create_test_db() -> Result<(NamedTempFile, Arc<Mutex<Connection>>), Box<dyn Error>> {
    let temp_file = NamedTempFile::new()?;
    let db_path = temp_file
        .path()
        .to_str()
        .ok_or("临时文件路径不是 UTF-8")?
        .to_string();

    let conn = open_sqlite_connection(&db_path)?;
    init_schema(&conn)?;

    Ok((temp_file, Arc::new(Mutex::new(conn))))
}

pub fn ym(year: i32, month: u32) -> YearMonth {
    YearMonth::new(year, month).unwrap()
}

/// 构造 SKU 主数据
pub fn sku(id: &str, abc: &str, xyz: &str) -> Sku {
    Sku {
        sku_id: id.to_string(),
        description: Some(format!("测试商品 {}", id)),
        category: Some("CAT1".to_string()),
        abc_code: Some(abc.to_string()),
        xyz_code: Some(xyz.to_string()),
        status: SkuStatus::Active,
        unit_cost: 5.0,
        unit_price: 10.0,
        supplier: Some("SUP1".to_string()),
        growth_status: GrowthStatus::Normal,
        order_multiple: 1,
    }
}

/// 连续月份的销售记录（无缺货）
pub fn flat_sales(sku_id: &str, warehouse: &str, start: YearMonth, months: usize, units: f64) -> Vec<MonthlySalesRecord> {
    (0..months)
        .map(|i| MonthlySalesRecord::new(sku_id, warehouse, start.add_months(i as i32), units, 0))
        .collect()
}

/// 写入 SKU 主数据与销售记录
pub fn seed(conn: &Arc<Mutex<Connection>>, skus: &[Sku], sales: &[MonthlySalesRecord]) {
    SkuRepository::from_connection(conn.clone())
        .batch_upsert(skus)
        .unwrap();
    SalesRepository::from_connection(conn.clone())
        .batch_upsert(sales)
        .unwrap();
}
