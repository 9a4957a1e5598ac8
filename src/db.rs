// ==========================================
// 仓库补货预测系统 - SQLite 连接初始化与建表
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为
// - 统一 busy_timeout，减少批次写入时的偶发 busy 错误
// - 建表幂等（CREATE TABLE IF NOT EXISTS），启动与测试共用同一份 schema
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 4;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> =
        conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

/// 初始化全部业务表（幂等）
///
/// 红线:
/// - forecast_detail.method_used / growth_rate_source 不允许为空串（元数据丢失即缺陷）
/// - order_confirmation 以 (sku, 仓库, 订货月) 为主键，重复生成只能 upsert
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS config_kv (
            scope_id TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (scope_id, key)
        );

        CREATE TABLE IF NOT EXISTS sku_master (
            sku_id TEXT PRIMARY KEY,
            description TEXT,
            category TEXT,
            abc_code TEXT,
            xyz_code TEXT,
            status TEXT NOT NULL DEFAULT 'active',
            unit_cost REAL NOT NULL DEFAULT 0,
            unit_price REAL NOT NULL DEFAULT 0,
            supplier TEXT,
            growth_status TEXT NOT NULL DEFAULT 'normal',
            order_multiple INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS inventory_current (
            sku_id TEXT NOT NULL,
            warehouse TEXT NOT NULL,
            on_hand REAL NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (sku_id, warehouse)
        );

        CREATE TABLE IF NOT EXISTS monthly_sales (
            sku_id TEXT NOT NULL,
            warehouse TEXT NOT NULL,
            year_month TEXT NOT NULL,
            units_sold REAL NOT NULL DEFAULT 0,
            stockout_days INTEGER NOT NULL DEFAULT 0,
            corrected_demand REAL NOT NULL DEFAULT 0,
            PRIMARY KEY (sku_id, warehouse, year_month)
        );

        CREATE INDEX IF NOT EXISTS idx_monthly_sales_month
          ON monthly_sales(year_month);

        CREATE TABLE IF NOT EXISTS seasonal_profile (
            sku_id TEXT NOT NULL,
            warehouse TEXT NOT NULL,
            factors_json TEXT NOT NULL,
            pattern_type TEXT NOT NULL,
            peak_months_json TEXT NOT NULL DEFAULT '[]',
            pattern_strength REAL NOT NULL DEFAULT 0,
            overall_confidence REAL NOT NULL DEFAULT 0,
            is_significant INTEGER NOT NULL DEFAULT 0,
            months_analyzed INTEGER NOT NULL DEFAULT 0,
            computed_at TEXT NOT NULL,
            PRIMARY KEY (sku_id, warehouse)
        );

        CREATE TABLE IF NOT EXISTS forecast_run (
            run_id TEXT PRIMARY KEY,
            created_at TEXT NOT NULL,
            requested_by TEXT,
            warehouses_json TEXT,
            status TEXT NOT NULL,
            growth_override REAL,
            forecast_start TEXT,
            total_count INTEGER NOT NULL DEFAULT 0,
            processed_count INTEGER NOT NULL DEFAULT 0,
            failed_count INTEGER NOT NULL DEFAULT 0,
            started_at TEXT,
            completed_at TEXT,
            error_message TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_forecast_run_status
          ON forecast_run(status, created_at);

        CREATE TABLE IF NOT EXISTS forecast_detail (
            run_id TEXT NOT NULL REFERENCES forecast_run(run_id) ON DELETE CASCADE,
            sku_id TEXT NOT NULL,
            warehouse TEXT NOT NULL,
            start_month TEXT NOT NULL,
            monthly_qty_json TEXT NOT NULL,
            monthly_revenue_json TEXT NOT NULL,
            total_qty_forecast REAL NOT NULL,
            total_revenue_forecast REAL NOT NULL,
            avg_monthly_qty REAL NOT NULL,
            base_demand REAL NOT NULL,
            safety_multiplier REAL NOT NULL DEFAULT 1.0,
            method_used TEXT NOT NULL CHECK (method_used <> ''),
            growth_rate_applied REAL NOT NULL DEFAULT 0,
            growth_rate_source TEXT NOT NULL CHECK (growth_rate_source <> ''),
            seasonal_pattern_applied TEXT NOT NULL DEFAULT 'none',
            seasonal_applied INTEGER NOT NULL DEFAULT 0,
            confidence_score REAL NOT NULL,
            calc_reason TEXT,
            created_at TEXT NOT NULL,
            PRIMARY KEY (run_id, sku_id, warehouse)
        );

        CREATE TABLE IF NOT EXISTS forecast_accuracy (
            sku_id TEXT NOT NULL,
            warehouse TEXT NOT NULL,
            period TEXT NOT NULL,
            run_id TEXT NOT NULL,
            method_used TEXT NOT NULL,
            predicted_demand REAL NOT NULL,
            actual_demand REAL,
            absolute_error REAL,
            percentage_error REAL,
            stockout_affected INTEGER NOT NULL DEFAULT 0,
            is_actual_recorded INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            recorded_at TEXT,
            PRIMARY KEY (sku_id, warehouse, period)
        );

        CREATE TABLE IF NOT EXISTS learning_adjustment (
            adjustment_id TEXT PRIMARY KEY,
            sku_id TEXT,
            category TEXT,
            warehouse TEXT,
            adjustment_type TEXT NOT NULL,
            current_value REAL NOT NULL DEFAULT 0,
            proposed_value REAL NOT NULL DEFAULT 0,
            adjustment_magnitude REAL NOT NULL DEFAULT 0,
            confidence_score REAL NOT NULL DEFAULT 0,
            mape_before REAL,
            mape_expected_after REAL,
            sample_size INTEGER NOT NULL DEFAULT 0,
            reason TEXT,
            applied INTEGER NOT NULL DEFAULT 0,
            rejected INTEGER NOT NULL DEFAULT 0,
            approved_by TEXT,
            approved_at TEXT,
            superseded_by TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_learning_adjustment_target
          ON learning_adjustment(adjustment_type, sku_id, category);

        CREATE TABLE IF NOT EXISTS pending_order (
            order_id TEXT PRIMARY KEY,
            sku_id TEXT NOT NULL,
            warehouse TEXT NOT NULL,
            supplier TEXT,
            quantity REAL NOT NULL,
            order_date TEXT NOT NULL,
            expected_arrival TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'ordered'
        );

        CREATE INDEX IF NOT EXISTS idx_pending_order_arrival
          ON pending_order(status, expected_arrival);

        CREATE TABLE IF NOT EXISTS supplier_lead_time (
            supplier TEXT NOT NULL,
            warehouse TEXT NOT NULL,
            avg_lead_time_days REAL NOT NULL,
            p95_lead_time_days REAL,
            min_lead_time_days REAL,
            reliability_score REAL NOT NULL DEFAULT 0.8,
            avg_delay_days_when_late REAL,
            shipments_observed INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (supplier, warehouse)
        );

        CREATE TABLE IF NOT EXISTS stockout_pattern (
            sku_id TEXT NOT NULL,
            pattern_type TEXT NOT NULL,
            frequency_score REAL NOT NULL DEFAULT 0,
            confidence_level TEXT NOT NULL DEFAULT 'low',
            pattern_value TEXT,
            detected_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (sku_id, pattern_type)
        );

        CREATE TABLE IF NOT EXISTS order_confirmation (
            sku_id TEXT NOT NULL,
            warehouse TEXT NOT NULL,
            order_month TEXT NOT NULL,
            suggested_qty REAL NOT NULL,
            confirmed_qty REAL,
            current_inventory REAL NOT NULL,
            effective_pending REAL NOT NULL,
            raw_pending REAL NOT NULL,
            future_pending_ignored REAL NOT NULL DEFAULT 0,
            monthly_demand REAL NOT NULL,
            demand_source TEXT NOT NULL CHECK (demand_source <> ''),
            forecast_demand REAL,
            historical_demand REAL NOT NULL,
            forecast_confidence REAL,
            blend_weight REAL,
            learning_adjustment REAL NOT NULL DEFAULT 0,
            safety_stock REAL NOT NULL,
            reorder_point REAL NOT NULL,
            coverage_days REAL,
            lead_time_days INTEGER NOT NULL,
            lead_time_override INTEGER,
            arrival_override TEXT,
            expected_arrival TEXT NOT NULL,
            urgency TEXT NOT NULL,
            urgency_reason TEXT,
            stockout_escalated INTEGER NOT NULL DEFAULT 0,
            seasonal_multiplier REAL NOT NULL DEFAULT 1.0,
            locked INTEGER NOT NULL DEFAULT 0,
            locked_by TEXT,
            locked_at TEXT,
            generated_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (sku_id, warehouse, order_month)
        );

        CREATE INDEX IF NOT EXISTS idx_order_confirmation_urgency
          ON order_confirmation(order_month, urgency);
        "#,
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();

        assert_eq!(read_schema_version(&conn).unwrap(), None);

        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();

        assert_eq!(
            read_schema_version(&conn).unwrap(),
            Some(CURRENT_SCHEMA_VERSION)
        );
    }

    #[test]
    fn test_forecast_detail_rejects_empty_metadata() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        conn.execute(
            "INSERT INTO forecast_run (run_id, created_at, status) VALUES ('R1', '2026-01-01T00:00:00Z', 'running')",
            [],
        )
        .unwrap();

        let result = conn.execute(
            r#"
            INSERT INTO forecast_detail (
                run_id, sku_id, warehouse, start_month, monthly_qty_json, monthly_revenue_json,
                total_qty_forecast, total_revenue_forecast, avg_monthly_qty, base_demand,
                method_used, growth_rate_source, confidence_score, created_at
            ) VALUES ('R1', 'S1', 'W1', '2026-02', '[]', '[]', 0, 0, 0, 0, '', '', 0, 'now')
            "#,
            [],
        );

        assert!(result.is_err(), "空的 method_used/growth_rate_source 必须被拒绝");
    }
}
