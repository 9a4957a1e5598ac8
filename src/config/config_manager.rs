// ==========================================
// 仓库补货预测系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::parameters::PlanningParameters;
use crate::config::planning_config_trait::{ConfigResult, PlanningConfigReader};
use crate::config::service_level::ServiceLevelTable;
use crate::db::open_sqlite_connection;
use async_trait::async_trait;
use rusqlite::{params, Connection};
use serde_json::json;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> ConfigResult<Self> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> ConfigResult<Self> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    fn get_config_value(&self, key: &str) -> ConfigResult<Option<String>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 读取 global scope 的配置值（公开方法，供其他模块复用）
    pub fn get_global_config_value(&self, key: &str) -> ConfigResult<Option<String>> {
        self.get_config_value(key)
    }

    /// 从 config_kv 表读取配置值，带默认值
    fn get_config_or_default(&self, key: &str, default: &str) -> ConfigResult<String> {
        Ok(self.get_config_value(key)?.unwrap_or_else(|| default.to_string()))
    }

    /// 读取并解析，格式错误时告警并回退默认值
    fn get_parsed_or<T: FromStr + Copy + std::fmt::Display>(
        &self,
        key: &str,
        default: T,
    ) -> ConfigResult<T> {
        let raw = match self.get_config_value(key)? {
            Some(v) => v,
            None => return Ok(default),
        };
        match raw.trim().parse::<T>() {
            Ok(v) => Ok(v),
            Err(_) => {
                tracing::warn!(
                    config_key = key,
                    raw_value = %raw,
                    default = %default,
                    "配置值格式错误，使用默认值"
                );
                Ok(default)
            }
        }
    }

    /// 写入（覆写）global 配置
    pub fn set_value(&self, key: &str, value: &str) -> ConfigResult<()> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value, updated_at) VALUES ('global', ?1, ?2, datetime('now'))
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        tracing::info!(config_key = key, value, "配置已更新");
        Ok(())
    }

    /// 获取所有配置的快照（JSON格式）
    ///
    /// # 用途
    /// - 随预测批次记录当时的参数口径
    pub fn get_config_snapshot(&self) -> ConfigResult<String> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;

        let mut config_map: HashMap<String, String> = HashMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        Ok(serde_json::to_string(&json!(config_map))?)
    }

    /// 同步读取全部计划参数（供非 async 调用方使用）
    pub fn load_parameters_sync(&self) -> ConfigResult<PlanningParameters> {
        let d = PlanningParameters::default();

        let service_levels = match self.get_config_value(config_keys::SERVICE_LEVEL_OVERRIDES)? {
            Some(raw) => ServiceLevelTable::from_json(&raw),
            None => ServiceLevelTable::default(),
        };

        let include_death_row = parse_bool(
            &self.get_config_or_default(config_keys::INCLUDE_DEATH_ROW, "true")?,
            d.include_death_row,
        );

        let params = PlanningParameters {
            review_period_days: self
                .get_parsed_or(config_keys::REVIEW_PERIOD_DAYS, d.review_period_days)?
                .max(1),
            pending_fetch_horizon_days: self.get_parsed_or(
                config_keys::PENDING_FETCH_HORIZON_DAYS,
                d.pending_fetch_horizon_days,
            )?,
            default_supplier_reliability: self
                .get_parsed_or(
                    config_keys::DEFAULT_SUPPLIER_RELIABILITY,
                    d.default_supplier_reliability,
                )?
                .clamp(0.0, 1.0),
            default_lead_time_days: self
                .get_parsed_or(config_keys::DEFAULT_LEAD_TIME_DAYS, d.default_lead_time_days)?
                .max(0),
            default_demand_cv: self
                .get_parsed_or(config_keys::DEFAULT_DEMAND_CV, d.default_demand_cv)?
                .max(0.0),
            blend_low_confidence: self
                .get_parsed_or(config_keys::BLEND_LOW_CONFIDENCE, d.blend_low_confidence)?,
            blend_high_confidence: self
                .get_parsed_or(config_keys::BLEND_HIGH_CONFIDENCE, d.blend_high_confidence)?,
            growth_cap_annual: self
                .get_parsed_or(config_keys::GROWTH_CAP_ANNUAL, d.growth_cap_annual)?
                .abs(),
            viral_growth_floor_annual: self.get_parsed_or(
                config_keys::VIRAL_GROWTH_FLOOR_ANNUAL,
                d.viral_growth_floor_annual,
            )?,
            declining_growth_cap_annual: self.get_parsed_or(
                config_keys::DECLINING_GROWTH_CAP_ANNUAL,
                d.declining_growth_cap_annual,
            )?,
            seasonal_confidence_threshold: self.get_parsed_or(
                config_keys::SEASONAL_CONFIDENCE_THRESHOLD,
                d.seasonal_confidence_threshold,
            )?,
            overdue_delay_confidence: self
                .get_parsed_or(
                    config_keys::OVERDUE_DELAY_CONFIDENCE,
                    d.overdue_delay_confidence,
                )?
                .clamp(0.0, 1.0),
            overdue_unknown_confidence: self
                .get_parsed_or(
                    config_keys::OVERDUE_UNKNOWN_CONFIDENCE,
                    d.overdue_unknown_confidence,
                )?
                .clamp(0.0, 1.0),
            include_death_row,
            forecast_parallelism: self
                .get_parsed_or(config_keys::FORECAST_PARALLELISM, d.forecast_parallelism)?
                .max(1),
            default_order_multiple: self
                .get_parsed_or(config_keys::DEFAULT_ORDER_MULTIPLE, d.default_order_multiple)?
                .max(1),
            service_levels,
        };

        if params.blend_low_confidence > params.blend_high_confidence {
            tracing::warn!(
                low = params.blend_low_confidence,
                high = params.blend_high_confidence,
                "混合阈值配置颠倒，使用默认值"
            );
            return Ok(PlanningParameters {
                blend_low_confidence: d.blend_low_confidence,
                blend_high_confidence: d.blend_high_confidence,
                ..params
            });
        }

        Ok(params)
    }
}

fn parse_bool(raw: &str, default: bool) -> bool {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

// ==========================================
// PlanningConfigReader Trait 实现
// ==========================================
#[async_trait]
impl PlanningConfigReader for ConfigManager {
    async fn get_review_period_days(&self) -> ConfigResult<i64> {
        Ok(self.get_parsed_or(config_keys::REVIEW_PERIOD_DAYS, 30i64)?.max(1))
    }

    async fn get_pending_fetch_horizon_days(&self) -> ConfigResult<i64> {
        self.get_parsed_or(config_keys::PENDING_FETCH_HORIZON_DAYS, 180i64)
    }

    async fn get_default_lead_time_days(&self) -> ConfigResult<i64> {
        self.get_parsed_or(config_keys::DEFAULT_LEAD_TIME_DAYS, 60i64)
    }

    async fn get_blend_thresholds(&self) -> ConfigResult<(f64, f64)> {
        let p = self.load_parameters_sync()?;
        Ok((p.blend_low_confidence, p.blend_high_confidence))
    }

    async fn get_growth_bounds(&self) -> ConfigResult<(f64, f64, f64)> {
        let cap = self.get_parsed_or(config_keys::GROWTH_CAP_ANNUAL, 0.5f64)?.abs();
        let viral = self.get_parsed_or(config_keys::VIRAL_GROWTH_FLOOR_ANNUAL, 0.2f64)?;
        let declining = self.get_parsed_or(config_keys::DECLINING_GROWTH_CAP_ANNUAL, -0.1f64)?;
        Ok((cap, viral, declining))
    }

    async fn get_service_level_table(&self) -> ConfigResult<ServiceLevelTable> {
        let value = self.get_config_or_default(config_keys::SERVICE_LEVEL_OVERRIDES, "{}")?;
        Ok(ServiceLevelTable::from_json(&value))
    }

    async fn get_include_death_row(&self) -> ConfigResult<bool> {
        let value = self.get_config_or_default(config_keys::INCLUDE_DEATH_ROW, "true")?;
        Ok(parse_bool(&value, true))
    }

    async fn get_forecast_parallelism(&self) -> ConfigResult<usize> {
        Ok(self.get_parsed_or(config_keys::FORECAST_PARALLELISM, 4usize)?.max(1))
    }

    async fn load_parameters(&self) -> ConfigResult<PlanningParameters> {
        self.load_parameters_sync()
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 周期与展望
    pub const REVIEW_PERIOD_DAYS: &str = "review_period_days";
    pub const PENDING_FETCH_HORIZON_DAYS: &str = "pending_fetch_horizon_days";

    // 缺省口径
    pub const DEFAULT_SUPPLIER_RELIABILITY: &str = "default_supplier_reliability";
    pub const DEFAULT_LEAD_TIME_DAYS: &str = "default_lead_time_days";
    pub const DEFAULT_DEMAND_CV: &str = "default_demand_cv";
    pub const DEFAULT_ORDER_MULTIPLE: &str = "default_order_multiple";

    // 置信度混合
    pub const BLEND_LOW_CONFIDENCE: &str = "blend_low_confidence";
    pub const BLEND_HIGH_CONFIDENCE: &str = "blend_high_confidence";

    // 增长率边界
    pub const GROWTH_CAP_ANNUAL: &str = "growth_cap_annual";
    pub const VIRAL_GROWTH_FLOOR_ANNUAL: &str = "viral_growth_floor_annual";
    pub const DECLINING_GROWTH_CAP_ANNUAL: &str = "declining_growth_cap_annual";

    // 季节
    pub const SEASONAL_CONFIDENCE_THRESHOLD: &str = "seasonal_confidence_threshold";

    // 逾期在途
    pub const OVERDUE_DELAY_CONFIDENCE: &str = "overdue_delay_confidence";
    pub const OVERDUE_UNKNOWN_CONFIDENCE: &str = "overdue_unknown_confidence";

    // 范围与并行
    pub const INCLUDE_DEATH_ROW: &str = "include_death_row";
    pub const FORECAST_PARALLELISM: &str = "forecast_parallelism";

    // 服务水平覆写 (JSON)
    pub const SERVICE_LEVEL_OVERRIDES: &str = "service_level_overrides";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_schema;

    fn manager() -> ConfigManager {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        ConfigManager::from_connection(Arc::new(Mutex::new(conn))).unwrap()
    }

    #[tokio::test]
    async fn test_defaults_when_empty() {
        let cfg = manager();
        let params = cfg.load_parameters().await.unwrap();
        assert_eq!(params.review_period_days, 30);
        assert_eq!(params.default_lead_time_days, 60);
        assert_eq!(params.blend_low_confidence, 0.5);
        assert_eq!(params.blend_high_confidence, 0.75);
        assert!(params.include_death_row);
    }

    #[tokio::test]
    async fn test_set_value_and_bad_value_fallback() {
        let cfg = manager();
        cfg.set_value(config_keys::REVIEW_PERIOD_DAYS, "28").unwrap();
        cfg.set_value(config_keys::DEFAULT_LEAD_TIME_DAYS, "abc").unwrap();
        cfg.set_value(config_keys::INCLUDE_DEATH_ROW, "false").unwrap();

        assert_eq!(cfg.get_review_period_days().await.unwrap(), 28);
        assert_eq!(cfg.get_default_lead_time_days().await.unwrap(), 60, "格式错误回退默认值");
        assert!(!cfg.get_include_death_row().await.unwrap());
    }

    #[tokio::test]
    async fn test_inverted_blend_thresholds_fall_back() {
        let cfg = manager();
        cfg.set_value(config_keys::BLEND_LOW_CONFIDENCE, "0.9").unwrap();
        cfg.set_value(config_keys::BLEND_HIGH_CONFIDENCE, "0.6").unwrap();

        let (low, high) = cfg.get_blend_thresholds().await.unwrap();
        assert_eq!((low, high), (0.5, 0.75));
    }

    #[test]
    fn test_config_snapshot_contains_keys() {
        let cfg = manager();
        cfg.set_value(config_keys::FORECAST_PARALLELISM, "8").unwrap();
        let snapshot = cfg.get_config_snapshot().unwrap();
        assert!(snapshot.contains("forecast_parallelism"));
    }
}
