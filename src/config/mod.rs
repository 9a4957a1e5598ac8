// ==========================================
// 仓库补货预测系统 - 配置层
// ==========================================
// 职责: 计划参数管理（默认值 + config_kv 覆写）
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod parameters;
pub mod planning_config_trait;
pub mod service_level;

// 重导出核心配置管理器
pub use config_manager::{config_keys, ConfigManager};
pub use parameters::PlanningParameters;
pub use planning_config_trait::{ConfigResult, PlanningConfigReader};
pub use service_level::ServiceLevelTable;
