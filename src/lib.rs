// ==========================================
// 仓库补货预测系统 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 决策支持系统 (补货数量由人工最终确认)
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 预测与补货规则
pub mod engine;

// 服务层 - 批次编排与任务队列
pub mod services;

// 配置层 - 计划参数
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA/建表）
pub mod db;

// 日志系统
pub mod logging;

// SQL 计数与耗时统计
pub mod perf;

// ==========================================
// 重导出核心类型
// ==========================================

pub use domain::types::{
    AbcCode, CalculationMethod, Classification, DemandSource, ForecastRunStatus,
    GrowthRateSource, GrowthStatus, SkuStatus, UrgencyLevel, XyzCode, YearMonth,
};

pub use domain::{
    ForecastAccuracyRecord, ForecastDetail, ForecastRun, LearningAdjustment, MonthlySalesRecord,
    OrderConfirmation, PendingOrder, SeasonalProfile, Sku, StockoutPattern,
    SupplierLeadTimeProfile,
};

pub use engine::{
    AccuracyTracker, DemandStatsProvider, ForecastEngine, GrowthRateEstimator,
    LearningRecommender, MonthlyOrderEngine, PendingInventoryCalculator, SafetyStockCalculator,
    SeasonalPatternDetector, TestLaunchPatternDetector, UrgencyEngine,
};

pub use services::{
    AccuracyService, ForecastBatchService, ForecastJobQueue, LearningService, OrderService,
    ServiceError, ServiceResult,
};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "仓库补货预测系统";

// 预测展望月数（固定 12 个月）
pub const FORECAST_HORIZON_MONTHS: usize = 12;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
        assert_eq!(FORECAST_HORIZON_MONTHS, 12);
    }
}
