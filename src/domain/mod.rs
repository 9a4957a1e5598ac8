// ==========================================
// 仓库补货预测系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod accuracy;
pub mod forecast;
pub mod order;
pub mod sales;
pub mod seasonal;
pub mod sku;
pub mod supply;
pub mod types;

// 重导出核心类型
pub use accuracy::{percentage_error, ForecastAccuracyRecord, LearningAdjustment};
pub use forecast::{ForecastDetail, ForecastRequest, ForecastRun};
pub use order::{ConfirmationEdit, OrderConfirmation, PendingContribution, PendingTimingReport};
pub use sales::{availability_rate, corrected_demand, MonthlySalesRecord};
pub use seasonal::SeasonalProfile;
pub use sku::Sku;
pub use supply::{InventoryLevel, PendingOrder, StockoutPattern, SupplierLeadTimeProfile};
pub use types::{
    AbcCode, AdjustmentType, CalculationMethod, Classification, ConfidenceLevel, DemandSource,
    ForecastRunStatus, GrowthRateSource, GrowthStatus, PendingBucket, PendingOrderStatus,
    SeasonalPatternType, SkuStatus, StockoutPatternType, UrgencyLevel, XyzCode, YearMonth,
};
