// ==========================================
// 仓库补货预测系统 - 引擎层
// ==========================================
// 职责: 实现预测与补货规则引擎,不拼 SQL
// 红线: Engine 不拼 SQL, 所有规则必须输出 reason
// ==========================================

pub mod accuracy;
pub mod classification;
pub mod demand_stats;
pub mod error;
pub mod forecast;
pub mod growth;
pub mod learning;
pub mod new_sku;
pub mod order_engine;
pub mod pending;
pub mod safety_stock;
pub mod seasonal;
pub mod stats;
pub mod urgency;

// 重导出核心引擎
pub use accuracy::{AccuracySummary, AccuracyTracker, MethodAccuracy};
pub use classification::CellPolicy;
pub use demand_stats::{DemandPoint, DemandStats, DemandStatsProvider};
pub use error::{EngineError, EngineResult};
pub use forecast::{BaseDemand, ForecastEngine, ForecastInput};
pub use growth::{GrowthEstimate, GrowthRateEstimator, TrendFit};
pub use learning::{LearningRecommender, SkuBias};
pub use new_sku::{LaunchPattern, TestLaunchPatternDetector};
pub use order_engine::{DemandBlend, MonthlyOrderEngine, OrderPlanningSnapshot, PairKey};
pub use pending::{PendingInventoryCalculator, SupplierProfileIndex};
pub use safety_stock::{SafetyStockCalculator, SafetyStockResult};
pub use seasonal::SeasonalPatternDetector;
pub use urgency::{UrgencyDecision, UrgencyEngine};
