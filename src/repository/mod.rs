// ==========================================
// 仓库补货预测系统 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod accuracy_repo;
pub mod common;
pub mod error;
pub mod forecast_repo;
pub mod learning_repo;
pub mod order_confirmation_repo;
pub mod sales_repo;
pub mod seasonal_repo;
pub mod sku_repo;
pub mod supply_repo;

// 重导出核心仓储
pub use accuracy_repo::AccuracyRepository;
pub use error::{RepositoryError, RepositoryResult};
pub use forecast_repo::{ForecastDetailRepository, ForecastRunRepository};
pub use learning_repo::LearningAdjustmentRepository;
pub use order_confirmation_repo::OrderConfirmationRepository;
pub use sales_repo::SalesRepository;
pub use seasonal_repo::SeasonalProfileRepository;
pub use sku_repo::{InventoryRepository, SkuRepository};
pub use supply_repo::{PendingOrderRepository, StockoutPatternRepository, SupplierLeadTimeRepository};
