// ==========================================
// 仓库补货预测系统 - 服务层
// ==========================================
// 职责: 批次编排（批量读取 → 纯计算 → 批量写入）与任务队列
// 红线: 服务层不写规则，规则全部在 engine
// ==========================================

pub mod accuracy_service;
pub mod error;
pub mod forecast_queue;
pub mod forecast_service;
pub mod learning_service;
pub mod order_service;

pub use accuracy_service::{AccuracyService, AccuracyUpdateReport};
pub use error::{ServiceError, ServiceResult};
pub use forecast_queue::{ForecastJobQueue, JobQueueState};
pub use forecast_service::{BatchOutcome, ForecastBatchService};
pub use learning_service::LearningService;
pub use order_service::{OrderGenerationReport, OrderService};
