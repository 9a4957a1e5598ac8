// ==========================================
// 仓库补货预测系统 - 计划参数读取 Trait
// ==========================================
// 职责: 定义批次编排所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use crate::config::parameters::PlanningParameters;
use crate::config::service_level::ServiceLevelTable;
use async_trait::async_trait;
use std::error::Error;

/// 配置读取结果
pub type ConfigResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

// ==========================================
// PlanningConfigReader Trait
// ==========================================
// 实现者: ConfigManager（从 config_kv 表读取）
#[async_trait]
pub trait PlanningConfigReader: Send + Sync {
    /// 月度复盘周期（默认 30 天）
    async fn get_review_period_days(&self) -> ConfigResult<i64>;

    /// 在途订单拉取展望（默认 180 天）
    async fn get_pending_fetch_horizon_days(&self) -> ConfigResult<i64>;

    /// 默认提前期（默认 60 天）
    async fn get_default_lead_time_days(&self) -> ConfigResult<i64>;

    /// 置信度混合边界 (low, high)，默认 (0.5, 0.75)
    async fn get_blend_thresholds(&self) -> ConfigResult<(f64, f64)>;

    /// 增长率边界 (cap, viral_floor, declining_cap)，默认 (0.5, 0.2, -0.1)
    async fn get_growth_bounds(&self) -> ConfigResult<(f64, f64, f64)>;

    /// 服务水平 z 值表
    async fn get_service_level_table(&self) -> ConfigResult<ServiceLevelTable>;

    /// 待淘汰 SKU 是否参与补货（默认 true）
    async fn get_include_death_row(&self) -> ConfigResult<bool>;

    /// 预测批次内的并行度（默认 4）
    async fn get_forecast_parallelism(&self) -> ConfigResult<usize>;

    /// 一次性读取全部计划参数
    ///
    /// # 逻辑
    /// 1. 逐项读取，缺失或格式错误回退默认值
    /// 2. 返回快照，批次计算期间不再读取配置
    async fn load_parameters(&self) -> ConfigResult<PlanningParameters>;
}
