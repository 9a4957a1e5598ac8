// ==========================================
// 仓库补货预测系统 - 月度补货服务
// ==========================================
// 职责: 月度补货确认单的生成与人工确认流程
// 流程: 批量取数 → OrderPlanningSnapshot → 纯计算 → 单事务 upsert
// 红线:
// - 计算阶段不访问存储
// - 重新生成只刷新系统字段，用户字段与锁定字段保持不变
// - 锁定行拒绝编辑
// ==========================================

use crate::config::ConfigManager;
use crate::domain::order::{ConfirmationEdit, OrderConfirmation};
use crate::domain::types::YearMonth;
use crate::engine::demand_stats::DemandStatsProvider;
use crate::engine::order_engine::{MonthlyOrderEngine, OrderPlanningSnapshot, PairKey};
use crate::perf::PerfGuard;
use crate::repository::{
    ForecastDetailRepository, InventoryRepository, LearningAdjustmentRepository,
    OrderConfirmationRepository, PendingOrderRepository, SalesRepository,
    SeasonalProfileRepository, SkuRepository, StockoutPatternRepository,
    SupplierLeadTimeRepository,
};
use crate::services::error::{ServiceError, ServiceResult};
use chrono::{Duration, NaiveDate, Utc};
use rusqlite::Connection;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tracing::{info, instrument};

/// 生成结果
#[derive(Debug, Clone, Serialize)]
pub struct OrderGenerationReport {
    pub order_month: YearMonth,
    pub rows: usize,
    pub by_urgency: BTreeMap<String, usize>,
    pub total_suggested_qty: f64,
}

pub struct OrderService {
    config: ConfigManager,
    sku_repo: SkuRepository,
    inventory_repo: InventoryRepository,
    sales_repo: SalesRepository,
    seasonal_repo: SeasonalProfileRepository,
    detail_repo: ForecastDetailRepository,
    pending_repo: PendingOrderRepository,
    supplier_repo: SupplierLeadTimeRepository,
    stockout_repo: StockoutPatternRepository,
    learning_repo: LearningAdjustmentRepository,
    confirmation_repo: OrderConfirmationRepository,
}

impl OrderService {
    pub fn new(conn: Arc<Mutex<Connection>>) -> ServiceResult<Self> {
        let config = ConfigManager::from_connection(conn.clone())
            .map_err(|e| ServiceError::Config(e.to_string()))?;
        Ok(Self {
            config,
            sku_repo: SkuRepository::from_connection(conn.clone()),
            inventory_repo: InventoryRepository::from_connection(conn.clone()),
            sales_repo: SalesRepository::from_connection(conn.clone()),
            seasonal_repo: SeasonalProfileRepository::from_connection(conn.clone()),
            detail_repo: ForecastDetailRepository::from_connection(conn.clone()),
            pending_repo: PendingOrderRepository::from_connection(conn.clone()),
            supplier_repo: SupplierLeadTimeRepository::from_connection(conn.clone()),
            stockout_repo: StockoutPatternRepository::from_connection(conn.clone()),
            learning_repo: LearningAdjustmentRepository::from_connection(conn.clone()),
            confirmation_repo: OrderConfirmationRepository::from_connection(conn),
        })
    }

    // ==========================================
    // 生成
    // ==========================================

    /// 生成（或重新生成）某月的补货确认单
    #[instrument(skip(self), fields(order_month = %order_month))]
    pub fn generate(
        &self,
        order_month: YearMonth,
        today: NaiveDate,
    ) -> ServiceResult<OrderGenerationReport> {
        let _perf = PerfGuard::new("order_generate");
        let params = self
            .config
            .load_parameters_sync()
            .map_err(|e| ServiceError::Config(e.to_string()))?;

        // 1. 批量取数
        let snapshot = self.load_snapshot(order_month, today, params.pending_fetch_horizon_days)?;

        // 2. 纯计算
        let engine = MonthlyOrderEngine::new(&params);
        let rows = engine.compute_all(&snapshot, order_month, today);

        // 3. 单事务写入
        self.confirmation_repo.batch_upsert_generated(&rows)?;

        let report = Self::summarize(order_month, &rows);
        info!(
            rows = report.rows,
            total_suggested_qty = report.total_suggested_qty,
            "补货确认单已生成"
        );
        Ok(report)
    }

    /// 批量读取计算所需的全部参考数据（每表一次查询）
    pub fn load_snapshot(
        &self,
        order_month: YearMonth,
        today: NaiveDate,
        pending_fetch_horizon_days: i64,
    ) -> ServiceResult<OrderPlanningSnapshot> {
        let skus = self
            .sku_repo
            .list_all()?
            .into_iter()
            .map(|s| (s.sku_id.clone(), s))
            .collect();

        let inventory = self
            .inventory_repo
            .list_all()?
            .into_iter()
            .map(|i| ((i.sku_id, i.warehouse), i.on_hand))
            .collect();

        let mut pending: HashMap<PairKey, Vec<_>> = HashMap::new();
        for order in self
            .pending_repo
            .list_open_until(today + Duration::days(pending_fetch_horizon_days))?
        {
            pending
                .entry((order.sku_id.clone(), order.warehouse.clone()))
                .or_default()
                .push(order);
        }

        let mut forecasts = HashMap::new();
        for detail in self.detail_repo.list_latest_completed()? {
            forecasts
                .entry((detail.sku_id.clone(), detail.warehouse.clone()))
                .or_insert(detail);
        }

        let supplier_profiles = self
            .supplier_repo
            .list_all()?
            .into_iter()
            .map(|p| ((p.supplier.clone(), p.warehouse.clone()), p))
            .collect();

        let sales = self.sales_repo.list_all(None)?;
        let latest = self.sales_repo.latest_month()?;
        let demand = DemandStatsProvider::new().build_all(&sales, latest);

        let seasonal = self
            .seasonal_repo
            .list_all()?
            .into_iter()
            .map(|p| ((p.sku_id.clone(), p.warehouse.clone()), p))
            .collect();

        let existing = self
            .confirmation_repo
            .list_by_month(order_month)?
            .into_iter()
            .map(|r| ((r.sku_id.clone(), r.warehouse.clone()), r))
            .collect();

        Ok(OrderPlanningSnapshot {
            skus,
            inventory,
            pending,
            forecasts,
            supplier_profiles,
            demand,
            seasonal,
            stockout_patterns: self.stockout_repo.list_all()?,
            applied_adjustments: self.learning_repo.list_applied()?,
            existing,
        })
    }

    fn summarize(order_month: YearMonth, rows: &[OrderConfirmation]) -> OrderGenerationReport {
        let mut by_urgency = BTreeMap::new();
        for row in rows {
            *by_urgency
                .entry(row.urgency.as_str().to_string())
                .or_insert(0) += 1;
        }
        OrderGenerationReport {
            order_month,
            rows: rows.len(),
            by_urgency,
            total_suggested_qty: rows.iter().map(|r| r.suggested_qty).sum(),
        }
    }

    // ==========================================
    // 人工确认
    // ==========================================

    pub fn list(&self, order_month: YearMonth) -> ServiceResult<Vec<OrderConfirmation>> {
        Ok(self.confirmation_repo.list_by_month(order_month)?)
    }

    /// 编辑确认字段（锁定行返回 RowLocked）
    pub fn edit_confirmed(
        &self,
        sku_id: &str,
        warehouse: &str,
        order_month: YearMonth,
        edit: &ConfirmationEdit,
    ) -> ServiceResult<OrderConfirmation> {
        if let Some(qty) = edit.confirmed_qty {
            if !qty.is_finite() || qty < 0.0 {
                return Err(ServiceError::InvalidInput(format!(
                    "确认数量必须为非负数: {}",
                    qty
                )));
            }
        }
        if let Some(days) = edit.lead_time_override {
            if days <= 0 {
                return Err(ServiceError::InvalidInput(format!(
                    "提前期覆盖必须为正数: {}",
                    days
                )));
            }
        }
        self.confirmation_repo
            .apply_edit(sku_id, warehouse, order_month, edit)?;
        info!(sku_id, warehouse, order_month = %order_month, "确认单已编辑");
        self.load(sku_id, warehouse, order_month)
    }

    pub fn lock(
        &self,
        sku_id: &str,
        warehouse: &str,
        order_month: YearMonth,
        user: &str,
    ) -> ServiceResult<OrderConfirmation> {
        if user.trim().is_empty() {
            return Err(ServiceError::InvalidInput("锁定人不能为空".to_string()));
        }
        self.set_locked(sku_id, warehouse, order_month, Some(user))
    }

    pub fn unlock(
        &self,
        sku_id: &str,
        warehouse: &str,
        order_month: YearMonth,
    ) -> ServiceResult<OrderConfirmation> {
        self.set_locked(sku_id, warehouse, order_month, None)
    }

    fn set_locked(
        &self,
        sku_id: &str,
        warehouse: &str,
        order_month: YearMonth,
        user: Option<&str>,
    ) -> ServiceResult<OrderConfirmation> {
        if !self
            .confirmation_repo
            .set_locked(sku_id, warehouse, order_month, user, Utc::now())?
        {
            return Err(Self::not_found(sku_id, warehouse, order_month));
        }
        info!(sku_id, warehouse, order_month = %order_month, locked = user.is_some(), "确认单锁定状态变更");
        self.load(sku_id, warehouse, order_month)
    }

    fn load(
        &self,
        sku_id: &str,
        warehouse: &str,
        order_month: YearMonth,
    ) -> ServiceResult<OrderConfirmation> {
        self.confirmation_repo
            .find(sku_id, warehouse, order_month)?
            .ok_or_else(|| Self::not_found(sku_id, warehouse, order_month))
    }

    fn not_found(sku_id: &str, warehouse: &str, order_month: YearMonth) -> ServiceError {
        ServiceError::NotFound(format!(
            "OrderConfirmation(id={}/{}/{})不存在",
            sku_id, warehouse, order_month
        ))
    }
}
