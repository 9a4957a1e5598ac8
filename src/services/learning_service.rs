// ==========================================
// 仓库补货预测系统 - 学习调整服务
// ==========================================
// 职责: 生成调整建议 + 人工审批/驳回
// 红线: 只有人工审批能让建议生效，没有任何自动生效阈值
// ==========================================

use crate::domain::accuracy::LearningAdjustment;
use crate::domain::sku::Sku;
use crate::domain::types::YearMonth;
use crate::engine::demand_stats::DemandStatsProvider;
use crate::engine::learning::LearningRecommender;
use crate::repository::{
    AccuracyRepository, LearningAdjustmentRepository, SalesRepository, SkuRepository,
};
use crate::services::error::{ServiceError, ServiceResult};
use chrono::Utc;
use rusqlite::Connection;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{info, instrument};

/// 近期需求窗口（月）
const RECENT_DEMAND_MONTHS: usize = 3;

pub struct LearningService {
    recommender: LearningRecommender,
    accuracy_repo: AccuracyRepository,
    learning_repo: LearningAdjustmentRepository,
    sku_repo: SkuRepository,
    sales_repo: SalesRepository,
}

impl LearningService {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self {
            recommender: LearningRecommender::new(),
            accuracy_repo: AccuracyRepository::from_connection(conn.clone()),
            learning_repo: LearningAdjustmentRepository::from_connection(conn.clone()),
            sku_repo: SkuRepository::from_connection(conn.clone()),
            sales_repo: SalesRepository::from_connection(conn),
        }
    }

    /// 扫描准确率历史并保存建议（同目标同类型的待审建议被刷新）
    ///
    /// 准确率记录保存的是未调整的预测值，偏差按已生效调整修正后计算，
    /// 已被修正的偏差不会再次提出。
    #[instrument(skip(self))]
    pub fn generate(&self, since: Option<YearMonth>) -> ServiceResult<Vec<LearningAdjustment>> {
        let records = self.accuracy_repo.list_recorded(since)?;
        let skus: HashMap<String, Sku> = self
            .sku_repo
            .list_all()?
            .into_iter()
            .map(|s| (s.sku_id.clone(), s))
            .collect();

        let sales = self.sales_repo.list_all(None)?;
        let latest = self.sales_repo.latest_month()?;
        let recent_demand: HashMap<(String, String), f64> = DemandStatsProvider::new()
            .build_all(&sales, latest)
            .into_iter()
            .filter_map(|(key, stats)| stats.recent_mean(RECENT_DEMAND_MONTHS).map(|m| (key, m)))
            .collect();

        let applied = self.learning_repo.list_applied()?;
        let proposals =
            self.recommender
                .recommend(&records, &skus, &recent_demand, &applied, Utc::now());
        let pending = self.learning_repo.list_pending()?;
        let merged = self.recommender.merge_with_pending(proposals, &pending);
        self.learning_repo.batch_save(&merged)?;

        info!(saved = merged.len(), "学习调整建议已保存");
        Ok(merged)
    }

    pub fn list_pending(&self) -> ServiceResult<Vec<LearningAdjustment>> {
        Ok(self.learning_repo.list_pending()?)
    }

    /// 审批生效
    pub fn approve(&self, adjustment_id: &str, approver: &str) -> ServiceResult<LearningAdjustment> {
        if approver.trim().is_empty() {
            return Err(ServiceError::InvalidInput("审批人不能为空".to_string()));
        }
        self.ensure_pending(adjustment_id)?;
        if !self.learning_repo.approve(adjustment_id, approver, Utc::now())? {
            return Err(ServiceError::InvalidState(format!(
                "调整建议 {} 已被处理",
                adjustment_id
            )));
        }
        info!(adjustment_id, approver, "学习调整建议已生效");
        self.load(adjustment_id)
    }

    /// 驳回
    pub fn reject(&self, adjustment_id: &str) -> ServiceResult<LearningAdjustment> {
        self.ensure_pending(adjustment_id)?;
        if !self.learning_repo.reject(adjustment_id)? {
            return Err(ServiceError::InvalidState(format!(
                "调整建议 {} 已被处理",
                adjustment_id
            )));
        }
        info!(adjustment_id, "学习调整建议已驳回");
        self.load(adjustment_id)
    }

    fn ensure_pending(&self, adjustment_id: &str) -> ServiceResult<()> {
        let adjustment = self.load(adjustment_id)?;
        if !adjustment.is_pending() {
            return Err(ServiceError::InvalidState(format!(
                "调整建议 {} 已被处理（applied={}, rejected={}）",
                adjustment_id, adjustment.applied, adjustment.rejected
            )));
        }
        Ok(())
    }

    fn load(&self, adjustment_id: &str) -> ServiceResult<LearningAdjustment> {
        self.learning_repo
            .find_by_id(adjustment_id)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("LearningAdjustment(id={})不存在", adjustment_id))
            })
    }
}
