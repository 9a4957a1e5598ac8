// ==========================================
// 仓库补货预测系统 - 预测批次服务
// ==========================================
// 职责: 执行单个预测批次（同步，运行在阻塞线程）
// 流程:
// 1) 批量取数: SKU / 销售 → 需求统计 → 季节画像
// 2) 增长率两阶段: SKU 趋势 → 品类中位数
// 3) 并行计算每个 SKU/仓库（进度计数串行更新）
// 4) 批量写入明细 + 预测值准确率记录，标记完成
// 红线:
// - 单个 SKU 失败只记日志并计数，不中断批次
// - 批次级错误必须把批次标记为 failed，不得停留在 running
// - 失败批次保留已落库的进度计数
// ==========================================

use crate::config::{ConfigManager, PlanningParameters};
use crate::domain::accuracy::ForecastAccuracyRecord;
use crate::domain::forecast::{ForecastDetail, ForecastRun};
use crate::domain::seasonal::SeasonalProfile;
use crate::domain::sku::Sku;
use crate::domain::types::{ForecastRunStatus, SkuStatus, YearMonth};
use crate::engine::demand_stats::{DemandStats, DemandStatsProvider};
use crate::engine::forecast::{ForecastEngine, ForecastInput};
use crate::engine::growth::MIN_MONTHS_FOR_CATEGORY_PEER;
use crate::engine::seasonal::SeasonalPatternDetector;
use crate::engine::PairKey;
use crate::perf::PerfGuard;
use crate::repository::{
    AccuracyRepository, ForecastDetailRepository, ForecastRunRepository, SalesRepository,
    SeasonalProfileRepository, SkuRepository,
};
use crate::services::error::{ServiceError, ServiceResult};
use chrono::{Datelike, Utc};
use rusqlite::Connection;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use tracing::{error, info, instrument, warn};

/// 进度落库间隔（条）
const PROGRESS_CHECKPOINT: i64 = 200;

/// 批次执行结果
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub details: Vec<ForecastDetail>,
    pub processed: i64,
    pub failed: i64,
}

// 批次内共享的进度（只由批次线程串行更新）
#[derive(Default)]
struct Progress {
    processed: i64,
    failed: i64,
    details: Vec<ForecastDetail>,
}

// ==========================================
// ForecastBatchService - 预测批次服务
// ==========================================
pub struct ForecastBatchService {
    config: ConfigManager,
    sku_repo: SkuRepository,
    sales_repo: SalesRepository,
    seasonal_repo: SeasonalProfileRepository,
    run_repo: ForecastRunRepository,
    detail_repo: ForecastDetailRepository,
    accuracy_repo: AccuracyRepository,
}

impl ForecastBatchService {
    pub fn new(conn: Arc<Mutex<Connection>>) -> ServiceResult<Self> {
        let config = ConfigManager::from_connection(conn.clone())
            .map_err(|e| ServiceError::Config(e.to_string()))?;
        Ok(Self {
            config,
            sku_repo: SkuRepository::from_connection(conn.clone()),
            sales_repo: SalesRepository::from_connection(conn.clone()),
            seasonal_repo: SeasonalProfileRepository::from_connection(conn.clone()),
            run_repo: ForecastRunRepository::from_connection(conn.clone()),
            detail_repo: ForecastDetailRepository::from_connection(conn.clone()),
            accuracy_repo: AccuracyRepository::from_connection(conn),
        })
    }

    pub fn run_repository(&self) -> &ForecastRunRepository {
        &self.run_repo
    }

    // ==========================================
    // 批次执行
    // ==========================================

    /// 执行批次直至终态
    ///
    /// 批次级错误会把批次标记为 failed 并返回 BatchFailed。
    #[instrument(skip(self))]
    pub fn execute_run(&self, run_id: &str) -> ServiceResult<ForecastRun> {
        let result = self
            .config
            .load_parameters_sync()
            .map_err(|e| ServiceError::Config(e.to_string()))
            .and_then(|params| self.execute_inner(run_id, &params));
        self.conclude(run_id, result)
    }

    /// 使用调用方读取的参数快照执行批次
    #[instrument(skip(self, params))]
    pub fn execute_run_with(
        &self,
        run_id: &str,
        params: &PlanningParameters,
    ) -> ServiceResult<ForecastRun> {
        let result = self.execute_inner(run_id, params);
        self.conclude(run_id, result)
    }

    fn conclude(&self, run_id: &str, result: ServiceResult<()>) -> ServiceResult<ForecastRun> {
        if let Err(e) = result {
            let message = e.to_string();
            error!(run_id, error = %message, "预测批次失败");
            self.run_repo
                .mark_finished(run_id, ForecastRunStatus::Failed, Some(&message), Utc::now())?;
            return Err(ServiceError::BatchFailed {
                run_id: run_id.to_string(),
                message,
            });
        }
        self.run_repo
            .find_by_id(run_id)?
            .ok_or_else(|| ServiceError::NotFound(format!("ForecastRun(id={})不存在", run_id)))
    }

    fn execute_inner(&self, run_id: &str, params: &PlanningParameters) -> ServiceResult<()> {
        let _perf = PerfGuard::new("forecast_batch");
        let run = self
            .run_repo
            .find_by_id(run_id)?
            .ok_or_else(|| ServiceError::NotFound(format!("ForecastRun(id={})不存在", run_id)))?;

        // 1. 批量取数
        let skus: HashMap<String, Sku> = self
            .sku_repo
            .list_all()?
            .into_iter()
            .filter(|s| s.status != SkuStatus::Discontinued)
            .map(|s| (s.sku_id.clone(), s))
            .collect();
        let sales = self.sales_repo.list_all(run.warehouses.as_deref())?;
        let latest = self.sales_repo.latest_month()?;
        let start_month = match latest {
            Some(m) => m.next(),
            None => {
                let today = Utc::now().date_naive();
                YearMonth::new(today.year(), today.month())
                    .ok_or_else(|| ServiceError::InvalidInput("当前日期无效".to_string()))?
            }
        };

        let stats = DemandStatsProvider::new().build_all(&sales, latest);
        let warehouses: Vec<String> = match &run.warehouses {
            Some(list) => list.clone(),
            None => self.sales_repo.list_warehouses()?,
        };
        let pairs = Self::planning_pairs(&skus, &stats, &warehouses);

        // 2. 季节画像（每批重算并落库）
        let stat_refs: Vec<&DemandStats> = stats.values().collect();
        let profiles = SeasonalPatternDetector::new().detect_batch(&stat_refs);
        self.seasonal_repo.batch_upsert(&profiles)?;
        let seasonal: HashMap<PairKey, SeasonalProfile> = profiles
            .into_iter()
            .map(|p| ((p.sku_id.clone(), p.warehouse.clone()), p))
            .collect();

        self.run_repo
            .mark_started(run_id, Some(start_month), pairs.len() as i64, Utc::now())?;
        info!(run_id, total = pairs.len(), start_month = %start_month, "预测批次开始");

        // 3. 计算
        let engine = ForecastEngine::new(params);
        let category_rates = Self::category_growth(&engine, &skus, &stats, &seasonal, &pairs);
        let outcome = self.compute(
            &engine,
            params,
            &run,
            start_month,
            &pairs,
            &skus,
            &stats,
            &seasonal,
            &category_rates,
        );

        // 计数先落库：写入阶段失败时批次保留部分进度
        self.run_repo
            .update_progress(run_id, outcome.processed, outcome.failed)?;

        // 4. 写入
        self.detail_repo.batch_insert(&outcome.details)?;
        let predicted: Vec<ForecastAccuracyRecord> = outcome
            .details
            .iter()
            .flat_map(|d| {
                d.periods().into_iter().zip(d.monthly_qty.iter()).map(move |(period, qty)| {
                    ForecastAccuracyRecord::predicted_only(
                        &d.sku_id,
                        &d.warehouse,
                        period,
                        &d.run_id,
                        d.method_used,
                        *qty,
                    )
                })
            })
            .collect();
        self.accuracy_repo.batch_upsert_predicted(&predicted)?;

        self.run_repo
            .mark_finished(run_id, ForecastRunStatus::Completed, None, Utc::now())?;
        info!(
            run_id,
            processed = outcome.processed,
            failed = outcome.failed,
            "预测批次完成"
        );
        Ok(())
    }

    /// 待计算的 SKU/仓库
    ///
    /// - 有销售记录的组合
    /// - 从未有销售的 SKU：对每个仓库生成零预测
    pub fn planning_pairs(
        skus: &HashMap<String, Sku>,
        stats: &HashMap<PairKey, DemandStats>,
        warehouses: &[String],
    ) -> Vec<PairKey> {
        let mut pairs: BTreeSet<PairKey> = stats
            .keys()
            .filter(|(sku_id, _)| skus.contains_key(sku_id))
            .cloned()
            .collect();
        let with_sales: BTreeSet<&str> = stats.keys().map(|(s, _)| s.as_str()).collect();
        for sku_id in skus.keys().filter(|id| !with_sales.contains(id.as_str())) {
            for wh in warehouses {
                pairs.insert((sku_id.clone(), wh.clone()));
            }
        }
        pairs.into_iter().collect()
    }

    /// 品类增长率中位数（同伴需 ≥12 个月历史）
    fn category_growth(
        engine: &ForecastEngine,
        skus: &HashMap<String, Sku>,
        stats: &HashMap<PairKey, DemandStats>,
        seasonal: &HashMap<PairKey, SeasonalProfile>,
        pairs: &[PairKey],
    ) -> HashMap<String, f64> {
        let mut peers: HashMap<String, Vec<f64>> = HashMap::new();
        for key in pairs {
            let (sku, demand) = match (skus.get(&key.0), stats.get(key)) {
                (Some(s), Some(d)) if d.months_of_history() >= MIN_MONTHS_FOR_CATEGORY_PEER => (s, d),
                _ => continue,
            };
            let category = match &sku.category {
                Some(c) => c,
                None => continue,
            };
            let input = ForecastInput {
                sku,
                warehouse: &key.1,
                demand: Some(demand),
                seasonal: seasonal.get(key),
                category_growth: None,
                growth_override: None,
            };
            if let Some(fit) = engine.sku_trend(&input) {
                peers.entry(category.clone()).or_default().push(fit.annual_rate);
            }
        }
        peers
            .into_iter()
            .filter_map(|(category, rates)| {
                engine
                    .growth_estimator()
                    .category_median(&rates)
                    .map(|median| (category, median))
            })
            .collect()
    }

    /// 并行计算（按 forecast_parallelism 分片）
    #[allow(clippy::too_many_arguments)]
    fn compute(
        &self,
        engine: &ForecastEngine,
        params: &PlanningParameters,
        run: &ForecastRun,
        start_month: YearMonth,
        pairs: &[PairKey],
        skus: &HashMap<String, Sku>,
        stats: &HashMap<PairKey, DemandStats>,
        seasonal: &HashMap<PairKey, SeasonalProfile>,
        category_rates: &HashMap<String, f64>,
    ) -> BatchOutcome {
        let workers = params.forecast_parallelism.max(1);
        let chunk_size = ((pairs.len() + workers - 1) / workers).max(1);
        let progress = Mutex::new(Progress::default());

        std::thread::scope(|scope| {
            for chunk in pairs.chunks(chunk_size) {
                let progress = &progress;
                scope.spawn(move || {
                    for key in chunk {
                        let result = match skus.get(&key.0) {
                            Some(sku) => {
                                let input = ForecastInput {
                                    sku,
                                    warehouse: &key.1,
                                    demand: stats.get(key),
                                    seasonal: seasonal.get(key),
                                    category_growth: sku
                                        .category
                                        .as_ref()
                                        .and_then(|c| category_rates.get(c))
                                        .copied(),
                                    growth_override: run.growth_override,
                                };
                                engine.forecast(&run.run_id, start_month, &input)
                            }
                            None => continue,
                        };
                        self.record_progress(progress, &run.run_id, key, result);
                    }
                });
            }
        });

        let progress = progress.into_inner().unwrap_or_else(|e| e.into_inner());
        BatchOutcome {
            details: progress.details,
            processed: progress.processed,
            failed: progress.failed,
        }
    }

    fn record_progress(
        &self,
        progress: &Mutex<Progress>,
        run_id: &str,
        key: &PairKey,
        result: Result<ForecastDetail, crate::engine::EngineError>,
    ) {
        let mut guard = match progress.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.processed += 1;
        match result {
            Ok(detail) => guard.details.push(detail),
            Err(e) => {
                guard.failed += 1;
                warn!(run_id, sku_id = %key.0, warehouse = %key.1, error = %e, "SKU 预测失败，已跳过");
            }
        }
        if guard.processed % PROGRESS_CHECKPOINT == 0 {
            if let Err(e) = self.run_repo.update_progress(run_id, guard.processed, guard.failed) {
                warn!(run_id, error = %e, "进度落库失败");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::GrowthStatus;

    fn sku(id: &str) -> Sku {
        Sku {
            sku_id: id.to_string(),
            description: None,
            category: None,
            abc_code: None,
            xyz_code: None,
            status: SkuStatus::Active,
            unit_cost: 1.0,
            unit_price: 1.0,
            supplier: None,
            growth_status: GrowthStatus::Normal,
            order_multiple: 1,
        }
    }

    #[test]
    fn test_planning_pairs_include_never_sold() {
        let mut skus = HashMap::new();
        skus.insert("S1".to_string(), sku("S1"));
        skus.insert("S2".to_string(), sku("S2"));
        let mut stats = HashMap::new();
        stats.insert(("S1".to_string(), "W1".to_string()), DemandStats::empty("S1", "W1"));
        stats.insert(("GHOST".to_string(), "W1".to_string()), DemandStats::empty("GHOST", "W1"));

        let pairs = ForecastBatchService::planning_pairs(
            &skus,
            &stats,
            &["W1".to_string(), "W2".to_string()],
        );
        assert_eq!(
            pairs,
            vec![
                ("S1".to_string(), "W1".to_string()),
                ("S2".to_string(), "W1".to_string()),
                ("S2".to_string(), "W2".to_string()),
            ],
            "主数据外的 SKU 忽略；从未销售的 SKU 每仓一条"
        );
    }
}
