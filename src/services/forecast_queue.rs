// ==========================================
// 仓库补货预测系统 - 预测任务队列
// ==========================================
// 职责: 保证全系统同一时刻只有一个预测批次在执行
// 规则:
// - 空闲时提交 → 立即执行（running）
// - 忙碌时提交 → 严格 FIFO 排队（queued），当前批次结束后自动启动
// - 只能取消排队中的批次，执行中的批次跑到完成或失败
// - 每个批次启动前经 PlanningConfigReader 读取一次参数快照
// 红线: 队列状态只由 JobState 持有，不允许在多处用布尔标记判断
// ==========================================

use crate::config::{ConfigManager, PlanningConfigReader};
use crate::domain::forecast::{ForecastRequest, ForecastRun};
use crate::domain::types::ForecastRunStatus;
use crate::repository::ForecastRunRepository;
use crate::services::error::{ServiceError, ServiceResult};
use crate::services::forecast_service::ForecastBatchService;
use chrono::Utc;
use rusqlite::Connection;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, Notify};
use tracing::{error, info, warn};

const STALE_RUN_MESSAGE: &str = "进程退出时批次仍在执行，已标记失败";

/// 队列快照
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobQueueState {
    pub active_run_id: Option<String>,
    pub queued: Vec<String>,
}

#[derive(Debug, Default)]
struct JobState {
    active_run_id: Option<String>,
    queued: VecDeque<String>,
}

struct QueueInner {
    conn: Arc<Mutex<Connection>>,
    config: Arc<dyn PlanningConfigReader>,
    run_repo: ForecastRunRepository,
    state: AsyncMutex<JobState>,
    // 任一批次进入终态时通知
    finished: Notify,
}

// ==========================================
// ForecastJobQueue - 预测任务队列
// ==========================================
#[derive(Clone)]
pub struct ForecastJobQueue {
    inner: Arc<QueueInner>,
}

impl ForecastJobQueue {
    /// 创建队列
    ///
    /// 启动恢复：
    /// - 遗留的 running 批次标记为 failed
    /// - 遗留的 queued 批次按创建顺序重新入队；在 tokio 运行时内立即启动队首
    pub fn new(conn: Arc<Mutex<Connection>>) -> ServiceResult<Self> {
        let config = ConfigManager::from_connection(conn.clone())
            .map_err(|e| ServiceError::Config(e.to_string()))?;
        Self::with_config(conn, Arc::new(config))
    }

    /// 使用指定的配置读取器创建队列
    pub fn with_config(
        conn: Arc<Mutex<Connection>>,
        config: Arc<dyn PlanningConfigReader>,
    ) -> ServiceResult<Self> {
        let run_repo = ForecastRunRepository::from_connection(conn.clone());
        let recovered = run_repo.fail_stale_running(STALE_RUN_MESSAGE)?;
        if recovered > 0 {
            warn!(recovered, "遗留的执行中批次已标记失败");
        }

        let queued: VecDeque<String> = run_repo
            .list_by_status(ForecastRunStatus::Queued)?
            .into_iter()
            .map(|r| r.run_id)
            .collect();

        let queue = Self {
            inner: Arc::new(QueueInner {
                conn,
                config,
                run_repo,
                state: AsyncMutex::new(JobState {
                    active_run_id: None,
                    queued,
                }),
                finished: Notify::new(),
            }),
        };

        if tokio::runtime::Handle::try_current().is_ok() {
            if let Some(next) = queue.take_next_queued()? {
                queue.spawn_worker(next);
            }
        }
        Ok(queue)
    }

    // 仅在构造时调用（此时没有其他持锁方）
    fn take_next_queued(&self) -> ServiceResult<Option<String>> {
        let mut state = self
            .inner
            .state
            .try_lock()
            .map_err(|e| ServiceError::JobQueue(format!("队列状态锁获取失败: {}", e)))?;
        let next = state.queued.pop_front();
        if let Some(run_id) = &next {
            self.inner
                .run_repo
                .update_status(run_id, ForecastRunStatus::Running)?;
            state.active_run_id = Some(run_id.clone());
        }
        Ok(next)
    }

    /// 提交预测请求，返回批次 ID
    ///
    /// 忙碌时不报错，进入队尾。
    /// 空闲但仍有恢复的排队批次时（队列在运行时外创建），新批次排到队尾并启动队首。
    pub async fn submit(&self, request: ForecastRequest) -> ServiceResult<String> {
        let mut state = self.inner.state.lock().await;
        let run_now = state.active_run_id.is_none() && state.queued.is_empty();
        let status = if run_now {
            ForecastRunStatus::Running
        } else {
            ForecastRunStatus::Queued
        };
        let run = ForecastRun::new(&request, status);
        self.inner.run_repo.insert(&run)?;
        let run_id = run.run_id;

        if run_now {
            state.active_run_id = Some(run_id.clone());
            drop(state);
            info!(run_id = %run_id, "预测批次立即执行");
            self.spawn_worker(run_id.clone());
            return Ok(run_id);
        }

        state.queued.push_back(run_id.clone());
        info!(run_id = %run_id, position = state.queued.len(), "预测批次已排队");

        if state.active_run_id.is_none() {
            if let Some(head) = state.queued.pop_front() {
                self.inner
                    .run_repo
                    .update_status(&head, ForecastRunStatus::Running)?;
                state.active_run_id = Some(head.clone());
                drop(state);
                info!(run_id = %head, "恢复的排队批次启动");
                self.spawn_worker(head);
            }
        }
        Ok(run_id)
    }

    /// 取消排队中的批次
    ///
    /// # 返回
    /// - Ok(true): 已取消
    /// - Ok(false): 不在队列中（已结束或不存在）
    /// - Err(InvalidState): 批次正在执行
    pub async fn cancel_queued(&self, run_id: &str) -> ServiceResult<bool> {
        let mut state = self.inner.state.lock().await;
        if state.active_run_id.as_deref() == Some(run_id) {
            return Err(ServiceError::InvalidState(format!(
                "批次 {} 正在执行，不可取消",
                run_id
            )));
        }
        let position = match state.queued.iter().position(|id| id == run_id) {
            Some(p) => p,
            None => return Ok(false),
        };
        let cancelled = self.inner.run_repo.cancel_if_queued(run_id)?;
        state.queued.remove(position);
        drop(state);

        info!(run_id, cancelled, "排队批次已取消");
        self.inner.finished.notify_waiters();
        Ok(cancelled)
    }

    /// 当前队列快照
    pub async fn status(&self) -> JobQueueState {
        let state = self.inner.state.lock().await;
        JobQueueState {
            active_run_id: state.active_run_id.clone(),
            queued: state.queued.iter().cloned().collect(),
        }
    }

    /// 等待批次进入终态
    pub async fn wait_for(&self, run_id: &str) -> ServiceResult<ForecastRun> {
        loop {
            // 先登记通知再查状态，避免错过两者之间的完成事件
            let notified = self.inner.finished.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let run = self
                .inner
                .run_repo
                .find_by_id(run_id)?
                .ok_or_else(|| ServiceError::NotFound(format!("ForecastRun(id={})不存在", run_id)))?;
            if run.status.is_terminal() {
                return Ok(run);
            }
            notified.await;
        }
    }

    // ==========================================
    // 工作循环
    // ==========================================

    fn spawn_worker(&self, first_run_id: String) {
        let queue = self.clone();
        tokio::spawn(async move {
            queue.worker_loop(first_run_id).await;
        });
    }

    async fn worker_loop(&self, first_run_id: String) {
        let mut run_id = first_run_id;
        loop {
            self.execute_blocking(&run_id).await;

            let next = {
                let mut state = self.inner.state.lock().await;
                let next = state.queued.pop_front();
                state.active_run_id = next.clone();
                next
            };
            self.inner.finished.notify_waiters();

            match next {
                Some(next_id) => {
                    if let Err(e) = self
                        .inner
                        .run_repo
                        .update_status(&next_id, ForecastRunStatus::Running)
                    {
                        warn!(run_id = %next_id, error = %e, "排队批次状态更新失败");
                    }
                    info!(run_id = %next_id, "排队批次自动启动");
                    run_id = next_id;
                }
                None => break,
            }
        }
    }

    /// 在阻塞线程执行批次；任何路径结束后批次都必须处于终态
    async fn execute_blocking(&self, run_id: &str) {
        let params = match self.inner.config.load_parameters().await {
            Ok(p) => p,
            Err(e) => {
                let failure = ServiceError::Config(e.to_string()).to_string();
                error!(run_id, error = %failure, "批次参数读取失败");
                self.ensure_terminal(run_id, &failure);
                return;
            }
        };

        let conn = self.inner.conn.clone();
        let id = run_id.to_string();
        let result = tokio::task::spawn_blocking(move || {
            let service = ForecastBatchService::new(conn)?;
            service.execute_run_with(&id, &params)
        })
        .await;

        let failure = match result {
            Ok(Ok(run)) => {
                info!(
                    run_id,
                    processed = run.processed_count,
                    failed = run.failed_count,
                    "预测批次结束"
                );
                return;
            }
            Ok(Err(e)) => e.to_string(),
            Err(join_err) => format!("批次线程异常退出: {}", join_err),
        };
        error!(run_id, error = %failure, "预测批次失败");
        self.ensure_terminal(run_id, &failure);
    }

    fn ensure_terminal(&self, run_id: &str, message: &str) {
        let still_open = match self.inner.run_repo.find_by_id(run_id) {
            Ok(Some(run)) => !run.status.is_terminal(),
            Ok(None) => false,
            Err(e) => {
                error!(run_id, error = %e, "批次状态查询失败");
                true
            }
        };
        if still_open {
            if let Err(e) = self.inner.run_repo.mark_finished(
                run_id,
                ForecastRunStatus::Failed,
                Some(message),
                Utc::now(),
            ) {
                error!(run_id, error = %e, "批次失败状态写入失败");
            }
        }
    }
}
