// ==========================================
// 仓库补货预测系统 - 服务层错误类型
// ==========================================
// 职责: 定义服务层错误类型，转换 Repository / Engine 错误为可解释的错误消息
// ==========================================

use crate::engine::error::EngineError;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// 服务层错误类型
#[derive(Error, Debug)]
pub enum ServiceError {
    // ==========================================
    // 业务规则错误
    // ==========================================
    /// 准确率回填只接受已完整结束的月份
    #[error("目标期间无效: period={period}, 原因: {reason}")]
    InvalidTargetPeriod { period: String, reason: String },

    #[error("确认单已锁定: {0}")]
    RowLocked(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("无效的状态: {0}")]
    InvalidState(String),

    // ==========================================
    // 批次错误
    // ==========================================
    #[error("任务队列错误: {0}")]
    JobQueue(String),

    #[error("批次失败: run_id={run_id}, {message}")]
    BatchFailed { run_id: String, message: String },

    #[error("配置加载失败: {0}")]
    Config(String),

    // ==========================================
    // 下层错误
    // ==========================================
    #[error("数据库错误: {0}")]
    Database(String),

    #[error("计算错误: {0}")]
    Engine(#[from] EngineError),
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ServiceError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => {
                ServiceError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::RowLocked(key) => ServiceError::RowLocked(key),
            RepositoryError::ValidationError(msg) => ServiceError::InvalidInput(msg),
            RepositoryError::CorruptedColumn { column, message } => {
                ServiceError::Database(format!("列{}内容损坏: {}", column, message))
            }
            RepositoryError::LockError(msg) => {
                ServiceError::Database(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseQueryError(msg) | RepositoryError::DuplicateKey(msg) => {
                ServiceError::Database(msg)
            }
        }
    }
}

/// Result 类型别名
pub type ServiceResult<T> = Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_error_mapping() {
        let err: ServiceError = RepositoryError::RowLocked("S1/W1/2025-03".to_string()).into();
        assert!(matches!(err, ServiceError::RowLocked(_)));

        let err: ServiceError = RepositoryError::NotFound {
            entity: "ForecastRun".to_string(),
            id: "R1".to_string(),
        }
        .into();
        assert!(err.to_string().contains("R1"));
    }
}
