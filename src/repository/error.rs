// ==========================================
// 仓库补货预测系统 - 仓储层错误类型
// ==========================================
// 约定: 仓储层只报告存储事实，业务语义由 services 层翻译
// ==========================================

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("记录未找到: {entity} with id={id}")]
    NotFound { entity: String, id: String },

    #[error("数据库锁获取失败: {0}")]
    LockError(String),

    #[error("数据库查询失败: {0}")]
    DatabaseQueryError(String),

    /// 同一 (sku, 仓库, 月份) 等自然键重复写入
    #[error("自然键冲突: {0}")]
    DuplicateKey(String),

    /// 补货确认行已被计划员锁定
    #[error("记录已锁定: {0}")]
    RowLocked(String),

    #[error("写入数据不合法: {0}")]
    ValidationError(String),

    /// JSON 列（月度序列、原因说明等）无法解码
    #[error("列 {column} 内容损坏: {message}")]
    CorruptedColumn { column: String, message: String },
}

impl From<rusqlite::Error> for RepositoryError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(_, Some(msg)) if msg.contains("UNIQUE") => {
                RepositoryError::DuplicateKey(msg)
            }
            rusqlite::Error::QueryReturnedNoRows => RepositoryError::NotFound {
                entity: "row".to_string(),
                id: "-".to_string(),
            },
            other => RepositoryError::DatabaseQueryError(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::CorruptedColumn {
            column: "json".to_string(),
            message: err.to_string(),
        }
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;
