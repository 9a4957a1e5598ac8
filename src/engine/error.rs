// ==========================================
// 仓库补货预测系统 - 引擎层错误类型
// ==========================================
// 红线: 单 SKU 计算错误只在本地恢复（记录日志、跳过、计入失败数），不中断批次
// ==========================================

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("数据不足 (sku={sku_id}, warehouse={warehouse}): {message}")]
    InsufficientData {
        sku_id: String,
        warehouse: String,
        message: String,
    },

    #[error("输入无效: {0}")]
    InvalidInput(String),

    #[error("分类无效: {0}")]
    InvalidClassification(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
