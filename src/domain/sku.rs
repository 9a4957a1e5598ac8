// ==========================================
// 仓库补货预测系统 - SKU 主数据领域模型
// ==========================================

use crate::domain::types::{Classification, GrowthStatus, SkuStatus};
use serde::{Deserialize, Serialize};

// ==========================================
// Sku - 商品主数据
// ==========================================
// 标识不可变；状态由业务流程维护
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sku {
    pub sku_id: String,                 // SKU 编码
    pub description: Option<String>,    // 描述
    pub category: Option<String>,       // 品类
    pub abc_code: Option<String>,       // 价值分层（原始代码）
    pub xyz_code: Option<String>,       // 波动分层（原始代码）
    pub status: SkuStatus,              // 生命周期状态
    pub unit_cost: f64,                 // 单位成本
    pub unit_price: f64,                // 单位售价（0 表示未维护）
    pub supplier: Option<String>,       // 供应商
    pub growth_status: GrowthStatus,    // 增长标记
    pub order_multiple: i64,            // 订货倍数（25/50/100...）
}

impl Sku {
    /// 解析九宫格分类；缺失或非法返回 None（由引擎按最保守格子处理）
    pub fn classification(&self) -> Option<Classification> {
        Classification::from_codes(self.abc_code.as_deref(), self.xyz_code.as_deref())
    }

    /// 收入测算单价：售价优先，未维护时用成本
    pub fn revenue_price(&self) -> f64 {
        if self.unit_price > 0.0 {
            self.unit_price
        } else {
            self.unit_cost
        }
    }

    pub fn is_death_row(&self) -> bool {
        self.status == SkuStatus::DeathRow
    }

    /// 是否参与补货（active，death_row 视开关而定）
    pub fn is_orderable(&self, include_death_row: bool) -> bool {
        match self.status {
            SkuStatus::Active => true,
            SkuStatus::DeathRow => include_death_row,
            SkuStatus::Discontinued => false,
        }
    }
}
