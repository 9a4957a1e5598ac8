// ==========================================
// 仓库补货预测系统 - 服务水平 z 值表
// ==========================================
// 职责: ABC×XYZ → 服务水平 z 值（可由 config_kv 覆写）
// 存储: config_kv key='service_level_overrides'，JSON {"AX": 2.33, ...}
// ==========================================

use crate::domain::types::Classification;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 默认 z 值（九宫格）
const DEFAULT_Z_VALUES: [(&str, f64); 9] = [
    ("AX", 2.33), // 99%
    ("AY", 2.05), // 98%
    ("AZ", 1.88), // 97%
    ("BX", 1.88),
    ("BY", 1.65), // 95%
    ("BZ", 1.48),
    ("CX", 1.65),
    ("CY", 1.28), // 90%
    ("CZ", 1.04), // 85%
];

/// 服务水平表
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServiceLevelTable {
    /// 覆写项（格子代码 → z 值）
    #[serde(default)]
    pub overrides: HashMap<String, f64>,
}

impl ServiceLevelTable {
    /// 由 JSON 覆写创建；格式错误时返回空覆写（全部用默认值）
    pub fn from_json(raw: &str) -> Self {
        match serde_json::from_str::<HashMap<String, f64>>(raw) {
            Ok(map) => Self {
                overrides: map
                    .into_iter()
                    .filter(|(_, z)| z.is_finite() && *z > 0.0)
                    .map(|(k, z)| (k.trim().to_uppercase(), z))
                    .collect(),
            },
            Err(e) => {
                tracing::warn!(raw_value = %raw, error = %e, "服务水平覆写配置格式错误，使用默认值");
                Self::default()
            }
        }
    }

    /// 查询 z 值；分类缺失按 C-Z 处理
    pub fn z_for(&self, classification: Option<Classification>) -> f64 {
        let cell = classification
            .unwrap_or_else(Classification::most_conservative)
            .cell();
        if let Some(z) = self.overrides.get(&cell) {
            return *z;
        }
        DEFAULT_Z_VALUES
            .iter()
            .find(|(c, _)| *c == cell)
            .map(|(_, z)| *z)
            .unwrap_or(1.04)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{AbcCode, XyzCode};

    #[test]
    fn test_default_table() {
        let table = ServiceLevelTable::default();
        assert_eq!(table.z_for(Some(Classification::new(AbcCode::A, XyzCode::X))), 2.33);
        assert_eq!(table.z_for(Some(Classification::new(AbcCode::C, XyzCode::Z))), 1.04);
        assert_eq!(table.z_for(None), 1.04, "缺失分类按 C-Z");
    }

    #[test]
    fn test_overrides_from_json() {
        let table = ServiceLevelTable::from_json(r#"{"ax": 2.5, "BY": -1}"#);
        assert_eq!(table.z_for(Some(Classification::new(AbcCode::A, XyzCode::X))), 2.5);
        assert_eq!(
            table.z_for(Some(Classification::new(AbcCode::B, XyzCode::Y))),
            1.65,
            "非法 z 值应被忽略"
        );

        let broken = ServiceLevelTable::from_json("not json");
        assert!(broken.overrides.is_empty());
    }
}
