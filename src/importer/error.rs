// ==========================================
// Sheetable 实体表格映射引擎 - 导入模块错误类型
// ==========================================
// 依据: Rust 错误处理最佳实践
// 工具: thiserror 派生宏
// 约定: 行级错误经 to_envelope() 渲染为 {"errors": [...]} 负载
// ==========================================

use crate::i18n::t_with_args;
use crate::importer::validator::RowViolation;
use crate::repository::error::StoreError;
use crate::sheet::error::SheetError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 导入模块错误类型
#[derive(Error, Debug)]
pub enum ImportError {
    // ===== 批次前置检查 =====
    #[error("同批次主键重复: {}", .ids.join("、"))]
    DuplicateIds { ids: Vec<String> },

    // ===== 行级校验 =====
    #[error("导入校验未通过: {} 处违规", .violations.len())]
    Validation { violations: Vec<RowViolation> },

    #[error("日期格式错误 (行 {row}, 列 {column}): 无法识别 {value}")]
    DateFormat {
        row: u32,
        column: String,
        value: String,
    },

    // ===== 范围授权 =====
    #[error("数据权限越界 (行 {row}): 批次已整体回滚")]
    ScopeViolation { row: u32 },

    // ===== 下层透传 =====
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Sheet(#[from] SheetError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ImportError {
    /// 渲染为行级错误负载（422 响应的 JSON 形态）
    ///
    /// 校验类错误逐条违规一行消息,其余错误整体一条;
    /// 消息按当前 locale 取词。
    pub fn to_envelope(&self) -> ErrorEnvelope {
        let errors = match self {
            ImportError::DuplicateIds { ids } => {
                let joined = ids.join(", ");
                vec![t_with_args("import.duplicate_ids", &[("ids", &joined)])]
            }
            ImportError::Validation { violations } => {
                violations.iter().map(|v| v.message.clone()).collect()
            }
            ImportError::DateFormat { row, column, value } => {
                let row = row.to_string();
                vec![t_with_args(
                    "import.date_format",
                    &[
                        ("row", row.as_str()),
                        ("column", column.as_str()),
                        ("value", value.as_str()),
                    ],
                )]
            }
            ImportError::ScopeViolation { row } => {
                let row = row.to_string();
                vec![t_with_args("import.scope_violation", &[("row", row.as_str())])]
            }
            other => vec![other.to_string()],
        };
        ErrorEnvelope { errors }
    }
}

// ==========================================
// ErrorEnvelope - 行级错误负载
// ==========================================
// 宿主应用以 422 状态码原样下发;引擎侧只负责组装
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub errors: Vec<String>,
}

/// Result 类型别名
pub type ImportResult<T> = Result<T, ImportError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::importer::validator::{RowViolation, ViolationKind};

    #[test]
    fn test_duplicate_ids_lists_every_offender() {
        let err = ImportError::DuplicateIds {
            ids: vec!["5".to_string(), "7".to_string()],
        };
        assert!(err.to_string().contains("5、7"));

        let envelope = err.to_envelope();
        assert_eq!(envelope.errors.len(), 1);
        assert!(envelope.errors[0].contains('5'));
        assert!(envelope.errors[0].contains('7'));
    }

    #[test]
    fn test_validation_envelope_is_one_message_per_violation() {
        let violation = |row: u32, message: &str| RowViolation {
            row,
            column: "name".to_string(),
            kind: ViolationKind::RequiredField,
            message: message.to_string(),
        };
        let err = ImportError::Validation {
            violations: vec![violation(2, "甲"), violation(4, "乙")],
        };
        assert_eq!(err.to_envelope().errors, vec!["甲", "乙"]);
    }

    #[test]
    fn test_envelope_serializes_to_errors_array() {
        let err = ImportError::ScopeViolation { row: 3 };
        let json = serde_json::to_value(err.to_envelope()).unwrap();
        let errors = json["errors"].as_array().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].as_str().unwrap().contains('3'));
    }

    #[test]
    fn test_store_errors_pass_through_as_single_message() {
        let err = ImportError::Store(StoreError::UnknownEntity("Ghost".to_string()));
        let envelope = err.to_envelope();
        assert_eq!(envelope.errors.len(), 1);
        assert!(envelope.errors[0].contains("Ghost"));
    }
}
