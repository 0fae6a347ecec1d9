// ==========================================
// Sheetable 实体表格映射引擎 - 导入行校验
// ==========================================
// 职责: 必填列与存储类型的逐行声明校验
// 约定: 违规只累积不短路,一次导入给出全部问题;
//       主键列空值放行(走纯插入),审计列不参与校验
// ==========================================

use crate::domain::descriptor::{is_audit_column, EntityDescriptor};
use crate::domain::types::{CellValue, ColumnType};
use crate::i18n::t_with_args;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

// ==========================================
// RowViolation - 行级违规
// ==========================================
// message 在构造时按当前 locale 渲染,贯穿到错误负载
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowViolation {
    pub row: u32,
    pub column: String,
    pub kind: ViolationKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationKind {
    RequiredField,
    TypeMismatch,
}

/// SchemaValidator - 声明校验器
pub struct SchemaValidator;

impl SchemaValidator {
    /// 按实体声明校验一行,返回该行全部违规
    ///
    /// values 为表头名 → 单元格值的整行映射（缺列视为 Null）。
    pub fn validate_row(
        desc: &EntityDescriptor,
        row: u32,
        values: &IndexMap<String, CellValue>,
    ) -> Vec<RowViolation> {
        let mut violations = Vec::new();
        for col in &desc.columns {
            if is_audit_column(&col.name) {
                continue;
            }
            let value = values.get(&col.name).cloned().unwrap_or(CellValue::Null);
            if value.is_null() {
                // 主键留空表示新增,由存储分配,不算缺失
                if col.required && col.name != desc.primary_key {
                    violations.push(required_violation(row, &col.name));
                }
                continue;
            }
            if !type_compatible(col.column_type, &value) {
                violations.push(type_violation(row, &col.name, col.column_type, &value));
            }
        }
        violations
    }
}

/// 类型相容判定
///
/// 口径向 SQLite 亲和性看齐: 数值文本可入数值列,整数可入浮点列,
/// 0/1 可入布尔列;日期列要求清洗环节已归一为 DateTime。
fn type_compatible(expected: ColumnType, value: &CellValue) -> bool {
    match expected {
        ColumnType::Text => true,
        ColumnType::Integer => {
            matches!(value, CellValue::Bool(_)) || value.as_int().is_some()
        }
        ColumnType::Float => value.as_float().is_some(),
        ColumnType::Boolean => {
            matches!(value, CellValue::Bool(_)) || matches!(value.as_int(), Some(0) | Some(1))
        }
        ColumnType::Date | ColumnType::DateTime => matches!(value, CellValue::DateTime(_)),
    }
}

fn required_violation(row: u32, column: &str) -> RowViolation {
    let row_text = row.to_string();
    RowViolation {
        row,
        column: column.to_string(),
        kind: ViolationKind::RequiredField,
        message: t_with_args(
            "import.required_field",
            &[("row", row_text.as_str()), ("column", column)],
        ),
    }
}

fn type_violation(row: u32, column: &str, expected: ColumnType, value: &CellValue) -> RowViolation {
    let row_text = row.to_string();
    let expected_text = expected.to_string();
    let value_text = value.as_text();
    RowViolation {
        row,
        column: column.to_string(),
        kind: ViolationKind::TypeMismatch,
        message: t_with_args(
            "import.type_mismatch",
            &[
                ("row", row_text.as_str()),
                ("column", column),
                ("expected", expected_text.as_str()),
                ("value", value_text.as_str()),
            ],
        ),
    }
}
