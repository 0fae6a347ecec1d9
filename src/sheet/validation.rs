// ==========================================
// Sheetable 实体表格映射引擎 - 数据有效性约束
// ==========================================
// 职责: 单元格 list 型数据有效性描述（字面清单 / 表内区域引用）
// 红线: 只承载约束语义,渲染为具体文件格式属外部写出器
// ==========================================

use serde::{Deserialize, Serialize};

// ==========================================
// ValidationSource - 有效值来源
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ValidationSource {
    /// 内联字面清单（逗号拼接,上游已截断）
    InlineList(String),
    /// 工作表区域引用（指向注册表列块）
    SheetRange { sheet: String, range: String },
}

// ==========================================
// DataValidation - list 型数据有效性
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataValidation {
    pub source: ValidationSource,
}

impl DataValidation {
    pub fn inline_list(list: &str) -> Self {
        Self {
            source: ValidationSource::InlineList(list.to_string()),
        }
    }

    pub fn sheet_range(sheet: &str, range: &str) -> Self {
        Self {
            source: ValidationSource::SheetRange {
                sheet: sheet.to_string(),
                range: range.to_string(),
            },
        }
    }

    /// 渲染为公式文本（内联清单加引号,区域引用带表名前缀）
    pub fn formula(&self) -> String {
        match &self.source {
            ValidationSource::InlineList(list) => format!("\"{}\"", list),
            ValidationSource::SheetRange { sheet, range } => format!("{}!{}", sheet, range),
        }
    }
}
