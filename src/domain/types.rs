// ==========================================
// Sheetable 实体表格映射引擎 - 领域类型定义
// ==========================================
// 职责: 单元格值 / 列存储类型 / 导出格式
// 红线: CellValue 为引擎唯一动态标量,不引入第二套值体系
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 单元格值 (Cell Value)
// ==========================================
// 用途: 工作表单元格与实体属性共用的动态标量
// 对齐: calamine 数据模型（Empty/Bool/Int/Float/String/DateTime）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    DateTime(NaiveDateTime),
}

impl CellValue {
    /// 是否为空值
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// 文本视图（空值 → 空串）
    pub fn as_text(&self) -> String {
        self.to_string()
    }

    /// 整数视图（Int 直取; 无小数部分的 Float 与可解析的 Text 亦可）
    pub fn as_int(&self) -> Option<i64> {
        match self {
            CellValue::Int(v) => Some(*v),
            CellValue::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            CellValue::Text(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
    }

    /// 浮点视图
    pub fn as_float(&self) -> Option<f64> {
        match self {
            CellValue::Int(v) => Some(*v as f64),
            CellValue::Float(v) => Some(*v),
            CellValue::Text(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// 主键归一化表示
    ///
    /// 重复检测与下拉反查需要跨类型比较主键
    /// （XLSX 数值列读出 Float、CSV 读出 Text），统一折叠为显示文本。
    pub fn key_string(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => Ok(()),
            CellValue::Bool(b) => write!(f, "{}", if *b { "1" } else { "0" }),
            CellValue::Int(v) => write!(f, "{}", v),
            CellValue::Float(v) => write!(f, "{}", v),
            CellValue::Text(s) => write!(f, "{}", s),
            CellValue::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<i64> for CellValue {
    fn from(v: i64) -> Self {
        CellValue::Int(v)
    }
}

impl From<f64> for CellValue {
    fn from(v: f64) -> Self {
        CellValue::Float(v)
    }
}

// ==========================================
// 列存储类型 (Column Type)
// ==========================================
// 用途: 日期清洗定位 datetime 列 / 导入类型校验 / 建表类型映射
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ColumnType {
    Text,
    Integer,
    Float,
    Boolean,
    Date,
    DateTime,
}

impl ColumnType {
    /// 是否为日期时间类存储类型（导入清洗阶段的判定口径）
    pub fn is_datetime(&self) -> bool {
        matches!(self, ColumnType::Date | ColumnType::DateTime)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Text => write!(f, "TEXT"),
            ColumnType::Integer => write!(f, "INTEGER"),
            ColumnType::Float => write!(f, "FLOAT"),
            ColumnType::Boolean => write!(f, "BOOLEAN"),
            ColumnType::Date => write!(f, "DATE"),
            ColumnType::DateTime => write!(f, "DATETIME"),
        }
    }
}

// ==========================================
// 导出格式 (Export Format)
// ==========================================
// 用途: 文件命名约定 {table}.{extension} 的唯一格式来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExportFormat {
    #[default]
    Xlsx,
    Xls,
    Csv,
    Tsv,
    Ods,
    Html,
    Pdf,
}

impl ExportFormat {
    /// 文件扩展名（不带点）
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Xlsx => "xlsx",
            ExportFormat::Xls => "xls",
            ExportFormat::Csv => "csv",
            ExportFormat::Tsv => "tsv",
            ExportFormat::Ods => "ods",
            ExportFormat::Html => "html",
            ExportFormat::Pdf => "pdf",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.extension())
    }
}
