// ==========================================
// Sheetable 实体表格映射引擎 - 表格层
// ==========================================
// 职责: 内存网格 + 文件边界适配
// 支持: Excel, OpenDocument, CSV/TSV
// ==========================================

// 模块声明
pub mod coords;
pub mod egress;
pub mod error;
pub mod ingest;
pub mod validation;
pub mod worksheet;

// 重导出核心类型
pub use coords::{a1, a1_absolute, column_index, column_letter};
pub use egress::{write_delimited, write_worksheet};
pub use error::{SheetError, SheetResult};
pub use ingest::read_workbook;
pub use validation::{DataValidation, ValidationSource};
pub use worksheet::{Cell, Workbook, Worksheet};
