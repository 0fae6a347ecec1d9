// ==========================================
// Sheetable 实体表格映射引擎 - 导出层入口
// ==========================================
// 职责: 实体集/空白模板导出编排与文件名约定
// ==========================================

// ===== 模块声明 =====
pub mod error;
pub mod export_service;

// ===== 重导出核心类型 =====
pub use error::{ExportError, ExportResult};
pub use export_service::ExportService;
