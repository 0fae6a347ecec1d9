// ==========================================
// Sheetable - 实体表格映射引擎核心库
// ==========================================
// 定位: 关系实体图 ⇄ 平面表格的双向映射
// 技术栈: Rust + SQLite (参考存储) + calamine/csv 表格边界
// ==========================================

// 初始化国际化系统
rust_i18n::i18n!("locales", fallback = "zh-CN");

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 声明与值类型
pub mod domain;

// 表格层 - 内存工作簿与文件边界
pub mod sheet;

// 数据仓储层 - 实体存储契约与 SQLite 参考实现
pub mod repository;

// 引擎层 - 列结构/拍平/下拉/映射
pub mod engine;

// 导出层 - 工作簿编排
pub mod exporter;

// 导入层 - 对账与落库
pub mod importer;

// 配置层 - 引擎配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// 国际化
pub mod i18n;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{CellValue, ColumnType, ExportFormat};

// 领域声明
pub use domain::{
    DropdownConfig, DropdownStrategy, EntityDescriptor, EntityRecord, ExportMappingSpec,
    JoinSpec, RelationDef, RelationKind, ScopePolicy,
};

// 配置
pub use config::SheetableConfig;

// 表格层
pub use sheet::{DataValidation, Workbook, Worksheet};

// 存储契约
pub use repository::{EntityStore, EntityTransaction, SqliteEntityStore};

// 引擎
pub use engine::{
    ColumnSchemaResolver, DropdownFieldResolver, ExportMappingApplier, JoinMapper,
    MetadataRegistry,
};

// 编排服务
pub use exporter::ExportService;
pub use importer::{ErrorEnvelope, ImportError, ImportReconciler, ImportReport};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "Sheetable 实体表格映射引擎";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
