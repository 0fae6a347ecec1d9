// ==========================================
// Sheetable 实体表格映射引擎 - 领域模型层
// ==========================================
// 职责: 定义值类型、实体描述符、连接/下拉/映射声明
// 红线: 不含数据访问逻辑,不含引擎逻辑,构造后不可变
// ==========================================

pub mod descriptor;
pub mod dropdown;
pub mod export_mapping;
pub mod join;
pub mod scope;
pub mod types;

// 重导出核心类型
pub use descriptor::{
    is_audit_column, ColumnDef, EntityDescriptor, EntityRecord, RelationDef, RelationKind,
    AUDIT_COLUMNS,
};
pub use dropdown::{DropdownConfig, DropdownStrategy};
pub use export_mapping::{CombineFn, ExportMappingSpec, MappingEntry};
pub use join::JoinSpec;
pub use scope::{AllowAllScope, ScopePolicy};
pub use types::{CellValue, ColumnType, ExportFormat};
