// ==========================================
// Sheetable 实体表格映射引擎 - 引擎层入口
// ==========================================
// 职责: 列结构解析 / 实体图拍平 / 下拉解析 / 注册表 / 导出映射
// 约定: 引擎无持久状态,全部经 EntityStore 读写
// ==========================================

// ===== 模块声明 =====
pub mod column_schema;
pub mod dropdown_resolver;
pub mod export_mapping;
pub mod join_mapper;
pub mod metadata;

// ===== 重导出核心类型 =====
pub use column_schema::ColumnSchemaResolver;
pub use dropdown_resolver::{DropdownFieldResolver, PivotAttachments};
pub use export_mapping::ExportMappingApplier;
pub use join_mapper::JoinMapper;
pub use metadata::{MetadataRegistry, RegistryBlock};
