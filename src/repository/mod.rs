// ==========================================
// Sheetable 实体表格映射引擎 - 实体存储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供实体数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod entity_store;
pub mod error;
pub mod sqlite_store;

// 重导出核心类型
pub use entity_store::{EntityStore, EntityTransaction};
pub use error::{StoreError, StoreResult};
pub use sqlite_store::SqliteEntityStore;
