// ==========================================
// Sheetable 实体表格映射引擎 - 导入层
// ==========================================
// 职责: 工作簿 → 实体存储的对账管道
// 分层: 清洗/校验为纯函数,对账器负责编排与事务
// ==========================================

pub mod cell_cleaner;
pub mod error;
pub mod reconciler;
pub mod report;
pub mod validator;

pub use cell_cleaner::CellCleaner;
pub use error::{ErrorEnvelope, ImportError, ImportResult};
pub use reconciler::ImportReconciler;
pub use report::ImportReport;
pub use validator::{RowViolation, SchemaValidator, ViolationKind};
