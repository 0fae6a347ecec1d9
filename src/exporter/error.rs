// ==========================================
// Sheetable 实体表格映射引擎 - 导出错误类型
// ==========================================
// 职责: 导出编排层错误聚合（存储/表格两层透传）
// ==========================================

use crate::repository::error::StoreError;
use crate::sheet::error::SheetError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    // ===== 存储相关错误 =====
    #[error(transparent)]
    Store(#[from] StoreError),

    // ===== 表格相关错误 =====
    #[error(transparent)]
    Sheet(#[from] SheetError),

    // ===== 其他错误 =====
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type ExportResult<T> = Result<T, ExportError>;
