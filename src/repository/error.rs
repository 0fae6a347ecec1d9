// ==========================================
// Sheetable 实体表格映射引擎 - 仓储层错误类型
// ==========================================
// 依据: Rust 错误处理最佳实践
// 工具: thiserror 派生宏
// ==========================================

use thiserror::Error;

/// 实体存储层错误类型
#[derive(Error, Debug)]
pub enum StoreError {
    // ===== 声明错误 =====
    #[error("实体类型未注册: {0}")]
    UnknownEntity(String),

    #[error("关系未声明: {entity}.{relation}")]
    UnknownRelation { entity: String, relation: String },

    // ===== 数据库错误 =====
    #[error("记录未找到: {entity} with id={id}")]
    NotFound { entity: String, id: String },

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    #[error("数据库锁获取失败: {0}")]
    LockError(String),

    #[error("数据库事务失败: {0}")]
    DatabaseTransactionError(String),

    #[error("数据库查询失败: {0}")]
    DatabaseQueryError(String),

    #[error("唯一约束违反: {0}")]
    UniqueConstraintViolation(String),

    #[error("外键约束违反: {0}")]
    ForeignKeyViolation(String),

    // ===== 数据质量错误 =====
    #[error("字段值错误 (field={field}): {message}")]
    FieldValueError { field: String, message: String },

    // ===== 通用错误 =====
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// 实现 From<rusqlite::Error>
impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(_, Some(msg)) => {
                if msg.contains("UNIQUE") {
                    StoreError::UniqueConstraintViolation(msg)
                } else if msg.contains("FOREIGN KEY") {
                    StoreError::ForeignKeyViolation(msg)
                } else {
                    StoreError::DatabaseQueryError(msg)
                }
            }
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound {
                entity: "Unknown".to_string(),
                id: "Unknown".to_string(),
            },
            _ => StoreError::DatabaseQueryError(err.to_string()),
        }
    }
}

/// Result 类型别名
pub type StoreResult<T> = Result<T, StoreError>;
