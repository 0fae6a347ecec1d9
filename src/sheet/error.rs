// ==========================================
// Sheetable 实体表格映射引擎 - 表格层错误类型
// ==========================================
// 依据: Rust 错误处理最佳实践
// 工具: thiserror 派生宏
// ==========================================

use thiserror::Error;

/// 表格读写层错误类型
#[derive(Error, Debug)]
pub enum SheetError {
    // ===== 文件相关错误 =====
    #[error("文件不存在: {0}")]
    FileNotFound(String),

    #[error("文件格式不支持: {0}（仅支持 .xlsx/.xls/.ods/.csv/.tsv）")]
    UnsupportedFormat(String),

    #[error("文件读取失败: {0}")]
    FileReadError(String),

    #[error("文件写入失败: {0}")]
    FileWriteError(String),

    // ===== 解析错误 =====
    #[error("工作簿解析失败: {0}")]
    WorkbookParseError(String),

    #[error("工作表不存在: {0}")]
    SheetNotFound(String),

    #[error("分隔符文件解析失败: {0}")]
    DelimitedParseError(String),

    // ===== 结构错误 =====
    #[error("表头行缺失: 工作表 {0} 第 1 行无内容")]
    MissingHeaderRow(String),

    #[error("表头列重复: {0}")]
    DuplicateHeader(String),

    // ===== 通用错误 =====
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// 实现 From<std::io::Error>
impl From<std::io::Error> for SheetError {
    fn from(err: std::io::Error) -> Self {
        SheetError::FileReadError(err.to_string())
    }
}

// 实现 From<calamine::Error>
impl From<calamine::Error> for SheetError {
    fn from(err: calamine::Error) -> Self {
        SheetError::WorkbookParseError(err.to_string())
    }
}

// 实现 From<csv::Error>
impl From<csv::Error> for SheetError {
    fn from(err: csv::Error) -> Self {
        SheetError::DelimitedParseError(err.to_string())
    }
}

pub type SheetResult<T> = Result<T, SheetError>;
