// ==========================================
// Sheetable 实体表格映射引擎 - 文件写出
// ==========================================
// 职责: 把内存工作表落成分隔符文件 (.csv/.tsv)
// 说明: 只搬运值,样式与 Excel 二进制编码不在本层
// ==========================================

use crate::sheet::error::{SheetError, SheetResult};
use crate::sheet::worksheet::Worksheet;
use csv::WriterBuilder;
use std::path::Path;

/// 按扩展名写出工作表
pub fn write_worksheet(sheet: &Worksheet, path: &Path) -> SheetResult<()> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match ext.as_str() {
        "csv" => write_delimited(sheet, path, b','),
        "tsv" => write_delimited(sheet, path, b'\t'),
        _ => Err(SheetError::UnsupportedFormat(ext)),
    }
}

/// 写出为分隔符文件
///
/// 范围取到最后一个非空值行列,预留校验行不落盘;
/// Null 写成空串,其余按单元格的文本形式。
pub fn write_delimited(sheet: &Worksheet, path: &Path, delimiter: u8) -> SheetResult<()> {
    let mut writer = WriterBuilder::new()
        .delimiter(delimiter)
        .from_path(path)
        .map_err(|e| SheetError::FileWriteError(e.to_string()))?;

    let last_row = sheet.last_data_row();
    let last_col = sheet.last_data_column();

    for row in 1..=last_row {
        let mut record: Vec<String> = Vec::with_capacity(last_col as usize);
        for col in 1..=last_col {
            record.push(sheet.value(row, col).to_string());
        }
        writer
            .write_record(&record)
            .map_err(|e| SheetError::FileWriteError(e.to_string()))?;
    }

    writer
        .flush()
        .map_err(|e| SheetError::FileWriteError(e.to_string()))?;
    Ok(())
}
