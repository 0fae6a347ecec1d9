// ==========================================
// Sheetable 实体表格映射引擎 - 文件读入
// ==========================================
// 职责: 按扩展名把磁盘文件读成内存工作簿
// 支持: Excel (.xlsx/.xls) / OpenDocument (.ods) / 分隔符 (.csv/.tsv)
// ==========================================

use crate::domain::types::CellValue;
use crate::sheet::error::{SheetError, SheetResult};
use crate::sheet::worksheet::{Workbook, Worksheet};
use calamine::{open_workbook_auto, Data, Reader};
use csv::ReaderBuilder;
use std::path::Path;

/// 按扩展名读入工作簿
///
/// 分隔符文件只有一张表,表名取文件主干名。
pub fn read_workbook(path: &Path) -> SheetResult<Workbook> {
    if !path.exists() {
        return Err(SheetError::FileNotFound(path.display().to_string()));
    }

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match ext.as_str() {
        "xlsx" | "xls" | "ods" => read_spreadsheet(path),
        "csv" => read_delimited(path, b','),
        "tsv" => read_delimited(path, b'\t'),
        _ => Err(SheetError::UnsupportedFormat(ext)),
    }
}

// ==========================================
// Excel / ODS 读入
// ==========================================
fn read_spreadsheet(path: &Path) -> SheetResult<Workbook> {
    let mut source = open_workbook_auto(path)?;

    let sheet_names = source.sheet_names().to_vec();
    if sheet_names.is_empty() {
        return Err(SheetError::WorkbookParseError(
            "工作簿无工作表".to_string(),
        ));
    }

    let mut workbook = Workbook::new();
    for sheet_name in sheet_names {
        let range = source
            .worksheet_range(&sheet_name)
            .map_err(|e| SheetError::WorkbookParseError(e.to_string()))?;

        let sheet = workbook.get_or_create(&sheet_name);

        // Range 锚点是首个非空单元格（0 基）,换算回绝对行列号
        let (anchor_row, anchor_col) = range.start().unwrap_or((0, 0));
        for (row_offset, row) in range.rows().enumerate() {
            for (col_offset, cell) in row.iter().enumerate() {
                let value = convert_cell(cell);
                if value.is_null() {
                    continue;
                }
                let row_n = anchor_row + row_offset as u32 + 1;
                let col_n = anchor_col + col_offset as u32 + 1;
                sheet.set_value(row_n, col_n, value);
            }
        }
    }

    Ok(workbook)
}

/// 单元格类型换算
///
/// Excel 日期在文件里是序列数,此处保留原始 Float,
/// 换算成日期由导入清洗环节按列类型决定。
fn convert_cell(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Null,
        Data::String(s) => {
            if s.is_empty() {
                CellValue::Null
            } else {
                CellValue::Text(s.clone())
            }
        }
        Data::Int(i) => CellValue::Int(*i),
        Data::Float(f) => CellValue::Float(*f),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(dt) => CellValue::Float(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Error(_) => CellValue::Null,
    }
}

// ==========================================
// CSV / TSV 读入
// ==========================================
// 分隔符文件不带类型,一律按文本读入;空串视为 Null
fn read_delimited(path: &Path, delimiter: u8) -> SheetResult<Workbook> {
    let sheet_name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("Sheet1")
        .to_string();

    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true) // 允许行长度不一致
        .delimiter(delimiter)
        .from_path(path)?;

    let mut workbook = Workbook::new();
    let sheet = workbook.get_or_create(&sheet_name);

    for (row_idx, result) in reader.records().enumerate() {
        let record = result?;
        for (col_idx, field) in record.iter().enumerate() {
            let trimmed = field.trim();
            if trimmed.is_empty() {
                continue;
            }
            sheet.set_value(
                row_idx as u32 + 1,
                col_idx as u32 + 1,
                CellValue::Text(trimmed.to_string()),
            );
        }
    }

    Ok(workbook)
}
