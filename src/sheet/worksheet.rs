// ==========================================
// Sheetable 实体表格映射引擎 - 内存工作表
// ==========================================
// 职责: 行列网格的读写/表头定位/扇出插列/范围查询
// 约定: 行列均为 1 基;第 1 行为表头行;单元格存"已计算值",
//       公式求值属外部表格引擎
// ==========================================

use crate::domain::types::CellValue;
use crate::sheet::validation::DataValidation;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ==========================================
// Cell - 单元格
// ==========================================
// 值与数据有效性约束分开存放;只挂约束的空单元格用于"预留校验行"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub value: CellValue,
    pub validation: Option<DataValidation>,
}

impl Cell {
    fn with_value(value: CellValue) -> Self {
        Self {
            value,
            validation: None,
        }
    }
}

// ==========================================
// Worksheet - 内存工作表
// ==========================================
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Worksheet {
    name: String,
    cells: BTreeMap<(u32, u32), Cell>,
}

impl Worksheet {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            cells: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // ===== 单元格读写 =====

    pub fn set_value(&mut self, row: u32, col: u32, value: CellValue) {
        match self.cells.get_mut(&(row, col)) {
            Some(cell) => cell.value = value,
            None => {
                self.cells.insert((row, col), Cell::with_value(value));
            }
        }
    }

    /// 读取值（缺失单元格视为 Null）
    pub fn value(&self, row: u32, col: u32) -> CellValue {
        self.cells
            .get(&(row, col))
            .map(|c| c.value.clone())
            .unwrap_or(CellValue::Null)
    }

    pub fn cell(&self, row: u32, col: u32) -> Option<&Cell> {
        self.cells.get(&(row, col))
    }

    pub fn set_validation(&mut self, row: u32, col: u32, validation: DataValidation) {
        match self.cells.get_mut(&(row, col)) {
            Some(cell) => cell.validation = Some(validation),
            None => {
                self.cells.insert(
                    (row, col),
                    Cell {
                        value: CellValue::Null,
                        validation: Some(validation),
                    },
                );
            }
        }
    }

    pub fn validation(&self, row: u32, col: u32) -> Option<&DataValidation> {
        self.cells.get(&(row, col)).and_then(|c| c.validation.as_ref())
    }

    /// 摘除单元格上的数据有效性约束（导入反解时使用）
    pub fn take_validation(&mut self, row: u32, col: u32) -> Option<DataValidation> {
        self.cells.get_mut(&(row, col)).and_then(|c| c.validation.take())
    }

    // ===== 范围查询 =====

    /// 最大行号（含只挂约束的单元格;空表为 0）
    pub fn max_row(&self) -> u32 {
        self.cells.keys().map(|(r, _)| *r).max().unwrap_or(0)
    }

    /// 最大列号（含只挂约束的单元格;空表为 0）
    pub fn max_column(&self) -> u32 {
        self.cells.keys().map(|(_, c)| *c).max().unwrap_or(0)
    }

    /// 最后一个持有非空值的行号
    ///
    /// 预留校验行只挂约束不带值,不计入数据范围;
    /// 多个下拉字段先后铺设预留行时以此口径保证互不放大。
    pub fn last_data_row(&self) -> u32 {
        self.cells
            .iter()
            .filter(|(_, cell)| !cell.value.is_null())
            .map(|((r, _), _)| *r)
            .max()
            .unwrap_or(0)
    }

    /// 最后一个持有非空值的列号
    pub fn last_data_column(&self) -> u32 {
        self.cells
            .iter()
            .filter(|(_, cell)| !cell.value.is_null())
            .map(|((_, c), _)| *c)
            .max()
            .unwrap_or(0)
    }

    // ===== 表头定位 =====

    /// 表头行（第 1 行）各列名, 按列序
    pub fn headers(&self) -> Vec<(u32, String)> {
        self.cells
            .range((1, 1)..(2, 1))
            .filter(|(_, cell)| !cell.value.is_null())
            .map(|((_, c), cell)| (*c, cell.value.as_text()))
            .collect()
    }

    /// 按表头名定位列号
    pub fn header_column(&self, name: &str) -> Option<u32> {
        self.headers()
            .into_iter()
            .find(|(_, h)| h == name)
            .map(|(c, _)| c)
    }

    /// 写表头行
    pub fn write_headers(&mut self, names: &[String]) {
        for (idx, name) in names.iter().enumerate() {
            self.set_value(1, idx as u32 + 1, CellValue::Text(name.clone()));
        }
    }

    /// 整行写入（从第 1 列起）
    pub fn write_row(&mut self, row: u32, values: &[CellValue]) {
        for (idx, value) in values.iter().enumerate() {
            if !value.is_null() {
                self.set_value(row, idx as u32 + 1, value.clone());
            }
        }
    }

    /// 按表头将一行读成有序映射（表头名 → 值）
    pub fn row_map(&self, row: u32) -> IndexMap<String, CellValue> {
        let mut map = IndexMap::new();
        for (col, header) in self.headers() {
            map.insert(header, self.value(row, col));
        }
        map
    }

    /// 整行是否无任何非空值
    pub fn is_blank_row(&self, row: u32) -> bool {
        self.cells
            .range((row, 1)..(row + 1, 1))
            .all(|(_, cell)| cell.value.is_null())
    }

    // ===== 结构变更 =====

    /// 在指定列右侧插入 count 个空列, 右侧既有内容整体右移
    ///
    /// 每次调用重建网格而非原位窜移,避免别名窜改。
    pub fn insert_columns_after(&mut self, col: u32, count: u32) {
        if count == 0 {
            return;
        }
        let old = std::mem::take(&mut self.cells);
        self.cells = old
            .into_iter()
            .map(|((r, c), cell)| {
                let new_col = if c > col { c + count } else { c };
                ((r, new_col), cell)
            })
            .collect();
    }
}

// ==========================================
// Workbook - 具名工作表集合
// ==========================================
// 用途: 数据表 + metadata 注册表的载体;表序即创建序
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Workbook {
    sheets: IndexMap<String, Worksheet>,
}

impl Workbook {
    pub fn new() -> Self {
        Self {
            sheets: IndexMap::new(),
        }
    }

    pub fn sheet(&self, name: &str) -> Option<&Worksheet> {
        self.sheets.get(name)
    }

    pub fn sheet_mut(&mut self, name: &str) -> Option<&mut Worksheet> {
        self.sheets.get_mut(name)
    }

    /// 具名查找,不存在则创建（幂等 get-or-create）
    pub fn get_or_create(&mut self, name: &str) -> &mut Worksheet {
        self.sheets
            .entry(name.to_string())
            .or_insert_with(|| Worksheet::new(name))
    }

    pub fn insert(&mut self, sheet: Worksheet) {
        self.sheets.insert(sheet.name().to_string(), sheet);
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.keys().map(|k| k.as_str()).collect()
    }

    pub fn first_sheet(&self) -> Option<&Worksheet> {
        self.sheets.values().next()
    }
}
