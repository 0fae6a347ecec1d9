// ==========================================
// Sheetable 实体表格映射引擎 - 导出映射套用
// ==========================================
// 职责: 把显式映射声明套到已解析的平面列/行上
// 红线: 声明序决定输出序;源列不全的条目整条静默丢弃
// ==========================================

use crate::domain::export_mapping::{ExportMappingSpec, MappingEntry};
use crate::domain::types::CellValue;
use crate::engine::join_mapper::JoinMapper;
use indexmap::IndexMap;

/// ExportMappingApplier - 导出映射套用器
pub struct ExportMappingApplier;

impl ExportMappingApplier {
    /// 套用到表头: 声明序 ∩ 实际可用列
    ///
    /// 普通条目要求列本身存在;派生条目要求全部源列存在,
    /// 存活的派生条目以逻辑名入表头。
    pub fn apply_to_headings(spec: &ExportMappingSpec, columns: &[String]) -> Vec<String> {
        spec.entries
            .iter()
            .filter(|entry| Self::entry_applies(entry, columns))
            .map(|entry| entry.heading_name().to_string())
            .collect()
    }

    /// 套用到单行: 与 apply_to_headings 输出逐位对齐
    ///
    /// 普通条目透传源值;派生条目按声明序收齐源值交给组合函数。
    /// 取值统一走 JoinMapper::flat_value,集合列与免映射路径同样
    /// 落首个子行,行上彻底缺失的键以 Null 代入。
    pub fn apply_to_row(
        spec: &ExportMappingSpec,
        columns: &[String],
        row: &IndexMap<String, CellValue>,
    ) -> Vec<CellValue> {
        spec.entries
            .iter()
            .filter(|entry| Self::entry_applies(entry, columns))
            .map(|entry| match entry {
                MappingEntry::Column(name) => JoinMapper::flat_value(row, name),
                MappingEntry::Combined { select, combine, .. } => {
                    let sources: Vec<CellValue> = select
                        .iter()
                        .map(|s| JoinMapper::flat_value(row, s))
                        .collect();
                    combine(&sources)
                }
            })
            .collect()
    }

    /// 条目是否存活（全部源列在解析结果中）
    fn entry_applies(entry: &MappingEntry, columns: &[String]) -> bool {
        entry
            .source_names()
            .iter()
            .all(|source| columns.iter().any(|c| c == source))
    }
}
