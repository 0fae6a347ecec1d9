// ==========================================
// Sheetable 实体表格映射引擎 - 导出映射声明
// ==========================================
// 职责: 显式列序/分组声明与多源派生列
// 红线: 映射只约束"存在的列",缺失列静默丢弃而非报错
// ==========================================

use crate::domain::types::CellValue;
use std::fmt;
use std::sync::Arc;

/// 派生列组合函数: 按声明序取出源值,合成单一结果值
pub type CombineFn = Arc<dyn Fn(&[CellValue]) -> CellValue + Send + Sync>;

// ==========================================
// MappingEntry - 映射条目
// ==========================================
#[derive(Clone)]
pub enum MappingEntry {
    /// 普通列: 原样透传
    Column(String),
    /// 派生列: 从多个源列合成单值
    Combined {
        name: String,
        select: Vec<String>,
        combine: CombineFn,
    },
}

impl MappingEntry {
    /// 条目在最终表头中的名字
    pub fn heading_name(&self) -> &str {
        match self {
            MappingEntry::Column(name) => name,
            MappingEntry::Combined { name, .. } => name,
        }
    }

    /// 条目依赖的真实源列名
    pub fn source_names(&self) -> Vec<&str> {
        match self {
            MappingEntry::Column(name) => vec![name.as_str()],
            MappingEntry::Combined { select, .. } => select.iter().map(|s| s.as_str()).collect(),
        }
    }
}

// 组合函数不可打印,Debug 输出仅覆盖可见字段
impl fmt::Debug for MappingEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MappingEntry::Column(name) => f.debug_tuple("Column").field(name).finish(),
            MappingEntry::Combined { name, select, .. } => f
                .debug_struct("Combined")
                .field("name", name)
                .field("select", select)
                .finish_non_exhaustive(),
        }
    }
}

// ==========================================
// ExportMappingSpec - 导出映射声明
// ==========================================
// 用途: 每实体类型可选的一份显式列序声明
// 生命周期: 静态配置,构造后不可变
#[derive(Debug, Clone, Default)]
pub struct ExportMappingSpec {
    pub entries: Vec<MappingEntry>,
}

impl ExportMappingSpec {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// 追加普通列条目
    pub fn column(mut self, name: &str) -> Self {
        self.entries.push(MappingEntry::Column(name.to_string()));
        self
    }

    /// 追加派生列条目
    pub fn combined<F>(mut self, name: &str, select: &[&str], combine: F) -> Self
    where
        F: Fn(&[CellValue]) -> CellValue + Send + Sync + 'static,
    {
        self.entries.push(MappingEntry::Combined {
            name: name.to_string(),
            select: select.iter().map(|s| s.to_string()).collect(),
            combine: Arc::new(combine),
        });
        self
    }
}
