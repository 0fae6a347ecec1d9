// ==========================================
// Sheetable 实体表格映射引擎 - 连接声明
// ==========================================
// 职责: 单步关系遍历的不可变声明,支持任意深度嵌套
// 红线: 构造后不可变;过滤规则 select 先收窄、except 后剔除
// ==========================================

use serde::{Deserialize, Serialize};

// ==========================================
// JoinSpec - 连接声明
// ==========================================
// 用途: 声明一步关系遍历（关系名 + 列过滤 + 嵌套子连接）
// 生命周期: 每实体类型一份的静态配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinSpec {
    /// 关系名（须在父实体描述符的 relations 中可解析）
    pub relation: String,
    /// 列收窄清单（空 = 全保留）
    pub select: Vec<String>,
    /// 列剔除清单（作用于收窄后的结果）
    pub except: Vec<String>,
    /// 嵌套子连接（根在关联实体类型上）
    pub nested: Vec<JoinSpec>,
}

impl JoinSpec {
    pub fn new(relation: &str) -> Self {
        Self {
            relation: relation.to_string(),
            select: Vec::new(),
            except: Vec::new(),
            nested: Vec::new(),
        }
    }

    pub fn select(mut self, fields: &[&str]) -> Self {
        self.select = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn except(mut self, fields: &[&str]) -> Self {
        self.except = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn nested(mut self, spec: JoinSpec) -> Self {
        self.nested.push(spec);
        self
    }

    /// 对关联实体列清单应用过滤
    ///
    /// 次序固定: select 先收窄（空清单保留全部），except 再剔除。
    /// 结果保持源列序，每次调用产生全新 Vec。
    pub fn filter_columns(&self, columns: &[String]) -> Vec<String> {
        columns
            .iter()
            .filter(|c| self.select.is_empty() || self.select.contains(c))
            .filter(|c| !self.except.contains(c))
            .cloned()
            .collect()
    }

    /// 字段是否通过过滤（给值映射侧使用,口径与 filter_columns 一致）
    pub fn passes_filter(&self, field: &str) -> bool {
        (self.select.is_empty() || self.select.iter().any(|s| s == field))
            && !self.except.iter().any(|e| e == field)
    }
}
