// ==========================================
// Sheetable 实体表格映射引擎 - 下拉字段声明
// ==========================================
// 职责: 下拉字段的不可变声明与解析策略判定
// 红线: 四种策略互斥,按固定优先级判定,不允许组合生效
// ==========================================

use serde::{Deserialize, Serialize};

// ==========================================
// DropdownStrategy - 解析策略
// ==========================================
// 判定优先级: Embedded > FanOut > FixedList > ForeignKey
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DropdownStrategy {
    /// 内联公式下拉（字面值清单,255 字符截断）
    Embedded,
    /// 多对多扇出列（{field}_1..{field}_N）
    FanOut,
    /// 固定字面值清单（无外键反查）
    FixedList,
    /// 普通外键反查（id ↔ 显示文本）
    ForeignKey,
}

// ==========================================
// DropdownConfig - 下拉字段声明
// ==========================================
// 用途: 声明一个字段为查表字段
// 生命周期: 每实体类型一份的静态配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropdownConfig {
    /// 目标字段名; FanOut 策略下同时是多对多关系名
    pub field: String,
    /// 外部模型类型名（FixedList 策略下为 None）
    pub foreign_type: Option<String>,
    /// 外部模型主键列（默认 "id"）
    pub foreign_id_column: String,
    /// 外部模型显示文本列
    pub foreign_text_column: String,
    /// 内联公式模式开关
    pub embedded: bool,
    /// 固定字面值清单
    pub fixed_list: Vec<String>,
    /// 扇出列插入锚点（紧随其右插入）
    pub mapping_right_of_field: Option<String>,
    /// 扇出列数下限（>0 即判定为 FanOut 策略）
    pub mapping_min_fields: usize,
}

impl DropdownConfig {
    /// 普通外键下拉
    pub fn foreign_key(field: &str, foreign_type: &str, text_column: &str) -> Self {
        Self {
            field: field.to_string(),
            foreign_type: Some(foreign_type.to_string()),
            foreign_id_column: "id".to_string(),
            foreign_text_column: text_column.to_string(),
            embedded: false,
            fixed_list: Vec::new(),
            mapping_right_of_field: None,
            mapping_min_fields: 0,
        }
    }

    /// 固定字面值清单下拉（原文即值,导入不反查）
    pub fn fixed_list(field: &str, values: &[&str]) -> Self {
        Self {
            field: field.to_string(),
            foreign_type: None,
            foreign_id_column: "id".to_string(),
            foreign_text_column: field.to_string(),
            embedded: false,
            fixed_list: values.iter().map(|v| v.to_string()).collect(),
            mapping_right_of_field: None,
            mapping_min_fields: 0,
        }
    }

    /// 多对多扇出下拉
    ///
    /// field 同时是父实体上的多对多关系名;
    /// 扇出列插在 right_of 紧右侧, 列数下限 min_fields（至少 1）。
    pub fn fan_out(
        field: &str,
        foreign_type: &str,
        text_column: &str,
        right_of: &str,
        min_fields: usize,
    ) -> Self {
        Self {
            field: field.to_string(),
            foreign_type: Some(foreign_type.to_string()),
            foreign_id_column: "id".to_string(),
            foreign_text_column: text_column.to_string(),
            embedded: false,
            fixed_list: Vec::new(),
            mapping_right_of_field: Some(right_of.to_string()),
            mapping_min_fields: min_fields.max(1),
        }
    }

    /// 覆盖外部模型主键列名
    pub fn id_column(mut self, column: &str) -> Self {
        self.foreign_id_column = column.to_string();
        self
    }

    /// 切换为内联公式模式
    pub fn embedded(mut self) -> Self {
        self.embedded = true;
        self
    }

    /// 按固定优先级判定生效策略
    ///
    /// 优先级: embedded > 扇出(mapping_min_fields>0) > 固定清单 > 外键反查
    pub fn strategy(&self) -> DropdownStrategy {
        if self.embedded {
            DropdownStrategy::Embedded
        } else if self.mapping_min_fields > 0 {
            DropdownStrategy::FanOut
        } else if !self.fixed_list.is_empty() {
            DropdownStrategy::FixedList
        } else {
            DropdownStrategy::ForeignKey
        }
    }

    /// 注册表键 "{ShortModelName}.{column}"
    ///
    /// 固定清单无外部模型,以属主实体类型代位,保证键仍全局唯一。
    pub fn registry_key(&self, owner_type: &str) -> String {
        match &self.foreign_type {
            Some(foreign) => format!("{}.{}", foreign, self.foreign_text_column),
            None => format!("{}.{}", owner_type, self.field),
        }
    }
}
