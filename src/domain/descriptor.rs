// ==========================================
// Sheetable 实体表格映射引擎 - 实体描述符
// ==========================================
// 职责: 实体静态声明（表/列/主键/关系）与运行时记录
// 红线: 关系基数为封闭标签变体,一次解析,不做运行时类型探测
// ==========================================

use crate::domain::dropdown::DropdownConfig;
use crate::domain::export_mapping::ExportMappingSpec;
use crate::domain::join::JoinSpec;
use crate::domain::types::{CellValue, ColumnType};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// 服务端管理的审计列（导入时一律丢弃,由存储层回填）
pub const AUDIT_COLUMNS: [&str; 4] = ["created_at", "updated_at", "created_by", "updated_by"];

/// 是否为审计列
pub fn is_audit_column(name: &str) -> bool {
    AUDIT_COLUMNS.contains(&name)
}

// ==========================================
// ColumnDef - 列定义
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub column_type: ColumnType,
    pub required: bool,
}

impl ColumnDef {
    pub fn new(name: &str, column_type: ColumnType) -> Self {
        Self {
            name: name.to_string(),
            column_type,
            required: false,
        }
    }

    /// 标记为必填列（导入校验阶段使用）
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

// ==========================================
// RelationKind - 关系基数变体
// ==========================================
// 每个变体携带其拼接规则所需的键信息:
// - ToOne: 外键在父表行上（belongsTo 语义）
// - ToMany: 外键在子表行上回指父表（hasMany 语义）
// - ManyToMany: 经中间表双外键展开
// - MorphToOne: 目标类型按行由 type_column 求得
// - MorphToMany: 中间表额外携带父类型列
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationKind {
    ToOne {
        foreign_key: String,
    },
    ToMany {
        foreign_key: String,
    },
    ManyToMany {
        pivot_table: String,
        parent_key: String,
        related_key: String,
    },
    MorphToOne {
        type_column: String,
        id_column: String,
    },
    MorphToMany {
        pivot_table: String,
        parent_key: String,
        related_key: String,
        type_column: String,
    },
}

// ==========================================
// RelationDef - 关系定义
// ==========================================
// related_type 为 None 仅出现在 MorphToOne（目标类型按行求得）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationDef {
    pub name: String,
    pub related_type: Option<String>,
    pub kind: RelationKind,
}

impl RelationDef {
    /// belongsTo 语义: 父表行上持有外键
    pub fn to_one(name: &str, related_type: &str, foreign_key: &str) -> Self {
        Self {
            name: name.to_string(),
            related_type: Some(related_type.to_string()),
            kind: RelationKind::ToOne {
                foreign_key: foreign_key.to_string(),
            },
        }
    }

    /// hasMany 语义: 子表行上持有回指外键
    pub fn to_many(name: &str, related_type: &str, foreign_key: &str) -> Self {
        Self {
            name: name.to_string(),
            related_type: Some(related_type.to_string()),
            kind: RelationKind::ToMany {
                foreign_key: foreign_key.to_string(),
            },
        }
    }

    /// belongsToMany 语义: 经中间表展开
    pub fn many_to_many(
        name: &str,
        related_type: &str,
        pivot_table: &str,
        parent_key: &str,
        related_key: &str,
    ) -> Self {
        Self {
            name: name.to_string(),
            related_type: Some(related_type.to_string()),
            kind: RelationKind::ManyToMany {
                pivot_table: pivot_table.to_string(),
                parent_key: parent_key.to_string(),
                related_key: related_key.to_string(),
            },
        }
    }

    /// morphTo 语义: 目标类型按行由 type_column 求得
    pub fn morph_to_one(name: &str, type_column: &str, id_column: &str) -> Self {
        Self {
            name: name.to_string(),
            related_type: None,
            kind: RelationKind::MorphToOne {
                type_column: type_column.to_string(),
                id_column: id_column.to_string(),
            },
        }
    }

    /// morphToMany 语义: 中间表携带父类型列
    pub fn morph_to_many(
        name: &str,
        related_type: &str,
        pivot_table: &str,
        parent_key: &str,
        related_key: &str,
        type_column: &str,
    ) -> Self {
        Self {
            name: name.to_string(),
            related_type: Some(related_type.to_string()),
            kind: RelationKind::MorphToMany {
                pivot_table: pivot_table.to_string(),
                parent_key: parent_key.to_string(),
                related_key: related_key.to_string(),
                type_column: type_column.to_string(),
            },
        }
    }

    /// 是否为集合侧关系（展开到多行/多列）
    pub fn is_collection(&self) -> bool {
        matches!(
            self.kind,
            RelationKind::ToMany { .. }
                | RelationKind::ManyToMany { .. }
                | RelationKind::MorphToMany { .. }
        )
    }
}

// ==========================================
// EntityDescriptor - 实体描述符
// ==========================================
// 用途: 每实体类型一份的静态声明（配置,非运行时状态）
// 生命周期: 注册到 EntityStore 后只读
// 注: 携带派生列组合函数,不参与 serde
#[derive(Debug, Clone)]
pub struct EntityDescriptor {
    pub entity_type: String,
    pub table: String,
    pub primary_key: String,
    pub columns: Vec<ColumnDef>,
    pub relations: IndexMap<String, RelationDef>,
    pub joins: Vec<JoinSpec>,
    pub dropdowns: Vec<DropdownConfig>,
    pub export_mapping: Option<ExportMappingSpec>,
}

impl EntityDescriptor {
    pub fn new(entity_type: &str, table: &str) -> Self {
        Self {
            entity_type: entity_type.to_string(),
            table: table.to_string(),
            primary_key: "id".to_string(),
            columns: Vec::new(),
            relations: IndexMap::new(),
            joins: Vec::new(),
            dropdowns: Vec::new(),
            export_mapping: None,
        }
    }

    pub fn primary_key(mut self, key: &str) -> Self {
        self.primary_key = key.to_string();
        self
    }

    pub fn column(mut self, name: &str, column_type: ColumnType) -> Self {
        self.columns.push(ColumnDef::new(name, column_type));
        self
    }

    pub fn required_column(mut self, name: &str, column_type: ColumnType) -> Self {
        self.columns.push(ColumnDef::new(name, column_type).required());
        self
    }

    pub fn relation(mut self, def: RelationDef) -> Self {
        self.relations.insert(def.name.clone(), def);
        self
    }

    pub fn join(mut self, spec: JoinSpec) -> Self {
        self.joins.push(spec);
        self
    }

    pub fn dropdown(mut self, config: DropdownConfig) -> Self {
        self.dropdowns.push(config);
        self
    }

    pub fn export_mapping(mut self, mapping: ExportMappingSpec) -> Self {
        self.export_mapping = Some(mapping);
        self
    }

    // ===== 只读访问 =====

    /// 本体列名（存储序）
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column_def(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_def(name).is_some()
    }

    pub fn relation_def(&self, name: &str) -> Option<&RelationDef> {
        self.relations.get(name)
    }
}

// ==========================================
// EntityRecord - 运行时实体记录
// ==========================================
// 用途: 存储层读出的一行;属性序即存储序
// 红线: 引擎侧只经 get/set 访问,不做动态属性解析
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub entity_type: String,
    pub attributes: IndexMap<String, CellValue>,
}

impl EntityRecord {
    pub fn new(entity_type: &str) -> Self {
        Self {
            entity_type: entity_type.to_string(),
            attributes: IndexMap::new(),
        }
    }

    /// 取字段值（缺失字段视为 Null）
    pub fn get(&self, field: &str) -> CellValue {
        self.attributes
            .get(field)
            .cloned()
            .unwrap_or(CellValue::Null)
    }

    pub fn set(mut self, field: &str, value: CellValue) -> Self {
        self.attributes.insert(field.to_string(), value);
        self
    }

    pub fn insert(&mut self, field: &str, value: CellValue) {
        self.attributes.insert(field.to_string(), value);
    }
}
