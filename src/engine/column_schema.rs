// ==========================================
// Sheetable 实体表格映射引擎 - 列架构解析器
// ==========================================
// 职责: 由实体声明 + 连接树静态推导扁平列清单
// 拼接规则: to-one 原位替换外键列 / to-many 去回指键后追加 /
//           其余基数不改动父列清单
// ==========================================

use crate::domain::descriptor::{EntityDescriptor, RelationKind};
use crate::domain::join::JoinSpec;
use crate::repository::entity_store::EntityStore;
use crate::repository::error::{StoreError, StoreResult};

/// ColumnSchemaResolver - 列架构解析器
///
/// 纯函数式: 每层递归产出新 Vec, 不窜改共享状态。
pub struct ColumnSchemaResolver;

impl ColumnSchemaResolver {
    /// 按实体声明上的连接树解析列清单
    pub fn resolve(store: &dyn EntityStore, entity_type: &str) -> StoreResult<Vec<String>> {
        let desc = store.descriptor(entity_type)?;
        Self::resolve_with_joins(store, desc, &desc.joins)
    }

    /// 按显式连接树解析列清单
    pub fn resolve_with_joins(
        store: &dyn EntityStore,
        desc: &EntityDescriptor,
        joins: &[JoinSpec],
    ) -> StoreResult<Vec<String>> {
        Self::resolve_level(store, desc, desc.column_names(), joins)
    }

    /// 单层解析: base 为本层列清单, joins 逐个拼入
    fn resolve_level(
        store: &dyn EntityStore,
        desc: &EntityDescriptor,
        base: Vec<String>,
        joins: &[JoinSpec],
    ) -> StoreResult<Vec<String>> {
        let mut columns = base;

        for join in joins {
            let rel = desc.relation_def(&join.relation).ok_or_else(|| {
                StoreError::UnknownRelation {
                    entity: desc.entity_type.clone(),
                    relation: join.relation.clone(),
                }
            })?;

            let related_type = match rel.related_type.as_deref() {
                Some(t) => t,
                // 多态单值关系对端类型按行才可知,列架构不拼接
                None => continue,
            };
            let related_desc = store.descriptor(related_type)?;

            // select 先收窄, except 再剔除
            let filtered = join.filter_columns(&related_desc.column_names());
            // 嵌套连接以过滤后的清单为下一层 base,点号前缀逐层累积
            let nested = Self::resolve_level(store, related_desc, filtered, &join.nested)?;
            let prefixed: Vec<String> = nested
                .iter()
                .map(|c| format!("{}.{}", join.relation, c))
                .collect();

            match &rel.kind {
                RelationKind::ToOne { foreign_key } => {
                    match columns.iter().position(|c| c == foreign_key) {
                        Some(pos) => {
                            // 外键列原位替换为关联列组
                            columns.splice(pos..=pos, prefixed);
                        }
                        // 外键列已被上层过滤掉时退化为追加
                        None => columns.extend(prefixed),
                    }
                }
                RelationKind::ToMany { foreign_key } => {
                    // 子表回指外键冗余,剔除后整组追加
                    let back_fk = format!("{}.{}", join.relation, foreign_key);
                    columns.extend(prefixed.into_iter().filter(|c| *c != back_fk));
                }
                // 多对多与多态基数不进列架构（扇出列由下拉解析器铺设）
                _ => {}
            }
        }

        Ok(columns)
    }
}
