// ==========================================
// Sheetable 实体表格映射引擎 - 连接映射器
// ==========================================
// 职责: 把活体实体图按连接树压成单行点号键值
// 红线: 纯读取,无副作用;关联缺失时省略子树而非报错
// ==========================================

use crate::domain::descriptor::{EntityRecord, RelationKind};
use crate::domain::join::JoinSpec;
use crate::domain::types::CellValue;
use crate::repository::entity_store::EntityStore;
use crate::repository::error::{StoreError, StoreResult};
use indexmap::IndexMap;

/// 中间值树: 叶子 / 单值子树 / 集合子树
#[derive(Debug, Clone)]
enum RowValue {
    Leaf(CellValue),
    Map(IndexMap<String, RowValue>),
    List(Vec<IndexMap<String, RowValue>>),
}

/// JoinMapper - 连接映射器
pub struct JoinMapper;

impl JoinMapper {
    /// 按实体声明上的连接树压平一条记录
    pub fn map_record(
        store: &dyn EntityStore,
        record: &EntityRecord,
    ) -> StoreResult<IndexMap<String, CellValue>> {
        let desc = store.descriptor(&record.entity_type)?;
        Self::map_with_joins(store, record, &desc.joins)
    }

    /// 按显式连接树压平一条记录
    pub fn map_with_joins(
        store: &dyn EntityStore,
        record: &EntityRecord,
        joins: &[JoinSpec],
    ) -> StoreResult<IndexMap<String, CellValue>> {
        let tree = Self::build_map(store, record, joins, None)?;
        let mut flat = IndexMap::new();
        flatten_into(&mut flat, None, tree);
        Ok(flat)
    }

    /// 按表头读一个拍平行值
    ///
    /// 直查不中时退回集合关系的首个子行（"rel.0.field" 位置键）,
    /// 仍不中返回 Null。
    pub fn flat_value(row: &IndexMap<String, CellValue>, heading: &str) -> CellValue {
        if let Some(value) = row.get(heading) {
            return value.clone();
        }
        let parts: Vec<&str> = heading.split('.').collect();
        for i in 1..parts.len() {
            let key = format!("{}.0.{}", parts[..i].join("."), parts[i..].join("."));
            if let Some(value) = row.get(&key) {
                return value.clone();
            }
        }
        CellValue::Null
    }

    /// 构造一层值映射: 本体属性（可过滤）+ 各连接子树
    fn build_map(
        store: &dyn EntityStore,
        record: &EntityRecord,
        joins: &[JoinSpec],
        filter: Option<&JoinSpec>,
    ) -> StoreResult<IndexMap<String, RowValue>> {
        let mut map: IndexMap<String, RowValue> = IndexMap::new();

        match filter {
            // 关联实体: 值映射套用与列架构同一把过滤
            Some(spec) => {
                for (key, value) in &record.attributes {
                    if spec.passes_filter(key) {
                        map.insert(key.clone(), RowValue::Leaf(value.clone()));
                    }
                }
            }
            None => {
                for (key, value) in &record.attributes {
                    map.insert(key.clone(), RowValue::Leaf(value.clone()));
                }
            }
        }

        let desc = store.descriptor(&record.entity_type)?;
        for join in joins {
            let rel = desc.relation_def(&join.relation).ok_or_else(|| {
                StoreError::UnknownRelation {
                    entity: desc.entity_type.clone(),
                    relation: join.relation.clone(),
                }
            })?;

            if rel.is_collection() {
                let related = store.related_many(record, &join.relation)?;
                if related.is_empty() {
                    continue;
                }
                let mut items = Vec::with_capacity(related.len());
                for item in &related {
                    items.push(Self::build_map(store, item, &join.nested, Some(join))?);
                }
                map.insert(join.relation.clone(), RowValue::List(items));
            } else {
                match store.related_one(record, &join.relation)? {
                    Some(related) => {
                        // to-one 外键列被子树取代,与列架构的原位替换对仗
                        if let RelationKind::ToOne { foreign_key } = &rel.kind {
                            map.shift_remove(foreign_key);
                        }
                        let subtree = Self::build_map(store, &related, &join.nested, Some(join))?;
                        map.insert(join.relation.clone(), RowValue::Map(subtree));
                    }
                    // 对端缺失: 整个子树省略
                    None => {}
                }
            }
        }

        Ok(map)
    }
}

/// 点号展开: Map 递归接前缀,List 以位置序号作中段
fn flatten_into(
    out: &mut IndexMap<String, CellValue>,
    prefix: Option<&str>,
    tree: IndexMap<String, RowValue>,
) {
    for (key, value) in tree {
        let full_key = match prefix {
            Some(p) => format!("{}.{}", p, key),
            None => key,
        };
        match value {
            RowValue::Leaf(cell) => {
                out.insert(full_key, cell);
            }
            RowValue::Map(map) => flatten_into(out, Some(&full_key), map),
            RowValue::List(items) => {
                for (idx, item) in items.into_iter().enumerate() {
                    let indexed = format!("{}.{}", full_key, idx);
                    flatten_into(out, Some(&indexed), item);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::descriptor::{EntityDescriptor, RelationDef};
    use crate::domain::types::ColumnType;
    use crate::engine::column_schema::ColumnSchemaResolver;
    use crate::repository::entity_store::EntityTransaction;
    use crate::repository::sqlite_store::SqliteEntityStore;
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    /// 员工 -> 部门 -> 驻地 两级 to-one + 员工 hasMany 任务
    fn graph_store() -> SqliteEntityStore {
        let conn = crate::db::open_in_memory_connection().unwrap();
        let mut store = SqliteEntityStore::from_connection(Arc::new(Mutex::new(conn)));

        store.register(
            EntityDescriptor::new("Employee", "employee")
                .column("id", ColumnType::Integer)
                .column("name", ColumnType::Text)
                .column("department_id", ColumnType::Integer)
                .relation(RelationDef::to_one("department", "Department", "department_id"))
                .relation(RelationDef::to_many("tasks", "Task", "employee_id"))
                .join(JoinSpec::new("department").nested(JoinSpec::new("site"))),
        );
        store.register(
            EntityDescriptor::new("Department", "department")
                .column("id", ColumnType::Integer)
                .column("name", ColumnType::Text)
                .column("site_id", ColumnType::Integer)
                .relation(RelationDef::to_one("site", "Site", "site_id")),
        );
        store.register(
            EntityDescriptor::new("Site", "site")
                .column("id", ColumnType::Integer)
                .column("city", ColumnType::Text),
        );
        store.register(
            EntityDescriptor::new("Task", "task")
                .column("id", ColumnType::Integer)
                .column("name", ColumnType::Text)
                .column("employee_id", ColumnType::Integer),
        );
        store.create_tables().unwrap();

        store
            .with_transaction(|tx| -> StoreResult<()> {
                tx.update_or_create(
                    &EntityRecord::new("Site")
                        .set("id", CellValue::Int(1))
                        .set("city", text("唐山")),
                )?;
                tx.update_or_create(
                    &EntityRecord::new("Department")
                        .set("id", CellValue::Int(3))
                        .set("name", text("精整车间"))
                        .set("site_id", CellValue::Int(1)),
                )?;
                tx.update_or_create(
                    &EntityRecord::new("Employee")
                        .set("id", CellValue::Int(7))
                        .set("name", text("王工"))
                        .set("department_id", CellValue::Int(3)),
                )?;
                tx.update_or_create(
                    &EntityRecord::new("Task")
                        .set("id", CellValue::Int(21))
                        .set("name", text("测厚"))
                        .set("employee_id", CellValue::Int(7)),
                )?;
                tx.update_or_create(
                    &EntityRecord::new("Task")
                        .set("id", CellValue::Int(22))
                        .set("name", text("卷检"))
                        .set("employee_id", CellValue::Int(7)),
                )?;
                Ok(())
            })
            .unwrap();
        store
    }

    #[test]
    fn test_to_one_chain_flattens_with_dotted_keys() {
        let store = graph_store();
        let employee = store.find("Employee", &CellValue::Int(7)).unwrap().unwrap();

        let row = JoinMapper::map_record(&store, &employee).unwrap();
        assert_eq!(row["name"], text("王工"));
        assert_eq!(row["department.name"], text("精整车间"));
        assert_eq!(row["department.site.city"], text("唐山"));
        // 外键列被关联子树取代
        assert!(!row.contains_key("department_id"));
    }

    #[test]
    fn test_schema_and_row_agree_on_to_one_trees() {
        let store = graph_store();
        let employee = store.find("Employee", &CellValue::Int(7)).unwrap().unwrap();

        let columns = ColumnSchemaResolver::resolve(&store, "Employee").unwrap();
        let row = JoinMapper::map_record(&store, &employee).unwrap();

        let column_set: HashSet<&String> = columns.iter().collect();
        let key_set: HashSet<&String> = row.keys().collect();
        assert_eq!(column_set, key_set);
    }

    #[test]
    fn test_to_many_join_emits_positional_keys() {
        let store = graph_store();
        let employee = store.find("Employee", &CellValue::Int(7)).unwrap().unwrap();
        let joins = vec![JoinSpec::new("tasks").select(&["name"])];

        let row = JoinMapper::map_with_joins(&store, &employee, &joins).unwrap();
        assert_eq!(row["tasks.0.name"], text("测厚"));
        assert_eq!(row["tasks.1.name"], text("卷检"));
        assert!(!row.contains_key("tasks.0.employee_id"));
    }

    #[test]
    fn test_morph_joins_emit_subtrees_beyond_schema() {
        let conn = crate::db::open_in_memory_connection().unwrap();
        let mut store = SqliteEntityStore::from_connection(Arc::new(Mutex::new(conn)));
        store.register(
            EntityDescriptor::new("Machine", "machine")
                .column("id", ColumnType::Integer)
                .column("name", ColumnType::Text)
                .relation(RelationDef::morph_to_many(
                    "tags",
                    "Tag",
                    "taggables",
                    "taggable_id",
                    "tag_id",
                    "taggable_type",
                ))
                .join(JoinSpec::new("tags").select(&["label"])),
        );
        store.register(
            EntityDescriptor::new("Remark", "remark")
                .column("id", ColumnType::Integer)
                .column("body", ColumnType::Text)
                .column("subject_type", ColumnType::Text)
                .column("subject_id", ColumnType::Integer)
                .relation(RelationDef::morph_to_one("subject", "subject_type", "subject_id"))
                .join(JoinSpec::new("subject").select(&["name"])),
        );
        store.register(
            EntityDescriptor::new("Tag", "tag")
                .column("id", ColumnType::Integer)
                .column("label", ColumnType::Text),
        );
        store.create_tables().unwrap();

        store
            .with_transaction(|tx| -> StoreResult<()> {
                tx.update_or_create(
                    &EntityRecord::new("Machine")
                        .set("id", CellValue::Int(1))
                        .set("name", text("精整横切线")),
                )?;
                for (id, label) in [(1, "高危"), (2, "夜检")] {
                    tx.update_or_create(
                        &EntityRecord::new("Tag")
                            .set("id", CellValue::Int(id))
                            .set("label", text(label)),
                    )?;
                }
                tx.replace_pivot(
                    "Machine",
                    "tags",
                    &CellValue::Int(1),
                    &[CellValue::Int(1), CellValue::Int(2)],
                )?;
                tx.update_or_create(
                    &EntityRecord::new("Remark")
                        .set("id", CellValue::Int(5))
                        .set("body", text("轧辊待换"))
                        .set("subject_type", text("Machine"))
                        .set("subject_id", CellValue::Int(1)),
                )?;
                Ok(())
            })
            .unwrap();

        // 多态集合: 列架构不动,行上以位置键带出子树
        let machine = store.find("Machine", &CellValue::Int(1)).unwrap().unwrap();
        let row = JoinMapper::map_record(&store, &machine).unwrap();
        assert_eq!(row["tags.0.label"], text("高危"));
        assert_eq!(row["tags.1.label"], text("夜检"));
        assert_eq!(
            ColumnSchemaResolver::resolve(&store, "Machine").unwrap(),
            vec!["id", "name"]
        );

        // 多态单值: 类型列与 id 列原地保留,子树按行解出
        let remark = store.find("Remark", &CellValue::Int(5)).unwrap().unwrap();
        let row = JoinMapper::map_record(&store, &remark).unwrap();
        assert_eq!(row["subject.name"], text("精整横切线"));
        assert_eq!(row["subject_id"], CellValue::Int(1));
        assert_eq!(row["subject_type"], text("Machine"));
    }

    #[test]
    fn test_missing_relation_target_is_omitted() {
        let store = graph_store();
        let orphan = EntityRecord::new("Employee")
            .set("id", CellValue::Int(99))
            .set("name", text("临时工"))
            .set("department_id", CellValue::Null);

        let row = JoinMapper::map_record(&store, &orphan).unwrap();
        assert_eq!(row["name"], text("临时工"));
        assert!(row.keys().all(|k| !k.starts_with("department.")));
        // 对端缺失时外键列保留原值
        assert_eq!(row["department_id"], CellValue::Null);
    }
}
