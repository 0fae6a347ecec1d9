// ==========================================
// Sheetable 实体表格映射引擎 - SQLite 实体存储
// ==========================================
// 依据: repository/entity_store.rs 接口
// 红线: Repository 不含业务逻辑
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

use crate::domain::descriptor::{EntityDescriptor, EntityRecord, RelationDef, RelationKind};
use crate::domain::types::{CellValue, ColumnType};
use crate::repository::entity_store::{EntityStore, EntityTransaction};
use crate::repository::error::{StoreError, StoreResult};
use indexmap::IndexMap;
use rusqlite::types::{ToSqlOutput, Value, ValueRef};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, ToSql};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

// ==========================================
// CellValue <-> SQLite 值换算
// ==========================================
// 日期时间统一落 TEXT（%Y-%m-%d %H:%M:%S）,布尔落 INTEGER 0/1
impl ToSql for CellValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let value = match self {
            CellValue::Null => Value::Null,
            CellValue::Bool(b) => Value::Integer(i64::from(*b)),
            CellValue::Int(i) => Value::Integer(*i),
            CellValue::Float(f) => Value::Real(*f),
            CellValue::Text(s) => Value::Text(s.clone()),
            CellValue::DateTime(dt) => Value::Text(dt.format("%Y-%m-%d %H:%M:%S").to_string()),
        };
        Ok(ToSqlOutput::Owned(value))
    }
}

fn value_from_sql(value: ValueRef<'_>) -> CellValue {
    match value {
        ValueRef::Null => CellValue::Null,
        ValueRef::Integer(i) => CellValue::Int(i),
        ValueRef::Real(f) => CellValue::Float(f),
        ValueRef::Text(t) => CellValue::Text(String::from_utf8_lossy(t).to_string()),
        // BLOB 不在单元格值域内
        ValueRef::Blob(_) => CellValue::Null,
    }
}

/// 标识符来自声明层,仍统一加引号防与关键字撞名
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn column_sql_type(column_type: ColumnType) -> &'static str {
    match column_type {
        ColumnType::Integer | ColumnType::Boolean => "INTEGER",
        ColumnType::Float => "REAL",
        ColumnType::Text | ColumnType::Date | ColumnType::DateTime => "TEXT",
    }
}

// ==========================================
// SqliteEntityStore - SQLite 后端实现
// ==========================================
/// SQLite 实体存储
/// 职责: 按注册的实体声明建表、读数、事务写入
pub struct SqliteEntityStore {
    conn: Arc<Mutex<Connection>>,
    descriptors: IndexMap<String, EntityDescriptor>,
}

impl SqliteEntityStore {
    /// 打开指定路径的数据库
    pub fn new(db_path: &str) -> StoreResult<Self> {
        let conn = crate::db::open_sqlite_connection(db_path)
            .map_err(|e| StoreError::DatabaseConnectionError(e.to_string()))?;
        Ok(Self::from_connection(Arc::new(Mutex::new(conn))))
    }

    /// 从已有连接创建存储实例
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self {
            conn,
            descriptors: IndexMap::new(),
        }
    }

    /// 注册实体声明（同名覆盖）
    pub fn register(&mut self, descriptor: EntityDescriptor) {
        self.descriptors
            .insert(descriptor.entity_type.clone(), descriptor);
    }

    /// 已注册声明, 按注册序
    pub fn descriptors(&self) -> impl Iterator<Item = &EntityDescriptor> {
        self.descriptors.values()
    }

    /// 按注册声明建表（含多对多中间表;幂等）
    ///
    /// 外键约束不写入 DDL,完整性由导入校验与作用域策略把关。
    pub fn create_tables(&self) -> StoreResult<()> {
        let mut ddl = String::new();
        let mut seen_pivots: HashSet<String> = HashSet::new();

        for desc in self.descriptors.values() {
            ddl.push_str(&table_ddl(desc));
            ddl.push('\n');

            for rel in desc.relations.values() {
                if let Some(pivot_sql) = self.pivot_ddl(desc, rel, &mut seen_pivots) {
                    ddl.push_str(&pivot_sql);
                    ddl.push('\n');
                }
            }
        }

        let conn = self.lock()?;
        conn.execute_batch(&ddl)?;
        Ok(())
    }

    fn pivot_ddl(
        &self,
        owner: &EntityDescriptor,
        rel: &RelationDef,
        seen: &mut HashSet<String>,
    ) -> Option<String> {
        let (pivot, parent_key, related_key, type_column) = match &rel.kind {
            RelationKind::ManyToMany {
                pivot_table,
                parent_key,
                related_key,
            } => (pivot_table, parent_key, related_key, None),
            RelationKind::MorphToMany {
                pivot_table,
                parent_key,
                related_key,
                type_column,
            } => (pivot_table, parent_key, related_key, Some(type_column)),
            _ => return None,
        };

        // 同一张中间表可能被两端各声明一次,只建一次
        if !seen.insert(pivot.clone()) {
            return None;
        }

        let parent_type = pk_sql_type(owner);
        let related_type = rel
            .related_type
            .as_ref()
            .and_then(|t| self.descriptors.get(t))
            .map(pk_sql_type)
            .unwrap_or("INTEGER");

        let mut defs = vec![
            format!("{} {}", quote_ident(parent_key), parent_type),
            format!("{} {}", quote_ident(related_key), related_type),
        ];
        let mut unique = vec![quote_ident(parent_key), quote_ident(related_key)];
        if let Some(tc) = type_column {
            defs.push(format!("{} TEXT", quote_ident(tc)));
            unique.push(quote_ident(tc));
        }

        Some(format!(
            "CREATE TABLE IF NOT EXISTS {} ({}, UNIQUE({}));",
            quote_ident(pivot),
            defs.join(", "),
            unique.join(", ")
        ))
    }

    /// 获取数据库连接
    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StoreError::LockError(e.to_string()))
    }

    fn descriptor_ref(&self, entity_type: &str) -> StoreResult<&EntityDescriptor> {
        self.descriptors
            .get(entity_type)
            .ok_or_else(|| StoreError::UnknownEntity(entity_type.to_string()))
    }
}

impl EntityStore for SqliteEntityStore {
    fn descriptor(&self, entity_type: &str) -> StoreResult<&EntityDescriptor> {
        self.descriptor_ref(entity_type)
    }

    fn find(&self, entity_type: &str, id: &CellValue) -> StoreResult<Option<EntityRecord>> {
        let desc = self.descriptor_ref(entity_type)?;
        let conn = self.lock()?;
        query_find(&conn, desc, id)
    }

    fn all(&self, entity_type: &str) -> StoreResult<Vec<EntityRecord>> {
        let desc = self.descriptor_ref(entity_type)?;
        let conn = self.lock()?;
        query_all(&conn, desc)
    }

    fn where_in(
        &self,
        entity_type: &str,
        column: &str,
        values: &[CellValue],
    ) -> StoreResult<Vec<EntityRecord>> {
        if values.is_empty() {
            return Ok(Vec::new());
        }
        let desc = self.descriptor_ref(entity_type)?;
        let conn = self.lock()?;
        query_where_in(&conn, desc, column, values)
    }

    fn related_one(
        &self,
        record: &EntityRecord,
        relation: &str,
    ) -> StoreResult<Option<EntityRecord>> {
        let owner = self.descriptor_ref(&record.entity_type)?;
        let rel = relation_def(owner, relation)?;

        match &rel.kind {
            RelationKind::ToOne { foreign_key } => {
                let fk = record.get(foreign_key);
                if fk.is_null() {
                    return Ok(None);
                }
                let related = required_related_type(owner, rel)?;
                let desc = self.descriptor_ref(related)?;
                let conn = self.lock()?;
                query_find(&conn, desc, &fk)
            }
            RelationKind::MorphToOne {
                type_column,
                id_column,
            } => {
                // 对端类型名与主键都存在行内
                let target_type = record.get(type_column).as_text();
                let target_id = record.get(id_column);
                if target_type.is_empty() || target_id.is_null() {
                    return Ok(None);
                }
                let desc = self.descriptor_ref(&target_type)?;
                let conn = self.lock()?;
                query_find(&conn, desc, &target_id)
            }
            _ => Err(StoreError::FieldValueError {
                field: relation.to_string(),
                message: "集合关系应使用 related_many".to_string(),
            }),
        }
    }

    fn related_many(
        &self,
        record: &EntityRecord,
        relation: &str,
    ) -> StoreResult<Vec<EntityRecord>> {
        let owner = self.descriptor_ref(&record.entity_type)?;
        let rel = relation_def(owner, relation)?;
        let owner_id = record.get(&owner.primary_key);
        if owner_id.is_null() {
            return Ok(Vec::new());
        }

        match &rel.kind {
            RelationKind::ToMany { foreign_key } => {
                let related = required_related_type(owner, rel)?;
                let desc = self.descriptor_ref(related)?;
                let conn = self.lock()?;
                query_children(&conn, desc, foreign_key, &owner_id)
            }
            RelationKind::ManyToMany {
                pivot_table,
                parent_key,
                related_key,
            } => {
                let related = required_related_type(owner, rel)?;
                let desc = self.descriptor_ref(related)?;
                let conn = self.lock()?;
                query_pivot_related(
                    &conn,
                    desc,
                    pivot_table,
                    parent_key,
                    related_key,
                    &owner_id,
                    None,
                )
            }
            RelationKind::MorphToMany {
                pivot_table,
                parent_key,
                related_key,
                type_column,
            } => {
                let related = required_related_type(owner, rel)?;
                let desc = self.descriptor_ref(related)?;
                let conn = self.lock()?;
                query_pivot_related(
                    &conn,
                    desc,
                    pivot_table,
                    parent_key,
                    related_key,
                    &owner_id,
                    Some((type_column, &owner.entity_type)),
                )
            }
            _ => Err(StoreError::FieldValueError {
                field: relation.to_string(),
                message: "单值关系应使用 related_one".to_string(),
            }),
        }
    }

    fn with_transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        E: From<StoreError>,
        F: FnOnce(&mut dyn EntityTransaction) -> Result<T, E>,
    {
        let conn = self.lock()?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| StoreError::DatabaseTransactionError(e.to_string()))
            .map_err(E::from)?;

        let mut scope = SqliteTransaction {
            tx: &tx,
            descriptors: &self.descriptors,
        };
        // 闭包报错时 tx 随 drop 回滚
        let out = f(&mut scope)?;

        tx.commit()
            .map_err(|e| StoreError::DatabaseTransactionError(e.to_string()))
            .map_err(E::from)?;
        Ok(out)
    }
}

// ==========================================
// SqliteTransaction - 事务作用域写入面
// ==========================================
struct SqliteTransaction<'a> {
    tx: &'a rusqlite::Transaction<'a>,
    descriptors: &'a IndexMap<String, EntityDescriptor>,
}

impl EntityTransaction for SqliteTransaction<'_> {
    fn descriptor(&self, entity_type: &str) -> StoreResult<&EntityDescriptor> {
        self.descriptors
            .get(entity_type)
            .ok_or_else(|| StoreError::UnknownEntity(entity_type.to_string()))
    }

    fn find(&self, entity_type: &str, id: &CellValue) -> StoreResult<Option<EntityRecord>> {
        let desc = self.descriptor(entity_type)?;
        query_find(self.tx, desc, id)
    }

    fn update_or_create(&mut self, record: &EntityRecord) -> StoreResult<CellValue> {
        let desc = self.descriptor(&record.entity_type)?;
        let pk_col = desc.primary_key.clone();
        let pk = record.get(&pk_col);

        // 只落声明过的列;行内多余属性（扇出残留等）一律忽略
        let mut fields: Vec<(String, CellValue)> = Vec::new();
        for col in &desc.columns {
            if col.name == pk_col {
                continue;
            }
            if let Some(value) = record.attributes.get(&col.name) {
                fields.push((col.name.clone(), value.clone()));
            }
        }

        if pk.is_null() {
            // 纯插入,主键由存储分配
            let id = insert_record(self.tx, desc, None, &fields)?;
            return Ok(id);
        }

        if fields.is_empty() {
            // 无可更新列: 只保证该主键存在
            if query_find(self.tx, desc, &pk)?.is_none() {
                insert_record(self.tx, desc, Some(&pk), &fields)?;
            }
            return Ok(pk);
        }

        let assignments: Vec<String> = fields
            .iter()
            .enumerate()
            .map(|(i, (name, _))| format!("{} = ?{}", quote_ident(name), i + 1))
            .collect();
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?{}",
            quote_ident(&desc.table),
            assignments.join(", "),
            quote_ident(&pk_col),
            fields.len() + 1
        );
        let mut values: Vec<&CellValue> = fields.iter().map(|(_, v)| v).collect();
        values.push(&pk);
        let affected = self.tx.execute(&sql, params_from_iter(values))?;

        if affected == 0 {
            insert_record(self.tx, desc, Some(&pk), &fields)?;
        }
        Ok(pk)
    }

    fn replace_pivot(
        &mut self,
        entity_type: &str,
        relation: &str,
        owner_id: &CellValue,
        related_ids: &[CellValue],
    ) -> StoreResult<()> {
        let desc = self.descriptor(entity_type)?;
        let rel = relation_def(desc, relation)?;

        let (pivot, parent_key, related_key, type_filter) = match &rel.kind {
            RelationKind::ManyToMany {
                pivot_table,
                parent_key,
                related_key,
            } => (pivot_table, parent_key, related_key, None),
            RelationKind::MorphToMany {
                pivot_table,
                parent_key,
                related_key,
                type_column,
            } => (
                pivot_table,
                parent_key,
                related_key,
                Some((type_column.as_str(), desc.entity_type.as_str())),
            ),
            _ => {
                return Err(StoreError::FieldValueError {
                    field: relation.to_string(),
                    message: "整体置换只适用于多对多关系".to_string(),
                })
            }
        };

        // 先清后建,置换语义
        match type_filter {
            Some((type_column, owner_type)) => {
                let sql = format!(
                    "DELETE FROM {} WHERE {} = ?1 AND {} = ?2",
                    quote_ident(pivot),
                    quote_ident(parent_key),
                    quote_ident(type_column)
                );
                self.tx.execute(&sql, params![owner_id, owner_type])?;
                let insert = format!(
                    "INSERT OR IGNORE INTO {} ({}, {}, {}) VALUES (?1, ?2, ?3)",
                    quote_ident(pivot),
                    quote_ident(parent_key),
                    quote_ident(related_key),
                    quote_ident(type_column)
                );
                for related_id in related_ids {
                    self.tx.execute(&insert, params![owner_id, related_id, owner_type])?;
                }
            }
            None => {
                let sql = format!(
                    "DELETE FROM {} WHERE {} = ?1",
                    quote_ident(pivot),
                    quote_ident(parent_key)
                );
                self.tx.execute(&sql, params![owner_id])?;
                // 扇出列重复值只落一行
                let insert = format!(
                    "INSERT OR IGNORE INTO {} ({}, {}) VALUES (?1, ?2)",
                    quote_ident(pivot),
                    quote_ident(parent_key),
                    quote_ident(related_key)
                );
                for related_id in related_ids {
                    self.tx.execute(&insert, params![owner_id, related_id])?;
                }
            }
        }
        Ok(())
    }
}

// ==========================================
// 共享查询函数（存储与事务两个入口复用）
// ==========================================

fn relation_def<'a>(desc: &'a EntityDescriptor, name: &str) -> StoreResult<&'a RelationDef> {
    desc.relation_def(name)
        .ok_or_else(|| StoreError::UnknownRelation {
            entity: desc.entity_type.clone(),
            relation: name.to_string(),
        })
}

fn required_related_type<'a>(
    owner: &EntityDescriptor,
    rel: &'a RelationDef,
) -> StoreResult<&'a str> {
    rel.related_type
        .as_deref()
        .ok_or_else(|| StoreError::InternalError(format!(
            "关系 {}.{} 未声明对端类型",
            owner.entity_type, rel.name
        )))
}

fn pk_sql_type(desc: &EntityDescriptor) -> &'static str {
    desc.column_def(&desc.primary_key)
        .map(|c| column_sql_type(c.column_type))
        .unwrap_or("INTEGER")
}

/// SELECT 列清单: 声明列序,主键缺席时补在首位
fn select_columns(desc: &EntityDescriptor) -> Vec<String> {
    let mut names = desc.column_names();
    if !names.iter().any(|n| *n == desc.primary_key) {
        names.insert(0, desc.primary_key.clone());
    }
    names
}

fn table_ddl(desc: &EntityDescriptor) -> String {
    let mut defs: Vec<String> = Vec::new();
    if !desc.has_column(&desc.primary_key) {
        defs.push(format!("{} INTEGER PRIMARY KEY", quote_ident(&desc.primary_key)));
    }
    for col in &desc.columns {
        let mut def = format!(
            "{} {}",
            quote_ident(&col.name),
            column_sql_type(col.column_type)
        );
        if col.name == desc.primary_key {
            def.push_str(" PRIMARY KEY");
        }
        defs.push(def);
    }
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({});",
        quote_ident(&desc.table),
        defs.join(", ")
    )
}

fn record_from_row(
    desc: &EntityDescriptor,
    names: &[String],
    row: &Row<'_>,
) -> rusqlite::Result<EntityRecord> {
    let mut record = EntityRecord::new(&desc.entity_type);
    for (idx, name) in names.iter().enumerate() {
        record.insert(name, value_from_sql(row.get_ref(idx)?));
    }
    Ok(record)
}

fn query_find(
    conn: &Connection,
    desc: &EntityDescriptor,
    id: &CellValue,
) -> StoreResult<Option<EntityRecord>> {
    if id.is_null() {
        return Ok(None);
    }
    let names = select_columns(desc);
    let cols: Vec<String> = names.iter().map(|n| quote_ident(n)).collect();
    let sql = format!(
        "SELECT {} FROM {} WHERE {} = ?1",
        cols.join(", "),
        quote_ident(&desc.table),
        quote_ident(&desc.primary_key)
    );
    let mut stmt = conn.prepare(&sql)?;
    let record = stmt
        .query_row(params![id], |row| record_from_row(desc, &names, row))
        .optional()?;
    Ok(record)
}

fn query_all(conn: &Connection, desc: &EntityDescriptor) -> StoreResult<Vec<EntityRecord>> {
    let names = select_columns(desc);
    let cols: Vec<String> = names.iter().map(|n| quote_ident(n)).collect();
    let sql = format!(
        "SELECT {} FROM {} ORDER BY {} ASC",
        cols.join(", "),
        quote_ident(&desc.table),
        quote_ident(&desc.primary_key)
    );
    collect_records(conn, desc, &names, &sql, std::iter::empty::<&CellValue>())
}

fn query_where_in(
    conn: &Connection,
    desc: &EntityDescriptor,
    column: &str,
    values: &[CellValue],
) -> StoreResult<Vec<EntityRecord>> {
    let names = select_columns(desc);
    let cols: Vec<String> = names.iter().map(|n| quote_ident(n)).collect();
    let placeholders: Vec<String> = (1..=values.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "SELECT {} FROM {} WHERE {} IN ({}) ORDER BY {} ASC",
        cols.join(", "),
        quote_ident(&desc.table),
        quote_ident(column),
        placeholders.join(", "),
        quote_ident(&desc.primary_key)
    );
    collect_records(conn, desc, &names, &sql, values.iter())
}

fn query_children(
    conn: &Connection,
    desc: &EntityDescriptor,
    foreign_key: &str,
    owner_id: &CellValue,
) -> StoreResult<Vec<EntityRecord>> {
    let names = select_columns(desc);
    let cols: Vec<String> = names.iter().map(|n| quote_ident(n)).collect();
    let sql = format!(
        "SELECT {} FROM {} WHERE {} = ?1 ORDER BY {} ASC",
        cols.join(", "),
        quote_ident(&desc.table),
        quote_ident(foreign_key),
        quote_ident(&desc.primary_key)
    );
    collect_records(conn, desc, &names, &sql, std::iter::once(owner_id))
}

fn query_pivot_related(
    conn: &Connection,
    desc: &EntityDescriptor,
    pivot: &str,
    parent_key: &str,
    related_key: &str,
    owner_id: &CellValue,
    type_filter: Option<(&str, &str)>,
) -> StoreResult<Vec<EntityRecord>> {
    let names = select_columns(desc);
    let cols: Vec<String> = names.iter().map(|n| format!("r.{}", quote_ident(n))).collect();
    let mut sql = format!(
        "SELECT {} FROM {} r INNER JOIN {} p ON p.{} = r.{} WHERE p.{} = ?1",
        cols.join(", "),
        quote_ident(&desc.table),
        quote_ident(pivot),
        quote_ident(related_key),
        quote_ident(&desc.primary_key),
        quote_ident(parent_key)
    );

    let mut params_vec: Vec<CellValue> = vec![owner_id.clone()];
    if let Some((type_column, owner_type)) = type_filter {
        sql.push_str(&format!(" AND p.{} = ?2", quote_ident(type_column)));
        params_vec.push(CellValue::Text(owner_type.to_string()));
    }
    sql.push_str(&format!(" ORDER BY r.{} ASC", quote_ident(&desc.primary_key)));

    collect_records(conn, desc, &names, &sql, params_vec.iter())
}

fn collect_records<'a, P>(
    conn: &Connection,
    desc: &EntityDescriptor,
    names: &[String],
    sql: &str,
    params_iter: P,
) -> StoreResult<Vec<EntityRecord>>
where
    P: IntoIterator,
    P::Item: ToSql,
{
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params_from_iter(params_iter), |row| {
        record_from_row(desc, names, row)
    })?;

    let mut records = Vec::new();
    for row in rows {
        records.push(row?);
    }
    Ok(records)
}

fn insert_record(
    conn: &Connection,
    desc: &EntityDescriptor,
    pk: Option<&CellValue>,
    fields: &[(String, CellValue)],
) -> StoreResult<CellValue> {
    let mut names: Vec<String> = Vec::new();
    let mut values: Vec<&CellValue> = Vec::new();

    if let Some(pk_value) = pk {
        names.push(quote_ident(&desc.primary_key));
        values.push(pk_value);
    }
    for (name, value) in fields {
        names.push(quote_ident(name));
        values.push(value);
    }

    if names.is_empty() {
        let sql = format!("INSERT INTO {} DEFAULT VALUES", quote_ident(&desc.table));
        conn.execute(&sql, [])?;
    } else {
        let placeholders: Vec<String> = (1..=names.len()).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(&desc.table),
            names.join(", "),
            placeholders.join(", ")
        );
        conn.execute(&sql, params_from_iter(values))?;
    }

    match pk {
        Some(pk_value) => Ok(pk_value.clone()),
        None => Ok(CellValue::Int(conn.last_insert_rowid())),
    }
}
