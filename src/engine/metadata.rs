// ==========================================
// Sheetable 实体表格映射引擎 - 下拉注册表
// ==========================================
// 职责: (id, 显示文本) 对照块的惰性建立与双向查询
// 约束: 每个 (外部模型, 文本列) 只建一块, 后来者复用;
//       块序 = 首次使用序, 单次导出/导入内只增不重建
// ==========================================

use crate::domain::descriptor::EntityRecord;
use crate::domain::dropdown::DropdownConfig;
use crate::domain::types::CellValue;
use crate::repository::entity_store::EntityStore;
use crate::repository::error::{StoreError, StoreResult};
use crate::sheet::coords::a1_absolute;
use crate::sheet::validation::DataValidation;
use crate::sheet::worksheet::Workbook;
use indexmap::IndexMap;
use tracing::debug;

// ==========================================
// RegistryBlock - 单个对照块
// ==========================================
// 固定清单块无 id,只有文本
#[derive(Debug, Clone)]
pub struct RegistryBlock {
    pub key: String,
    pub ids: Vec<CellValue>,
    pub texts: Vec<String>,
}

impl RegistryBlock {
    /// 文本反查 id（取首个命中;无 id 的固定清单块返回 None）
    pub fn id_for_text(&self, text: &str) -> Option<CellValue> {
        let pos = self.texts.iter().position(|t| t == text)?;
        self.ids.get(pos).cloned()
    }

    /// id 正查显示文本
    pub fn text_for_id(&self, id: &CellValue) -> Option<&str> {
        let pos = self.ids.iter().position(|i| i == id)?;
        self.texts.get(pos).map(|s| s.as_str())
    }
}

// ==========================================
// MetadataRegistry - 注册表
// ==========================================
/// 下拉对照注册表
///
/// 导出时物化为 metadata 工作表供区间引用;
/// 导入时按同一份声明重建,用于文本 → id 反解。
#[derive(Debug, Clone)]
pub struct MetadataRegistry {
    sheet_name: String,
    blocks: IndexMap<String, RegistryBlock>,
}

impl MetadataRegistry {
    pub fn new(sheet_name: &str) -> Self {
        Self {
            sheet_name: sheet_name.to_string(),
            blocks: IndexMap::new(),
        }
    }

    pub fn sheet_name(&self) -> &str {
        &self.sheet_name
    }

    pub fn block(&self, key: &str) -> Option<&RegistryBlock> {
        self.blocks.get(key)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// 外键对照块 get-or-create
    ///
    /// 首次使用时从存储整表拉取 (id, 文本) 对;
    /// 同键再次请求直接复用,不重复读库。
    pub fn ensure_foreign_block(
        &mut self,
        store: &dyn EntityStore,
        owner_type: &str,
        config: &DropdownConfig,
    ) -> StoreResult<&RegistryBlock> {
        let key = config.registry_key(owner_type);
        if !self.blocks.contains_key(&key) {
            let foreign = config.foreign_type.as_deref().ok_or_else(|| {
                StoreError::InternalError(format!("下拉声明 {} 缺少外部模型类型", config.field))
            })?;
            let records = store.all(foreign)?;
            let mut ids = Vec::with_capacity(records.len());
            let mut texts = Vec::with_capacity(records.len());
            for record in &records {
                ids.push(record.get(&config.foreign_id_column));
                texts.push(display_text(record, &config.foreign_text_column));
            }
            debug!(key = %key, rows = texts.len(), "建立下拉对照块");
            self.blocks.insert(
                key.clone(),
                RegistryBlock {
                    key: key.clone(),
                    ids,
                    texts,
                },
            );
        }
        Ok(&self.blocks[&key])
    }

    /// 固定清单块 get-or-create（无 id）
    pub fn ensure_fixed_block(
        &mut self,
        owner_type: &str,
        config: &DropdownConfig,
    ) -> &RegistryBlock {
        let key = config.registry_key(owner_type);
        if !self.blocks.contains_key(&key) {
            debug!(key = %key, rows = config.fixed_list.len(), "建立固定清单块");
            self.blocks.insert(
                key.clone(),
                RegistryBlock {
                    key: key.clone(),
                    ids: Vec::new(),
                    texts: config.fixed_list.clone(),
                },
            );
        }
        &self.blocks[&key]
    }

    /// 指向某块文本列的区间校验
    ///
    /// 块 i 占两列: id 列 2i+1 / 文本列 2i+2,数据自第 2 行起。
    /// 空块不产生校验。
    pub fn text_list_validation(&self, key: &str) -> Option<DataValidation> {
        let idx = self.blocks.get_index_of(key)?;
        let block = &self.blocks[idx];
        if block.texts.is_empty() {
            return None;
        }
        let col = idx as u32 * 2 + 2;
        let last_row = block.texts.len() as u32 + 1;
        let range = format!("{}:{}", a1_absolute(2, col), a1_absolute(last_row, col));
        Some(DataValidation::sheet_range(&self.sheet_name, &range))
    }

    /// 物化为 metadata 工作表
    ///
    /// 每块两列,首行 "{key}.id" / "{key}",值自第 2 行起。
    pub fn write_sheet(&self, workbook: &mut Workbook) {
        let sheet = workbook.get_or_create(&self.sheet_name);
        for (idx, block) in self.blocks.values().enumerate() {
            let id_col = idx as u32 * 2 + 1;
            let text_col = id_col + 1;
            sheet.set_value(1, id_col, CellValue::Text(format!("{}.id", block.key)));
            sheet.set_value(1, text_col, CellValue::Text(block.key.clone()));
            for (row_offset, text) in block.texts.iter().enumerate() {
                let row = row_offset as u32 + 2;
                if let Some(id) = block.ids.get(row_offset) {
                    sheet.set_value(row, id_col, id.clone());
                }
                sheet.set_value(row, text_col, CellValue::Text(text.clone()));
            }
        }
    }
}

/// 显示文本口径: 单元格文本形式（Null → 空串）
fn display_text(record: &EntityRecord, column: &str) -> String {
    record.get(column).as_text()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::descriptor::EntityDescriptor;
    use crate::domain::types::ColumnType;
    use crate::repository::entity_store::EntityTransaction;
    use crate::repository::sqlite_store::SqliteEntityStore;
    use std::sync::{Arc, Mutex};

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    fn store_with_departments() -> SqliteEntityStore {
        let conn = crate::db::open_in_memory_connection().unwrap();
        let mut store = SqliteEntityStore::from_connection(Arc::new(Mutex::new(conn)));
        store.register(
            EntityDescriptor::new("Department", "department")
                .column("id", ColumnType::Integer)
                .column("name", ColumnType::Text),
        );
        store.create_tables().unwrap();
        store
            .with_transaction(|tx| -> StoreResult<()> {
                for name in ["炼钢", "热轧", "精整"] {
                    tx.update_or_create(&EntityRecord::new("Department").set("name", text(name)))?;
                }
                Ok(())
            })
            .unwrap();
        store
    }

    #[test]
    fn test_same_source_shares_one_block() {
        let store = store_with_departments();
        let mut registry = MetadataRegistry::new("metadata");

        // 两个字段同指 (Department, name),只建一块
        let a = DropdownConfig::foreign_key("department_id", "Department", "name");
        let b = DropdownConfig::foreign_key("backup_department_id", "Department", "name");
        registry.ensure_foreign_block(&store, "Employee", &a).unwrap();
        registry.ensure_foreign_block(&store, "Employee", &b).unwrap();

        assert_eq!(registry.len(), 1);
        let block = registry.block("Department.name").unwrap();
        assert_eq!(block.texts, vec!["炼钢", "热轧", "精整"]);
    }

    #[test]
    fn test_bidirectional_lookup() {
        let store = store_with_departments();
        let mut registry = MetadataRegistry::new("metadata");
        let config = DropdownConfig::foreign_key("department_id", "Department", "name");
        registry
            .ensure_foreign_block(&store, "Employee", &config)
            .unwrap();

        let block = registry.block("Department.name").unwrap();
        assert_eq!(block.id_for_text("热轧"), Some(CellValue::Int(2)));
        assert_eq!(block.text_for_id(&CellValue::Int(3)), Some("精整"));
        assert_eq!(block.id_for_text("不存在"), None);
    }

    #[test]
    fn test_fixed_block_has_no_ids() {
        let mut registry = MetadataRegistry::new("metadata");
        let config = DropdownConfig::fixed_list("grade", &["A", "B", "C"]);
        registry.ensure_fixed_block("Employee", &config);

        let block = registry.block("Employee.grade").unwrap();
        assert!(block.ids.is_empty());
        assert_eq!(block.id_for_text("B"), None);
    }

    #[test]
    fn test_validation_range_targets_text_column() {
        let store = store_with_departments();
        let mut registry = MetadataRegistry::new("metadata");
        registry.ensure_fixed_block("Employee", &DropdownConfig::fixed_list("grade", &["A", "B"]));
        registry
            .ensure_foreign_block(
                &store,
                "Employee",
                &DropdownConfig::foreign_key("department_id", "Department", "name"),
            )
            .unwrap();

        // 第二块: 文本列 D, 3 行值 → $D$2:$D$4
        let validation = registry.text_list_validation("Department.name").unwrap();
        assert_eq!(validation.formula(), "metadata!$D$2:$D$4");
    }

    #[test]
    fn test_write_sheet_layout() {
        let store = store_with_departments();
        let mut registry = MetadataRegistry::new("metadata");
        registry
            .ensure_foreign_block(
                &store,
                "Employee",
                &DropdownConfig::foreign_key("department_id", "Department", "name"),
            )
            .unwrap();

        let mut workbook = Workbook::new();
        registry.write_sheet(&mut workbook);
        let sheet = workbook.sheet("metadata").unwrap();
        assert_eq!(sheet.value(1, 1), text("Department.name.id"));
        assert_eq!(sheet.value(1, 2), text("Department.name"));
        assert_eq!(sheet.value(2, 1), CellValue::Int(1));
        assert_eq!(sheet.value(4, 2), text("精整"));
    }
}
