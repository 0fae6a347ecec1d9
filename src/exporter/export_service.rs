// ==========================================
// Sheetable 实体表格映射引擎 - 导出编排服务
// ==========================================
// 职责: 取数 → 列结构解析 → 拍平 → 导出映射 → 下拉代换 → 注册表物化
// 约定: 数据表以实体表名命名;注册表物化为 metadata 工作表
// ==========================================

use crate::config::SheetableConfig;
use crate::domain::descriptor::{EntityDescriptor, EntityRecord};
use crate::domain::types::CellValue;
use crate::engine::{
    ColumnSchemaResolver, DropdownFieldResolver, ExportMappingApplier, JoinMapper,
    MetadataRegistry,
};
use crate::exporter::error::ExportResult;
use crate::repository::entity_store::EntityStore;
use crate::repository::error::StoreError;
use crate::sheet::egress::write_worksheet;
use crate::sheet::worksheet::Workbook;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

// ==========================================
// ExportService - 导出编排服务
// ==========================================

pub struct ExportService {
    settings: SheetableConfig,
}

impl ExportService {
    pub fn new(settings: SheetableConfig) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &SheetableConfig {
        &self.settings
    }

    /// 导出实体集为内存工作簿
    ///
    /// # 参数
    /// - store: 实体存储
    /// - entity_type: 实体类型名
    /// - ids: 限定主键集;None 为全量导出
    ///
    /// # 返回
    /// 数据表 + metadata 注册表的工作簿
    pub fn export(
        &self,
        store: &dyn EntityStore,
        entity_type: &str,
        ids: Option<&[CellValue]>,
    ) -> ExportResult<Workbook> {
        let desc = store.descriptor(entity_type)?;
        let records = match ids {
            Some(list) => store.where_in(entity_type, &desc.primary_key, list)?,
            None => store.all(entity_type)?,
        };
        self.build_workbook(store, entity_type, records)
    }

    /// 空白模板: 与导出同构,零数据行（表头 + 校验 + 注册表）
    pub fn template(&self, store: &dyn EntityStore, entity_type: &str) -> ExportResult<Workbook> {
        self.build_workbook(store, entity_type, Vec::new())
    }

    /// 导出并按 {table}.{extension} 约定写入目录
    ///
    /// 落盘走分隔符写出器,格式由配置的导出格式决定。
    pub fn export_to_file(
        &self,
        store: &dyn EntityStore,
        entity_type: &str,
        dir: &Path,
    ) -> ExportResult<PathBuf> {
        let workbook = self.export(store, entity_type, None)?;
        let desc = store.descriptor(entity_type)?;
        let path = dir.join(self.file_name(desc));
        let sheet = workbook.sheet(&desc.table).ok_or_else(|| {
            StoreError::InternalError(format!("导出工作簿缺少数据表 {}", desc.table))
        })?;
        write_worksheet(sheet, &path)?;
        info!(entity_type, path = %path.display(), "导出文件已写出");
        Ok(path)
    }

    /// 文件名约定 {table}.{extension}
    pub fn file_name(&self, desc: &EntityDescriptor) -> String {
        format!("{}.{}", desc.table, self.settings.export_format.extension())
    }

    fn build_workbook(
        &self,
        store: &dyn EntityStore,
        entity_type: &str,
        records: Vec<EntityRecord>,
    ) -> ExportResult<Workbook> {
        info!(entity_type, records = records.len(), "开始导出");
        let desc = store.descriptor(entity_type)?;

        // ==========================================
        // 步骤1: 解析平面列结构
        // ==========================================
        debug!("步骤1: 解析平面列结构");
        let columns = ColumnSchemaResolver::resolve_with_joins(store, desc, &desc.joins)?;

        // ==========================================
        // 步骤2: 拍平实体图
        // ==========================================
        debug!("步骤2: 拍平实体图");
        let mut rows = Vec::with_capacity(records.len());
        for record in &records {
            rows.push(JoinMapper::map_with_joins(store, record, &desc.joins)?);
        }

        // ==========================================
        // 步骤3: 套用导出映射并落数据表
        // ==========================================
        debug!("步骤3: 套用导出映射并落数据表");
        let headings = match &desc.export_mapping {
            Some(mapping) => ExportMappingApplier::apply_to_headings(mapping, &columns),
            None => columns.clone(),
        };

        let mut workbook = Workbook::new();
        let mut registry = MetadataRegistry::new(&self.settings.metadata_sheet_name);
        {
            let sheet = workbook.get_or_create(&desc.table);
            sheet.write_headers(&headings);
            for (i, row) in rows.iter().enumerate() {
                let row_idx = i as u32 + 2;
                match &desc.export_mapping {
                    Some(mapping) => {
                        let values = ExportMappingApplier::apply_to_row(mapping, &columns, row);
                        sheet.write_row(row_idx, &values);
                    }
                    None => {
                        for (c, heading) in headings.iter().enumerate() {
                            let value = JoinMapper::flat_value(row, heading);
                            if !value.is_null() {
                                sheet.set_value(row_idx, c as u32 + 1, value);
                            }
                        }
                    }
                }
            }

            // ==========================================
            // 步骤4: 下拉代换与有效性校验
            // ==========================================
            debug!("步骤4: 下拉代换与有效性校验");
            DropdownFieldResolver::apply_dropdowns(
                store,
                &mut registry,
                &self.settings,
                entity_type,
                sheet,
            )?;
        }

        // ==========================================
        // 步骤5: 物化注册表工作表
        // ==========================================
        if !registry.is_empty() {
            debug!(blocks = registry.len(), "步骤5: 物化注册表工作表");
            registry.write_sheet(&mut workbook);
        }

        info!(
            entity_type,
            rows = rows.len(),
            sheets = workbook.sheet_names().len(),
            "导出完成"
        );
        Ok(workbook)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::descriptor::RelationDef;
    use crate::domain::dropdown::DropdownConfig;
    use crate::domain::export_mapping::ExportMappingSpec;
    use crate::domain::join::JoinSpec;
    use crate::domain::types::ColumnType;
    use crate::repository::entity_store::EntityTransaction;
    use crate::repository::error::StoreResult;
    use crate::repository::sqlite_store::SqliteEntityStore;
    use std::sync::{Arc, Mutex};

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    fn demo_store() -> SqliteEntityStore {
        let conn = crate::db::open_in_memory_connection().unwrap();
        let mut store = SqliteEntityStore::from_connection(Arc::new(Mutex::new(conn)));

        store.register(
            EntityDescriptor::new("Department", "department")
                .column("id", ColumnType::Integer)
                .column("name", ColumnType::Text)
                .relation(RelationDef::to_many("employees", "Employee", "department_id"))
                .join(JoinSpec::new("employees").select(&["name"])),
        );
        store.register(
            EntityDescriptor::new("Employee", "employee")
                .column("id", ColumnType::Integer)
                .column("name", ColumnType::Text)
                .column("department_id", ColumnType::Integer)
                .dropdown(DropdownConfig::foreign_key("department_id", "Department", "name")),
        );
        store.create_tables().unwrap();

        store
            .with_transaction(|tx| -> StoreResult<()> {
                for name in ["炼钢", "热轧"] {
                    tx.update_or_create(&EntityRecord::new("Department").set("name", text(name)))?;
                }
                tx.update_or_create(
                    &EntityRecord::new("Employee")
                        .set("id", CellValue::Int(1))
                        .set("name", text("赵工"))
                        .set("department_id", CellValue::Int(2)),
                )?;
                tx.update_or_create(
                    &EntityRecord::new("Employee")
                        .set("id", CellValue::Int(2))
                        .set("name", text("钱工"))
                        .set("department_id", CellValue::Int(1)),
                )?;
                Ok(())
            })
            .unwrap();
        store
    }

    #[test]
    fn test_export_writes_data_and_metadata_sheets() {
        let store = demo_store();
        let service = ExportService::new(SheetableConfig::default());

        let workbook = service.export(&store, "Employee", None).unwrap();
        assert_eq!(workbook.sheet_names(), vec!["employee", "metadata"]);

        let sheet = workbook.sheet("employee").unwrap();
        let headers: Vec<String> = sheet.headers().into_iter().map(|(_, h)| h).collect();
        assert_eq!(headers, vec!["id", "name", "department_id"]);

        // 外键下拉已代换为显示文本
        let dept_col = sheet.header_column("department_id").unwrap();
        assert_eq!(sheet.value(2, dept_col), text("热轧"));
        assert_eq!(sheet.value(3, dept_col), text("炼钢"));

        // 注册表块两列: id + 文本
        let metadata = workbook.sheet("metadata").unwrap();
        assert_eq!(metadata.value(1, 1), text("Department.name.id"));
        assert_eq!(metadata.value(1, 2), text("Department.name"));
        assert_eq!(metadata.value(2, 2), text("炼钢"));
        assert_eq!(metadata.value(3, 2), text("热轧"));
    }

    #[test]
    fn test_export_with_id_filter() {
        let store = demo_store();
        let service = ExportService::new(SheetableConfig::default());

        let workbook = service
            .export(&store, "Employee", Some(&[CellValue::Int(2)]))
            .unwrap();
        let sheet = workbook.sheet("employee").unwrap();
        assert_eq!(sheet.last_data_row(), 2);
        assert_eq!(sheet.value(2, 2), text("钱工"));
    }

    #[test]
    fn test_template_has_headers_and_validation_but_no_rows() {
        let store = demo_store();
        let service = ExportService::new(SheetableConfig::default());

        let workbook = service.template(&store, "Employee").unwrap();
        let sheet = workbook.sheet("employee").unwrap();
        assert_eq!(sheet.last_data_row(), 1);

        // 空模板仍在追加区铺好校验
        let dept_col = sheet.header_column("department_id").unwrap();
        assert!(sheet.validation(2, dept_col).is_some());
        assert!(sheet
            .validation(1 + service.settings().pad_rows, dept_col)
            .is_some());
    }

    #[test]
    fn test_collection_join_takes_first_related_row() {
        let store = demo_store();
        let service = ExportService::new(SheetableConfig::default());

        let workbook = service.export(&store, "Department", None).unwrap();
        let sheet = workbook.sheet("department").unwrap();
        let headers: Vec<String> = sheet.headers().into_iter().map(|(_, h)| h).collect();
        assert_eq!(headers, vec!["id", "name", "employees.name"]);

        // 炼钢只有钱工,热轧只有赵工;集合列落首个子行
        assert_eq!(sheet.value(2, 3), text("钱工"));
        assert_eq!(sheet.value(3, 3), text("赵工"));
    }

    #[test]
    fn test_mapping_entry_on_collection_column_takes_first_row() {
        let conn = crate::db::open_in_memory_connection().unwrap();
        let mut store = SqliteEntityStore::from_connection(Arc::new(Mutex::new(conn)));
        store.register(
            EntityDescriptor::new("Department", "department")
                .column("id", ColumnType::Integer)
                .column("name", ColumnType::Text)
                .relation(RelationDef::to_many("employees", "Employee", "department_id"))
                .join(JoinSpec::new("employees").select(&["name"]))
                .export_mapping(
                    ExportMappingSpec::new().column("name").column("employees.name"),
                ),
        );
        store.register(
            EntityDescriptor::new("Employee", "employee")
                .column("id", ColumnType::Integer)
                .column("name", ColumnType::Text)
                .column("department_id", ColumnType::Integer),
        );
        store.create_tables().unwrap();
        store
            .with_transaction(|tx| -> StoreResult<()> {
                tx.update_or_create(
                    &EntityRecord::new("Department")
                        .set("id", CellValue::Int(1))
                        .set("name", text("精整")),
                )?;
                for (id, name) in [(1, "赵工"), (2, "钱工")] {
                    tx.update_or_create(
                        &EntityRecord::new("Employee")
                            .set("id", CellValue::Int(id))
                            .set("name", text(name))
                            .set("department_id", CellValue::Int(1)),
                    )?;
                }
                Ok(())
            })
            .unwrap();

        let service = ExportService::new(SheetableConfig::default());
        let workbook = service.export(&store, "Department", None).unwrap();
        let sheet = workbook.sheet("department").unwrap();
        let headers: Vec<String> = sheet.headers().into_iter().map(|(_, h)| h).collect();
        assert_eq!(headers, vec!["name", "employees.name"]);
        // 映射条目与免映射路径同字: 集合列都落首个子行
        assert_eq!(sheet.value(2, 1), text("精整"));
        assert_eq!(sheet.value(2, 2), text("赵工"));
    }

    #[test]
    fn test_export_mapping_reorders_headings_and_rows() {
        let conn = crate::db::open_in_memory_connection().unwrap();
        let mut store = SqliteEntityStore::from_connection(Arc::new(Mutex::new(conn)));
        store.register(
            EntityDescriptor::new("Badge", "badge")
                .column("id", ColumnType::Integer)
                .column("code", ColumnType::Text)
                .column("holder", ColumnType::Text)
                .export_mapping(
                    ExportMappingSpec::new()
                        .column("holder")
                        .combined("标牌", &["code", "holder"], |values| {
                            let parts: Vec<String> =
                                values.iter().map(|v| v.as_text()).collect();
                            CellValue::Text(parts.join("/"))
                        })
                        .column("不存在的列"),
                ),
        );
        store.create_tables().unwrap();
        store
            .with_transaction(|tx| -> StoreResult<()> {
                tx.update_or_create(
                    &EntityRecord::new("Badge")
                        .set("code", text("B-07"))
                        .set("holder", text("孙工")),
                )?;
                Ok(())
            })
            .unwrap();

        let service = ExportService::new(SheetableConfig::default());
        let workbook = service.export(&store, "Badge", None).unwrap();
        let sheet = workbook.sheet("badge").unwrap();
        let headers: Vec<String> = sheet.headers().into_iter().map(|(_, h)| h).collect();
        assert_eq!(headers, vec!["holder", "标牌"]);
        assert_eq!(sheet.value(2, 1), text("孙工"));
        assert_eq!(sheet.value(2, 2), text("B-07/孙工"));
    }

    #[test]
    fn test_file_name_follows_configured_format() {
        let store = demo_store();
        let service = ExportService::new(SheetableConfig {
            export_format: crate::domain::types::ExportFormat::Csv,
            ..SheetableConfig::default()
        });
        let desc = store.descriptor("Employee").unwrap();
        assert_eq!(service.file_name(desc), "employee.csv");
    }
}
