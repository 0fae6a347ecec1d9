// ==========================================
// Sheetable 实体表格映射引擎 - 导入对账器
// ==========================================
// 职责: 把工作簿对账进实体存储
// 流程: 重复预检 → 空白归一 → 日期清洗 → 下拉反解 → 声明校验
//       → 单事务(落库 + 关联置换 + 范围复核)
// 红线: 全批次原子;范围越界即整体回滚,不留部分提交
// ==========================================

use crate::config::SheetableConfig;
use crate::domain::descriptor::{is_audit_column, EntityDescriptor, EntityRecord};
use crate::domain::scope::{AllowAllScope, ScopePolicy};
use crate::domain::types::CellValue;
use crate::engine::dropdown_resolver::{DropdownFieldResolver, PivotAttachments};
use crate::engine::metadata::MetadataRegistry;
use crate::importer::cell_cleaner::CellCleaner;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::report::ImportReport;
use crate::importer::validator::{RowViolation, SchemaValidator};
use crate::repository::entity_store::{EntityStore, EntityTransaction};
use crate::sheet::error::SheetError;
use crate::sheet::ingest::read_workbook;
use crate::sheet::worksheet::{Workbook, Worksheet};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

// ==========================================
// ImportReconciler - 导入对账器
// ==========================================
/// 泛型参数为范围策略: 引擎只消费布尔判定,规则属宿主应用
pub struct ImportReconciler<P: ScopePolicy> {
    settings: SheetableConfig,
    scope: P,
}

/// 事务内计数汇总
#[derive(Default)]
struct PersistOutcome {
    total: usize,
    created: usize,
    updated: usize,
    attached: usize,
}

impl ImportReconciler<AllowAllScope> {
    /// 未接入范围控制时的缺省构造
    pub fn unscoped(settings: SheetableConfig) -> Self {
        Self::new(settings, AllowAllScope)
    }
}

impl<P: ScopePolicy> ImportReconciler<P> {
    pub fn new(settings: SheetableConfig, scope: P) -> Self {
        Self { settings, scope }
    }

    /// 从磁盘文件导入（扩展名决定解析器）
    pub fn import_file<S: EntityStore>(
        &self,
        store: &S,
        entity_type: &str,
        path: &Path,
    ) -> ImportResult<ImportReport> {
        debug!(path = %path.display(), "读入导入文件");
        let mut workbook = read_workbook(path)?;
        self.import(store, entity_type, &mut workbook)
    }

    /// 导入一个内存工作簿
    ///
    /// 数据表按实体表名定位,缺席时退到首个非注册表工作表;
    /// 返回批次报告,任何行级错误整批失败。
    pub fn import<S: EntityStore>(
        &self,
        store: &S,
        entity_type: &str,
        workbook: &mut Workbook,
    ) -> ImportResult<ImportReport> {
        let start_time = Instant::now();
        let batch_id = Uuid::new_v4().to_string();
        let mut warnings: Vec<String> = Vec::new();

        info!(batch_id = %batch_id, entity_type = %entity_type, "开始导入批次");

        let desc = store.descriptor(entity_type)?;

        // === 步骤 1: 定位数据表 ===
        debug!("步骤 1: 定位数据表");
        let sheet_name = self.data_sheet_name(desc, workbook)?;
        if sheet_name != desc.table {
            warn!(expected = %desc.table, actual = %sheet_name, "数据表名不符,改用候补工作表");
            warnings.push(format!(
                "数据表 {} 不存在,改用工作表 {}",
                desc.table, sheet_name
            ));
        }
        let sheet = workbook
            .sheet_mut(&sheet_name)
            .ok_or_else(|| SheetError::SheetNotFound(sheet_name.clone()))?;
        if sheet.header_column(&desc.primary_key).is_none() {
            warnings.push(format!(
                "主键列 {} 不在表头,全部按新增处理",
                desc.primary_key
            ));
        }

        // === 步骤 2: 主键重复预检 ===
        debug!("步骤 2: 主键重复预检");
        Self::check_duplicate_ids(desc, sheet)?;

        // === 步骤 3: 空白归一 ===
        debug!("步骤 3: 空白归一");
        Self::normalize_cells(sheet);

        // === 步骤 4: 日期时间清洗 ===
        debug!("步骤 4: 日期时间清洗");
        Self::clean_datetime_columns(desc, sheet)?;

        // === 步骤 5: 下拉反解 ===
        debug!("步骤 5: 下拉反解");
        let mut registry = MetadataRegistry::new(&self.settings.metadata_sheet_name);
        let attachments =
            DropdownFieldResolver::resolve_dropdowns(store, &mut registry, entity_type, sheet)?;

        // === 步骤 6: 声明校验 ===
        debug!("步骤 6: 声明校验");
        let violations = Self::validate_rows(desc, sheet);
        if !violations.is_empty() {
            warn!(count = violations.len(), "声明校验未通过,批次中止");
            return Err(ImportError::Validation { violations });
        }

        // === 步骤 7: 事务落库与范围复核 ===
        debug!("步骤 7: 事务落库与范围复核");
        let outcome = self.persist(store, desc, sheet, &attachments)?;

        let elapsed = start_time.elapsed();
        info!(
            batch_id = %batch_id,
            total = outcome.total,
            created = outcome.created,
            updated = outcome.updated,
            attached = outcome.attached,
            elapsed_ms = elapsed.as_millis(),
            "导入批次完成"
        );

        Ok(ImportReport {
            batch_id,
            entity_type: entity_type.to_string(),
            total_rows: outcome.total,
            created: outcome.created,
            updated: outcome.updated,
            attached: outcome.attached,
            warnings,
            elapsed_ms: elapsed.as_millis() as u64,
        })
    }

    /// 数据表定位: 同名表优先,否则取首个非注册表工作表
    fn data_sheet_name(
        &self,
        desc: &EntityDescriptor,
        workbook: &Workbook,
    ) -> ImportResult<String> {
        if workbook.sheet(&desc.table).is_some() {
            return Ok(desc.table.clone());
        }
        workbook
            .sheet_names()
            .into_iter()
            .find(|name| *name != self.settings.metadata_sheet_name)
            .map(|name| name.to_string())
            .ok_or_else(|| ImportError::Sheet(SheetError::SheetNotFound(desc.table.clone())))
    }

    /// 主键重复预检: 任何重复即中止,一次性列出全部重复值
    ///
    /// 空主键行走纯插入,不参与判定;比较口径为 key_string
    /// （XLSX 数值列读出 Float、CSV 读出 Text,需跨类型折叠）。
    fn check_duplicate_ids(desc: &EntityDescriptor, sheet: &Worksheet) -> ImportResult<()> {
        let Some(pk_col) = sheet.header_column(&desc.primary_key) else {
            return Ok(());
        };

        let mut seen: HashSet<String> = HashSet::new();
        let mut duplicates: Vec<String> = Vec::new();
        for row in 2..=sheet.last_data_row() {
            let value = sheet.value(row, pk_col);
            if value.is_null() {
                continue;
            }
            let key = value.key_string();
            if !seen.insert(key.clone()) && !duplicates.contains(&key) {
                duplicates.push(key);
            }
        }

        if duplicates.is_empty() {
            Ok(())
        } else {
            warn!(count = duplicates.len(), "主键重复,批次中止");
            Err(ImportError::DuplicateIds { ids: duplicates })
        }
    }

    /// 全部数据单元格空白归一(见 CellCleaner::normalize)
    fn normalize_cells(sheet: &mut Worksheet) {
        let last_row = sheet.last_data_row();
        let last_col = sheet.last_data_column();
        for row in 2..=last_row {
            for col in 1..=last_col {
                let value = sheet.value(row, col);
                if value.is_null() {
                    continue;
                }
                let cleaned = CellCleaner::normalize(value.clone());
                if cleaned != value {
                    sheet.set_value(row, col, cleaned);
                }
            }
        }
    }

    /// 日期列逐行归一;审计时间列归宿主存储维护,不参与清洗
    fn clean_datetime_columns(
        desc: &EntityDescriptor,
        sheet: &mut Worksheet,
    ) -> ImportResult<()> {
        for col_def in &desc.columns {
            if !col_def.column_type.is_datetime() || is_audit_column(&col_def.name) {
                continue;
            }
            let Some(col) = sheet.header_column(&col_def.name) else {
                continue;
            };
            for row in 2..=sheet.last_data_row() {
                let value = sheet.value(row, col);
                if value.is_null() {
                    continue;
                }
                match CellCleaner::clean_datetime(&value) {
                    Some(dt) => sheet.set_value(row, col, CellValue::DateTime(dt)),
                    None => {
                        return Err(ImportError::DateFormat {
                            row,
                            column: col_def.name.clone(),
                            value: value.as_text(),
                        })
                    }
                }
            }
        }
        Ok(())
    }

    /// 逐行声明校验,空行跳过,违规全量累积
    fn validate_rows(desc: &EntityDescriptor, sheet: &Worksheet) -> Vec<RowViolation> {
        let mut violations = Vec::new();
        for row in 2..=sheet.last_data_row() {
            if sheet.is_blank_row(row) {
                continue;
            }
            let values = sheet.row_map(row);
            violations.extend(SchemaValidator::validate_row(desc, row, &values));
        }
        violations
    }

    /// 单事务: 逐行 update_or_create → 关联整体置换 → 逐行范围复核
    ///
    /// 复核对象是事务内按主键回读的已落库实体;
    /// 首个越界行经闭包 Err 触发整体回滚。
    fn persist<S: EntityStore>(
        &self,
        store: &S,
        desc: &EntityDescriptor,
        sheet: &Worksheet,
        attachments: &PivotAttachments,
    ) -> ImportResult<PersistOutcome> {
        let mut outcome = PersistOutcome::default();

        store.with_transaction(|tx| -> Result<(), ImportError> {
            // 行号 → 落库主键,升序保证复核按行序报告首个越界
            let mut persisted: BTreeMap<u32, CellValue> = BTreeMap::new();

            for row in 2..=sheet.last_data_row() {
                if sheet.is_blank_row(row) {
                    continue;
                }
                let record = Self::reduce_to_record(desc, sheet, row);
                let pk = record.get(&desc.primary_key);
                let existed = !pk.is_null() && tx.find(&desc.entity_type, &pk)?.is_some();

                let id = tx.update_or_create(&record)?;
                if existed {
                    outcome.updated += 1;
                } else {
                    outcome.created += 1;
                }
                outcome.total += 1;
                persisted.insert(row, id);
            }

            // 关联整体置换: 空清单同样执行,表示清空该行关联
            for (field, rows) in &attachments.lists {
                for (row, ids) in rows {
                    let Some(owner_id) = persisted.get(row) else {
                        continue;
                    };
                    tx.replace_pivot(&desc.entity_type, field, owner_id, ids)?;
                    outcome.attached += ids.len();
                }
            }

            for (row, id) in &persisted {
                let Some(record) = tx.find(&desc.entity_type, id)? else {
                    continue;
                };
                if !self.scope.is_allowed(&record) {
                    warn!(row = *row, "行越出数据权限,整批回滚");
                    return Err(ImportError::ScopeViolation { row: *row });
                }
            }
            Ok(())
        })?;

        Ok(outcome)
    }

    /// 行归约: 只保留本体存储列;瞬态列(联结列/扇出残留)与审计列丢弃
    ///
    /// 表头在场而单元格为空的列落 Null,更新时即清空该字段。
    fn reduce_to_record(desc: &EntityDescriptor, sheet: &Worksheet, row: u32) -> EntityRecord {
        let mut record = EntityRecord::new(&desc.entity_type);
        for (col, header) in sheet.headers() {
            if !desc.has_column(&header) && header != desc.primary_key {
                continue;
            }
            if is_audit_column(&header) {
                continue;
            }
            record.insert(&header, sheet.value(row, col));
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::descriptor::RelationDef;
    use crate::domain::dropdown::DropdownConfig;
    use crate::domain::types::ColumnType;
    use crate::repository::error::StoreResult;
    use crate::repository::sqlite_store::SqliteEntityStore;
    use std::sync::{Arc, Mutex};

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    /// 拒绝指定姓名的策略,用于回滚演练
    struct DenyNamed(&'static str);

    impl ScopePolicy for DenyNamed {
        fn is_allowed(&self, record: &EntityRecord) -> bool {
            record.get("name").as_text() != self.0
        }
    }

    /// 演示声明: 部门 / 技能 / 员工（外键下拉 + 扇出 + 日期列）
    fn demo_store() -> SqliteEntityStore {
        let conn = crate::db::open_in_memory_connection().unwrap();
        let mut store = SqliteEntityStore::from_connection(Arc::new(Mutex::new(conn)));
        store.register(
            EntityDescriptor::new("Department", "department")
                .column("id", ColumnType::Integer)
                .column("name", ColumnType::Text),
        );
        store.register(
            EntityDescriptor::new("Skill", "skill")
                .column("id", ColumnType::Integer)
                .column("title", ColumnType::Text),
        );
        store.register(
            EntityDescriptor::new("Employee", "employee")
                .column("id", ColumnType::Integer)
                .required_column("name", ColumnType::Text)
                .column("department_id", ColumnType::Integer)
                .column("hired_at", ColumnType::Date)
                .relation(RelationDef::to_one("department", "Department", "department_id"))
                .relation(RelationDef::many_to_many(
                    "skills",
                    "Skill",
                    "employee_skill",
                    "employee_id",
                    "skill_id",
                ))
                .dropdown(DropdownConfig::foreign_key("department_id", "Department", "name"))
                .dropdown(DropdownConfig::fan_out("skills", "Skill", "title", "name", 1)),
        );
        store.create_tables().unwrap();

        store
            .with_transaction(|tx| -> StoreResult<()> {
                for name in ["炼钢", "热轧"] {
                    tx.update_or_create(&EntityRecord::new("Department").set("name", text(name)))?;
                }
                for title in ["吊装", "测厚", "质检"] {
                    tx.update_or_create(&EntityRecord::new("Skill").set("title", text(title)))?;
                }
                Ok(())
            })
            .unwrap();
        store
    }

    fn workbook_with(sheet: Worksheet) -> Workbook {
        let mut workbook = Workbook::new();
        workbook.insert(sheet);
        workbook
    }

    fn reconciler() -> ImportReconciler<AllowAllScope> {
        ImportReconciler::unscoped(SheetableConfig::default())
    }

    #[test]
    fn test_import_creates_updates_and_attaches() {
        let store = demo_store();
        store
            .with_transaction(|tx| -> StoreResult<()> {
                tx.update_or_create(
                    &EntityRecord::new("Employee")
                        .set("id", CellValue::Int(1))
                        .set("name", text("赵工"))
                        .set("department_id", CellValue::Int(1)),
                )?;
                Ok(())
            })
            .unwrap();

        let mut sheet = Worksheet::new("employee");
        sheet.write_headers(&[
            "id".to_string(),
            "name".to_string(),
            "department_id".to_string(),
            "skills_1".to_string(),
            "skills_2".to_string(),
        ]);
        // 既有员工: 改名换部门,两项技能
        sheet.write_row(
            2,
            &[CellValue::Int(1), text("赵组长"), text("热轧"), text("吊装"), text("质检")],
        );
        // 新员工: 空主键,姓名带脏空白
        sheet.write_row(
            3,
            &[CellValue::Null, text(" 钱  工 "), text("炼钢"), text("测厚")],
        );
        let mut workbook = workbook_with(sheet);

        let report = reconciler().import(&store, "Employee", &mut workbook).unwrap();
        assert_eq!(report.total_rows, 2);
        assert_eq!(report.created, 1);
        assert_eq!(report.updated, 1);
        assert_eq!(report.attached, 3);
        assert!(report.warnings.is_empty());

        let updated = store.find("Employee", &CellValue::Int(1)).unwrap().unwrap();
        assert_eq!(updated.get("name"), text("赵组长"));
        assert_eq!(updated.get("department_id"), CellValue::Int(2));
        let skills = store.related_many(&updated, "skills").unwrap();
        assert_eq!(skills.len(), 2);

        let created = store.find("Employee", &CellValue::Int(2)).unwrap().unwrap();
        assert_eq!(created.get("name"), text("钱 工"));
        assert_eq!(created.get("department_id"), CellValue::Int(1));
    }

    #[test]
    fn test_duplicate_ids_abort_before_any_persist() {
        let store = demo_store();
        let mut sheet = Worksheet::new("employee");
        sheet.write_headers(&["id".to_string(), "name".to_string()]);
        sheet.write_row(2, &[CellValue::Int(5), text("甲")]);
        sheet.write_row(3, &[CellValue::Int(5), text("乙")]);
        sheet.write_row(4, &[CellValue::Int(7), text("丙")]);
        sheet.write_row(5, &[text("7"), text("丁")]);
        let mut workbook = workbook_with(sheet);

        let err = reconciler()
            .import(&store, "Employee", &mut workbook)
            .unwrap_err();
        match err {
            ImportError::DuplicateIds { ids } => {
                // 文本 "7" 与数值 7 折叠为同一主键
                assert_eq!(ids, vec!["5", "7"]);
            }
            other => panic!("预期 DuplicateIds, 实际 {other:?}"),
        }
        assert!(store.all("Employee").unwrap().is_empty());
    }

    #[test]
    fn test_scope_violation_rolls_back_whole_batch() {
        let store = demo_store();
        let mut sheet = Worksheet::new("employee");
        sheet.write_headers(&["id".to_string(), "name".to_string()]);
        sheet.write_row(2, &[CellValue::Null, text("甲")]);
        sheet.write_row(3, &[CellValue::Null, text("乙")]);
        sheet.write_row(4, &[CellValue::Null, text("丙")]);
        let mut workbook = workbook_with(sheet);

        let importer = ImportReconciler::new(SheetableConfig::default(), DenyNamed("乙"));
        let err = importer.import(&store, "Employee", &mut workbook).unwrap_err();
        assert!(matches!(err, ImportError::ScopeViolation { row: 3 }));
        // 三行全部回滚,不是只回滚被拒的一行
        assert!(store.all("Employee").unwrap().is_empty());
    }

    #[test]
    fn test_unrecognized_date_aborts_with_row_context() {
        let store = demo_store();
        let mut sheet = Worksheet::new("employee");
        sheet.write_headers(&["name".to_string(), "hired_at".to_string()]);
        sheet.write_row(2, &[text("甲"), text("15.03.2024")]);
        sheet.write_row(3, &[text("乙"), text("2024/03/15")]);
        let mut workbook = workbook_with(sheet);

        let err = reconciler()
            .import(&store, "Employee", &mut workbook)
            .unwrap_err();
        match err {
            ImportError::DateFormat { row, column, value } => {
                assert_eq!(row, 3);
                assert_eq!(column, "hired_at");
                assert_eq!(value, "2024/03/15");
            }
            other => panic!("预期 DateFormat, 实际 {other:?}"),
        }
        assert!(store.all("Employee").unwrap().is_empty());
    }

    #[test]
    fn test_validation_failures_accumulate_across_rows() {
        let store = demo_store();
        let mut sheet = Worksheet::new("employee");
        sheet.write_headers(&["name".to_string(), "department_id".to_string()]);
        sheet.write_row(2, &[CellValue::Null, text("不存在的部门")]);
        sheet.write_row(3, &[text("乙"), text("也不存在")]);
        let mut workbook = workbook_with(sheet);

        let err = reconciler()
            .import(&store, "Employee", &mut workbook)
            .unwrap_err();
        match err {
            ImportError::Validation { violations } => {
                // 行 2: 必填缺失 + 未注册文本落到整数列;行 3: 类型不符
                assert_eq!(violations.len(), 3);
            }
            other => panic!("预期 Validation, 实际 {other:?}"),
        }
        assert!(store.all("Employee").unwrap().is_empty());
    }

    #[test]
    fn test_missing_pk_header_inserts_all_and_warns() {
        let store = demo_store();
        let mut sheet = Worksheet::new("employee");
        sheet.write_headers(&["name".to_string()]);
        sheet.write_row(2, &[text("甲")]);
        sheet.write_row(3, &[text("乙")]);
        let mut workbook = workbook_with(sheet);

        let report = reconciler().import(&store, "Employee", &mut workbook).unwrap();
        assert_eq!(report.created, 2);
        assert_eq!(report.updated, 0);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("id"));
    }

    #[test]
    fn test_fallback_sheet_is_used_when_table_name_absent() {
        let store = demo_store();
        let mut sheet = Worksheet::new("Sheet1");
        sheet.write_headers(&["name".to_string()]);
        sheet.write_row(2, &[text("甲")]);
        let mut workbook = Workbook::new();
        // 注册表工作表不作数据表候补
        workbook.get_or_create("metadata");
        workbook.insert(sheet);

        let report = reconciler().import(&store, "Employee", &mut workbook).unwrap();
        assert_eq!(report.created, 1);
        assert_eq!(report.warnings.len(), 2);
        assert!(report.warnings[0].contains("Sheet1"));
    }

    #[test]
    fn test_transient_and_audit_columns_are_dropped() {
        let store = demo_store();
        let mut sheet = Worksheet::new("employee");
        sheet.write_headers(&[
            "name".to_string(),
            "department.name".to_string(),
            "created_at".to_string(),
        ]);
        sheet.write_row(2, &[text("甲"), text("热轧"), text("2020-01-01 00:00:00")]);
        let mut workbook = workbook_with(sheet);

        let report = reconciler().import(&store, "Employee", &mut workbook).unwrap();
        assert_eq!(report.created, 1);

        let record = store.find("Employee", &CellValue::Int(1)).unwrap().unwrap();
        assert_eq!(record.get("name"), text("甲"));
        // 联结列与审计列未落库
        assert_eq!(record.get("department.name"), CellValue::Null);
        assert_eq!(record.get("created_at"), CellValue::Null);
    }
}
