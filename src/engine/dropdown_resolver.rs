// ==========================================
// Sheetable 实体表格映射引擎 - 下拉字段解析器
// ==========================================
// 职责: 导出方向 id → 显示文本 + 铺设有效性约束;
//       导入方向 显示文本 → id + 扇出列收拢为关联清单
// 红线: 未注册文本原样放行,不作硬错误（允许直填原始 id）
// ==========================================

use crate::config::SheetableConfig;
use crate::domain::descriptor::EntityDescriptor;
use crate::domain::dropdown::{DropdownConfig, DropdownStrategy};
use crate::domain::types::CellValue;
use crate::engine::metadata::MetadataRegistry;
use crate::repository::entity_store::EntityStore;
use crate::repository::error::StoreResult;
use crate::sheet::validation::DataValidation;
use crate::sheet::worksheet::Worksheet;
use indexmap::IndexMap;
use std::collections::BTreeMap;
use tracing::{debug, warn};

// ==========================================
// PivotAttachments - 扇出列反解结果
// ==========================================
/// 导入方向收拢的多对多关联清单
///
/// 键为关系字段名,值按行号给出对端主键清单;
/// 空清单也保留,置换语义下表示"清空该行关联"。
#[derive(Debug, Default)]
pub struct PivotAttachments {
    pub lists: IndexMap<String, BTreeMap<u32, Vec<CellValue>>>,
}

impl PivotAttachments {
    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }
}

/// DropdownFieldResolver - 下拉字段解析器
pub struct DropdownFieldResolver;

impl DropdownFieldResolver {
    // ==========================================
    // 导出方向
    // ==========================================

    /// 对工作表套用实体声明的全部下拉字段
    ///
    /// 声明序处理;策略判定见 DropdownConfig::strategy。
    pub fn apply_dropdowns(
        store: &dyn EntityStore,
        registry: &mut MetadataRegistry,
        settings: &SheetableConfig,
        entity_type: &str,
        sheet: &mut Worksheet,
    ) -> StoreResult<()> {
        let desc = store.descriptor(entity_type)?;
        for config in &desc.dropdowns {
            match config.strategy() {
                DropdownStrategy::Embedded => {
                    Self::apply_embedded(store, settings, config, sheet)?
                }
                DropdownStrategy::FanOut => {
                    Self::apply_fan_out(store, registry, desc, config, sheet)?
                }
                DropdownStrategy::FixedList => {
                    Self::apply_fixed_list(registry, settings, &desc.entity_type, config, sheet)
                }
                DropdownStrategy::ForeignKey => {
                    Self::apply_foreign_key(store, registry, settings, &desc.entity_type, config, sheet)?
                }
            }
        }
        Ok(())
    }

    /// 内联清单: 字面值公式,超限静默截断
    fn apply_embedded(
        store: &dyn EntityStore,
        settings: &SheetableConfig,
        config: &DropdownConfig,
        sheet: &mut Worksheet,
    ) -> StoreResult<()> {
        let Some(col) = sheet.header_column(&config.field) else {
            warn!(field = %config.field, "下拉目标列不在表头,跳过");
            return Ok(());
        };

        let texts: Vec<String> = match config.foreign_type.as_deref() {
            Some(foreign) => store
                .all(foreign)?
                .iter()
                .map(|r| r.get(&config.foreign_text_column).as_text())
                .collect(),
            None => config.fixed_list.clone(),
        };

        // 截断按字符数,保证不劈开多字节文本
        let joined = texts.join(",");
        let inline: String = joined.chars().take(settings.embedded_list_limit).collect();
        let validation = DataValidation::inline_list(&inline);

        let last = sheet.last_data_row().max(1);
        for row in 2..=(last + settings.pad_rows) {
            sheet.set_validation(row, col, validation.clone());
        }
        Ok(())
    }

    /// 多对多扇出: 锚点右侧插 {field}_1..N 列并写对端文本
    fn apply_fan_out(
        store: &dyn EntityStore,
        registry: &mut MetadataRegistry,
        desc: &EntityDescriptor,
        config: &DropdownConfig,
        sheet: &mut Worksheet,
    ) -> StoreResult<()> {
        let Some(anchor_name) = config.mapping_right_of_field.as_deref() else {
            warn!(field = %config.field, "扇出声明缺少锚点列,跳过");
            return Ok(());
        };
        let Some(anchor_col) = sheet.header_column(anchor_name) else {
            warn!(field = %config.field, anchor = anchor_name, "扇出锚点列不在表头,跳过");
            return Ok(());
        };
        let Some(pk_col) = sheet.header_column(&desc.primary_key) else {
            warn!(field = %config.field, "主键列不在表头,扇出跳过");
            return Ok(());
        };

        // 每行对端显示文本（对端主键升序,保证重复导出列序稳定）
        let last = sheet.last_data_row();
        let mut per_row: Vec<(u32, Vec<String>)> = Vec::new();
        let mut max_count = 0usize;
        for row in 2..=last {
            let id = sheet.value(row, pk_col);
            if id.is_null() {
                continue;
            }
            let texts: Vec<String> = match store.find(&desc.entity_type, &id)? {
                Some(record) => store
                    .related_many(&record, &config.field)?
                    .iter()
                    .map(|r| r.get(&config.foreign_text_column).as_text())
                    .collect(),
                None => Vec::new(),
            };
            max_count = max_count.max(texts.len());
            per_row.push((row, texts));
        }

        // 列数 = max(声明下限, 最富行的关联数)
        let col_count = config.mapping_min_fields.max(max_count);
        sheet.insert_columns_after(anchor_col, col_count as u32);
        for slot in 0..col_count {
            let col = anchor_col + 1 + slot as u32;
            sheet.set_value(
                1,
                col,
                CellValue::Text(format!("{}_{}", config.field, slot + 1)),
            );
        }

        registry.ensure_foreign_block(store, &desc.entity_type, config)?;
        let validation = registry.text_list_validation(&config.registry_key(&desc.entity_type));

        for (row, texts) in &per_row {
            for slot in 0..col_count {
                let col = anchor_col + 1 + slot as u32;
                // 第 N 个关联存在才写文本,否则留空
                if let Some(text) = texts.get(slot) {
                    sheet.set_value(*row, col, CellValue::Text(text.clone()));
                }
                if let Some(v) = &validation {
                    sheet.set_validation(*row, col, v.clone());
                }
            }
        }
        Ok(())
    }

    /// 固定清单: 注册表落字面值块,区间校验铺到 pad 行,值本身不改写
    fn apply_fixed_list(
        registry: &mut MetadataRegistry,
        settings: &SheetableConfig,
        owner_type: &str,
        config: &DropdownConfig,
        sheet: &mut Worksheet,
    ) {
        let Some(col) = sheet.header_column(&config.field) else {
            warn!(field = %config.field, "下拉目标列不在表头,跳过");
            return;
        };
        registry.ensure_fixed_block(owner_type, config);
        let Some(validation) = registry.text_list_validation(&config.registry_key(owner_type))
        else {
            return;
        };
        // 空白模板同样铺满追加区,与外键/内联两策略对齐
        let last = sheet.last_data_row();
        for row in 2..=(last.max(1) + settings.pad_rows) {
            sheet.set_validation(row, col, validation.clone());
        }
    }

    /// 普通外键: id 改写为显示文本 + 区间校验铺到 pad 行
    fn apply_foreign_key(
        store: &dyn EntityStore,
        registry: &mut MetadataRegistry,
        settings: &SheetableConfig,
        owner_type: &str,
        config: &DropdownConfig,
        sheet: &mut Worksheet,
    ) -> StoreResult<()> {
        let Some(col) = sheet.header_column(&config.field) else {
            warn!(field = %config.field, "下拉目标列不在表头,跳过");
            return Ok(());
        };

        registry.ensure_foreign_block(store, owner_type, config)?;
        let key = config.registry_key(owner_type);
        let last = sheet.last_data_row();

        if let Some(block) = registry.block(&key) {
            for row in 2..=last {
                let value = sheet.value(row, col);
                if value.is_null() {
                    continue;
                }
                // 注册表外的 id（陈旧外键）原样保留
                if let Some(text) = block.text_for_id(&value) {
                    sheet.set_value(row, col, CellValue::Text(text.to_string()));
                }
            }
        }

        if let Some(validation) = registry.text_list_validation(&key) {
            for row in 2..=(last.max(1) + settings.pad_rows) {
                sheet.set_validation(row, col, validation.clone());
            }
        }
        Ok(())
    }

    // ==========================================
    // 导入方向
    // ==========================================

    /// 反解工作表上的全部下拉字段
    ///
    /// 扇出字段收拢为关联清单返回;标量字段就地改写回 id。
    pub fn resolve_dropdowns(
        store: &dyn EntityStore,
        registry: &mut MetadataRegistry,
        entity_type: &str,
        sheet: &mut Worksheet,
    ) -> StoreResult<PivotAttachments> {
        let desc = store.descriptor(entity_type)?;
        let mut attachments = PivotAttachments::default();
        for config in &desc.dropdowns {
            match config.strategy() {
                DropdownStrategy::FanOut => {
                    Self::resolve_fan_out(store, registry, desc, config, sheet, &mut attachments)?
                }
                // 固定清单原文即值,只摘校验不反查;无对端实体的内联清单同理
                DropdownStrategy::FixedList => Self::strip_column_validators(config, sheet),
                DropdownStrategy::Embedded if config.foreign_type.is_none() => {
                    Self::strip_column_validators(config, sheet)
                }
                DropdownStrategy::Embedded | DropdownStrategy::ForeignKey => {
                    Self::resolve_scalar(store, registry, desc, config, sheet)?
                }
            }
        }
        Ok(attachments)
    }

    /// 扇出列发现与反解: {field}_1.. 连续探测直至缺失
    fn resolve_fan_out(
        store: &dyn EntityStore,
        registry: &mut MetadataRegistry,
        desc: &EntityDescriptor,
        config: &DropdownConfig,
        sheet: &mut Worksheet,
        attachments: &mut PivotAttachments,
    ) -> StoreResult<()> {
        let mut slot_cols: Vec<u32> = Vec::new();
        let mut slot = 1usize;
        while let Some(col) = sheet.header_column(&format!("{}_{}", config.field, slot)) {
            slot_cols.push(col);
            slot += 1;
        }
        if slot_cols.is_empty() {
            return Ok(());
        }

        registry.ensure_foreign_block(store, &desc.entity_type, config)?;
        let key = config.registry_key(&desc.entity_type);
        let last = sheet.last_data_row();
        let rows = attachments.lists.entry(config.field.clone()).or_default();

        for row in 2..=last {
            let mut ids: Vec<CellValue> = Vec::new();
            for &col in &slot_cols {
                sheet.take_validation(row, col);
                let value = sheet.value(row, col);
                if value.is_null() {
                    continue;
                }
                match registry.block(&key).and_then(|b| b.id_for_text(&value.as_text())) {
                    Some(id) => ids.push(id),
                    None => {
                        debug!(row, field = %config.field, value = %value, "扇出文本未注册,按原值放行");
                        ids.push(value);
                    }
                }
            }
            rows.insert(row, ids);
        }
        Ok(())
    }

    /// 标量字段反解: 文本命中注册表则改写回 id
    fn resolve_scalar(
        store: &dyn EntityStore,
        registry: &mut MetadataRegistry,
        desc: &EntityDescriptor,
        config: &DropdownConfig,
        sheet: &mut Worksheet,
    ) -> StoreResult<()> {
        let Some(col) = sheet.header_column(&config.field) else {
            return Ok(());
        };

        registry.ensure_foreign_block(store, &desc.entity_type, config)?;
        let key = config.registry_key(&desc.entity_type);
        let last = sheet.last_data_row();

        for row in 2..=last {
            sheet.take_validation(row, col);
            let value = sheet.value(row, col);
            if value.is_null() {
                continue;
            }
            match registry.block(&key).and_then(|b| b.id_for_text(&value.as_text())) {
                Some(id) => sheet.set_value(row, col, id),
                None => {
                    debug!(row, field = %config.field, value = %value, "下拉文本未注册,按原值放行");
                }
            }
        }
        Ok(())
    }

    fn strip_column_validators(config: &DropdownConfig, sheet: &mut Worksheet) {
        let Some(col) = sheet.header_column(&config.field) else {
            return;
        };
        let last = sheet.last_data_row();
        for row in 2..=last {
            sheet.take_validation(row, col);
        }
    }
}
