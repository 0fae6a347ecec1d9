// ==========================================
// Sheetable 实体表格映射引擎 - 配置层
// ==========================================
// 职责: 引擎级配置值对象
// 约定: 字段全部带缺省,缺省即原始行为
// ==========================================

use crate::domain::types::ExportFormat;
use serde::{Deserialize, Serialize};

/// 引擎配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetableConfig {
    /// 导出文件格式（决定 {表名}.{扩展名} 的扩展名）
    #[serde(default)]
    pub export_format: ExportFormat,

    /// 数据区之外预铺下拉校验的行数
    #[serde(default = "default_pad_rows")]
    pub pad_rows: u32,

    /// 内联下拉清单的字符上限（超出静默截断）
    #[serde(default = "default_embedded_list_limit")]
    pub embedded_list_limit: usize,

    /// 注册表工作表名
    #[serde(default = "default_metadata_sheet_name")]
    pub metadata_sheet_name: String,
}

fn default_pad_rows() -> u32 {
    100
}

fn default_embedded_list_limit() -> usize {
    255
}

fn default_metadata_sheet_name() -> String {
    "metadata".to_string()
}

impl Default for SheetableConfig {
    fn default() -> Self {
        Self {
            export_format: ExportFormat::default(),
            pad_rows: default_pad_rows(),
            embedded_list_limit: default_embedded_list_limit(),
            metadata_sheet_name: default_metadata_sheet_name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SheetableConfig::default();
        assert_eq!(config.export_format, ExportFormat::Xlsx);
        assert_eq!(config.pad_rows, 100);
        assert_eq!(config.embedded_list_limit, 255);
        assert_eq!(config.metadata_sheet_name, "metadata");
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: SheetableConfig = serde_json::from_str(r#"{"export_format":"CSV"}"#).unwrap();
        assert_eq!(config.export_format, ExportFormat::Csv);
        assert_eq!(config.pad_rows, 100);
    }
}
