// ==========================================
// Sheetable 实体表格映射引擎 - 导入批次报告
// ==========================================
// 用途: 单次导入的结果汇总,宿主应用可直接序列化下发
// ==========================================

use serde::{Deserialize, Serialize};

/// 导入批次报告
///
/// created/updated 按主键是否已存在划分;
/// attached 为多对多置换写入的关联条数。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportReport {
    /// 批次 ID（uuid v4）
    pub batch_id: String,
    /// 导入的实体类型
    pub entity_type: String,
    /// 落库行数（空行不计）
    pub total_rows: usize,
    /// 新增行数
    pub created: usize,
    /// 更新行数
    pub updated: usize,
    /// 置换写入的关联条数
    pub attached: usize,
    /// 非致命提示（改用候补工作表、主键列缺席等）
    pub warnings: Vec<String>,
    /// 耗时（毫秒）
    pub elapsed_ms: u64,
}
