// ==========================================
// Sheetable 实体表格映射引擎 - 访问范围策略
// ==========================================
// 职责: 定义导入行的范围授权接口（不包含实现）
// 红线: 策略内部规则属外部协作方,引擎只消费布尔判定
// ==========================================

use crate::domain::descriptor::EntityRecord;

// ==========================================
// ScopePolicy Trait
// ==========================================
// 用途: 导入事务内逐行复核已落库实体是否在调用方授权范围内
// 实现者: 宿主应用（组织/租户/项目范围等）
pub trait ScopePolicy: Send + Sync {
    /// 实体是否在授权范围内
    ///
    /// # 参数
    /// - record: 事务内按主键回读的已落库实体
    ///
    /// # 返回
    /// - true: 允许保留
    /// - false: 触发整批回滚
    fn is_allowed(&self, record: &EntityRecord) -> bool;
}

// ==========================================
// AllowAllScope - 放行全部
// ==========================================
// 用途: 未接入范围控制的宿主应用的缺省策略
pub struct AllowAllScope;

impl ScopePolicy for AllowAllScope {
    fn is_allowed(&self, _record: &EntityRecord) -> bool {
        true
    }
}
