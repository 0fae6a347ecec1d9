// ==========================================
// Sheetable 实体表格映射引擎 - 实体存储 Trait
// ==========================================
// 职责: 定义实体读取与事务写入接口（不包含实现）
// 红线: 映射引擎只依赖本接口,不触碰具体数据库
// ==========================================

use crate::domain::descriptor::{EntityDescriptor, EntityRecord};
use crate::domain::types::CellValue;
use crate::repository::error::{StoreError, StoreResult};

// ==========================================
// EntityStore Trait
// ==========================================
// 用途: 导出/导入管道的只读数据面 + 事务入口
// 实现者: SqliteEntityStore
pub trait EntityStore: Send + Sync {
    /// 按实体类型名取声明
    ///
    /// # 返回
    /// - Ok(&EntityDescriptor): 已注册的声明
    /// - Err(UnknownEntity): 类型未注册
    fn descriptor(&self, entity_type: &str) -> StoreResult<&EntityDescriptor>;

    /// 按主键查单条
    fn find(&self, entity_type: &str, id: &CellValue) -> StoreResult<Option<EntityRecord>>;

    /// 全表读取, 按主键升序
    fn all(&self, entity_type: &str) -> StoreResult<Vec<EntityRecord>>;

    /// 按列值集合筛选, 按主键升序
    ///
    /// values 为空时直接返回空集, 不发查询。
    fn where_in(
        &self,
        entity_type: &str,
        column: &str,
        values: &[CellValue],
    ) -> StoreResult<Vec<EntityRecord>>;

    /// 单值关系取数 (ToOne / MorphToOne)
    ///
    /// # 返回
    /// - Ok(Some): 外键非空且对端存在
    /// - Ok(None): 外键为空或对端缺失
    fn related_one(&self, record: &EntityRecord, relation: &str)
        -> StoreResult<Option<EntityRecord>>;

    /// 集合关系取数 (ToMany / ManyToMany / MorphToMany), 按对端主键升序
    fn related_many(&self, record: &EntityRecord, relation: &str)
        -> StoreResult<Vec<EntityRecord>>;

    /// 在单事务内执行写入闭包
    ///
    /// 闭包返回 Err 时整体回滚;返回 Ok 后提交。
    /// 提交失败同样以 Err 报出。错误类型由调用方给定,
    /// 存储自身的错误经 From<StoreError> 并入。
    fn with_transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        E: From<StoreError>,
        F: FnOnce(&mut dyn EntityTransaction) -> Result<T, E>,
        Self: Sized;
}

// ==========================================
// EntityTransaction Trait
// ==========================================
// 用途: 事务作用域内的写入面;只在 with_transaction 闭包里可见
pub trait EntityTransaction {
    /// 按实体类型名取声明
    fn descriptor(&self, entity_type: &str) -> StoreResult<&EntityDescriptor>;

    /// 按主键查单条（事务内可见已写入数据）
    fn find(&self, entity_type: &str, id: &CellValue) -> StoreResult<Option<EntityRecord>>;

    /// 按主键更新, 不存在则插入
    ///
    /// # 参数
    /// - record: 待写实体;主键为 Null 时作纯插入,由存储分配主键
    ///
    /// # 返回
    /// - Ok(CellValue): 落库后的主键值
    fn update_or_create(&mut self, record: &EntityRecord) -> StoreResult<CellValue>;

    /// 整体置换多对多关联
    ///
    /// 删除 owner 在中间表的全部既有行, 再按给定顺序重建。
    fn replace_pivot(
        &mut self,
        entity_type: &str,
        relation: &str,
        owner_id: &CellValue,
        related_ids: &[CellValue],
    ) -> StoreResult<()>;
}
