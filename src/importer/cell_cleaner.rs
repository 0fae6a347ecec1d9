// ==========================================
// Sheetable 实体表格映射引擎 - 单元格清洗
// ==========================================
// 职责: 空白归一(连续空白折叠/去首尾/空串归 Null)
//       与日期时间三形态归一(序列数 / dd.mm.yyyy / 带时分秒)
// 依据: 表格文件读入层只move值不定型,类型归一在此收口
// ==========================================

use crate::domain::types::CellValue;
use chrono::{Duration, NaiveDate, NaiveDateTime};

/// 序列数日期纪元（电子表格以 1899-12-30 为第 0 天）
const SERIAL_EPOCH: (i32, u32, u32) = (1899, 12, 30);

/// 单日秒数,序列数小数部分按此换算时刻
const SECONDS_PER_DAY: f64 = 86_400.0;

/// CellCleaner - 单元格清洗器
pub struct CellCleaner;

impl CellCleaner {
    /// 空白归一
    ///
    /// 文本内部连续空白折叠为单个空格并去首尾;
    /// 清洗后为空串的单元格归 Null,不以 "" 落库。
    /// 非文本值原样放行。
    pub fn normalize(value: CellValue) -> CellValue {
        match value {
            CellValue::Text(s) => {
                let collapsed = s.split_whitespace().collect::<Vec<_>>().join(" ");
                if collapsed.is_empty() {
                    CellValue::Null
                } else {
                    CellValue::Text(collapsed)
                }
            }
            other => other,
        }
    }

    /// 日期时间归一
    ///
    /// 接受的来源形态: 电子表格序列数(整数、小数或数字文本)、
    /// `dd.mm.yyyy`(可带时分秒)、ISO `yyyy-mm-dd`(可带时分秒,
    /// 即本引擎导出文件的写法);全部不中返回 None,
    /// 由调用方定级为行错误。
    pub fn clean_datetime(value: &CellValue) -> Option<NaiveDateTime> {
        match value {
            CellValue::DateTime(dt) => Some(*dt),
            CellValue::Int(n) => Self::serial_to_datetime(*n as f64),
            CellValue::Float(f) => Self::serial_to_datetime(*f),
            CellValue::Text(s) => Self::parse_datetime_text(s.trim()),
            _ => None,
        }
    }

    /// 序列数 → 日期时间（小数部分为当日时刻）
    fn serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
        if !serial.is_finite() || serial < 0.0 {
            return None;
        }
        let (y, m, d) = SERIAL_EPOCH;
        let epoch = NaiveDate::from_ymd_opt(y, m, d)?.and_hms_opt(0, 0, 0)?;
        let days = serial.trunc() as i64;
        let seconds = (serial.fract() * SECONDS_PER_DAY).round() as i64;
        epoch
            .checked_add_signed(Duration::days(days))?
            .checked_add_signed(Duration::seconds(seconds))
    }

    /// 文本形态解析: 先带时分秒,再纯日期;严格匹配,不做模糊推断
    fn parse_datetime_text(s: &str) -> Option<NaiveDateTime> {
        for format in ["%d.%m.%Y %H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
                return Some(dt);
            }
        }
        for format in ["%d.%m.%Y", "%Y-%m-%d"] {
            if let Ok(date) = NaiveDate::parse_from_str(s, format) {
                return date.and_hms_opt(0, 0, 0);
            }
        }
        // 分隔符文件无类型,序列数以数字文本到达
        if let Ok(serial) = s.parse::<f64>() {
            return Self::serial_to_datetime(serial);
        }
        None
    }
}
