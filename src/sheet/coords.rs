// ==========================================
// Sheetable 实体表格映射引擎 - 坐标换算
// ==========================================
// 职责: 列字母 ⇄ 1 基列号 / A1 坐标拼装
// ==========================================

/// 1 基列号 → 列字母（1 → "A", 27 → "AA"）
pub fn column_letter(index: u32) -> String {
    debug_assert!(index >= 1, "列号为 1 基");
    let mut index = index;
    let mut letters = Vec::new();
    while index > 0 {
        let rem = ((index - 1) % 26) as u8;
        letters.push(b'A' + rem);
        index = (index - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// 列字母 → 1 基列号（"A" → 1, "AA" → 27; 非法输入 → None）
pub fn column_index(letters: &str) -> Option<u32> {
    if letters.is_empty() {
        return None;
    }
    let mut index: u32 = 0;
    for ch in letters.chars() {
        let ch = ch.to_ascii_uppercase();
        if !ch.is_ascii_uppercase() {
            return None;
        }
        index = index.checked_mul(26)?.checked_add(ch as u32 - 'A' as u32 + 1)?;
    }
    Some(index)
}

/// (行, 列) → A1 坐标文本（"B7"）
pub fn a1(row: u32, col: u32) -> String {
    format!("{}{}", column_letter(col), row)
}

/// (行, 列) → 绝对引用坐标文本（"$B$7"）
pub fn a1_absolute(row: u32, col: u32) -> String {
    format!("${}${}", column_letter(col), row)
}
