//! 模型输出的文本清洗工具

use once_cell::sync::Lazy;
use regex::Regex;

/// 行首编号，如 "1. " "2、" "（3）" "(4) "
static LEADING_NUMBERING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*(?:[（(]?\d+[）)]?[.、:：]?)\s*").expect("invalid regex"));

/// Markdown 代码栅栏
static CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^\s*```[a-zA-Z]*\s*(.*?)\s*```\s*$").expect("invalid regex"));

/// 去掉模型爱加的行首编号，咨询对话里不该出现 "1. xxx" 式的清单腔
pub fn clean_numbering(text: &str) -> String {
    LEADING_NUMBERING.replace_all(text.trim(), "").to_string()
}

/// 剥掉包裹整段输出的 Markdown 代码栅栏
pub fn strip_code_fence(text: &str) -> &str {
    match CODE_FENCE.captures(text) {
        Some(caps) => caps.get(1).map(|m| m.as_str()).unwrap_or(text),
        None => text.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_numbering_strips_common_formats() {
        assert_eq!(clean_numbering("1. 你最近睡眠怎么样？"), "你最近睡眠怎么样？");
        assert_eq!(clean_numbering("2、先说说情绪"), "先说说情绪");
        assert_eq!(clean_numbering("（3）有什么想法"), "有什么想法");
        assert_eq!(clean_numbering("没有编号的句子"), "没有编号的句子");
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("{\"a\":1}"), "{\"a\":1}");
    }
}
