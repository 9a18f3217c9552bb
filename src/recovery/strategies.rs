//! 结构化解析策略
//!
//! 每个策略都是纯函数：输入原始文本，输出一个 JSON 对象或 None。数组、标量一律视为失败。

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::schema::RecoveryStrategy;

static FENCE_RE: OnceLock<Option<Regex>> = OnceLock::new();
static NESTED_OBJECT_RE: OnceLock<Option<Regex>> = OnceLock::new();
static GREEDY_OBJECT_RE: OnceLock<Option<Regex>> = OnceLock::new();
static COMMENTARY_RE: OnceLock<Option<Regex>> = OnceLock::new();
static TRAILING_COMMA_RE: OnceLock<Option<Regex>> = OnceLock::new();
static DOUBLED_QUOTE_RE: OnceLock<Option<Regex>> = OnceLock::new();

fn cached(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

fn fence_re() -> Option<&'static Regex> {
    cached(&FENCE_RE, r"(?s)```[A-Za-z]*[ \t]*\r?\n?(.*?)```")
}

fn nested_object_re() -> Option<&'static Regex> {
    cached(&NESTED_OBJECT_RE, r"\{(?:[^{}]|\{[^{}]*\})*\}")
}

fn greedy_object_re() -> Option<&'static Regex> {
    cached(&GREEDY_OBJECT_RE, r"(?s)\{.*\}")
}

/// 推理类前缀行：markdown 标题、`Step 3:`、`Reason:`、`Branch 1:` 等
fn commentary_re() -> Option<&'static Regex> {
    cached(
        &COMMENTARY_RE,
        r"(?i)^\s*(#{1,6}\s|(step|branch|agent)\s*\d+\s*[:.)]|(reason|evaluate|act|check|think|thought|work|observe|observation|optimize|root|select|coordinator|action)\s*:)",
    )
}

fn trailing_comma_re() -> Option<&'static Regex> {
    cached(&TRAILING_COMMA_RE, r",(\s*[}\]])")
}

fn doubled_quote_re() -> Option<&'static Regex> {
    cached(&DOUBLED_QUOTE_RE, r#"""([^"\n]+)"""#)
}

fn parse_object(text: &str) -> Option<Value> {
    serde_json::from_str::<Value>(text)
        .ok()
        .filter(Value::is_object)
}

/// 1. 直接解析：去空白后必须以 `{` 开头、`}` 结尾
pub fn direct_parse(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        parse_object(trimmed)
    } else {
        None
    }
}

/// 去掉开头的推理说明行与代码围栏标记；围栏内部内容保持原样
pub fn strip_commentary(text: &str) -> String {
    let is_fence = |line: &str| line.trim_start().starts_with("```");
    let is_commentary = |line: &str| commentary_re().is_some_and(|re| re.is_match(line));

    let mut leading = true;
    let mut kept = Vec::new();
    for line in text.lines() {
        if is_fence(line) {
            continue;
        }
        if leading {
            if line.trim().is_empty() || is_commentary(line) {
                continue;
            }
            leading = false;
        }
        kept.push(line);
    }
    kept.join("\n")
}

/// 清理后的正文：有代码围栏时取第一个围栏内容，否则去掉说明行
pub fn cleaned(text: &str) -> String {
    if let Some(inner) = fence_re()
        .and_then(|re| re.captures(text))
        .and_then(|caps| caps.get(1))
    {
        let inner = inner.as_str().trim();
        if !inner.is_empty() {
            return inner.to_string();
        }
    }
    strip_commentary(text)
}

/// 2. 去掉围栏与说明行后重新直接解析
pub fn fence_strip(text: &str) -> Option<Value> {
    direct_parse(&cleaned(text))
}

/// 从第一个 `{` 开始按深度计数找到与之匹配的 `}`；字符串字面量与转义字符不计入深度
pub fn balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// 3. 括号边界提取
pub fn brace_extraction(text: &str) -> Option<Value> {
    balanced_object(text).and_then(parse_object)
}

/// 4. 正则候选扫描：围栏块 → 一层嵌套对象 → 最外层贪婪匹配，依次尝试每个候选
pub fn regex_scan(text: &str) -> Option<Value> {
    if let Some(re) = fence_re() {
        for caps in re.captures_iter(text) {
            if let Some(found) = caps.get(1).and_then(|m| parse_object(m.as_str().trim())) {
                return Some(found);
            }
        }
    }
    if let Some(re) = nested_object_re() {
        for m in re.find_iter(text) {
            if let Some(found) = parse_object(m.as_str()) {
                return Some(found);
            }
        }
    }
    greedy_object_re()
        .and_then(|re| re.find(text))
        .and_then(|m| parse_object(m.as_str()))
}

/// 5. 备用语法：把清理后的正文当作 YAML 块映射解析。`{` / `[` 开头的流式写法不在此处理
pub fn alternate_syntax(text: &str) -> Option<Value> {
    let body = cleaned(text);
    let trimmed = body.trim_start();
    if trimmed.is_empty() || trimmed.starts_with('{') || trimmed.starts_with('[') {
        return None;
    }
    let doc: serde_yaml::Value = serde_yaml::from_str(&body).ok()?;
    if !doc.is_mapping() {
        return None;
    }
    // 非字符串键在这里转换失败
    serde_json::to_value(doc).ok().filter(Value::is_object)
}

/// 标点修复：还原 `\"`、合并 `""x""`、删除 `}` / `]` 前的多余逗号
pub fn repair_punctuation(text: &str) -> String {
    let mut out = text.replace("\\\"", "\"");
    if let Some(re) = doubled_quote_re() {
        out = re.replace_all(&out, "\"$1\"").into_owned();
    }
    if let Some(re) = trailing_comma_re() {
        out = re.replace_all(&out, "$1").into_owned();
    }
    out
}

/// 6. 修复后先整体直接解析，再对括号边界切片解析一次
pub fn punctuation_repair(text: &str) -> Option<Value> {
    let repaired = repair_punctuation(&cleaned(text));
    direct_parse(&repaired).or_else(|| brace_extraction(&repaired))
}

/// 按固定顺序尝试各策略，返回第一个结构上成功的结果
pub fn extract(text: &str) -> Option<(RecoveryStrategy, Value)> {
    extract_matching(text, |_| true)
}

/// 同 extract，但 `relevant` 拒绝的候选不算成功，继续尝试后面的策略
pub fn extract_matching(
    text: &str,
    relevant: impl Fn(&Value) -> bool,
) -> Option<(RecoveryStrategy, Value)> {
    const ORDER: [(RecoveryStrategy, fn(&str) -> Option<Value>); 6] = [
        (RecoveryStrategy::DirectParse, direct_parse),
        (RecoveryStrategy::FenceStrip, fence_strip),
        (RecoveryStrategy::BraceExtraction, brace_extraction),
        (RecoveryStrategy::RegexScan, regex_scan),
        (RecoveryStrategy::AlternateSyntax, alternate_syntax),
        (RecoveryStrategy::PunctuationRepair, punctuation_repair),
    ];

    if text.trim().is_empty() {
        return None;
    }
    for (strategy, attempt) in ORDER {
        match attempt(text) {
            Some(value) if relevant(&value) => {
                tracing::debug!(strategy = %strategy, "recovery strategy succeeded");
                return Some((strategy, value));
            }
            Some(_) => tracing::debug!(strategy = %strategy, "recovery strategy found an unrelated object"),
            None => tracing::debug!(strategy = %strategy, "recovery strategy found nothing"),
        }
    }
    None
}
