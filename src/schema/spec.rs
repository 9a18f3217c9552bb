//! 字段级 schema 描述：严格校验（check）与尽力修正（coerce）
//!
//! SchemaSpec 与 types.rs 中的强类型结构一一对应：check 通过的 JSON 一定能反序列化为对应结构。
//! 兜底记录（default_record）也完全由这里的字段默认值推导，保证失败输出确定、可测试。

use std::fmt;

use serde_json::{Map, Value};

use crate::schema::types::AgentType;

/// 字段是否必填
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Required,
    Optional,
}

/// 字段类型
#[derive(Debug, Clone)]
pub enum FieldType {
    /// 字符串；non_empty 表示 trim 之后不能为空
    Text { non_empty: bool },
    Integer { min: i64, max: i64 },
    Number { min: f64, max: f64 },
    /// 枚举：取值必须在集合内
    Enum(&'static [&'static str]),
    /// 字符串数组，长度上限 max_items
    TextList { max_items: usize },
    /// string -> string 映射
    TextMap,
    /// 嵌套记录
    Object(Vec<FieldSpec>),
    /// 嵌套记录数组，长度上限 max_items
    RecordList { max_items: usize, fields: Vec<FieldSpec> },
}

/// 单个字段的声明
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: &'static str,
    pub requirement: Requirement,
    pub ty: FieldType,
    /// 兜底值；Null 表示没有默认值（字段缺省即不出现）。Object 类型的默认值由子字段推导
    pub default: Value,
}

impl FieldSpec {
    pub fn required(name: &'static str, ty: FieldType, default: Value) -> Self {
        Self {
            name,
            requirement: Requirement::Required,
            ty,
            default,
        }
    }

    /// 必填但没有默认值：只用于嵌套记录数组的元素，缺失时整条元素被丢弃
    pub fn required_no_default(name: &'static str, ty: FieldType) -> Self {
        Self::required(name, ty, Value::Null)
    }

    pub fn optional(name: &'static str, ty: FieldType) -> Self {
        Self {
            name,
            requirement: Requirement::Optional,
            ty,
            default: Value::Null,
        }
    }

    pub fn optional_with_default(name: &'static str, ty: FieldType, default: Value) -> Self {
        Self {
            name,
            requirement: Requirement::Optional,
            ty,
            default,
        }
    }

    pub fn is_required(&self) -> bool {
        self.requirement == Requirement::Required
    }

    /// 字段的兜底值；嵌套 Object 且必填时由子字段默认值递归构造
    pub fn default_value(&self) -> Value {
        match &self.ty {
            FieldType::Object(fields) if self.is_required() && self.default.is_null() => {
                default_fields(fields).map(Value::Object).unwrap_or(Value::Null)
            }
            _ => self.default.clone(),
        }
    }
}

/// 一条校验失败信息，path 形如 `upskilling[0].timeline_weeks`
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    pub path: String,
    pub message: String,
}

impl Violation {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// 某个 agent 的完整 schema
#[derive(Debug, Clone)]
pub struct SchemaSpec {
    pub agent: AgentType,
    pub fields: Vec<FieldSpec>,
}

impl SchemaSpec {
    pub fn new(agent: AgentType, fields: Vec<FieldSpec>) -> Self {
        Self { agent, fields }
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// 候选对象至少含有一个顶层字段
    pub fn recognizes(&self, value: &Value) -> bool {
        value.as_object().is_some_and(|obj| self.recognizes_keys(obj))
    }

    fn recognizes_keys(&self, obj: &Map<String, Value>) -> bool {
        self.fields.iter().any(|f| obj.contains_key(f.name))
    }

    /// 严格校验，返回全部违规项；空 Vec 表示通过
    pub fn check(&self, value: &Value) -> Vec<Violation> {
        let mut out = Vec::new();
        match value.as_object() {
            Some(obj) => check_fields(&self.fields, obj, "", &mut out),
            None => out.push(Violation::new("$", "expected an object")),
        }
        out
    }

    /// 尽力修正：缺失字段用默认值补齐、截断超长数组、枚举就近取值、数值夹到合法区间。
    /// 候选与 schema 没有任何同名字段时视为无法修正。
    pub fn coerce(&self, value: Value) -> Result<Value, Violation> {
        let obj = match value {
            Value::Object(map) => map,
            _ => return Err(Violation::new("$", "expected an object")),
        };
        if !self.recognizes_keys(&obj) {
            return Err(Violation::new("$", "no recognizable fields"));
        }
        coerce_fields(&self.fields, obj, "").map(Value::Object)
    }

    /// 由字段默认值构造的兜底记录
    pub fn default_record(&self) -> Value {
        default_fields(&self.fields)
            .map(Value::Object)
            .unwrap_or(Value::Null)
    }
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

fn default_fields(fields: &[FieldSpec]) -> Option<Map<String, Value>> {
    let mut out = Map::new();
    for field in fields {
        let default = field.default_value();
        if default.is_null() {
            if field.is_required() {
                return None;
            }
            continue;
        }
        out.insert(field.name.to_string(), default);
    }
    Some(out)
}

// ---------------------------------------------------------------------------
// check
// ---------------------------------------------------------------------------

fn check_fields(fields: &[FieldSpec], obj: &Map<String, Value>, prefix: &str, out: &mut Vec<Violation>) {
    for field in fields {
        let path = join_path(prefix, field.name);
        match obj.get(field.name) {
            None | Some(Value::Null) => {
                if field.is_required() {
                    out.push(Violation::new(path, "missing required field"));
                }
            }
            Some(value) => check_value(&field.ty, value, &path, out),
        }
    }
}

fn check_value(ty: &FieldType, value: &Value, path: &str, out: &mut Vec<Violation>) {
    match ty {
        FieldType::Text { non_empty } => match value.as_str() {
            Some(s) if *non_empty && s.trim().is_empty() => {
                out.push(Violation::new(path, "must not be empty"))
            }
            Some(_) => {}
            None => out.push(Violation::new(path, "expected a string")),
        },
        FieldType::Integer { min, max } => match value.as_i64() {
            Some(n) if n < *min || n > *max => {
                out.push(Violation::new(path, format!("{n} outside {min}..={max}")))
            }
            Some(_) => {}
            None => out.push(Violation::new(path, "expected an integer")),
        },
        FieldType::Number { min, max } => match value.as_f64() {
            Some(n) if n < *min || n > *max => {
                out.push(Violation::new(path, format!("{n} outside {min}..={max}")))
            }
            Some(_) => {}
            None => out.push(Violation::new(path, "expected a number")),
        },
        FieldType::Enum(values) => match value.as_str() {
            Some(s) if values.contains(&s) => {}
            Some(s) => out.push(Violation::new(path, format!("'{s}' not one of {values:?}"))),
            None => out.push(Violation::new(path, "expected an enum string")),
        },
        FieldType::TextList { max_items } => match value.as_array() {
            Some(items) => {
                if items.len() > *max_items {
                    out.push(Violation::new(path, format!("more than {max_items} items")));
                }
                if items.iter().any(|v| !v.is_string()) {
                    out.push(Violation::new(path, "expected only strings"));
                }
            }
            None => out.push(Violation::new(path, "expected an array")),
        },
        FieldType::TextMap => match value.as_object() {
            Some(map) if map.values().all(Value::is_string) => {}
            Some(_) => out.push(Violation::new(path, "expected only string values")),
            None => out.push(Violation::new(path, "expected an object")),
        },
        FieldType::Object(fields) => match value.as_object() {
            Some(obj) => check_fields(fields, obj, path, out),
            None => out.push(Violation::new(path, "expected an object")),
        },
        FieldType::RecordList { max_items, fields } => match value.as_array() {
            Some(items) => {
                if items.len() > *max_items {
                    out.push(Violation::new(path, format!("more than {max_items} items")));
                }
                for (i, item) in items.iter().enumerate() {
                    let item_path = format!("{path}[{i}]");
                    match item.as_object() {
                        Some(obj) => check_fields(fields, obj, &item_path, out),
                        None => out.push(Violation::new(item_path, "expected an object")),
                    }
                }
            }
            None => out.push(Violation::new(path, "expected an array")),
        },
    }
}

// ---------------------------------------------------------------------------
// coerce
// ---------------------------------------------------------------------------

fn coerce_fields(
    fields: &[FieldSpec],
    mut obj: Map<String, Value>,
    prefix: &str,
) -> Result<Map<String, Value>, Violation> {
    let mut out = Map::new();
    for field in fields {
        let path = join_path(prefix, field.name);
        let coerced = match obj.remove(field.name) {
            None | Some(Value::Null) => None,
            Some(value) => coerce_value(&field.ty, value, &path).ok(),
        };
        match coerced {
            Some(value) => {
                out.insert(field.name.to_string(), value);
            }
            None => {
                let default = field.default_value();
                if !default.is_null() {
                    out.insert(field.name.to_string(), default);
                } else if field.is_required() {
                    return Err(Violation::new(path, "missing required field without default"));
                }
            }
        }
    }
    Ok(out)
}

fn coerce_value(ty: &FieldType, value: Value, path: &str) -> Result<Value, Violation> {
    match ty {
        FieldType::Text { non_empty } => {
            let text = scalar_to_text(&value)
                .ok_or_else(|| Violation::new(path, "cannot convert to string"))?;
            if *non_empty && text.is_empty() {
                return Err(Violation::new(path, "must not be empty"));
            }
            Ok(Value::String(text))
        }
        FieldType::Integer { min, max } => {
            let n = match &value {
                Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
                Value::String(s) => first_number(s).map(|f| f.round() as i64),
                _ => None,
            }
            .ok_or_else(|| Violation::new(path, "cannot convert to integer"))?;
            Ok(Value::from(n.clamp(*min, *max)))
        }
        FieldType::Number { min, max } => {
            let n = match &value {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => first_number(s),
                _ => None,
            }
            .filter(|f| f.is_finite())
            .ok_or_else(|| Violation::new(path, "cannot convert to number"))?;
            serde_json::Number::from_f64(n.clamp(*min, *max))
                .map(Value::Number)
                .ok_or_else(|| Violation::new(path, "cannot convert to number"))
        }
        FieldType::Enum(values) => {
            let raw = scalar_to_text(&value)
                .ok_or_else(|| Violation::new(path, "cannot convert to enum"))?;
            nearest_enum(&raw, values)
                .map(|v| Value::String(v.to_string()))
                .ok_or_else(|| Violation::new(path, "empty enum"))
        }
        FieldType::TextList { max_items } => {
            let mut items: Vec<Value> = match value {
                Value::Array(items) => items
                    .iter()
                    .filter_map(scalar_to_text)
                    .filter(|s| !s.is_empty())
                    .map(Value::String)
                    .collect(),
                Value::String(s) => s
                    .split([',', ';', '\n'])
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| Value::String(s.to_string()))
                    .collect(),
                _ => return Err(Violation::new(path, "cannot convert to list")),
            };
            items.truncate(*max_items);
            Ok(Value::Array(items))
        }
        FieldType::TextMap => match value {
            Value::Object(map) => Ok(Value::Object(
                map.into_iter()
                    .filter_map(|(k, v)| scalar_to_text(&v).map(|s| (k, Value::String(s))))
                    .collect(),
            )),
            _ => Err(Violation::new(path, "cannot convert to map")),
        },
        FieldType::Object(fields) => match value {
            Value::Object(obj) => coerce_fields(fields, obj, path).map(Value::Object),
            _ => Err(Violation::new(path, "cannot convert to object")),
        },
        FieldType::RecordList { max_items, fields } => {
            let items = match value {
                Value::Array(items) => items,
                single @ Value::Object(_) => vec![single],
                _ => return Err(Violation::new(path, "cannot convert to list")),
            };
            let mut records: Vec<Value> = items
                .into_iter()
                .enumerate()
                .filter_map(|(i, item)| match item {
                    Value::Object(obj) => coerce_fields(fields, obj, &format!("{path}[{i}]"))
                        .ok()
                        .map(Value::Object),
                    _ => None,
                })
                .collect();
            records.truncate(*max_items);
            Ok(Value::Array(records))
        }
    }
}

/// 标量转字符串（去首尾空白）；数组/对象返回 None
fn scalar_to_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// 从文本中取出第一个数字，如 "about 6 weeks" -> 6.0
fn first_number(s: &str) -> Option<f64> {
    let start = s.find(|c: char| c.is_ascii_digit())?;
    let negative = s[..start].ends_with('-');
    let digits: String = s[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let n: f64 = digits.trim_end_matches('.').parse().ok()?;
    Some(if negative { -n } else { n })
}

fn normalize_enum(s: &str) -> String {
    s.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect()
}

/// 枚举就近取值：规范化后精确匹配 → 包含关系 → 最小编辑距离
pub fn nearest_enum(raw: &str, values: &'static [&'static str]) -> Option<&'static str> {
    let norm = normalize_enum(raw);
    if let Some(v) = values.iter().copied().find(|v| *v == norm) {
        return Some(v);
    }
    if !norm.is_empty() {
        if let Some(v) = values
            .iter()
            .copied()
            .find(|v| norm.contains(*v) || v.contains(norm.as_str()))
        {
            return Some(v);
        }
    }
    values
        .iter()
        .min_by_key(|v| edit_distance(&norm, v))
        .copied()
}

fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.chars().enumerate() {
        let mut cur = vec![i + 1; b.len() + 1];
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            cur[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(cur[j] + 1);
        }
        prev = cur;
    }
    prev[b.len()]
}
