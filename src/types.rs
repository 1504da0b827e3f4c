//! 通用调用值类型定义
//!
//! 连接池对后端操作的参数和返回值做统一表示，
//! 后端无关性由这里的 `Value` 枚举承担

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 通用调用值 - 跨后端的参数/结果表示
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// 空值
    Null,
    /// 布尔值
    Bool(bool),
    /// 整数
    Int(i64),
    /// 无符号整数
    UInt(u64),
    /// 浮点数
    Float(f64),
    /// 字符串
    String(String),
    /// 字节数组
    Bytes(Vec<u8>),
    /// JSON 值
    Json(serde_json::Value),
    /// 数组
    Array(Vec<Value>),
    /// 对象/文档
    Object(HashMap<String, Value>),
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::UInt(u) => write!(f, "{}", u),
            Value::Float(fl) => write!(f, "{}", fl),
            Value::String(s) => write!(f, "{}", s),
            Value::Bytes(bytes) => write!(f, "[{} bytes]", bytes.len()),
            Value::Json(json) => write!(f, "{}", json),
            Value::Array(arr) => {
                let json_str = serde_json::to_string(arr).unwrap_or_default();
                write!(f, "{}", json_str)
            }
            Value::Object(obj) => {
                let json_str = serde_json::to_string(obj).unwrap_or_default();
                write!(f, "{}", json_str)
            }
        }
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Debug 与 Display 保持一致，显示实际值而不是类型构造函数
        write!(f, "{}", self)
    }
}

impl Value {
    /// 获取数据类型名称
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::UInt(_) => "unsigned_integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Json(_) => "json",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    /// 判断是否为空值
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// 尝试取出字符串引用
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// 尝试取出整数
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::UInt(u) => i64::try_from(*u).ok(),
            _ => None,
        }
    }

    /// 尝试取出浮点数
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// 尝试取出布尔值
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::UInt(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

impl From<HashMap<String, Value>> for Value {
    fn from(v: HashMap<String, Value>) -> Self {
        Value::Object(v)
    }
}

/// 将 serde_json::Value 转换为调用值
pub fn json_value_to_value(json: serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else if let Some(u) = n.as_u64() {
                Value::UInt(u)
            } else {
                Value::Float(n.as_f64().unwrap_or_default())
            }
        }
        serde_json::Value::String(s) => Value::String(s),
        serde_json::Value::Array(arr) => {
            Value::Array(arr.into_iter().map(json_value_to_value).collect())
        }
        serde_json::Value::Object(obj) => Value::Object(
            obj.into_iter()
                .map(|(k, v)| (k, json_value_to_value(v)))
                .collect(),
        ),
    }
}

/// 构建位置参数列表的便捷宏
///
/// ```
/// use rat_connpool::{args, types::Value};
///
/// let a = args!["select 1", 42];
/// assert_eq!(a[1], Value::Int(42));
/// ```
#[macro_export]
macro_rules! args {
    () => { Vec::<$crate::types::Value>::new() };
    ($($v:expr),+ $(,)?) => {
        vec![$($crate::types::Value::from($v)),+]
    };
}

/// 构建命名参数映射的便捷宏
///
/// ```
/// use rat_connpool::{kwargs, types::Value};
///
/// let kw = kwargs!{"timeout_ms" => 500};
/// assert_eq!(kw.get("timeout_ms"), Some(&Value::Int(500)));
/// ```
#[macro_export]
macro_rules! kwargs {
    () => { std::collections::HashMap::<String, $crate::types::Value>::new() };
    ($($k:expr => $v:expr),+ $(,)?) => {{
        let mut map = std::collections::HashMap::new();
        $(map.insert($k.to_string(), $crate::types::Value::from($v));)+
        map
    }};
}
