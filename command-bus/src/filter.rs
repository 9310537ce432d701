//! 处理器过滤条件（Filter）
//!
//! 注册处理器时用来描述“处理哪些命令”，统一转换为谓词 [`Predicate`]：
//! - `ByName`：命令名称完全相等；
//! - `ByShape`：结构化部分匹配，过滤对象中的每个键都必须在命令中存在且相等，
//!   命令可以带有过滤对象之外的字段；嵌套对象同样按部分匹配比较；
//! - `ByPredicate`：自定义谓词；
//! - `ByType`：具名命令类型（[`ShapeCommand`]），按其固定名称匹配。
//!
//! 从松散的 JSON 值构造过滤条件时（字符串 → 名称，对象 → 形状），其余类型在注册阶段立即报错。
//!
use command_bus_core::{BusError, BusResult, COMMAND_FIELD, Command, ShapeCommand};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

pub type Predicate = Arc<dyn Fn(&Command) -> bool + Send + Sync>;

#[derive(Clone)]
pub enum Filter {
    ByName(String),
    ByShape(Map<String, Value>),
    ByPredicate(Predicate),
    ByType(&'static str),
}

impl Filter {
    pub fn name(name: impl Into<String>) -> Self {
        Self::ByName(name.into())
    }

    pub fn shape(shape: Map<String, Value>) -> Self {
        Self::ByShape(shape)
    }

    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&Command) -> bool + Send + Sync + 'static,
    {
        Self::ByPredicate(Arc::new(f))
    }

    pub fn of_type<C: ShapeCommand>() -> Self {
        Self::ByType(C::COMMAND_NAME)
    }

    /// 从松散值构造：字符串 → 名称匹配，对象 → 形状匹配，其它类型报错
    pub fn from_value(value: Value) -> BusResult<Self> {
        match value {
            Value::String(name) => Ok(Self::ByName(name)),
            Value::Object(shape) => Ok(Self::ByShape(shape)),
            other => Err(BusError::invalid_predicate(format!(
                "command predicate has to be a function, a string or an object, got `{other}`"
            ))),
        }
    }

    pub fn matches(&self, command: &Command) -> bool {
        match self {
            Self::ByName(name) => command.name() == name,
            Self::ByType(name) => command.name() == *name,
            Self::ByShape(shape) => matches_shape(shape, command),
            Self::ByPredicate(f) => f(command),
        }
    }

    pub fn into_predicate(self) -> Predicate {
        match self {
            Self::ByPredicate(f) => f,
            other => {
                let predicate: Predicate = Arc::new(move |command: &Command| other.matches(command));
                predicate
            }
        }
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ByName(name) => f.debug_tuple("ByName").field(name).finish(),
            Self::ByShape(shape) => f.debug_tuple("ByShape").field(shape).finish(),
            Self::ByPredicate(_) => f.write_str("ByPredicate(..)"),
            Self::ByType(name) => f.debug_tuple("ByType").field(name).finish(),
        }
    }
}

/// 可转换为 [`Filter`] 的注册参数
pub trait IntoFilter {
    fn into_filter(self) -> BusResult<Filter>;
}

impl IntoFilter for Filter {
    fn into_filter(self) -> BusResult<Filter> {
        Ok(self)
    }
}

impl IntoFilter for &str {
    fn into_filter(self) -> BusResult<Filter> {
        Ok(Filter::ByName(self.to_string()))
    }
}

impl IntoFilter for String {
    fn into_filter(self) -> BusResult<Filter> {
        Ok(Filter::ByName(self))
    }
}

impl IntoFilter for Value {
    fn into_filter(self) -> BusResult<Filter> {
        Filter::from_value(self)
    }
}

impl IntoFilter for Map<String, Value> {
    fn into_filter(self) -> BusResult<Filter> {
        Ok(Filter::ByShape(self))
    }
}

fn matches_shape(shape: &Map<String, Value>, command: &Command) -> bool {
    shape.iter().all(|(key, expected)| {
        if key == COMMAND_FIELD {
            return expected.as_str() == Some(command.name());
        }
        command
            .get(key)
            .is_some_and(|actual| is_partial_match(expected, actual))
    })
}

fn is_partial_match(expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::Object(expected), Value::Object(actual)) => expected.iter().all(|(k, v)| {
            actual
                .get(k)
                .is_some_and(|inner| is_partial_match(v, inner))
        }),
        // 整数与浮点按数值比较：`1` 与 `1.0` 视为相同
        (Value::Number(e), Value::Number(a)) => {
            e == a || e.as_f64().zip(a.as_f64()).is_some_and(|(e, a)| e == a)
        }
        _ => expected == actual,
    }
}
