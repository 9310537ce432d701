//! 命令执行结果（CommandOutput）
//!
//! 处理器返回结构化值或二进制流二者之一；流式结果在 RPC 中以
//! `application/octet-stream` 原样透传，不做缓冲。
//!
use crate::error::BusResult;
use crate::stream::ByteStream;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

#[derive(Debug)]
pub enum CommandOutput {
    Value(Value),
    Stream(ByteStream),
}

impl CommandOutput {
    /// 序列化任意值作为结果
    pub fn json<T: Serialize + ?Sized>(value: &T) -> BusResult<Self> {
        Ok(Self::Value(serde_json::to_value(value)?))
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, Self::Stream(_))
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(v) => Some(v),
            Self::Stream(_) => None,
        }
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            Self::Value(v) => Some(v),
            Self::Stream(_) => None,
        }
    }

    pub fn into_stream(self) -> Option<ByteStream> {
        match self {
            Self::Stream(s) => Some(s),
            Self::Value(_) => None,
        }
    }

    /// 将结构化结果解析为强类型；流式结果返回 `None`
    pub fn parse<T: DeserializeOwned>(self) -> BusResult<Option<T>> {
        match self {
            Self::Value(v) => Ok(Some(serde_json::from_value(v)?)),
            Self::Stream(_) => Ok(None),
        }
    }
}

impl From<Value> for CommandOutput {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<ByteStream> for CommandOutput {
    fn from(stream: ByteStream) -> Self {
        Self::Stream(stream)
    }
}

impl From<()> for CommandOutput {
    fn from(_: ()) -> Self {
        Self::Value(Value::Null)
    }
}
