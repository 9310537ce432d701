//! 序列化器（Serializer）协议
//!
//! RPC 两端共用的编解码约定：
//! - `normalize` / `denormalize`：对象图层面的转换（例如把自定义类型编码为带类型标签的对象），
//!   宿主框架已预先解析 JSON 时只需 `denormalize`；
//! - `serialize` / `deserialize`：在对象图转换之上完成文本编码，默认使用 JSON。
//!
use crate::error::BusResult;
use serde_json::Value;

pub const APPLICATION_JSON: &str = "application/json";

pub trait Serializer: Send + Sync + 'static {
    /// 线上内容类型
    fn content_type(&self) -> &str {
        APPLICATION_JSON
    }

    fn normalize(&self, value: Value) -> BusResult<Value> {
        Ok(value)
    }

    fn denormalize(&self, value: Value) -> BusResult<Value> {
        Ok(value)
    }

    fn serialize(&self, value: &Value) -> BusResult<String> {
        let normalized = self.normalize(value.clone())?;
        Ok(serde_json::to_string(&normalized)?)
    }

    fn deserialize(&self, raw: &[u8]) -> BusResult<Value> {
        let parsed: Value = serde_json::from_slice(raw)?;
        self.denormalize(parsed)
    }
}

/// 默认实现：纯 JSON，对象图不做转换
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {}
