//! 命令（Command）
//!
//! 以名称标识的不可变意图值：`{ command: <name>, ...额外字段 }`，可附带若干二进制附件。
//! - 名称必须为非空字符串；
//! - 构造完成后不暴露任何修改方法，需要“补充信息”时通过 [`Command::into_builder`] 生成新值；
//! - 附件与普通字段分开存放，线上传输时附件走 multipart 文件分片。
//!
use crate::error::{BusError, BusResult};
use crate::stream::ByteStream;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// 命令名称字段（保留字段）
pub const COMMAND_FIELD: &str = "command";

#[derive(Debug)]
pub struct Command {
    name: String,
    fields: Map<String, Value>,
    attachments: BTreeMap<String, ByteStream>,
}

/// 命令拆解后的各部分，便于编解码层按需重组
#[derive(Debug)]
pub struct CommandParts {
    pub name: String,
    pub fields: Map<String, Value>,
    pub attachments: BTreeMap<String, ByteStream>,
}

impl Command {
    /// 仅含名称的命令
    pub fn new(name: impl Into<String>) -> BusResult<Self> {
        Self::builder(name).build()
    }

    pub fn builder(name: impl Into<String>) -> CommandBuilder {
        CommandBuilder {
            name: name.into(),
            fields: Map::new(),
            attachments: BTreeMap::new(),
        }
    }

    /// 以名称 + 任意可序列化的额外数据创建命令
    ///
    /// `extra` 必须序列化为对象或 `null`；其中不得包含保留的 `command` 键。
    pub fn create<T>(name: impl Into<String>, extra: &T) -> BusResult<Self>
    where
        T: Serialize + ?Sized,
    {
        let mut builder = Self::builder(name);
        match serde_json::to_value(extra)? {
            Value::Null => {}
            Value::Object(map) => builder.fields = map,
            other => {
                return Err(BusError::invalid_command(format!(
                    "extra command data must be an object, got {}",
                    json_type_name(&other)
                )));
            }
        }
        builder.build()
    }

    /// 从结构化值还原命令：必须是对象，且 `command` 为非空字符串
    pub fn from_value(value: Value) -> BusResult<Self> {
        let mut map = match value {
            Value::Object(map) => map,
            other => {
                return Err(BusError::invalid_command(format!(
                    "expected an object, got {}",
                    json_type_name(&other)
                )));
            }
        };
        let name = match map.remove(COMMAND_FIELD) {
            Some(Value::String(name)) => name,
            Some(_) => {
                return Err(BusError::invalid_command("`command` must be a string"));
            }
            None => return Err(BusError::invalid_command("missing `command` field")),
        };
        Self::from_parts(name, map, BTreeMap::new())
    }

    pub fn from_parts(
        name: impl Into<String>,
        fields: Map<String, Value>,
        attachments: BTreeMap<String, ByteStream>,
    ) -> BusResult<Self> {
        CommandBuilder {
            name: name.into(),
            fields,
            attachments,
        }
        .build()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 读取额外字段（名称通过 [`name`](Self::name) 读取）
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn has_attachments(&self) -> bool {
        !self.attachments.is_empty()
    }

    pub fn attachment_names(&self) -> impl Iterator<Item = &str> {
        self.attachments.keys().map(String::as_str)
    }

    /// 普通字段部分（不含附件）的结构化表示，即线上 JSON 形态
    pub fn to_value(&self) -> Value {
        let mut map = Map::with_capacity(self.fields.len() + 1);
        map.insert(COMMAND_FIELD.to_string(), Value::String(self.name.clone()));
        for (k, v) in &self.fields {
            map.insert(k.clone(), v.clone());
        }
        Value::Object(map)
    }

    /// 将额外字段解析为强类型结构
    pub fn parse<T: DeserializeOwned>(&self) -> BusResult<T> {
        Ok(serde_json::from_value(Value::Object(self.fields.clone()))?)
    }

    pub fn into_parts(self) -> CommandParts {
        CommandParts {
            name: self.name,
            fields: self.fields,
            attachments: self.attachments,
        }
    }

    /// 分离附件：返回不含附件的命令与附件表
    pub fn take_attachments(self) -> (Command, BTreeMap<String, ByteStream>) {
        let Command {
            name,
            fields,
            attachments,
        } = self;
        (
            Command {
                name,
                fields,
                attachments: BTreeMap::new(),
            },
            attachments,
        )
    }

    /// 以当前命令为起点构造新命令（原值被消费）
    pub fn into_builder(self) -> CommandBuilder {
        CommandBuilder {
            name: self.name,
            fields: self.fields,
            attachments: self.attachments,
        }
    }
}

#[derive(Debug)]
pub struct CommandBuilder {
    name: String,
    fields: Map<String, Value>,
    attachments: BTreeMap<String, ByteStream>,
}

impl CommandBuilder {
    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn attachment(mut self, key: impl Into<String>, stream: impl Into<ByteStream>) -> Self {
        self.attachments.insert(key.into(), stream.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn build(self) -> BusResult<Command> {
        if self.name.is_empty() {
            return Err(BusError::invalid_command("command name must not be empty"));
        }
        if self.fields.contains_key(COMMAND_FIELD) || self.attachments.contains_key(COMMAND_FIELD)
        {
            return Err(BusError::invalid_command(
                "`command` is reserved for the command name",
            ));
        }
        if let Some(key) = self.attachments.keys().find(|k| self.fields.contains_key(*k)) {
            return Err(BusError::invalid_command(format!(
                "`{key}` is used both as a field and as an attachment"
            )));
        }
        Ok(Command {
            name: self.name,
            fields: self.fields,
            attachments: self.attachments,
        })
    }
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
