//! 命令总线统一错误定义
//!
//! 按发生阶段区分：注册期（非法谓词）、构造期（非法命令）、分发期（未注册处理器）、
//! 业务期（处理器返回的错误）以及跨进程传输期（RPC）。
//! 业务错误以 [`CommandError`] 表示，可序列化后跨网络还原。
//!
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use thiserror::Error;

/// 统一错误类型
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum BusError {
    // --- 注册/构造 ---
    #[error("invalid predicate: {reason}")]
    InvalidPredicate { reason: String },
    #[error("invalid command: {reason}")]
    InvalidCommand { reason: String },

    // --- 分发 ---
    #[error("No command handler registered for command: {command}")]
    HandlerNotFound { command: String },

    // --- 业务 ---
    #[error(transparent)]
    Command(#[from] CommandError),

    // --- 传输 ---
    #[error("transport error: {reason}")]
    Transport { reason: String },

    // --- 序列化 ---
    #[error("serialization error: {source}")]
    Serde {
        #[from]
        source: serde_json::Error,
    },
}

/// 统一 Result 类型别名
pub type BusResult<T> = Result<T, BusError>;

impl BusError {
    pub fn invalid_predicate(reason: impl Into<String>) -> Self {
        Self::InvalidPredicate {
            reason: reason.into(),
        }
    }

    pub fn invalid_command(reason: impl Into<String>) -> Self {
        Self::InvalidCommand {
            reason: reason.into(),
        }
    }

    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }

    /// 是否为处理器（或远端处理器）返回的业务错误
    pub fn is_business(&self) -> bool {
        matches!(self, Self::Command(_))
    }

    /// 是否为分发期“未注册处理器”错误（配置错误，而非业务错误）
    pub fn is_unregistered(&self) -> bool {
        matches!(self, Self::HandlerNotFound { .. })
    }
}

/// 业务错误（可跨进程传递）
///
/// 线上格式：`{ "name": "...", "message": "...", "data": ... }`，`data` 可省略。
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{name}: {message}")]
pub struct CommandError {
    name: String,
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandError {
    /// 通用错误名
    pub const GENERIC: &'static str = "Error";
    pub const HANDLER_NOT_FOUND: &'static str = "CommandHandlerNotFound";
    pub const INVALID_PREDICATE: &'static str = "InvalidPredicate";
    pub const INVALID_COMMAND: &'static str = "InvalidCommand";
    pub const TRANSPORT: &'static str = "TransportError";
    pub const SERIALIZATION: &'static str = "SerializationError";

    /// 以通用错误名 `Error` 创建
    pub fn new(message: impl Into<String>) -> Self {
        Self::named(Self::GENERIC, message)
    }

    pub fn named(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    /// 从任意（可能是外部系统产生的）错误负载还原
    ///
    /// 非对象或缺少 `message` 时，整个负载作为消息文本保留。
    pub fn from_payload(payload: Value) -> Self {
        match serde_json::from_value::<CommandError>(payload.clone()) {
            Ok(err) => err,
            Err(_) => match payload {
                Value::String(message) => Self::new(message),
                Value::Object(map) => Self::from_loose_object(map),
                other => Self::new(other.to_string()),
            },
        }
    }

    fn from_loose_object(map: Map<String, Value>) -> Self {
        let name = map
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or(Self::GENERIC)
            .to_string();
        let message = map
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| Value::Object(map.clone()).to_string());
        Self {
            name,
            message,
            data: None,
        }
    }

    /// 还原为 [`BusError`]：远端的“未注册处理器”错误还原为同类错误，其余均为业务错误
    pub fn into_bus_error(self) -> BusError {
        if self.name == Self::HANDLER_NOT_FOUND {
            if let Some(command) = self
                .data
                .as_ref()
                .and_then(|d| d.get("command"))
                .and_then(Value::as_str)
            {
                return BusError::HandlerNotFound {
                    command: command.to_string(),
                };
            }
        }
        BusError::Command(self)
    }
}

impl From<&BusError> for CommandError {
    fn from(err: &BusError) -> Self {
        match err {
            BusError::Command(e) => e.clone(),
            BusError::HandlerNotFound { command } => {
                CommandError::named(CommandError::HANDLER_NOT_FOUND, err.to_string())
                    .with_data(json!({ "command": command }))
            }
            BusError::InvalidPredicate { .. } => {
                CommandError::named(CommandError::INVALID_PREDICATE, err.to_string())
            }
            BusError::InvalidCommand { .. } => {
                CommandError::named(CommandError::INVALID_COMMAND, err.to_string())
            }
            BusError::Transport { .. } => {
                CommandError::named(CommandError::TRANSPORT, err.to_string())
            }
            BusError::Serde { .. } => {
                CommandError::named(CommandError::SERIALIZATION, err.to_string())
            }
        }
    }
}
