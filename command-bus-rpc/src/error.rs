use command_bus_core::{BusError, CommandError};
use thiserror::Error;

/// RPC 错误
///
/// 传输层失败（`is_transport`）与远端业务拒绝（`Bus`）严格区分，
/// 后者保持远端报告的错误名称与消息。
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum RpcError {
    #[error(transparent)]
    Bus(#[from] BusError),

    #[cfg(feature = "client")]
    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid response status: {status}")]
    Status { status: u16 },

    #[error("unsupported content-type: {content_type}")]
    UnsupportedContentType { content_type: String },

    #[error("Missing body for command")]
    MissingBody,

    #[error("Cannot deserialize body: {reason}")]
    Decode { reason: String },

    #[error(
        "Request body does not look like a command object. Make sure you have sent proper command object: {reason}"
    )]
    NotACommand { reason: String },

    #[error("multipart error: {reason}")]
    Multipart { reason: String },

    #[error("rpc client closed")]
    Closed,
}

impl RpcError {
    pub const SERVER_ERROR: &'static str = "RpcServerError";

    pub fn decode(reason: impl ToString) -> Self {
        Self::Decode {
            reason: reason.to_string(),
        }
    }

    pub fn multipart(reason: impl Into<String>) -> Self {
        Self::Multipart {
            reason: reason.into(),
        }
    }

    pub fn unsupported(content_type: impl Into<String>) -> Self {
        Self::UnsupportedContentType {
            content_type: content_type.into(),
        }
    }

    /// 是否为传输层失败（连接、状态码、响应格式、客户端已关闭）
    pub fn is_transport(&self) -> bool {
        match self {
            Self::Bus(e) => matches!(e, BusError::Transport { .. }),
            #[cfg(feature = "client")]
            Self::Http(_) => true,
            Self::Status { .. } | Self::UnsupportedContentType { .. } | Self::Decode { .. } => true,
            Self::Closed => true,
            Self::MissingBody | Self::NotACommand { .. } | Self::Multipart { .. } => false,
        }
    }

    /// 线上错误负载：总线错误保持原名，请求校验失败统一命名为 `RpcServerError`
    pub fn to_command_error(&self) -> CommandError {
        match self {
            Self::Bus(e) => CommandError::from(e),
            other => CommandError::named(Self::SERVER_ERROR, other.to_string()),
        }
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        Self::Bus(BusError::from(err))
    }
}

impl From<CommandError> for RpcError {
    fn from(err: CommandError) -> Self {
        Self::Bus(err.into_bus_error())
    }
}

/// 经由 `CommandRunner` 观察时：业务错误原样保留，其余折叠为传输错误
impl From<RpcError> for BusError {
    fn from(err: RpcError) -> Self {
        match err {
            RpcError::Bus(e) => e,
            other => BusError::transport(other.to_string()),
        }
    }
}
