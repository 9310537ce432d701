//! RPC 客户端
//!
//! 将命令发送到远端 [`RpcServer`](crate::server::RpcServer) 并还原结果：
//! - 结构化结果 → [`CommandOutput::Value`]；
//! - 流式结果 → [`CommandOutput::Stream`]（未消费，由调用方读取或丢弃）；
//! - 远端业务错误 → [`RpcError::Bus`]，保留远端错误名称与消息。
//!
//! 通过 [`RpcClient::as_runner`] 可替换进程内的 `CommandBus`。
//!
mod config;
mod middleware;
mod transport;

pub use config::RpcClientConfig;
pub use middleware::{ClientMiddleware, ClientNext, RpcContext, RpcRequest};

use crate::error::RpcError;
use async_trait::async_trait;
use command_bus_core::{
    BusError, BusResult, Command, CommandOutput, CommandRunner, JsonSerializer, Serializer,
};
use middleware::ClientChain;
use parking_lot::RwLock;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;
use transport::Transport;

pub struct RpcClient {
    config: RpcClientConfig,
    serializer: Arc<dyn Serializer>,
    http: RwLock<Option<reqwest::Client>>,
    middlewares: RwLock<ClientChain>,
}

impl RpcClient {
    pub fn new(config: RpcClientConfig) -> Result<Self, RpcError> {
        Self::with_serializer(config, Arc::new(JsonSerializer))
    }

    pub fn with_serializer(
        config: RpcClientConfig,
        serializer: Arc<dyn Serializer>,
    ) -> Result<Self, RpcError> {
        let http = config.build_http()?;
        Ok(Self {
            config,
            serializer,
            http: RwLock::new(Some(http)),
            middlewares: RwLock::default(),
        })
    }

    /// 以默认配置连接到给定地址
    pub fn connect(url: impl Into<String>) -> Result<Self, RpcError> {
        Self::new(RpcClientConfig::new(url))
    }

    pub fn config(&self) -> &RpcClientConfig {
        &self.config
    }

    /// 注册中间件：后注册者位于更外层（最先执行），传输步骤始终在最内层
    pub fn use_middleware<M>(&self, middleware: M) -> &Self
    where
        M: ClientMiddleware,
    {
        let mut chain = self.middlewares.write();
        Arc::make_mut(&mut chain).insert(0, Arc::new(middleware));
        self
    }

    /// 发送命令；`data` 仅在本次调用的中间件链中可见
    pub async fn handle(
        &self,
        command: Command,
        data: Map<String, Value>,
    ) -> Result<CommandOutput, RpcError> {
        let http = self.http.read().clone().ok_or(RpcError::Closed)?;
        let transport = Arc::new(Transport::new(http, self.serializer.clone()));
        let chain = self.middlewares.read().clone();

        let ctx = RpcContext {
            request: RpcRequest {
                url: self.config.url.clone(),
                headers: self.default_headers(),
                timeout: self.config.timeout,
            },
            command,
            data,
        };

        debug!(command = %ctx.command.name(), url = %ctx.request.url, "sending command");
        ClientNext::new(chain, transport).run(ctx).await
    }

    /// 释放连接池；可重复调用，之后的调用返回 [`RpcError::Closed`]
    pub fn close(&self) {
        if self.http.write().take().is_some() {
            debug!(url = %self.config.url, "rpc client closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.http.read().is_none()
    }

    pub fn as_runner(self: &Arc<Self>) -> Arc<dyn CommandRunner> {
        self.clone()
    }

    fn default_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(accept) = HeaderValue::from_str(self.serializer.content_type()) {
            headers.insert(ACCEPT, accept);
        }
        headers
    }
}

#[async_trait]
impl CommandRunner for RpcClient {
    async fn run(&self, command: Command) -> BusResult<CommandOutput> {
        self.handle(command, Map::new()).await.map_err(BusError::from)
    }
}
