//! 客户端中间件
//!
//! 每次调用构造一个 [`RpcContext`]，沿中间件链按值传递；
//! 中间件可以改写请求（地址、请求头、超时）、替换命令，或不调用 `next` 直接返回。
//! 内置传输步骤始终位于链的最内层。
//!
use super::transport::Transport;
use crate::error::RpcError;
use async_trait::async_trait;
use command_bus_core::{Command, CommandOutput};
use reqwest::header::HeaderMap;
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub(crate) type ClientChain = Arc<Vec<Arc<dyn ClientMiddleware>>>;

/// 即将发出的 HTTP 请求描述
#[derive(Clone, Debug)]
pub struct RpcRequest {
    pub url: String,
    pub headers: HeaderMap,
    pub timeout: Option<Duration>,
}

/// 单次调用的上下文
#[derive(Debug)]
pub struct RpcContext {
    pub request: RpcRequest,
    pub command: Command,
    /// 调用方附带的任意数据，仅供中间件读取，不会发送到服务端
    pub data: Map<String, Value>,
}

#[async_trait]
pub trait ClientMiddleware: Send + Sync + 'static {
    async fn handle(&self, ctx: RpcContext, next: ClientNext) -> Result<CommandOutput, RpcError>;
}

#[async_trait]
impl<F, Fut> ClientMiddleware for F
where
    F: Fn(RpcContext, ClientNext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<CommandOutput, RpcError>> + Send + 'static,
{
    async fn handle(&self, ctx: RpcContext, next: ClientNext) -> Result<CommandOutput, RpcError> {
        (self)(ctx, next).await
    }
}

/// 指向链上下一环的续延，调用即消费
pub struct ClientNext {
    chain: ClientChain,
    index: usize,
    transport: Arc<Transport>,
}

impl ClientNext {
    pub(crate) fn new(chain: ClientChain, transport: Arc<Transport>) -> Self {
        Self {
            chain,
            index: 0,
            transport,
        }
    }

    pub async fn run(self, ctx: RpcContext) -> Result<CommandOutput, RpcError> {
        let ClientNext {
            chain,
            index,
            transport,
        } = self;

        match chain.get(index).cloned() {
            Some(middleware) => {
                let next = ClientNext {
                    chain,
                    index: index + 1,
                    transport,
                };
                middleware.handle(ctx, next).await
            }
            None => transport.send(ctx).await,
        }
    }
}
