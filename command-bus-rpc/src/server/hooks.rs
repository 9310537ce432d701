//! 服务端扩展点
//!
//! - [`PrepareCommand`]：分发前按请求信息改写命令（例如从请求头注入调用者身份），
//!   同步闭包与异步实现均可；返回错误即拒绝本次请求；
//! - `on_command` / `on_result` / `on_error`：只观察，不改变处理流程。
//!
use crate::error::RpcError;
use async_trait::async_trait;
use axum::http::request::Parts;
use command_bus_core::{BusResult, Command, CommandOutput};
use std::sync::Arc;

#[async_trait]
pub trait PrepareCommand: Send + Sync + 'static {
    async fn prepare(&self, command: Command, request: &Parts) -> BusResult<Command>;
}

#[async_trait]
impl<F> PrepareCommand for F
where
    F: Fn(Command, &Parts) -> BusResult<Command> + Send + Sync + 'static,
{
    async fn prepare(&self, command: Command, request: &Parts) -> BusResult<Command> {
        (self)(command, request)
    }
}

pub type CommandHook = Arc<dyn Fn(&Command) + Send + Sync>;
pub type ResultHook = Arc<dyn Fn(&CommandOutput) + Send + Sync>;
pub type ErrorHook = Arc<dyn Fn(&RpcError) + Send + Sync>;
