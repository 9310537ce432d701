//! 强类型命令处理器与处理器提供者
//!
//! - [`CommandHandler`]：针对某个具名命令类型的处理器，总线负责把 [`Command`] 解析为具体类型；
//! - [`CommandHandlerProvider`]：一次性提供多条处理器描述的对象，由应用在启动时显式注册，
//!   取代基于反射/注解的自动发现。
//!
//! [`Command`]: command_bus_core::Command
use crate::descriptor::CommandHandlerDescriptor;
use async_trait::async_trait;
use command_bus_core::{BusResult, CommandOutput, ShapeCommand};
use std::sync::Arc;

#[async_trait]
pub trait CommandHandler<C>: Send + Sync
where
    C: ShapeCommand,
{
    async fn handle(&self, cmd: C) -> BusResult<CommandOutput>;
}

pub trait CommandHandlerProvider: Send + Sync + 'static {
    /// 返回的描述按顺序注册
    fn command_handlers(self: Arc<Self>) -> Vec<CommandHandlerDescriptor>;
}
