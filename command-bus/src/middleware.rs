//! 中间件（Middleware）
//!
//! 包裹命令分发过程的责任链节点：
//! - 调用 `next.run(command)` 继续向内层推进，最内层为处理器执行；
//! - 不调用 `next` 即否决本次分发，自身返回值成为最终结果；
//! - `Next` 以值传递并在调用时被消费，因此同一次调用中无法重复推进。
//!
//! 每次分发都基于注册列表的快照构造新的 `Next`，链上位置由 `Next` 自身携带，
//! 并发分发之间不存在共享游标。
//!
use crate::descriptor::CommandHandlerDescriptor;
use async_trait::async_trait;
use command_bus_core::{BusError, BusResult, Command, CommandOutput};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

pub(crate) type MiddlewareChain = Arc<Vec<Arc<dyn Middleware>>>;
pub(crate) type HandlerTable = Arc<Vec<CommandHandlerDescriptor>>;

#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    async fn handle(&self, command: Command, next: Next) -> BusResult<CommandOutput>;
}

#[async_trait]
impl<F, Fut> Middleware for F
where
    F: Fn(Command, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = BusResult<CommandOutput>> + Send + 'static,
{
    async fn handle(&self, command: Command, next: Next) -> BusResult<CommandOutput> {
        (self)(command, next).await
    }
}

/// 指向链上下一环的续延
pub struct Next {
    chain: MiddlewareChain,
    index: usize,
    handlers: HandlerTable,
}

impl Next {
    pub(crate) fn new(chain: MiddlewareChain, handlers: HandlerTable) -> Self {
        Self {
            chain,
            index: 0,
            handlers,
        }
    }

    pub async fn run(self, command: Command) -> BusResult<CommandOutput> {
        let Next {
            chain,
            index,
            handlers,
        } = self;

        match chain.get(index).cloned() {
            Some(middleware) => {
                let next = Next {
                    chain,
                    index: index + 1,
                    handlers,
                };
                middleware.handle(command, next).await
            }
            None => run_handler(&handlers, command).await,
        }
    }
}

pub(crate) fn resolve<'a>(
    handlers: &'a [CommandHandlerDescriptor],
    command: &Command,
) -> Option<&'a CommandHandlerDescriptor> {
    handlers.iter().find(|d| d.matches(command))
}

async fn run_handler(handlers: &[CommandHandlerDescriptor], command: Command) -> BusResult<CommandOutput> {
    let Some(descriptor) = resolve(handlers, &command).cloned() else {
        warn!(command = %command.name(), "no command handler registered");
        return Err(BusError::HandlerNotFound {
            command: command.name().to_string(),
        });
    };

    debug!(command = %command.name(), "running command handler");
    descriptor.call(command).await
}
