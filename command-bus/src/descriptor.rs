//! 处理器描述（CommandHandlerDescriptor）
//!
//! `{ predicate, func }` 二元组，创建后不可变，克隆开销仅为两个 `Arc`。
//! 总线按注册顺序保存描述，首个谓词命中的描述胜出。
//!
use crate::filter::{IntoFilter, Predicate};
use command_bus_core::{BusResult, Command, CommandOutput};
use futures_core::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

pub type HandlerFuture = BoxFuture<'static, BusResult<CommandOutput>>;

pub type HandlerFn = Arc<dyn Fn(Command) -> HandlerFuture + Send + Sync>;

#[derive(Clone)]
pub struct CommandHandlerDescriptor {
    predicate: Predicate,
    func: HandlerFn,
}

impl CommandHandlerDescriptor {
    pub fn new(predicate: Predicate, func: HandlerFn) -> Self {
        Self { predicate, func }
    }

    /// 由过滤条件与处理函数构造；过滤条件非法时立即返回错误
    pub fn from_filter<F, H, Fut, O>(filter: F, handler: H) -> BusResult<Self>
    where
        F: IntoFilter,
        H: Fn(Command) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = BusResult<O>> + Send + 'static,
        O: Into<CommandOutput>,
    {
        let predicate = filter.into_filter()?.into_predicate();
        Ok(Self::new(predicate, handler_fn(handler)))
    }

    pub fn matches(&self, command: &Command) -> bool {
        (self.predicate)(command)
    }

    pub fn call(&self, command: Command) -> HandlerFuture {
        (self.func)(command)
    }
}

impl fmt::Debug for CommandHandlerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandHandlerDescriptor").finish_non_exhaustive()
    }
}

/// 将普通异步函数擦除为 [`HandlerFn`]
pub fn handler_fn<H, Fut, O>(handler: H) -> HandlerFn
where
    H: Fn(Command) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = BusResult<O>> + Send + 'static,
    O: Into<CommandOutput>,
{
    Arc::new(move |command: Command| -> HandlerFuture {
        let fut = handler(command);
        Box::pin(async move { fut.await.map(Into::into) })
    })
}
