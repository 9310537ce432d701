use crate::descriptor::{CommandHandlerDescriptor, HandlerFn, HandlerFuture};
use crate::filter::{Filter, IntoFilter};
use crate::handler::{CommandHandler, CommandHandlerProvider};
use crate::middleware::{HandlerTable, Middleware, MiddlewareChain, Next, resolve};
use async_trait::async_trait;
use command_bus_core::{BusResult, Command, CommandOutput, CommandRunner, ShapeCommand};
use parking_lot::RwLock;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// 进程内命令总线
/// - 中间件按注册顺序由外向内包裹分发过程
/// - 处理器按注册顺序匹配，首个命中者执行
/// - 两个列表均为写时复制：分发开始时取快照，之后的注册只影响新的分发
#[derive(Default)]
pub struct CommandBus {
    middlewares: RwLock<MiddlewareChain>,
    handlers: RwLock<HandlerTable>,
}

impl CommandBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册中间件（追加到链尾，即更靠内层）
    pub fn use_middleware<M>(&self, middleware: M) -> &Self
    where
        M: Middleware,
    {
        let mut chain = self.middlewares.write();
        Arc::make_mut(&mut chain).push(Arc::new(middleware));
        self
    }

    /// 以过滤条件 + 处理函数注册处理器
    pub fn register<F, H, Fut, O>(&self, filter: F, handler: H) -> BusResult<&Self>
    where
        F: IntoFilter,
        H: Fn(Command) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = BusResult<O>> + Send + 'static,
        O: Into<CommandOutput>,
    {
        let descriptor = CommandHandlerDescriptor::from_filter(filter, handler)?;
        Ok(self.register_descriptor(descriptor))
    }

    pub fn register_descriptor(&self, descriptor: CommandHandlerDescriptor) -> &Self {
        let mut handlers = self.handlers.write();
        Arc::make_mut(&mut handlers).push(descriptor);
        self
    }

    /// 批量注册，保持相对顺序
    pub fn register_many<I>(&self, descriptors: I) -> &Self
    where
        I: IntoIterator<Item = CommandHandlerDescriptor>,
    {
        let mut handlers = self.handlers.write();
        Arc::make_mut(&mut handlers).extend(descriptors);
        self
    }

    /// 注册具名命令类型的处理器
    pub fn register_handler<C, H>(&self, handler: Arc<H>) -> &Self
    where
        C: ShapeCommand,
        H: CommandHandler<C> + 'static,
    {
        let func: HandlerFn = Arc::new(move |command: Command| -> HandlerFuture {
            let handler = handler.clone();

            Box::pin(async move {
                let cmd = C::from_command(&command)?;
                handler.handle(cmd).await
            })
        });

        let predicate = Filter::of_type::<C>().into_predicate();
        self.register_descriptor(CommandHandlerDescriptor::new(predicate, func))
    }

    pub fn register_provider<P>(&self, provider: Arc<P>) -> &Self
    where
        P: CommandHandlerProvider,
    {
        self.register_many(provider.command_handlers())
    }

    /// 分发命令
    pub async fn handle(&self, command: Command) -> BusResult<CommandOutput> {
        let next = Next::new(self.middlewares.read().clone(), self.handlers.read().clone());

        debug!(command = %command.name(), "dispatching command");
        next.run(command).await
    }

    /// 查找首个匹配的处理器描述
    pub fn resolve(&self, command: &Command) -> Option<CommandHandlerDescriptor> {
        let handlers = self.handlers.read();
        resolve(&handlers, command).cloned()
    }

    pub fn has_handler(&self, command: &Command) -> bool {
        self.resolve(command).is_some()
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.read().len()
    }

    /// 以通用执行器形态暴露，可替换为远程客户端
    pub fn as_runner(self: &Arc<Self>) -> Arc<dyn CommandRunner> {
        self.clone()
    }
}

#[async_trait]
impl CommandRunner for CommandBus {
    async fn run(&self, command: Command) -> BusResult<CommandOutput> {
        self.handle(command).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use command_bus_core::BusError;
    use serde_json::{Value, json};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::Notify;
    use tokio::task::JoinSet;

    fn cmd(value: Value) -> Command {
        Command::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn first_registered_match_wins() {
        let bus = CommandBus::new();
        bus.register("a", |_cmd: Command| async { Ok::<_, BusError>(json!("first")) })
            .unwrap()
            .register(json!({ "command": "a", "x": 1 }), |_cmd: Command| async {
                Ok::<_, BusError>(json!("second"))
            })
            .unwrap();

        let out = bus.handle(cmd(json!({ "command": "a", "x": 1 }))).await.unwrap();
        assert_eq!(out.into_value(), Some(json!("first")));
    }

    #[tokio::test]
    async fn unregistered_command_names_the_command() {
        let bus = CommandBus::new();
        let err = bus.handle(cmd(json!({ "command": "unknown" }))).await.unwrap_err();
        assert!(err.is_unregistered());
        assert!(err.to_string().contains("unknown"));
    }

    #[test]
    fn has_handler_is_a_pure_query() {
        let bus = CommandBus::new();
        bus.register("a", |_cmd: Command| async { Ok::<_, BusError>(()) })
            .unwrap();

        assert!(bus.has_handler(&cmd(json!({ "command": "a" }))));
        assert!(!bus.has_handler(&cmd(json!({ "command": "b" }))));
        assert_eq!(bus.handler_count(), 1);
    }

    #[tokio::test]
    async fn later_registrations_do_not_affect_in_flight_snapshots() {
        let bus = Arc::new(CommandBus::new());
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let first = Arc::new(AtomicBool::new(true));

        // 仅首次分发在此等待，期间注册新的中间件
        {
            let (entered, release, first) = (entered.clone(), release.clone(), first.clone());
            bus.use_middleware(move |command: Command, next: Next| {
                let (entered, release, first) = (entered.clone(), release.clone(), first.clone());
                async move {
                    if first.swap(false, Ordering::SeqCst) {
                        entered.notify_one();
                        release.notified().await;
                    }
                    next.run(command).await
                }
            });
        }
        bus.register("a", |_cmd: Command| async { Ok::<_, BusError>(json!("handler")) })
            .unwrap();

        let in_flight = tokio::spawn({
            let bus = bus.clone();
            async move { bus.handle(cmd(json!({ "command": "a" }))).await }
        });
        entered.notified().await;

        bus.use_middleware(|_command: Command, _next: Next| async {
            Ok::<_, BusError>(CommandOutput::from(json!("vetoed")))
        });
        release.notify_one();

        let out = in_flight.await.unwrap().unwrap();
        assert_eq!(out.into_value(), Some(json!("handler")));

        let out = bus.handle(cmd(json!({ "command": "a" }))).await.unwrap();
        assert_eq!(out.into_value(), Some(json!("vetoed")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_dispatch_is_safe() {
        let bus = Arc::new(CommandBus::new());
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let counter = counter.clone();
            bus.register("inc", move |_cmd: Command| {
                let counter = counter.clone();
                async move {
                    let v = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    Ok::<_, BusError>(json!(v))
                }
            })
            .unwrap();
        }

        let mut set = JoinSet::new();
        for _ in 0..100 {
            let bus = bus.clone();
            set.spawn(async move { bus.handle(cmd(json!({ "command": "inc" }))).await.unwrap() });
        }
        let mut results = Vec::new();
        while let Some(res) = set.join_next().await {
            results.push(res.unwrap().into_value().unwrap().as_u64().unwrap());
        }
        results.sort_unstable();
        assert_eq!(results.len(), 100);
        assert_eq!(results[0], 1);
        assert_eq!(results[99], 100);
    }
}
