use async_trait::async_trait;
use bytes::Bytes;
use command_bus::{
    BusError, BusResult, ByteStream, Command, CommandBus, CommandError, CommandHandler,
    CommandHandlerDescriptor, CommandHandlerProvider, CommandOutput, CommandRunner, Filter,
    Middleware, Next, ShapeCommand,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn cmd(value: Value) -> Command {
    Command::from_value(value).unwrap()
}

fn spy_handler(
    calls: Arc<AtomicUsize>,
    result: Value,
) -> impl Fn(Command) -> std::future::Ready<BusResult<Value>> + Send + Sync + 'static {
    move |_cmd: Command| {
        calls.fetch_add(1, Ordering::SeqCst);
        std::future::ready(Ok(result.clone()))
    }
}

#[tokio::test]
async fn middleware_can_veto_dispatch() {
    let bus = CommandBus::new();
    let calls = Arc::new(AtomicUsize::new(0));

    bus.use_middleware(|_command: Command, _next: Next| async {
        Ok::<_, BusError>(CommandOutput::from(json!({ "middleware": "result" })))
    });
    bus.register("example", spy_handler(calls.clone(), json!("handler")))
        .unwrap();

    let out = bus.handle(cmd(json!({ "command": "example" }))).await.unwrap();
    assert_eq!(out.into_value(), Some(json!({ "middleware": "result" })));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

/// 记录进入/退出顺序的中间件
struct Trace {
    label: &'static str,
    log: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Middleware for Trace {
    async fn handle(&self, command: Command, next: Next) -> BusResult<CommandOutput> {
        self.log.lock().unwrap().push(format!("enter {}", self.label));
        let out = next.run(command).await;
        self.log.lock().unwrap().push(format!("leave {}", self.label));
        out
    }
}

#[tokio::test]
async fn middlewares_wrap_in_registration_order() {
    let bus = CommandBus::new();
    let log = Arc::new(Mutex::new(Vec::new()));

    bus.use_middleware(Trace {
        label: "outer",
        log: log.clone(),
    })
    .use_middleware(Trace {
        label: "inner",
        log: log.clone(),
    });
    {
        let log = log.clone();
        bus.register("a", move |_cmd: Command| {
            log.lock().unwrap().push("handler".to_string());
            async { Ok::<_, BusError>(()) }
        })
        .unwrap();
    }

    bus.handle(cmd(json!({ "command": "a" }))).await.unwrap();
    assert_eq!(
        *log.lock().unwrap(),
        vec![
            "enter outer",
            "enter inner",
            "handler",
            "leave inner",
            "leave outer"
        ]
    );
}

#[tokio::test]
async fn middleware_may_rewrite_the_command() {
    let bus = CommandBus::new();
    bus.use_middleware(|command: Command, next: Next| async move {
        let command = command.into_builder().field("user", "u-1").build()?;
        next.run(command).await
    });
    bus.register("whoami", |cmd: Command| async move {
        Ok::<_, BusError>(cmd.get("user").cloned().unwrap_or(Value::Null))
    })
    .unwrap();

    let out = bus.handle(cmd(json!({ "command": "whoami" }))).await.unwrap();
    assert_eq!(out.into_value(), Some(json!("u-1")));
}

#[tokio::test]
async fn business_errors_pass_through_middleware_unmodified() {
    let bus = CommandBus::new();
    let seen = Arc::new(Mutex::new(None));
    {
        let seen = seen.clone();
        bus.use_middleware(move |command: Command, next: Next| {
            let seen = seen.clone();
            async move {
                let out = next.run(command).await;
                if let Err(err) = &out {
                    *seen.lock().unwrap() = Some(err.to_string());
                }
                out
            }
        });
    }
    bus.register("fail", |_cmd: Command| async {
        Err::<Value, _>(BusError::from(
            CommandError::named("ValidationError", "name is required")
                .with_data(json!({ "field": "name" })),
        ))
    })
    .unwrap();

    let err = bus.handle(cmd(json!({ "command": "fail" }))).await.unwrap_err();
    match err {
        BusError::Command(e) => {
            assert_eq!(e.name(), "ValidationError");
            assert_eq!(e.message(), "name is required");
            assert_eq!(e.data(), Some(&json!({ "field": "name" })));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(
        seen.lock().unwrap().as_deref(),
        Some("ValidationError: name is required")
    );
}

#[tokio::test]
async fn unregistered_command_is_not_a_business_error() {
    let bus = CommandBus::new();
    bus.register("known", |_cmd: Command| async { Ok::<_, BusError>(()) })
        .unwrap();

    let err = bus.handle(cmd(json!({ "command": "unknown" }))).await.unwrap_err();
    assert!(matches!(err, BusError::HandlerNotFound { ref command } if command == "unknown"));
    assert!(!err.is_business());
    assert_eq!(
        err.to_string(),
        "No command handler registered for command: unknown"
    );
}

#[test]
fn boolean_filter_fails_at_registration() {
    let bus = CommandBus::new();
    let err = bus
        .register(json!(true), |_cmd: Command| async { Ok::<_, BusError>(()) })
        .err()
        .unwrap();
    assert!(matches!(err, BusError::InvalidPredicate { .. }));
    assert_eq!(bus.handler_count(), 0);
}

#[tokio::test]
async fn object_filter_matches_supersets() {
    let bus = CommandBus::new();
    bus.register(json!({ "command": "x", "a": 1 }), |_cmd: Command| async {
        Ok::<_, BusError>(json!("matched"))
    })
    .unwrap();

    let out = bus
        .handle(cmd(json!({ "command": "x", "a": 1, "b": 2 })))
        .await
        .unwrap();
    assert_eq!(out.into_value(), Some(json!("matched")));

    let err = bus
        .handle(cmd(json!({ "command": "x", "a": 2 })))
        .await
        .unwrap_err();
    assert!(err.is_unregistered());
}

#[tokio::test]
async fn handlers_may_return_streams() {
    let bus = CommandBus::new();
    bus.register("download", |_cmd: Command| async {
        Ok::<_, BusError>(ByteStream::from_chunks(vec![
            Bytes::from_static(b"hello "),
            Bytes::from_static(b"world"),
        ]))
    })
    .unwrap();

    let out = bus.handle(cmd(json!({ "command": "download" }))).await.unwrap();
    let stream = out.into_stream().expect("stream output");
    assert_eq!(stream.collect().await.unwrap(), Bytes::from_static(b"hello world"));
}

#[derive(Debug, Serialize, Deserialize)]
struct CreateUser {
    name: String,
}

impl ShapeCommand for CreateUser {
    const COMMAND_NAME: &'static str = "user.create";
}

struct CreateUserHandler {
    created: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl CommandHandler<CreateUser> for CreateUserHandler {
    async fn handle(&self, cmd: CreateUser) -> BusResult<CommandOutput> {
        self.created.lock().unwrap().push(cmd.name.clone());
        CommandOutput::json(&json!({ "id": 1, "name": cmd.name }))
    }
}

#[tokio::test]
async fn typed_handlers_receive_parsed_commands() {
    let bus = CommandBus::new();
    let created = Arc::new(Mutex::new(Vec::new()));
    bus.register_handler::<CreateUser, _>(Arc::new(CreateUserHandler {
        created: created.clone(),
    }));

    let command = CreateUser {
        name: "Alice".into(),
    }
    .to_command()
    .unwrap();
    let out = bus.handle(command).await.unwrap();
    assert_eq!(out.into_value(), Some(json!({ "id": 1, "name": "Alice" })));
    assert_eq!(*created.lock().unwrap(), vec!["Alice".to_string()]);

    // 名称匹配但字段缺失 -> 解析失败
    let err = bus
        .handle(cmd(json!({ "command": "user.create" })))
        .await
        .unwrap_err();
    assert!(matches!(err, BusError::Serde { .. }));
}

struct UserCommands;

impl CommandHandlerProvider for UserCommands {
    fn command_handlers(self: Arc<Self>) -> Vec<CommandHandlerDescriptor> {
        vec![
            CommandHandlerDescriptor::from_filter("user.rename", |_cmd: Command| async {
                Ok::<_, BusError>(json!("renamed"))
            })
            .unwrap(),
            CommandHandlerDescriptor::from_filter(
                Filter::predicate(|c| c.name().starts_with("user.")),
                |_cmd: Command| async { Ok::<_, BusError>(json!("fallback")) },
            )
            .unwrap(),
        ]
    }
}

#[tokio::test]
async fn providers_register_in_order() {
    let bus = Arc::new(CommandBus::new());
    bus.register_provider(Arc::new(UserCommands));
    assert_eq!(bus.handler_count(), 2);

    let runner = bus.as_runner();
    let out = runner
        .run(cmd(json!({ "command": "user.rename" })))
        .await
        .unwrap();
    assert_eq!(out.into_value(), Some(json!("renamed")));

    let out = runner
        .run(cmd(json!({ "command": "user.delete" })))
        .await
        .unwrap();
    assert_eq!(out.into_value(), Some(json!("fallback")));
}
