use async_trait::async_trait;
use command_bus::{
    BusError, BusResult, Command, CommandBus, CommandHandler, CommandOutput, Next, ShapeCommand,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Serialize, Deserialize)]
struct CreateUser {
    name: String,
}

impl ShapeCommand for CreateUser {
    const COMMAND_NAME: &'static str = "user.create";
}

struct CreateUserHandler;

#[async_trait]
impl CommandHandler<CreateUser> for CreateUserHandler {
    async fn handle(&self, cmd: CreateUser) -> BusResult<CommandOutput> {
        println!("CreateUser: name={}", cmd.name);
        CommandOutput::json(&json!({ "created": cmd.name }))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let bus = CommandBus::new();

    bus.use_middleware(|command: Command, next: Next| async move {
        println!("-> {}", command.name());
        next.run(command).await
    });
    bus.register_handler::<CreateUser, _>(Arc::new(CreateUserHandler));
    bus.register("user.delete", |cmd: Command| async move {
        println!("DeleteUser: id={:?}", cmd.get("id"));
        Ok::<_, BusError>(())
    })?;

    let out = bus
        .handle(
            CreateUser {
                name: "Alice".into(),
            }
            .to_command()?,
        )
        .await?;
    println!("result: {:?}", out.into_value());

    bus.handle(Command::builder("user.delete").field("id", 42).build()?)
        .await?;

    // 未注册的命令 -> 返回 HandlerNotFound 错误
    if let Err(BusError::HandlerNotFound { command }) =
        bus.handle(Command::new("user.update")?).await
    {
        eprintln!("HandlerNotFound as expected for command: {command}");
    }
    Ok(())
}
