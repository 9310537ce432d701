mod account;

use account::{Deposit, IMPORT_ATTACHMENT, IMPORT_COMMAND, Ledger, OpenAccount, Statement, Withdraw};
use anyhow::Context;
use axum::http::HeaderValue;
use command_bus::{ByteStream, Command, CommandBus, Next, ShapeCommand};
use command_bus_rpc::{ClientNext, RpcClient, RpcContext, RpcServer};
use serde_json::Map;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_LISTEN: &str = "127.0.0.1:3000";
const COMMAND_PATH: &str = "/command";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let listen =
        std::env::var("COMMAND_BUS_LISTEN").unwrap_or_else(|_| DEFAULT_LISTEN.to_string());

    // 服务端：总线 + 账本
    let ledger = Arc::new(Ledger::default());
    let bus = Arc::new(CommandBus::new());
    bus.use_middleware(|command: Command, next: Next| async move {
        let name = command.name().to_string();
        let started = Instant::now();
        let out = next.run(command).await;
        info!(
            command = %name,
            elapsed_us = started.elapsed().as_micros() as u64,
            ok = out.is_ok(),
            "command handled"
        );
        out
    });
    bus.register_handler::<OpenAccount, _>(ledger.clone())
        .register_handler::<Deposit, _>(ledger.clone())
        .register_handler::<Withdraw, _>(ledger.clone())
        .register_handler::<Statement, _>(ledger.clone())
        .register_provider(ledger);

    let server = RpcServer::builder()
        .runner(bus)
        .prepare_command(Arc::new(account::stamp_operator))
        .build();
    let app = server.into_router(COMMAND_PATH);

    let listener = TcpListener::bind(&listen)
        .await
        .with_context(|| format!("failed to bind {listen}"))?;
    let addr = listener.local_addr()?;
    info!(%addr, "command bus listening");

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let serving = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
    });

    // 客户端：经由 RPC 调用同一套命令
    let client = RpcClient::connect(format!("http://{addr}{COMMAND_PATH}"))?;
    client.use_middleware(|mut ctx: RpcContext, next: ClientNext| async move {
        ctx.request
            .headers
            .insert("x-operator", HeaderValue::from_static("demo"));
        next.run(ctx).await
    });

    run_session(&client).await?;

    client.close();
    let _ = shutdown_tx.send(());
    serving.await??;
    Ok(())
}

async fn run_session(client: &RpcClient) -> anyhow::Result<()> {
    let id = "acc-1";

    // 开户
    let out = client
        .handle(
            OpenAccount {
                id: id.into(),
                initial_balance: 1000,
            }
            .to_command()?,
            Map::new(),
        )
        .await?;
    println!("opened: {:?}", out.into_value());

    // 存款
    let out = client
        .handle(
            Deposit {
                id: id.into(),
                amount: 500,
                operator: None,
            }
            .to_command()?,
            Map::new(),
        )
        .await?;
    println!("deposited: {:?}", out.into_value());

    // 余额不足 -> 远端业务错误
    let withdraw = Withdraw {
        id: id.into(),
        amount: 10_000,
        operator: None,
    };
    match client.handle(withdraw.to_command()?, Map::new()).await {
        Ok(out) => println!("withdrawn: {:?}", out.into_value()),
        Err(err) if !err.is_transport() => println!("withdraw rejected: {err}"),
        Err(err) => return Err(err.into()),
    }

    // 批量导入：附件以 multipart 流式上传
    let import = Command::builder(IMPORT_COMMAND)
        .field("id", id)
        .attachment(IMPORT_ATTACHMENT, ByteStream::from_bytes("10\n20\n30\n"))
        .build()?;
    let out = client.handle(import, Map::new()).await?;
    println!("imported: {:?}", out.into_value());

    // 对账单：流式结果
    let out = client
        .handle(Statement { id: id.into() }.to_command()?, Map::new())
        .await?;
    if let Some(stream) = out.into_stream() {
        let body = stream.collect().await?;
        println!("statement:\n{}", String::from_utf8_lossy(&body));
    }

    Ok(())
}
