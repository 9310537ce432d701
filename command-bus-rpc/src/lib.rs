//! 命令总线 HTTP RPC（command-bus-rpc）
//!
//! 把进程内的命令分发延伸到网络另一端：
//! - `client`（特性 `client`）：基于 reqwest，支持客户端中间件、multipart 附件上传与流式结果；
//! - `server`（特性 `server`）：基于 axum，把请求还原为命令交给 `CommandRunner` 执行；
//! - `wire`：两端共享的线上协议常量；
//! - `error`：RPC 错误，区分传输失败与远端业务拒绝。
//!
//! ```no_run
//! use command_bus::CommandBus;
//! use command_bus_rpc::{RpcClient, RpcServer};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let bus = Arc::new(CommandBus::new());
//! let app = RpcServer::new(bus).into_router("/command");
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
//! tokio::spawn(async move { axum::serve(listener, app).await });
//!
//! let client = RpcClient::connect("http://127.0.0.1:3000/command")?;
//! # let _ = client;
//! # Ok(())
//! # }
//! ```
//!
pub mod error;
pub mod wire;

#[cfg(feature = "client")]
pub mod client;
#[cfg(feature = "server")]
pub mod server;

pub use error::RpcError;

#[cfg(feature = "client")]
pub use client::{ClientMiddleware, ClientNext, RpcClient, RpcClientConfig, RpcContext, RpcRequest};
#[cfg(feature = "server")]
pub use server::{PrepareCommand, RpcServer, RpcServerConfig};
