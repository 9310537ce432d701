//! 命令总线基础库（command-bus-core）
//!
//! 定义命令总线各层共享的最小抽象：
//! - 命令值（`command`）与其二进制附件（`stream`）
//! - 执行结果（`output`）与统一错误（`error`）
//! - 执行器协议（`runner`）：进程内总线与 RPC 客户端的共同形态
//! - 线上编解码协议（`serializer`）与具名命令类型（`shape`）
//!
//! 本 crate 不包含任何分发或传输实现，分别见 `command-bus` 与 `command-bus-rpc`。
//!
pub mod command;
pub mod error;
pub mod output;
pub mod runner;
pub mod serializer;
pub mod shape;
pub mod stream;

pub use command::{COMMAND_FIELD, Command, CommandBuilder, CommandParts};
pub use error::{BusError, BusResult, CommandError};
pub use output::CommandOutput;
pub use runner::CommandRunner;
pub use serializer::{APPLICATION_JSON, JsonSerializer, Serializer};
pub use shape::ShapeCommand;
pub use stream::ByteStream;
