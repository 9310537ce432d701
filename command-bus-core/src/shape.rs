//! 具名命令类型（ShapeCommand）
//!
//! 为强类型命令绑定一个固定名称，既可作为过滤条件（按名称匹配），
//! 也可在 [`Command`] 与具体结构之间互相转换。
//!
//! ```rust
//! use command_bus_core::ShapeCommand;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct CreateUser {
//!     name: String,
//! }
//!
//! impl ShapeCommand for CreateUser {
//!     const COMMAND_NAME: &'static str = "user.create";
//! }
//!
//! let cmd = CreateUser { name: "Alice".into() }.to_command().unwrap();
//! assert_eq!(cmd.name(), "user.create");
//! assert!(CreateUser::is_type_of(&cmd));
//! assert_eq!(CreateUser::from_command(&cmd).unwrap().name, "Alice");
//! ```
use crate::command::Command;
use crate::error::{BusError, BusResult};
use serde::Serialize;
use serde::de::DeserializeOwned;

pub trait ShapeCommand: Serialize + DeserializeOwned + Send + 'static {
    /// 命令的稳定名称（建议常量字符串，不随重构变化）
    const COMMAND_NAME: &'static str;

    fn to_command(&self) -> BusResult<Command> {
        Command::create(Self::COMMAND_NAME, self)
    }

    fn from_command(command: &Command) -> BusResult<Self> {
        if !Self::is_type_of(command) {
            return Err(BusError::invalid_command(format!(
                "expected command `{}`, got `{}`",
                Self::COMMAND_NAME,
                command.name()
            )));
        }
        command.parse()
    }

    fn is_type_of(command: &Command) -> bool {
        command.name() == Self::COMMAND_NAME
    }
}
