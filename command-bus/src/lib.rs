//! 进程内命令总线（command-bus）
//!
//! - `filter`：过滤条件到谓词的转换（名称、结构化部分匹配、自定义谓词、具名类型）
//! - `descriptor`：处理器描述与类型擦除后的处理函数
//! - `handler`：强类型处理器与处理器提供者
//! - `middleware`：包裹分发过程的责任链
//! - `bus`：按注册顺序执行中间件并以“首个命中”规则解析处理器
//!
pub mod bus;
pub mod descriptor;
pub mod filter;
pub mod handler;
pub mod middleware;

pub use bus::CommandBus;
pub use descriptor::{CommandHandlerDescriptor, HandlerFn, HandlerFuture, handler_fn};
pub use filter::{Filter, IntoFilter, Predicate};
pub use handler::{CommandHandler, CommandHandlerProvider};
pub use middleware::{Middleware, Next};

pub use command_bus_core::{
    BusError, BusResult, ByteStream, Command, CommandError, CommandOutput, CommandRunner,
    ShapeCommand,
};
