//! 命令执行器（CommandRunner）
//!
//! “给我一个命令，还你一个结果”的最小抽象。进程内总线与 RPC 客户端都实现它，
//! 使调用方可以在本地与远程分发之间无感切换。
//!
use crate::command::Command;
use crate::error::BusResult;
use crate::output::CommandOutput;
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: Command) -> BusResult<CommandOutput>;
}

#[async_trait]
impl<R> CommandRunner for Arc<R>
where
    R: CommandRunner + ?Sized,
{
    async fn run(&self, command: Command) -> BusResult<CommandOutput> {
        (**self).run(command).await
    }
}
