//! 账户命令与处理器
//!
//! 开户、存取款与对账单走强类型处理器；批量导入需要读取附件，以处理器提供者的形式注册。
//!
use async_trait::async_trait;
use axum::http::request::Parts;
use bytes::Bytes;
use command_bus::{
    BusError, BusResult, ByteStream, Command, CommandError, CommandHandler,
    CommandHandlerDescriptor, CommandHandlerProvider, CommandOutput, Filter, ShapeCommand,
    handler_fn,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// 导入文件上限
const MAX_IMPORT_BYTES: usize = 1024 * 1024;

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("account {0} already opened")]
    AlreadyOpened(String),
    #[error("account {0} not opened")]
    NotOpened(String),
    #[error("insufficient funds: balance {balance}, requested {requested}")]
    InsufficientFunds { balance: i64, requested: i64 },
    #[error("invalid import line {line}: {reason}")]
    InvalidImport { line: usize, reason: String },
}

impl AccountError {
    fn kind(&self) -> &'static str {
        match self {
            Self::AlreadyOpened(_) => "AccountAlreadyOpened",
            Self::NotOpened(_) => "AccountNotOpened",
            Self::InsufficientFunds { .. } => "InsufficientFunds",
            Self::InvalidImport { .. } => "InvalidImport",
        }
    }
}

impl From<AccountError> for BusError {
    fn from(err: AccountError) -> Self {
        CommandError::named(err.kind(), err.to_string()).into()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OpenAccount {
    pub id: String,
    #[serde(default)]
    pub initial_balance: i64,
}

impl ShapeCommand for OpenAccount {
    const COMMAND_NAME: &'static str = "account.open";
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Deposit {
    pub id: String,
    pub amount: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
}

impl ShapeCommand for Deposit {
    const COMMAND_NAME: &'static str = "account.deposit";
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Withdraw {
    pub id: String,
    pub amount: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
}

impl ShapeCommand for Withdraw {
    const COMMAND_NAME: &'static str = "account.withdraw";
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Statement {
    pub id: String,
}

impl ShapeCommand for Statement {
    const COMMAND_NAME: &'static str = "account.statement";
}

pub const IMPORT_COMMAND: &str = "account.import";
pub const IMPORT_ATTACHMENT: &str = "deposits";

#[derive(Debug, Default)]
struct Account {
    balance: i64,
    history: Vec<String>,
}

/// 内存账本
#[derive(Debug, Default)]
pub struct Ledger {
    accounts: Mutex<HashMap<String, Account>>,
}

impl Ledger {
    fn apply<F>(&self, id: &str, f: F) -> Result<i64, AccountError>
    where
        F: FnOnce(&mut Account) -> Result<(), AccountError>,
    {
        let mut accounts = self.accounts.lock();
        let account = accounts
            .get_mut(id)
            .ok_or_else(|| AccountError::NotOpened(id.to_string()))?;
        f(account)?;
        Ok(account.balance)
    }

    async fn import(&self, command: Command) -> BusResult<CommandOutput> {
        let parts = command.into_parts();
        let id = parts
            .fields
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| BusError::invalid_command("missing `id`"))?
            .to_string();

        let mut attachments = parts.attachments;
        let file = attachments
            .remove(IMPORT_ATTACHMENT)
            .ok_or_else(|| BusError::invalid_command(format!("missing `{IMPORT_ATTACHMENT}` file")))?;
        let raw = file
            .collect_limited(MAX_IMPORT_BYTES)
            .await
            .map_err(|e| AccountError::InvalidImport {
                line: 0,
                reason: e.to_string(),
            })?;

        let mut amounts = Vec::new();
        for (index, line) in String::from_utf8_lossy(&raw).lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let amount = line.parse::<i64>().map_err(|e| AccountError::InvalidImport {
                line: index + 1,
                reason: e.to_string(),
            })?;
            amounts.push(amount);
        }

        let balance = self.apply(&id, |account| {
            for amount in &amounts {
                account.balance += amount;
                account.history.push(format!("import +{amount}"));
            }
            Ok(())
        })?;
        CommandOutput::json(&json!({ "imported": amounts.len(), "balance": balance }))
    }
}

#[async_trait]
impl CommandHandler<OpenAccount> for Ledger {
    async fn handle(&self, cmd: OpenAccount) -> BusResult<CommandOutput> {
        let mut accounts = self.accounts.lock();
        if accounts.contains_key(&cmd.id) {
            return Err(AccountError::AlreadyOpened(cmd.id).into());
        }
        accounts.insert(
            cmd.id.clone(),
            Account {
                balance: cmd.initial_balance,
                history: vec![format!("open {}", cmd.initial_balance)],
            },
        );
        CommandOutput::json(&json!({ "id": cmd.id, "balance": cmd.initial_balance }))
    }
}

#[async_trait]
impl CommandHandler<Deposit> for Ledger {
    async fn handle(&self, cmd: Deposit) -> BusResult<CommandOutput> {
        let operator = cmd.operator.unwrap_or_else(|| "-".to_string());
        let balance = self.apply(&cmd.id, |account| {
            account.balance += cmd.amount;
            account.history.push(format!("deposit +{} by {operator}", cmd.amount));
            Ok(())
        })?;
        CommandOutput::json(&json!({ "balance": balance }))
    }
}

#[async_trait]
impl CommandHandler<Withdraw> for Ledger {
    async fn handle(&self, cmd: Withdraw) -> BusResult<CommandOutput> {
        let operator = cmd.operator.unwrap_or_else(|| "-".to_string());
        let balance = self.apply(&cmd.id, |account| {
            if account.balance < cmd.amount {
                return Err(AccountError::InsufficientFunds {
                    balance: account.balance,
                    requested: cmd.amount,
                });
            }
            account.balance -= cmd.amount;
            account.history.push(format!("withdraw -{} by {operator}", cmd.amount));
            Ok(())
        })?;
        CommandOutput::json(&json!({ "balance": balance }))
    }
}

#[async_trait]
impl CommandHandler<Statement> for Ledger {
    /// 对账单以流式结果返回，每行一条记录
    async fn handle(&self, cmd: Statement) -> BusResult<CommandOutput> {
        let accounts = self.accounts.lock();
        let account = accounts
            .get(&cmd.id)
            .ok_or_else(|| AccountError::NotOpened(cmd.id.clone()))?;
        let lines = account
            .history
            .iter()
            .map(|line| Bytes::from(format!("{line}\n")))
            .collect::<Vec<_>>();
        Ok(ByteStream::from_chunks(lines).into())
    }
}

impl CommandHandlerProvider for Ledger {
    fn command_handlers(self: Arc<Self>) -> Vec<CommandHandlerDescriptor> {
        let ledger = self;
        let import = handler_fn(move |command: Command| {
            let ledger = ledger.clone();
            async move { ledger.import(command).await }
        });
        vec![CommandHandlerDescriptor::new(
            Filter::name(IMPORT_COMMAND).into_predicate(),
            import,
        )]
    }
}

/// 把调用方在请求头中声明的操作员写入命令
pub fn stamp_operator(command: Command, request: &Parts) -> BusResult<Command> {
    match request
        .headers
        .get("x-operator")
        .and_then(|v| v.to_str().ok())
    {
        Some(operator) => command.into_builder().field("operator", operator).build(),
        None => Ok(command),
    }
}
