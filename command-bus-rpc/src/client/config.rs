use crate::error::RpcError;
use bon::Builder;
use std::time::Duration;

/// RPC 客户端配置
#[derive(Builder, Clone, Debug)]
pub struct RpcClientConfig {
    /// 服务端命令入口（单一 POST 路径）
    #[builder(into)]
    pub url: String,
    /// 单次请求超时；缺省不设超时
    pub timeout: Option<Duration>,
    /// 连接池空闲连接保留时长
    pub pool_idle_timeout: Option<Duration>,
    /// 每个主机保留的最大空闲连接数
    pub pool_max_idle_per_host: Option<usize>,
    #[builder(into)]
    pub user_agent: Option<String>,
}

impl RpcClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self::builder().url(url).build()
    }

    pub(crate) fn build_http(&self) -> Result<reqwest::Client, RpcError> {
        let mut builder = reqwest::Client::builder();
        if let Some(idle) = self.pool_idle_timeout {
            builder = builder.pool_idle_timeout(idle);
        }
        if let Some(max) = self.pool_max_idle_per_host {
            builder = builder.pool_max_idle_per_host(max);
        }
        if let Some(agent) = &self.user_agent {
            builder = builder.user_agent(agent.as_str());
        }
        Ok(builder.build()?)
    }
}
