use bon::Builder;

/// RPC 服务端配置
#[derive(Builder, Clone, Debug)]
pub struct RpcServerConfig {
    /// 请求体上限（JSON 请求体与整个 multipart 请求）
    #[builder(default = 16 * 1024 * 1024)]
    pub max_body_bytes: usize,
    /// 每个流式附件的通道容量（块数）
    #[builder(default = 8)]
    pub attachment_channel_capacity: usize,
    /// 缓冲附件的总字节上限：未声明附件清单时的整体缓冲，以及乱序读取附件时的溢出缓冲
    #[builder(default = 16 * 1024 * 1024)]
    pub max_buffered_attachment_bytes: usize,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}
