//! 内置传输步骤：编码请求、发送、解码响应
//!
//! 编码：
//! - 无附件：序列化后的命令作为请求体；
//! - 有附件：`multipart/form-data`，依次为 `commandBody`、`commandAttachments` 清单、
//!   每个附件一个 `application/octet-stream` 文件部分（以附件名命名）。
//!
//! 解码：
//! - 非 200 → 传输错误；
//! - `application/octet-stream` → 流式结果，原样交给调用方；
//! - 其余按序列化器格式读取，带错误标记头时还原为错误。
//!
use super::middleware::RpcContext;
use crate::error::RpcError;
use crate::wire::{
    APPLICATION_OCTET_STREAM, ATTACHMENTS_FIELD, COMMAND_BODY_FIELD, ERROR_FLAG, ERROR_HEADER,
    media_type,
};
use command_bus_core::{ByteStream, Command, CommandError, CommandOutput, Serializer};
use futures_util::StreamExt;
use reqwest::header::{CONTENT_TYPE, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, StatusCode};
use std::io;
use std::sync::Arc;
use tracing::debug;

pub(crate) struct Transport {
    http: reqwest::Client,
    serializer: Arc<dyn Serializer>,
}

impl Transport {
    pub(crate) fn new(http: reqwest::Client, serializer: Arc<dyn Serializer>) -> Self {
        Self { http, serializer }
    }

    pub(crate) async fn send(&self, ctx: RpcContext) -> Result<CommandOutput, RpcError> {
        let RpcContext {
            request, command, ..
        } = ctx;
        let mut headers = request.headers;

        let builder = if command.has_attachments() {
            // multipart 的 content-type（含 boundary）由 reqwest 生成
            headers.remove(CONTENT_TYPE);
            let form = self.encode_multipart(command)?;
            self.http.post(&request.url).headers(headers).multipart(form)
        } else {
            let body = self.serializer.serialize(&command.to_value())?;
            let content_type = HeaderValue::from_str(self.serializer.content_type())
                .map_err(|e| RpcError::unsupported(e.to_string()))?;
            headers.insert(CONTENT_TYPE, content_type);
            self.http.post(&request.url).headers(headers).body(body)
        };
        let builder = match request.timeout {
            Some(timeout) => builder.timeout(timeout),
            None => builder,
        };

        let response = builder.send().await?;
        self.decode(response).await
    }

    fn encode_multipart(&self, command: Command) -> Result<Form, RpcError> {
        let (plain, attachments) = command.take_attachments();
        let names: Vec<&String> = attachments.keys().collect();

        let mut form = Form::new()
            .text(COMMAND_BODY_FIELD, self.serializer.serialize(&plain.to_value())?)
            .text(ATTACHMENTS_FIELD, serde_json::to_string(&names)?);

        for (name, stream) in attachments {
            let part = Part::stream(Body::wrap_stream(stream))
                .file_name(name.clone())
                .mime_str(APPLICATION_OCTET_STREAM)?;
            form = form.part(name, part);
        }
        Ok(form)
    }

    async fn decode(&self, response: reqwest::Response) -> Result<CommandOutput, RpcError> {
        let status = response.status();
        if status != StatusCode::OK {
            return Err(RpcError::Status {
                status: status.as_u16(),
            });
        }

        let headers = response.headers();
        let media = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(media_type);
        let is_error = headers
            .get(ERROR_HEADER)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == ERROR_FLAG);

        if !is_error && media.as_deref() == Some(APPLICATION_OCTET_STREAM) {
            debug!("decoding streamed command result");
            let stream = response
                .bytes_stream()
                .map(|chunk| chunk.map_err(io::Error::other));
            return Ok(CommandOutput::Stream(ByteStream::from_stream(stream)));
        }

        // 缺少 content-type 时按序列化器格式读取
        if let Some(media) = media {
            if media != media_type(self.serializer.content_type()) {
                return Err(RpcError::unsupported(media));
            }
        }

        let body = response.bytes().await?;
        let value = self.serializer.deserialize(&body).map_err(RpcError::decode)?;
        if is_error {
            debug!("remote command failed");
            return Err(CommandError::from_payload(value).into());
        }
        Ok(CommandOutput::Value(value))
    }
}
