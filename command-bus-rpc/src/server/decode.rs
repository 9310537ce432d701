//! 请求解码：HTTP 请求 → [`Command`]
//!
//! - 序列化器格式（默认 JSON）：读取完整请求体并反序列化；
//! - `multipart/form-data`：读取 `commandBody` 与可选的 `commandAttachments` 清单。
//!   有清单时，清单之后的文件部分由后台任务按线上顺序泵入各附件的有界通道；
//!   按清单顺序消费（或直接丢弃）时全程流式。先读后面的附件时，前面附件的剩余内容被缓冲，
//!   超出 `max_buffered_attachment_bytes` 则相关附件流以错误结束；
//!   无清单时文件部分整体缓冲，总量同样受 `max_buffered_attachment_bytes` 限制。
//!
use super::config::RpcServerConfig;
use crate::error::RpcError;
use crate::wire::{ATTACHMENTS_FIELD, COMMAND_BODY_FIELD, MULTIPART_FORM_DATA, media_type};
use axum::body::{Body, to_bytes};
use axum::extract::multipart::{Field, MultipartError};
use axum::extract::{FromRequest, Multipart, Request};
use axum::http::header::CONTENT_TYPE;
use axum::http::request::Parts;
use bytes::{Bytes, BytesMut};
use command_bus_core::{ByteStream, Command, Serializer};
use serde_json::Value;
use futures_util::{StreamExt, stream};
use std::collections::{BTreeMap, VecDeque};
use std::io;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

type ChunkSender = mpsc::Sender<io::Result<Bytes>>;

pub(crate) async fn read_command(
    parts: &Parts,
    body: Body,
    serializer: &dyn Serializer,
    config: &RpcServerConfig,
) -> Result<Command, RpcError> {
    let content_type = parts
        .headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let media = media_type(content_type);

    if media == MULTIPART_FORM_DATA {
        return read_multipart(parts, body, serializer, config).await;
    }
    if media.is_empty() {
        return Err(RpcError::unsupported("(missing)"));
    }
    if media != media_type(serializer.content_type()) {
        return Err(RpcError::unsupported(content_type));
    }

    let raw = to_bytes(body, config.max_body_bytes)
        .await
        .map_err(RpcError::decode)?;
    if raw.is_empty() {
        return Err(RpcError::MissingBody);
    }
    let value = serializer.deserialize(&raw).map_err(RpcError::decode)?;
    command_from_value(value)
}

/// 校验“看起来像命令”：对象，且 `command` 为非空字符串
pub(crate) fn command_from_value(value: Value) -> Result<Command, RpcError> {
    if value.is_null() {
        return Err(RpcError::MissingBody);
    }
    Command::from_value(value).map_err(|e| RpcError::NotACommand {
        reason: e.to_string(),
    })
}

async fn read_multipart(
    parts: &Parts,
    body: Body,
    serializer: &dyn Serializer,
    config: &RpcServerConfig,
) -> Result<Command, RpcError> {
    let request = Request::from_parts(parts.clone(), body);
    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|e| RpcError::multipart(e.body_text()))?;

    let mut plain: Option<Value> = None;
    let mut manifest: Option<Vec<String>> = None;
    let mut buffered = BTreeMap::new();
    let mut buffered_bytes = 0usize;

    while plain.is_none() || manifest.is_none() {
        let Some(field) = multipart.next_field().await.map_err(multipart_error)? else {
            break;
        };
        let name = field.name().unwrap_or_default().to_string();

        match name.as_str() {
            COMMAND_BODY_FIELD => {
                let raw = field.bytes().await.map_err(multipart_error)?;
                plain = Some(serializer.deserialize(&raw).map_err(RpcError::decode)?);
            }
            ATTACHMENTS_FIELD => {
                let raw = field.bytes().await.map_err(multipart_error)?;
                manifest = Some(serde_json::from_slice(&raw).map_err(RpcError::decode)?);
            }
            _ => {
                let remaining = config.max_buffered_attachment_bytes - buffered_bytes;
                let data = read_limited(field, remaining).await?;
                buffered_bytes += data.len();
                buffered.insert(name, ByteStream::from_bytes(data));
            }
        }
    }

    let plain = plain.ok_or(RpcError::MissingBody)?;
    let command = command_from_value(plain)?;

    let mut streamed = manifest.unwrap_or_default();
    streamed.retain(|name| !buffered.contains_key(name));

    let mut builder = command.into_builder();
    for (name, stream) in buffered {
        builder = builder.attachment(name, stream);
    }
    if !streamed.is_empty() {
        let spill_budget = config
            .max_buffered_attachment_bytes
            .saturating_sub(buffered_bytes);
        let streams = spawn_pump(
            multipart,
            streamed,
            config.attachment_channel_capacity,
            spill_budget,
        );
        for (name, stream) in streams {
            builder = builder.attachment(name, stream);
        }
    }

    builder.build().map_err(|e| RpcError::NotACommand {
        reason: e.to_string(),
    })
}

async fn read_limited(mut field: Field<'_>, limit: usize) -> Result<Bytes, RpcError> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        if chunk.len() > limit - buf.len() {
            return Err(RpcError::multipart(
                "buffered attachments exceed the configured limit",
            ));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf.freeze())
}

fn multipart_error(err: MultipartError) -> RpcError {
    RpcError::multipart(err.body_text())
}

const OUT_OF_ORDER: &str =
    "attachments read out of order exceed the buffered attachment limit";

struct PendingAttachment {
    index: usize,
    name: String,
    tx: ChunkSender,
}

fn spawn_pump(
    multipart: Multipart,
    names: Vec<String>,
    capacity: usize,
    spill_budget: usize,
) -> Vec<(String, ByteStream)> {
    // 记录已被读取过的最靠后的附件序号
    let (demand_tx, demand_rx) = watch::channel(0usize);
    let demand_tx = Arc::new(demand_tx);
    let mut streams = Vec::with_capacity(names.len());
    let mut pending = VecDeque::with_capacity(names.len());

    for (index, name) in names.into_iter().enumerate() {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let demand = demand_tx.clone();
        let stream = stream::once(async move {
            demand.send_if_modified(|polled| {
                let raised = index > *polled;
                if raised {
                    *polled = index;
                }
                raised
            });
            ReceiverStream::new(rx)
        })
        .flatten();
        streams.push((name.clone(), ByteStream::from_stream(stream)));
        pending.push_back(PendingAttachment { index, name, tx });
    }

    tokio::spawn(pump(multipart, pending, demand_rx, spill_budget));
    streams
}

async fn pump(
    mut multipart: Multipart,
    mut pending: VecDeque<PendingAttachment>,
    mut demand: watch::Receiver<usize>,
    mut budget: usize,
) {
    while !pending.is_empty() {
        let mut field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                fail_all(pending, &e.body_text());
                return;
            }
        };

        let position = field
            .name()
            .and_then(|name| pending.iter().position(|p| p.name == name));
        let Some(position) = position else {
            debug!(field = ?field.name(), "skipping undeclared multipart field");
            continue;
        };

        // 清单中排在前面却被跳过的附件不会再出现
        for skipped in pending.drain(..position) {
            let _ = skipped.tx.try_send(Err(missing(&skipped.name)));
        }
        let Some(current) = pending.pop_front() else {
            break;
        };

        let forwarded = forward(&mut field, &current, &mut demand, &mut budget).await;
        drop(field);
        match forwarded {
            Ok(()) => debug!(attachment = %current.name, "attachment streamed"),
            Err(reason) => {
                warn!(attachment = %current.name, %reason, "attachment streaming aborted");
                fail_all(pending, &reason);
                drain(multipart).await;
                return;
            }
        }
    }

    for rest in pending {
        let _ = rest.tx.try_send(Err(missing(&rest.name)));
    }
}

/// 把一个文件部分转交给对应附件
///
/// 通道已满、且更靠后的附件已被读取时，本部分剩余内容改为缓冲（总量受 `budget` 限制）
/// 并由独立任务补发，读取方因此可以先消费后面的附件。
async fn forward(
    field: &mut Field<'_>,
    current: &PendingAttachment,
    demand: &mut watch::Receiver<usize>,
    budget: &mut usize,
) -> Result<(), String> {
    let mut spill: Option<Vec<Bytes>> = None;

    loop {
        let chunk = match field.chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(e) => {
                let reason = e.body_text();
                deliver(current.tx.clone(), spill.unwrap_or_default(), Some(reason.clone()));
                return Err(reason);
            }
        };

        if spill.is_none() {
            tokio::select! {
                biased;
                permit = current.tx.reserve() => {
                    // 接收端已丢弃时继续读完该部分，以便推进到下一个附件
                    if let Ok(permit) = permit {
                        permit.send(Ok(chunk));
                    }
                    continue;
                }
                _ = requested_after(demand, current.index) => {
                    debug!(attachment = %current.name, "later attachment requested, buffering");
                }
            }
        }
        let spilled = spill.get_or_insert_with(Vec::new);

        if chunk.len() > *budget {
            let chunks = std::mem::take(spilled);
            deliver(current.tx.clone(), chunks, Some(OUT_OF_ORDER.to_string()));
            return Err(OUT_OF_ORDER.to_string());
        }
        *budget -= chunk.len();
        spilled.push(chunk);
    }

    if let Some(spilled) = spill {
        deliver(current.tx.clone(), spilled, None);
    }
    Ok(())
}

async fn requested_after(demand: &mut watch::Receiver<usize>, index: usize) {
    let closed = demand.wait_for(|polled| *polled > index).await.is_err();
    if closed {
        std::future::pending::<()>().await;
    }
}

fn deliver(tx: ChunkSender, chunks: Vec<Bytes>, error: Option<String>) {
    tokio::spawn(async move {
        for chunk in chunks {
            if tx.send(Ok(chunk)).await.is_err() {
                return;
            }
        }
        if let Some(reason) = error {
            let _ = tx.send(Err(io::Error::other(reason))).await;
        }
    });
}

/// 读完剩余请求体，连接才能正常完成响应
async fn drain(mut multipart: Multipart) {
    while let Ok(Some(mut field)) = multipart.next_field().await {
        while let Ok(Some(_)) = field.chunk().await {}
    }
}

fn fail_all(pending: VecDeque<PendingAttachment>, reason: &str) {
    for rest in pending {
        let _ = rest.tx.try_send(Err(io::Error::other(reason.to_string())));
    }
}

fn missing(name: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("attachment `{name}` missing from request"),
    )
}
