//! RPC 服务端
//!
//! 把 HTTP 请求还原为命令并交给 [`CommandRunner`]（通常是 `CommandBus`）执行：
//! 1. 按 `content-type` 解码请求体（见 [`decode`]）；
//! 2. 可选的 [`PrepareCommand`] 按请求信息改写命令；
//! 3. 分发；成功时结构化结果按序列化器格式返回，流式结果以 `application/octet-stream` 透传；
//! 4. 任何失败都返回 200 + `X-command-bus-error: 1` + 序列化后的错误负载。
//!
//! [`RpcServer::into_router`] 生成可直接挂载的 axum 路由；
//! 已自行解析 JSON 的宿主可调用 [`RpcServer::dispatch_parsed`]。
//!
mod config;
mod decode;
mod hooks;

pub use config::RpcServerConfig;
pub use hooks::{CommandHook, ErrorHook, PrepareCommand, ResultHook};

use crate::error::RpcError;
use crate::wire::{APPLICATION_OCTET_STREAM, ERROR_FLAG, ERROR_HEADER};
use axum::Router;
use axum::body::Body;
use axum::extract::{DefaultBodyLimit, Request};
use axum::http::header::{CONTENT_TYPE, HeaderName};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use bon::Builder;
use command_bus_core::{
    BusError, Command, CommandError, CommandOutput, CommandRunner, JsonSerializer, Serializer,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Builder)]
pub struct RpcServer {
    runner: Arc<dyn CommandRunner>,
    #[builder(default = default_serializer())]
    serializer: Arc<dyn Serializer>,
    prepare_command: Option<Arc<dyn PrepareCommand>>,
    on_command: Option<CommandHook>,
    on_result: Option<ResultHook>,
    on_error: Option<ErrorHook>,
    #[builder(default)]
    config: RpcServerConfig,
}

fn default_serializer() -> Arc<dyn Serializer> {
    Arc::new(JsonSerializer)
}

impl RpcServer {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self::builder().runner(runner).build()
    }

    pub fn config(&self) -> &RpcServerConfig {
        &self.config
    }

    /// 在 `path` 上挂载单一 POST 入口
    pub fn into_router(self, path: &str) -> Router {
        let limit = self.config.max_body_bytes;
        let server = Arc::new(self);

        Router::new()
            .route(
                path,
                post(move |request: Request| async move { server.handle(request).await }),
            )
            .layer(DefaultBodyLimit::max(limit))
    }

    pub async fn handle(&self, request: Request) -> Response {
        let (parts, body) = request.into_parts();
        let outcome =
            match decode::read_command(&parts, body, self.serializer.as_ref(), &self.config).await
            {
                Ok(command) => self.dispatch(command, &parts).await,
                Err(err) => Err(err),
            };
        self.respond(outcome)
    }

    /// 宿主已解析 JSON 请求体时使用：只做 `denormalize`，不再反序列化
    pub async fn dispatch_parsed(&self, body: Value, parts: &Parts) -> Response {
        let command = self
            .serializer
            .denormalize(body)
            .map_err(RpcError::decode)
            .and_then(decode::command_from_value);
        let outcome = match command {
            Ok(command) => self.dispatch(command, parts).await,
            Err(err) => Err(err),
        };
        self.respond(outcome)
    }

    async fn dispatch(&self, command: Command, parts: &Parts) -> Result<CommandOutput, RpcError> {
        let command = match &self.prepare_command {
            Some(prepare) => prepare.prepare(command, parts).await?,
            None => command,
        };
        if let Some(hook) = &self.on_command {
            hook(&command);
        }

        debug!(command = %command.name(), "dispatching rpc command");
        let output = self.runner.run(command).await?;

        if let Some(hook) = &self.on_result {
            hook(&output);
        }
        Ok(output)
    }

    fn respond(&self, outcome: Result<CommandOutput, RpcError>) -> Response {
        match outcome {
            Ok(CommandOutput::Stream(stream)) => (
                StatusCode::OK,
                [(CONTENT_TYPE, APPLICATION_OCTET_STREAM)],
                Body::from_stream(stream),
            )
                .into_response(),
            Ok(CommandOutput::Value(value)) => match self.serializer.serialize(&value) {
                Ok(body) => (
                    StatusCode::OK,
                    [(CONTENT_TYPE, self.serializer.content_type())],
                    body,
                )
                    .into_response(),
                Err(err) => self.error_response(err.into()),
            },
            Err(err) => self.error_response(err),
        }
    }

    fn error_response(&self, err: RpcError) -> Response {
        if let Some(hook) = &self.on_error {
            hook(&err);
        }
        match &err {
            RpcError::Bus(e) if e.is_business() => debug!(error = %err, "command rejected"),
            _ => warn!(error = %err, "rpc command failed"),
        }

        let payload = err.to_command_error();
        let body = serde_json::to_value(&payload)
            .map_err(BusError::from)
            .and_then(|value| self.serializer.serialize(&value))
            .unwrap_or_else(|e| {
                warn!(error = %e, "cannot serialize error payload");
                let fallback = CommandError::named(CommandError::SERIALIZATION, e.to_string());
                serde_json::to_string(&fallback).unwrap_or_default()
            });

        (
            StatusCode::OK,
            [
                (CONTENT_TYPE, self.serializer.content_type()),
                (HeaderName::from_static(ERROR_HEADER), ERROR_FLAG),
            ],
            body,
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use axum::http::Request as HttpRequest;
    use command_bus::CommandBus;
    use command_bus_core::{BusResult, ByteStream};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn bus() -> Arc<CommandBus> {
        let bus = Arc::new(CommandBus::new());
        bus.register("echo", |cmd: Command| async move {
            Ok::<_, BusError>(Value::Object(cmd.fields().clone()))
        })
        .unwrap()
        .register("fail", |_cmd: Command| async {
            Err::<Value, _>(BusError::from(CommandError::named("Conflict", "test")))
        })
        .unwrap()
        .register("download", |_cmd: Command| async {
            Ok::<_, BusError>(ByteStream::from_bytes(&b"payload"[..]))
        })
        .unwrap();
        bus
    }

    fn json_request(body: impl Into<Body>) -> Request {
        HttpRequest::builder()
            .method("POST")
            .header(CONTENT_TYPE, "application/json")
            .body(body.into())
            .unwrap()
    }

    async fn read(response: Response) -> (bool, Value) {
        let flagged = response
            .headers()
            .get(ERROR_HEADER)
            .is_some_and(|v| v == ERROR_FLAG);
        assert_eq!(response.status(), StatusCode::OK);
        let raw = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (flagged, serde_json::from_slice(&raw).unwrap())
    }

    #[tokio::test]
    async fn dispatches_json_commands() {
        let server = RpcServer::new(bus());
        let response = server
            .handle(json_request(r#"{"command":"echo","x":1}"#))
            .await;

        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );
        let (flagged, body) = read(response).await;
        assert!(!flagged);
        assert_eq!(body, json!({ "x": 1 }));
    }

    #[tokio::test]
    async fn business_errors_are_flagged() {
        let server = RpcServer::new(bus());
        let (flagged, body) = read(server.handle(json_request(r#"{"command":"fail"}"#)).await).await;
        assert!(flagged);
        assert_eq!(body, json!({ "name": "Conflict", "message": "test" }));
    }

    #[tokio::test]
    async fn unregistered_commands_are_flagged() {
        let server = RpcServer::new(bus());
        let (flagged, body) =
            read(server.handle(json_request(r#"{"command":"missing"}"#)).await).await;
        assert!(flagged);
        assert_eq!(body["name"], json!("CommandHandlerNotFound"));
        assert_eq!(body["data"], json!({ "command": "missing" }));
    }

    #[tokio::test]
    async fn rejects_malformed_requests() {
        let server = RpcServer::new(bus());

        let (flagged, body) = read(server.handle(json_request("")).await).await;
        assert!(flagged);
        assert_eq!(body["name"], json!("RpcServerError"));
        assert_eq!(body["message"], json!("Missing body for command"));

        let (_, body) = read(server.handle(json_request("{not json")).await).await;
        assert!(
            body["message"]
                .as_str()
                .unwrap()
                .starts_with("Cannot deserialize body")
        );

        let (_, body) = read(server.handle(json_request(r#"{"foo":1}"#)).await).await;
        assert!(
            body["message"]
                .as_str()
                .unwrap()
                .contains("does not look like a command")
        );

        let (_, body) = read(server.handle(json_request(r#"{"command":""}"#)).await).await;
        assert!(
            body["message"]
                .as_str()
                .unwrap()
                .contains("does not look like a command")
        );
    }

    #[tokio::test]
    async fn rejects_unsupported_content_types() {
        let server = RpcServer::new(bus());

        let request = HttpRequest::builder()
            .method("POST")
            .header(CONTENT_TYPE, "text/plain")
            .body(Body::from("hello"))
            .unwrap();
        let (flagged, body) = read(server.handle(request).await).await;
        assert!(flagged);
        assert_eq!(body["message"], json!("unsupported content-type: text/plain"));

        let request = HttpRequest::builder()
            .method("POST")
            .body(Body::from(r#"{"command":"echo"}"#))
            .unwrap();
        let (flagged, body) = read(server.handle(request).await).await;
        assert!(flagged);
        assert_eq!(body["name"], json!("RpcServerError"));
    }

    #[tokio::test]
    async fn stream_results_are_piped() {
        let server = RpcServer::new(bus());
        let response = server
            .handle(json_request(r#"{"command":"download"}"#))
            .await;

        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            APPLICATION_OCTET_STREAM
        );
        assert!(response.headers().get(ERROR_HEADER).is_none());
        let raw = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&raw[..], b"payload");
    }

    #[tokio::test]
    async fn prepare_command_sees_the_request() {
        let server = RpcServer::builder()
            .runner(bus())
            .prepare_command(Arc::new(|command: Command, request: &Parts| -> BusResult<Command> {
                let user = request
                    .headers
                    .get("x-user")
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| BusError::from(CommandError::named("Unauthorized", "no user")))?
                    .to_string();
                command.into_builder().field("user", user).build()
            }))
            .build();

        let mut request = json_request(r#"{"command":"echo"}"#);
        request
            .headers_mut()
            .insert("x-user", "alice".parse().unwrap());
        let (flagged, body) = read(server.handle(request).await).await;
        assert!(!flagged);
        assert_eq!(body, json!({ "user": "alice" }));

        let (flagged, body) = read(server.handle(json_request(r#"{"command":"echo"}"#)).await).await;
        assert!(flagged);
        assert_eq!(body["name"], json!("Unauthorized"));
    }

    #[tokio::test]
    async fn hooks_observe_every_outcome() {
        let commands = Arc::new(Mutex::new(Vec::new()));
        let results = Arc::new(AtomicUsize::new(0));
        let errors = Arc::new(AtomicUsize::new(0));

        let server = RpcServer::builder()
            .runner(bus())
            .on_command({
                let commands = commands.clone();
                Arc::new(move |command: &Command| {
                    commands.lock().unwrap().push(command.name().to_string());
                })
            })
            .on_result({
                let results = results.clone();
                Arc::new(move |_output: &CommandOutput| {
                    results.fetch_add(1, Ordering::SeqCst);
                })
            })
            .on_error({
                let errors = errors.clone();
                Arc::new(move |_err: &RpcError| {
                    errors.fetch_add(1, Ordering::SeqCst);
                })
            })
            .build();

        server.handle(json_request(r#"{"command":"echo"}"#)).await;
        server.handle(json_request(r#"{"command":"fail"}"#)).await;
        server.handle(json_request("")).await;

        assert_eq!(*commands.lock().unwrap(), vec!["echo", "fail"]);
        assert_eq!(results.load(Ordering::SeqCst), 1);
        assert_eq!(errors.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn dispatch_parsed_skips_deserialization() {
        let server = RpcServer::new(bus());
        let (parts, ()) = HttpRequest::builder().body(()).unwrap().into_parts();

        let (flagged, body) = read(
            server
                .dispatch_parsed(json!({ "command": "echo", "y": true }), &parts)
                .await,
        )
        .await;
        assert!(!flagged);
        assert_eq!(body, json!({ "y": true }));

        let (flagged, body) = read(server.dispatch_parsed(Value::Null, &parts).await).await;
        assert!(flagged);
        assert_eq!(body["message"], json!("Missing body for command"));
    }
}
