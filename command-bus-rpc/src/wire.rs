//! 线上协议常量
//!
//! 单一 POST 路径；请求体为 JSON 或 `multipart/form-data`，
//! 成功与业务错误均返回 200，错误以响应头 `X-command-bus-error: 1` 标记。
//!

/// 错误标记头（HTTP 头大小写不敏感，此处使用规范化的小写形式）
pub const ERROR_HEADER: &str = "x-command-bus-error";
pub const ERROR_FLAG: &str = "1";

/// multipart 中承载普通命令字段的部分
pub const COMMAND_BODY_FIELD: &str = "commandBody";
/// multipart 中的附件清单：按线上顺序排列的附件名 JSON 数组
pub const ATTACHMENTS_FIELD: &str = "commandAttachments";

pub const APPLICATION_OCTET_STREAM: &str = "application/octet-stream";
pub const MULTIPART_FORM_DATA: &str = "multipart/form-data";

/// 取内容类型的媒体类型部分（去掉参数并转小写）
pub fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}
