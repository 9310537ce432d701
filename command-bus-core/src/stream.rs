//! 二进制流（ByteStream）
//!
//! 命令附件与流式结果的统一载体：单消费者、按块产出 `io::Result<Bytes>`。
//! 未消费的流应显式丢弃，以便底层连接/通道及时释放。
//!
use bytes::{Bytes, BytesMut};
use futures_core::Stream;
use futures_core::stream::BoxStream;
use futures_util::{StreamExt, stream};
use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

pub struct ByteStream {
    inner: BoxStream<'static, io::Result<Bytes>>,
}

impl ByteStream {
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        Self {
            inner: Box::pin(stream),
        }
    }

    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self::from_chunks(vec![bytes.into()])
    }

    pub fn from_chunks<I>(chunks: I) -> Self
    where
        I: IntoIterator<Item = Bytes>,
        I::IntoIter: Send + 'static,
    {
        Self::from_stream(stream::iter(chunks.into_iter().map(Ok)))
    }

    pub fn empty() -> Self {
        Self::from_stream(stream::empty())
    }

    /// 读取全部内容（会将整个流缓冲到内存）
    pub async fn collect(self) -> io::Result<Bytes> {
        self.collect_limited(usize::MAX).await
    }

    /// 与 [`collect`](Self::collect) 相同，但超过 `limit` 字节时报错
    pub async fn collect_limited(mut self, limit: usize) -> io::Result<Bytes> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = self.inner.next().await {
            let chunk = chunk?;
            if chunk.len() > limit - buf.len() {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("stream exceeds {limit} bytes"),
                ));
            }
            buf.extend_from_slice(&chunk);
        }
        Ok(buf.freeze())
    }
}

impl Stream for ByteStream {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl fmt::Debug for ByteStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteStream").finish_non_exhaustive()
    }
}

impl From<Bytes> for ByteStream {
    fn from(bytes: Bytes) -> Self {
        Self::from_bytes(bytes)
    }
}

impl From<Vec<u8>> for ByteStream {
    fn from(bytes: Vec<u8>) -> Self {
        Self::from_bytes(bytes)
    }
}
