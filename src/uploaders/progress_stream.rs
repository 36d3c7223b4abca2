use std::pin::Pin;
use std::task::{Context, Poll};
use bytes::Bytes;
use futures::Stream;
use pin_project_lite::pin_project;
use crate::core::ProgressReporter;

/// Split a payload into body chunks without copying
pub fn chunked(payload: Bytes, chunk_size: usize) -> impl Stream<Item = std::io::Result<Bytes>> + Send + 'static {
    let chunk_size = chunk_size.max(1);
    let chunks: Vec<std::io::Result<Bytes>> = (0..payload.len())
        .step_by(chunk_size)
        .map(|start| Ok(payload.slice(start..(start + chunk_size).min(payload.len()))))
        .collect();

    futures::stream::iter(chunks)
}

pin_project! {
    /// Counts the bytes pulled out of `inner` and reports them as a
    /// percentage of `total_bytes`.
    pub struct ProgressStream<S> {
        #[pin]
        inner: S,
        reporter: ProgressReporter,
        bytes_sent: u64,
        total_bytes: u64,
    }
}

impl<S> ProgressStream<S> {
    pub fn new(inner: S, total_bytes: u64, reporter: ProgressReporter) -> Self {
        Self {
            inner,
            reporter,
            bytes_sent: 0,
            total_bytes,
        }
    }
}

impl<S> Stream for ProgressStream<S>
where
    S: Stream<Item = std::io::Result<Bytes>>
{
    type Item = std::io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();

        match this.inner.poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                if !chunk.is_empty() {
                    *this.bytes_sent += chunk.len() as u64;
                    this.reporter.report_bytes(*this.bytes_sent, *this.total_bytes);
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(None) => {
                // 流结束时发送最终进度
                this.reporter.report_bytes(*this.bytes_sent, *this.total_bytes);
                Poll::Ready(None)
            }
            other => other,
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}
