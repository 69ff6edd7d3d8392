//! Phase timing helpers.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::error::{Phase, ProbeError};

/// Milliseconds elapsed since `since`.
pub(crate) fn millis_since(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Run `fut` under `limit`, mapping expiry to a timeout in `phase`.
pub(crate) async fn bounded<T, F>(limit: Duration, phase: Phase, fut: F) -> Result<T, ProbeError>
where
    F: Future<Output = Result<T, ProbeError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(ProbeError::Timeout(phase)),
    }
}

/// Like [`bounded`], also returning how long `fut` took in milliseconds.
pub(crate) async fn timed<T, F>(limit: Duration, phase: Phase, fut: F) -> Result<(T, u64), ProbeError>
where
    F: Future<Output = Result<T, ProbeError>>,
{
    let start = Instant::now();
    let value = bounded(limit, phase, fut).await?;
    Ok((value, millis_since(start)))
}

/// Stream wrapper that remembers when the first byte was read.
pub(crate) struct FirstByte<T> {
    inner: T,
    seen: Arc<OnceLock<Instant>>,
}

impl<T> FirstByte<T> {
    pub(crate) fn new(inner: T) -> (Self, Arc<OnceLock<Instant>>) {
        let seen = Arc::new(OnceLock::new());
        (Self { inner, seen: Arc::clone(&seen) }, seen)
    }
}

impl<T: AsyncRead + Unpin> AsyncRead for FirstByte<T> {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        let poll = Pin::new(&mut this.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = poll {
            if buf.filled().len() > before {
                let _ = this.seen.set(Instant::now());
            }
        }
        poll
    }
}

impl<T: AsyncWrite + Unpin> AsyncWrite for FirstByte<T> {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}
