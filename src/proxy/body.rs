//! Response body adapter bounding the size of forwarded chunks.

use bytes::Bytes;
use hyper::body::{Body, Frame, SizeHint};
use hyper::HeaderMap;
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

pin_project! {
    /// Re-frames an upstream body into data frames of at most `chunk_size`
    /// bytes. Frames already taken from the upstream body can be put back in
    /// front with `with_prefix`.
    pub struct ChunkedBody<B> {
        #[pin]
        inner: B,
        pending: Bytes,
        trailers: Option<HeaderMap>,
        chunk_size: usize,
    }
}

impl<B> ChunkedBody<B> {
    /// Wrap a body. A `chunk_size` of 0 is treated as 1.
    pub fn new(inner: B, chunk_size: usize) -> Self {
        Self {
            inner,
            pending: Bytes::new(),
            trailers: None,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Wrap a body whose first frame was already read.
    pub fn with_prefix(inner: B, first: Option<Frame<Bytes>>, chunk_size: usize) -> Self {
        let mut body = Self::new(inner, chunk_size);
        if let Some(frame) = first {
            match frame.into_data() {
                Ok(data) => body.pending = data,
                Err(frame) => body.trailers = frame.into_trailers().ok(),
            }
        }
        body
    }
}

impl<B> Body for ChunkedBody<B>
where
    B: Body<Data = Bytes>,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, Self::Error>>> {
        let mut this = self.project();

        loop {
            if !this.pending.is_empty() {
                let n = this.pending.len().min(*this.chunk_size);
                return Poll::Ready(Some(Ok(Frame::data(this.pending.split_to(n)))));
            }

            if let Some(trailers) = this.trailers.take() {
                return Poll::Ready(Some(Ok(Frame::trailers(trailers))));
            }

            match ready!(this.inner.as_mut().poll_frame(cx)) {
                Some(Ok(frame)) => match frame.into_data() {
                    // Empty data frames are dropped by looping.
                    Ok(data) => *this.pending = data,
                    Err(frame) => return Poll::Ready(Some(Ok(frame))),
                },
                other => return Poll::Ready(other),
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.pending.is_empty() && self.trailers.is_none() && self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        let inner = self.inner.size_hint();
        let pending = self.pending.len() as u64;

        // Upper first: set_lower panics when it would exceed the upper bound.
        let mut hint = SizeHint::new();
        if let Some(upper) = inner.upper() {
            hint.set_upper(upper.saturating_add(pending));
        }
        hint.set_lower(inner.lower().saturating_add(pending));
        hint
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::{BodyExt, Full, StreamBody};
    use std::convert::Infallible;

    async fn frame_sizes<B>(mut body: B) -> Vec<usize>
    where
        B: Body<Data = Bytes> + Unpin,
        B::Error: std::fmt::Debug,
    {
        let mut sizes = Vec::new();
        while let Some(frame) = body.frame().await {
            if let Ok(data) = frame.unwrap().into_data() {
                sizes.push(data.len());
            }
        }
        sizes
    }

    #[tokio::test]
    async fn test_splits_large_frames() {
        let body = ChunkedBody::new(Full::new(Bytes::from(vec![7u8; 20_000])), 8192);
        assert_eq!(frame_sizes(body).await, vec![8192, 8192, 3616]);
    }

    #[tokio::test]
    async fn test_small_frames_pass_through() {
        let frames = vec![
            Ok::<_, Infallible>(Frame::data(Bytes::from_static(b"abc"))),
            Ok(Frame::data(Bytes::new())),
            Ok(Frame::data(Bytes::from_static(b"de"))),
        ];
        let body = ChunkedBody::new(StreamBody::new(futures::stream::iter(frames)), 8192);
        assert_eq!(frame_sizes(body).await, vec![3, 2]);
    }

    #[tokio::test]
    async fn test_prefix_comes_first() {
        let rest = Full::new(Bytes::from_static(b" world"));
        let first = Some(Frame::data(Bytes::from_static(b"hello")));
        let body = ChunkedBody::with_prefix(rest, first, 4);

        assert_eq!(body.size_hint().exact(), Some(11));
        let collected = body.collect().await.unwrap().to_bytes();
        assert_eq!(&collected[..], b"hello world");
    }

    #[tokio::test]
    async fn test_trailers_forwarded() {
        let mut trailers = HeaderMap::new();
        trailers.insert("x-checksum", "abc".parse().unwrap());
        let frames = vec![
            Ok::<_, Infallible>(Frame::data(Bytes::from_static(b"body"))),
            Ok(Frame::trailers(trailers)),
        ];
        let body = ChunkedBody::new(StreamBody::new(futures::stream::iter(frames)), 2);

        let collected = body.collect().await.unwrap();
        assert_eq!(collected.trailers().unwrap()["x-checksum"], "abc");
        assert_eq!(&collected.to_bytes()[..], b"body");
    }

    #[test]
    fn test_empty_body_is_end_stream() {
        let body = ChunkedBody::with_prefix(Full::new(Bytes::new()), None, 8192);
        assert!(body.is_end_stream());
        assert_eq!(body.size_hint().exact(), Some(0));
    }
}
