//! Response body handling.
//!
//! # Responsibilities
//! - Hold the backend reservation until the body has been handed to the connection
//! - Report bodies dropped while they still hold unsent data
//!
//! # Design Decisions
//! - Only a drop before the data frame was taken is visible here. A client
//!   that leaves before the handler returns cancels the handler instead, and
//!   a socket error after the frame was taken never reaches the body.
//! - Nothing is retried once the status is decided

use hyper::body::{Body as HttpBody, Bytes, Frame, SizeHint};
use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::http::proxy::DispatchError;
use crate::load_balancer::BackendGuard;
use crate::observability::metrics;

/// Single-chunk body that owns a [`BackendGuard`].
#[derive(Debug)]
pub struct GuardedBody {
    data: Option<Bytes>,
    guard: Option<BackendGuard>,
}

impl GuardedBody {
    pub fn new(data: impl Into<Bytes>, guard: BackendGuard) -> Self {
        let data: Bytes = data.into();
        Self {
            data: (!data.is_empty()).then_some(data),
            guard: Some(guard),
        }
    }

    pub fn empty(guard: BackendGuard) -> Self {
        Self {
            data: None,
            guard: Some(guard),
        }
    }
}

impl HttpBody for GuardedBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.data.take() {
            Some(data) => Poll::Ready(Some(Ok(Frame::data(data)))),
            None => {
                self.guard.take();
                Poll::Ready(None)
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.data.is_none()
    }

    fn size_hint(&self) -> SizeHint {
        let len = self.data.as_ref().map_or(0, |d| d.len() as u64);
        SizeHint::with_exact(len)
    }
}

impl Drop for GuardedBody {
    fn drop(&mut self) {
        let Some(guard) = self.guard.take() else {
            return;
        };
        // connection gave up before the data frame was taken
        if self.data.is_some() {
            let err = DispatchError::ResponseWriteFailed {
                address: guard.address().to_string(),
            };
            tracing::warn!(backend = %guard.address(), error = %err, "Response abandoned before it was written");
            metrics::record_write_failure(guard.address());
        }
        drop(guard);
    }
}
