use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_channel::oneshot;

use super::borrower::Verdict;
use super::error::PoolError;
use super::PoolInner;
use crate::resource::PooledRef;

enum AcquireState<R: Send + 'static, E: Send + 'static> {
    Init,
    Waiting(oneshot::Receiver<Verdict<R, E>>),
}

/// A future resolving to a [`PooledRef`] or a [`PoolError`].
///
/// It is cold: nothing is registered with the pool until it is first polled.
/// Dropping it before completion cancels the outstanding acquisition; if a
/// delivery wins that race the delivered reference is released back to the
/// pool automatically.
pub struct Acquire<R: Send + 'static, E: Send + 'static> {
    pool: Arc<PoolInner<R, E>>,
    state: Option<AcquireState<R, E>>,
}

impl<R: Send, E: Send> Acquire<R, E> {
    pub(crate) fn new(pool: Arc<PoolInner<R, E>>) -> Self {
        Self {
            pool,
            state: Some(AcquireState::Init),
        }
    }
}

impl<R: Send, E: Send> Future for Acquire<R, E> {
    type Output = Result<PooledRef<R, E>, PoolError<E>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = match self.state.take() {
            Some(state) => state,
            None => {
                // future already completed
                return Poll::Ready(Err(PoolError::Shutdown));
            }
        };

        loop {
            state = match state {
                AcquireState::Init => match self.pool.subscribe() {
                    Ok(receiver) => AcquireState::Waiting(receiver),
                    Err(err) => return Poll::Ready(Err(err)),
                },

                AcquireState::Waiting(mut receiver) => {
                    match Pin::new(&mut receiver).poll(cx) {
                        Poll::Pending => {
                            self.state = Some(AcquireState::Waiting(receiver));
                            return Poll::Pending;
                        }
                        Poll::Ready(Ok(verdict)) => return Poll::Ready(verdict),
                        Poll::Ready(Err(oneshot::Canceled)) => {
                            // The pool dropped the borrower without a verdict;
                            // it is no longer serving acquisitions.
                            return Poll::Ready(Err(PoolError::Shutdown));
                        }
                    }
                }
            };
        }
    }
}
