use std::sync::Arc;

use async_trait::async_trait;
use vpph_context::CallContext;

/// Remote-call capability: one request in, one reply or failure out.
///
/// Implementations must honor `ctx`: stop waiting once [`CallContext::done`] resolves.
/// Message contents are opaque to everything in this crate.
#[async_trait]
pub trait Connection: Send + Sync {
    type Request: Send + Sync;
    type Reply: Send;
    type Error: Send;

    async fn invoke(
        &self,
        ctx: &CallContext,
        request: &Self::Request,
    ) -> Result<Self::Reply, Self::Error>;
}

#[async_trait]
impl<C> Connection for Arc<C>
where
    C: Connection + ?Sized,
{
    type Request = C::Request;
    type Reply = C::Reply;
    type Error = C::Error;

    async fn invoke(
        &self,
        ctx: &CallContext,
        request: &Self::Request,
    ) -> Result<Self::Reply, Self::Error> {
        (**self).invoke(ctx, request).await
    }
}

#[async_trait]
impl<C> Connection for Box<C>
where
    C: Connection + ?Sized,
{
    type Request = C::Request;
    type Reply = C::Reply;
    type Error = C::Error;

    async fn invoke(
        &self,
        ctx: &CallContext,
        request: &Self::Request,
    ) -> Result<Self::Reply, Self::Error> {
        (**self).invoke(ctx, request).await
    }
}
