//! Out-of-band resolution and delivery of magic links.
//!
//! Request handlers push a [`LinkRequest`] onto a [`DeliveryQueue`] and
//! return immediately, doing the same work whether or not the address
//! belongs to anyone. A worker task drains the queue: a [`LinkResolver`]
//! looks up the recipient and signs the link, and a [`MagicLinkMailer`]
//! sends it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use doorway_core::error::DoorwayResult;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::AuthError;

/// A sign-in link request as the client made it, before any lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRequest {
    /// Normalized when valid, otherwise trimmed and lowercased as typed.
    pub email_address: String,
    pub account_external_id: Option<u64>,
}

/// One sign-in link addressed to one identity.
#[derive(Debug, Clone)]
pub struct MagicLinkDelivery {
    pub identity_id: Uuid,
    pub email_address: String,
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// Turns a request into a signed link, or `None` when nobody should get one.
pub trait LinkResolver: Send + Sync + 'static {
    fn resolve(
        &self,
        request: &LinkRequest,
    ) -> impl Future<Output = DoorwayResult<Option<MagicLinkDelivery>>> + Send;
}

/// Sends a magic link to its recipient.
pub trait MagicLinkMailer: Send + Sync + 'static {
    fn deliver(
        &self,
        delivery: &MagicLinkDelivery,
    ) -> impl Future<Output = DoorwayResult<()>> + Send;
}

#[derive(Debug, Clone)]
pub struct DeliveryQueue {
    tx: mpsc::UnboundedSender<LinkRequest>,
}

impl DeliveryQueue {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<LinkRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn enqueue(&self, request: LinkRequest) -> Result<(), AuthError> {
        self.tx
            .send(request)
            .map_err(|_| AuthError::DeliveryUnavailable)
    }
}

/// Handle to a running delivery worker.
#[derive(Debug)]
pub struct DeliveryWorker {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl DeliveryWorker {
    /// Refuse new requests, deliver everything already queued, then
    /// wait for the worker to finish.
    pub async fn shutdown(self) {
        let _ = self.stop.send(());
        if let Err(e) = self.handle.await {
            tracing::warn!(error = %e, "delivery worker ended abnormally");
        }
    }
}

/// Drain `rx` through `resolver` into `mailer` until every queue handle
/// is dropped or [`DeliveryWorker::shutdown`] is called.
pub fn spawn_delivery_worker<R, M>(
    mut rx: mpsc::UnboundedReceiver<LinkRequest>,
    resolver: Arc<R>,
    mailer: M,
) -> DeliveryWorker
where
    R: LinkResolver,
    M: MagicLinkMailer,
{
    let (stop, mut stopped) = oneshot::channel();
    let handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                request = rx.recv() => match request {
                    Some(request) => dispatch(&*resolver, &mailer, request).await,
                    None => break,
                },
                _ = &mut stopped => {
                    rx.close();
                    while let Some(request) = rx.recv().await {
                        dispatch(&*resolver, &mailer, request).await;
                    }
                    break;
                }
            }
        }
        tracing::debug!("delivery queue closed");
    });
    DeliveryWorker { stop, handle }
}

async fn dispatch<R: LinkResolver, M: MagicLinkMailer>(
    resolver: &R,
    mailer: &M,
    request: LinkRequest,
) {
    let delivery = match resolver.resolve(&request).await {
        Ok(Some(delivery)) => delivery,
        Ok(None) => return,
        Err(e) => {
            tracing::warn!(
                account = ?request.account_external_id,
                error = %e,
                "magic link could not be prepared"
            );
            return;
        }
    };
    if let Err(e) = mailer.deliver(&delivery).await {
        tracing::warn!(
            identity_id = %delivery.identity_id,
            error = %e,
            "magic link delivery failed"
        );
    }
}

/// Development mailer that writes to the log instead of sending mail.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMailer;

impl MagicLinkMailer for LogMailer {
    async fn deliver(&self, delivery: &MagicLinkDelivery) -> DoorwayResult<()> {
        tracing::info!(
            identity_id = %delivery.identity_id,
            email = %delivery.email_address,
            expires_at = %delivery.expires_at,
            "magic link sent"
        );
        tracing::debug!(url = %delivery.url, "magic link");
        Ok(())
    }
}
