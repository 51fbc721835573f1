//! In-process message bus connecting the execution contexts.
//!
//! Every endpoint registers a handler; each inbound message runs in its own task,
//! so two requests to the same endpoint may complete in either order.

use super::protocol::{Endpoint, Request, Response};
use crate::error::BusError;
use arc_swap::ArcSwap;
use async_trait::async_trait;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Default inbox size per endpoint.
pub const DEFAULT_CHANNEL_SIZE: usize = 64;

/// Handles messages delivered to one endpoint.
///
/// Returning `None` sends no reply; the sender sees the same outcome as an
/// absent listener.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    async fn handle(&self, from: Endpoint, request: Request) -> Option<Response>;
}

struct Envelope {
    from: Endpoint,
    request: Request,
    reply: Option<oneshot::Sender<Response>>,
}

type Routes = FxHashMap<Endpoint, mpsc::Sender<Envelope>>;

#[derive(Clone)]
pub struct MessageBus {
    routes: Arc<ArcSwap<Routes>>,
    default_timeout: Duration,
}

/// Registration of a handler. Dropping it unregisters the endpoint.
pub struct Listener {
    endpoint: Endpoint,
    routes: Arc<ArcSwap<Routes>>,
    inbox: mpsc::Sender<Envelope>,
    task: JoinHandle<()>,
}

impl MessageBus {
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            routes: Arc::new(ArcSwap::from_pointee(Routes::default())),
            default_timeout,
        }
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    pub fn is_listening(&self, endpoint: Endpoint) -> bool {
        self.routes.load().contains_key(&endpoint)
    }

    /// Registers `handler` for `endpoint`, replacing any previous listener.
    pub fn on_message(&self, endpoint: Endpoint, handler: Arc<dyn MessageHandler>) -> Listener {
        let (tx, mut rx) = mpsc::channel::<Envelope>(DEFAULT_CHANNEL_SIZE);

        let task = tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                let handler = handler.clone();
                tokio::spawn(async move {
                    let Envelope {
                        from,
                        request,
                        reply,
                    } = envelope;
                    let response = handler.handle(from, request).await;
                    if let (Some(reply), Some(response)) = (reply, response) {
                        // Caller may have given up already
                        let _ = reply.send(response);
                    }
                });
            }
        });

        let inbox = tx.clone();
        self.routes.rcu(|routes| {
            let mut next = Routes::clone(routes);
            next.insert(endpoint, inbox.clone());
            next
        });
        debug!("Listener registered for {}", endpoint);

        Listener {
            endpoint,
            routes: self.routes.clone(),
            inbox: tx,
            task,
        }
    }

    pub async fn send(
        &self,
        from: Endpoint,
        target: Endpoint,
        request: Request,
    ) -> Result<Response, BusError> {
        self.send_with_timeout(from, target, request, self.default_timeout)
            .await
    }

    /// Request/response with an explicit bound on the wait.
    pub async fn send_with_timeout(
        &self,
        from: Endpoint,
        target: Endpoint,
        request: Request,
        timeout: Duration,
    ) -> Result<Response, BusError> {
        let sender = self
            .routes
            .load()
            .get(&target)
            .cloned()
            .ok_or(BusError::NoListener(target))?;

        let (reply_tx, reply_rx) = oneshot::channel();
        let name = request.name();
        let exchange = async move {
            sender
                .send(Envelope {
                    from,
                    request,
                    reply: Some(reply_tx),
                })
                .await
                .map_err(|_| BusError::NoListener(target))?;
            reply_rx.await.map_err(|_| BusError::NoListener(target))
        };

        match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(_) => {
                debug!("{} -> {}: {} timed out after {:?}", from, target, name, timeout);
                Err(BusError::Timeout(target))
            }
        }
    }

    /// Fire-and-forget. Never waits: an absent target or a full inbox is reported
    /// and the message is dropped.
    pub fn post(&self, from: Endpoint, target: Endpoint, request: Request) -> Result<(), BusError> {
        let routes = self.routes.load();
        let sender = routes.get(&target).ok_or(BusError::NoListener(target))?;
        let name = request.name();
        sender
            .try_send(Envelope {
                from,
                request,
                reply: None,
            })
            .map_err(|e| match e {
                TrySendError::Full(_) => {
                    warn!("Inbox of {} is full; dropping {}", target, name);
                    BusError::Full(target)
                }
                TrySendError::Closed(_) => {
                    debug!("{} went away; dropping {}", target, name);
                    BusError::NoListener(target)
                }
            })
    }
}

impl Listener {
    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        let inbox = &self.inbox;
        let endpoint = self.endpoint;
        // Only remove the route if it still points at this listener
        self.routes.rcu(|routes| {
            let mut next = Routes::clone(routes);
            if next.get(&endpoint).is_some_and(|s| s.same_channel(inbox)) {
                next.remove(&endpoint);
            }
            next
        });
        self.task.abort();
        debug!("Listener for {} dropped", endpoint);
    }
}
