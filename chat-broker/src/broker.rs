use std::sync::{Arc, Mutex, PoisonError};

use tokio::{
    select,
    sync::mpsc::{self, error::TrySendError},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    config::BrokerConfig,
    error::BrokerError,
    message::Message,
    registry::{Inbox, Registry},
    stats::{DeliveryStats, DeliveryStatsSnapshot},
};

/// Routes messages from a bounded input queue to registered inboxes.
///
/// Cloning is cheap and every clone drives the same router. The router never
/// waits on a recipient: a full inbox loses that message and bumps the
/// `dropped_full` counter.
///
/// Only handles own the input sender. Once the last handle is dropped the
/// queue closes and the router exits after routing what was already queued.
#[derive(Clone)]
pub struct Broker {
    input: mpsc::Sender<Message>,
    state: Arc<BrokerState>,
}

impl Broker {
    /// Creates a broker that stops when `cancel` (or [`Broker::stop`]) fires.
    pub fn new(cancel: CancellationToken) -> Self {
        Self::with_config(cancel, BrokerConfig::default())
    }

    pub fn with_config(cancel: CancellationToken, config: BrokerConfig) -> Self {
        let (input, receiver) = mpsc::channel(config.effective_queue_capacity());
        Self {
            input,
            state: Arc::new(BrokerState {
                // A child token lets `stop` tear down this broker alone while
                // the parent still reaches it on process-wide shutdown.
                cancel: cancel.child_token(),
                pending_input: Mutex::new(Some(receiver)),
                registry: Registry::new(),
                stats: DeliveryStats::default(),
            }),
        }
    }

    /// Spawns the router loop. Can only succeed once per broker.
    ///
    /// Must be called from within a Tokio runtime; `tokio::spawn` panics
    /// otherwise.
    pub fn run(&self) -> Result<JoinHandle<()>, BrokerError> {
        let receiver = self
            .state
            .pending_input
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(BrokerError::AlreadyRunning)?;

        let state = Arc::clone(&self.state);
        Ok(tokio::spawn(route(state, receiver)))
    }

    /// Enqueues `message`, waiting for room in the input queue.
    ///
    /// Fails with [`BrokerError::Cancelled`] if the broker was already
    /// cancelled or is cancelled while waiting.
    pub async fn send_message(&self, message: Message) -> Result<(), BrokerError> {
        if self.state.cancel.is_cancelled() {
            return Err(BrokerError::Cancelled);
        }

        select! {
            biased;
            _ = self.state.cancel.cancelled() => Err(BrokerError::Cancelled),
            sent = self.input.send(message) => sent.map_err(|_| BrokerError::Stopped),
        }
    }

    /// Enqueues `message` only if the input queue has room right now.
    pub fn try_send_message(&self, message: Message) -> Result<(), BrokerError> {
        if self.state.cancel.is_cancelled() {
            return Err(BrokerError::Cancelled);
        }

        self.input.try_send(message).map_err(|err| match err {
            TrySendError::Full(_) => BrokerError::Backpressure,
            TrySendError::Closed(_) => BrokerError::Stopped,
        })
    }

    /// Makes `inbox` the destination for `user_id`, replacing any earlier one.
    pub async fn register_user(&self, user_id: impl Into<String>, inbox: Inbox) {
        let user_id = user_id.into();
        if self
            .state
            .registry
            .register(user_id.clone(), inbox)
            .await
            .is_some()
        {
            debug!(%user_id, "replaced existing registration");
        } else {
            debug!(%user_id, "registered user");
        }
    }

    /// Removes `user_id` from routing. Absent ids are ignored.
    pub async fn unregister_user(&self, user_id: &str) {
        if self.state.registry.unregister(user_id).await {
            debug!(%user_id, "unregistered user");
        }
    }

    pub async fn is_registered(&self, user_id: &str) -> bool {
        self.state.registry.contains(user_id).await
    }

    /// Currently registered ids, sorted.
    pub async fn registered_users(&self) -> Vec<String> {
        self.state.registry.ids().await
    }

    /// Stops this broker without touching the parent token.
    pub fn stop(&self) {
        self.state.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancel.is_cancelled()
    }

    pub fn stats(&self) -> DeliveryStatsSnapshot {
        self.state.stats.snapshot()
    }
}

struct BrokerState {
    cancel: CancellationToken,
    pending_input: Mutex<Option<mpsc::Receiver<Message>>>,
    registry: Registry,
    stats: DeliveryStats,
}

impl BrokerState {
    async fn dispatch(&self, message: Message) {
        if message.broadcast {
            self.fan_out(message).await;
        } else {
            self.unicast(message).await;
        }
        self.stats.record_dispatched();
    }

    async fn unicast(&self, message: Message) {
        match self.registry.lookup(&message.recipient).await {
            Some(inbox) => {
                let recipient = message.recipient.clone();
                self.deliver(&recipient, &inbox, message);
            }
            None => {
                self.stats.record_unroutable();
                warn!(
                    sender = %message.sender,
                    recipient = %message.recipient,
                    "no inbox registered for recipient, dropping message"
                );
            }
        }
    }

    async fn fan_out(&self, message: Message) {
        // The snapshot is taken under a read guard that is released before any send.
        let recipients = self.registry.snapshot().await;
        if recipients.is_empty() {
            debug!(sender = %message.sender, "broadcast with no registered users");
            return;
        }

        for (user_id, inbox) in &recipients {
            self.deliver(user_id, inbox, message.clone());
        }
    }

    fn deliver(&self, user_id: &str, inbox: &Inbox, message: Message) {
        match inbox.try_send(message) {
            Ok(()) => self.stats.record_delivered(),
            Err(TrySendError::Full(message)) => {
                self.stats.record_dropped_full();
                warn!(
                    %user_id,
                    sender = %message.sender,
                    "inbox full, dropping message"
                );
            }
            Err(TrySendError::Closed(_)) => {
                self.stats.record_dropped_closed();
                debug!(%user_id, "inbox closed, dropping message");
            }
        }
    }
}

async fn route(state: Arc<BrokerState>, mut input: mpsc::Receiver<Message>) {
    info!("broker router started");

    loop {
        select! {
            biased;
            _ = state.cancel.cancelled() => break,
            next = input.recv() => match next {
                Some(message) => state.dispatch(message).await,
                None => break,
            },
        }
    }

    input.close();
    let discarded = input.len();
    if discarded > 0 {
        warn!(discarded, "broker stopped with undispatched messages");
    }
    info!("broker router stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_twice_is_rejected() {
        let broker = Broker::new(CancellationToken::new());
        let handle = broker.run().expect("first run starts the router");

        assert_eq!(broker.run().err(), Some(BrokerError::AlreadyRunning));

        broker.stop();
        handle.await.expect("router exits cleanly");
    }

    #[tokio::test]
    async fn stop_does_not_cancel_parent_token() {
        let parent = CancellationToken::new();
        let broker = Broker::new(parent.clone());

        broker.stop();

        assert!(broker.is_cancelled());
        assert!(!parent.is_cancelled());
    }

    #[tokio::test]
    async fn parent_cancellation_reaches_broker() {
        let parent = CancellationToken::new();
        let broker = Broker::new(parent.clone());

        parent.cancel();

        assert!(broker.is_cancelled());
        assert_eq!(
            broker.send_message(Message::broadcast("alice", "late")).await,
            Err(BrokerError::Cancelled)
        );
    }

    #[tokio::test]
    async fn try_send_reports_backpressure_on_full_queue() {
        let broker = Broker::with_config(
            CancellationToken::new(),
            BrokerConfig::with_queue_capacity(1),
        );

        broker
            .try_send_message(Message::broadcast("alice", "first"))
            .expect("queue has room for one message");
        assert_eq!(
            broker.try_send_message(Message::broadcast("alice", "second")),
            Err(BrokerError::Backpressure)
        );
    }

    #[tokio::test]
    async fn full_inbox_is_counted_as_drop() {
        let broker = Broker::new(CancellationToken::new());
        let (tx, mut rx) = mpsc::channel(1);
        broker.register_user("bob", tx).await;

        broker
            .state
            .dispatch(Message::direct("alice", "bob", "one"))
            .await;
        broker
            .state
            .dispatch(Message::direct("alice", "bob", "two"))
            .await;

        let stats = broker.stats();
        assert_eq!(stats.dispatched, 2);
        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.dropped_full, 1);
        assert_eq!(rx.recv().await.map(|m| m.content), Some("one".into()));
    }

    #[tokio::test]
    async fn closed_inbox_is_counted_as_drop() {
        let broker = Broker::new(CancellationToken::new());
        let (tx, rx) = mpsc::channel(4);
        broker.register_user("bob", tx).await;
        drop(rx);

        broker
            .state
            .dispatch(Message::direct("alice", "bob", "gone"))
            .await;

        assert_eq!(broker.stats().dropped_closed, 1);
        assert_eq!(broker.stats().dropped(), 1);
    }

    #[tokio::test]
    async fn router_exits_once_every_handle_is_dropped() {
        let broker = Broker::new(CancellationToken::new());
        let second = broker.clone();
        let router = broker.run().expect("router starts");

        drop(broker);
        assert!(!router.is_finished());
        drop(second);

        tokio::time::timeout(std::time::Duration::from_secs(1), router)
            .await
            .expect("router exits after the last handle is dropped")
            .expect("router exits cleanly");
    }

    #[tokio::test]
    async fn cancellation_mid_dispatch_leaves_rest_of_queue_undispatched() {
        let shutdown = CancellationToken::new();
        let broker = Broker::new(shutdown.clone());
        let (tx, mut rx) = mpsc::channel(16);
        broker.register_user("bob", tx).await;
        let router = broker.run().expect("router starts");

        // Holding the registry exclusively parks the router inside its first lookup.
        let guard = broker.state.registry.hold_exclusive().await;
        for sequence in 0..5 {
            broker
                .send_message(Message::direct("alice", "bob", sequence.to_string()))
                .await
                .expect("queue has room");
        }

        let queue_capacity = BrokerConfig::default().queue_capacity;
        tokio::time::timeout(std::time::Duration::from_secs(1), async {
            while broker.input.capacity() < queue_capacity - 4 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("router takes the first message");

        shutdown.cancel();
        drop(guard);
        tokio::time::timeout(std::time::Duration::from_secs(1), router)
            .await
            .expect("router stops after cancellation")
            .expect("router exits cleanly");

        assert_eq!(broker.stats().dispatched, 1);
        assert_eq!(rx.recv().await.map(|m| m.content), Some("0".into()));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    #[should_panic]
    fn run_outside_a_runtime_panics() {
        let broker = Broker::new(CancellationToken::new());
        let _ = broker.run();
    }
}
