//! In-memory chat message broker.
//!
//! Producers submit [`message::Message`]s to a [`broker::Broker`], whose single
//! router task hands each one to the addressed user's inbox or, for
//! broadcasts, to every registered inbox. Each module has one job:
//!
//! - [`broker`] owns the input queue, the router loop and shutdown.
//! - [`registry`] maps user ids to inbox senders behind a reader/writer lock.
//! - [`directory`] stores user identity records, independent of routing.
//! - [`message`] defines the routed value type and its validation.
//! - [`stats`] counts deliveries and drops.
//! - [`error`] holds the error types returned by all of the above.
//! - [`config`] and [`cli`] configure the broker and the demo binary.
//! - [`simulate`] drives a full in-process session for the `simulate` command.
//!
//! Routing never blocks on a recipient. A full inbox loses the message and
//! the drop is counted, so one slow consumer can't stall everyone else.

pub mod broker;
pub mod cli;
pub mod config;
pub mod directory;
pub mod error;
pub mod message;
pub mod registry;
pub mod simulate;
pub mod stats;

pub use broker::Broker;
pub use config::BrokerConfig;
pub use directory::{Directory, User};
pub use error::{BrokerError, DirectoryError, ValidationError};
pub use message::Message;
pub use registry::Inbox;
pub use stats::DeliveryStatsSnapshot;
