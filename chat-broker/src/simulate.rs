//! Self-contained chat session used by the `simulate` command.
//!
//! Every simulated user is added to a [`Directory`], registers an inbox with
//! the [`Broker`], and then acts as both producer and consumer: each round it
//! broadcasts once and sends one direct message to the next user.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tokio::{sync::mpsc, task::JoinSet, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    broker::Broker,
    cli::SimulateArgs,
    config::BrokerConfig,
    directory::{Directory, User},
    message::Message,
    stats::DeliveryStatsSnapshot,
};

const DISPATCH_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Summary {
    pub users: usize,
    pub submitted: u64,
    pub received: u64,
    pub stats: DeliveryStatsSnapshot,
}

impl Summary {
    pub fn render(&self) -> String {
        format!(
            "simulation finished: users={} submitted={} received={} delivered={} dropped={} unroutable={}",
            self.users,
            self.submitted,
            self.received,
            self.stats.delivered,
            self.stats.dropped(),
            self.stats.unroutable
        )
    }
}

pub async fn run(args: SimulateArgs, shutdown: CancellationToken) -> Result<Summary> {
    if args.users == 0 {
        bail!("at least one user is required");
    }

    let broker = Broker::with_config(shutdown.clone(), BrokerConfig::from(&args.broker));
    let directory = Directory::with_cancellation(shutdown.clone());
    let router = broker.run()?;

    let user_ids = enroll_users(&broker, &directory, &args).await?;
    let mut consumers = spawn_consumers(&broker, &user_ids, args.inbox_capacity).await;

    let submitted = produce(&broker, &user_ids, args.rounds).await?;
    wait_for_dispatch(&broker, submitted, Duration::from_secs(args.timeout_secs)).await?;

    // Dropping the registry's senders lets each consumer drain and finish.
    for user_id in &user_ids {
        broker.unregister_user(user_id).await;
        directory.remove_user(user_id).await?;
    }

    let mut received = 0;
    while let Some(count) = consumers.join_next().await {
        received += count.context("consumer task panicked")?;
    }

    broker.stop();
    router.await.context("broker router panicked")?;

    let summary = Summary {
        users: user_ids.len(),
        submitted,
        received,
        stats: broker.stats(),
    };
    info!(
        submitted,
        received,
        dropped = summary.stats.dropped(),
        "simulation complete"
    );
    Ok(summary)
}

async fn enroll_users(
    broker: &Broker,
    directory: &Directory,
    args: &SimulateArgs,
) -> Result<Vec<String>> {
    let mut user_ids = Vec::with_capacity(args.users);
    for index in 0..args.users {
        let user = User::new(
            format!("user-{index}"),
            format!("User {index}"),
            format!("user{index}@example.com"),
        )?;
        user_ids.push(user.id.clone());
        directory.add_user(user).await?;
    }
    info!(users = user_ids.len(), "enrolled users");
    Ok(user_ids)
}

async fn spawn_consumers(
    broker: &Broker,
    user_ids: &[String],
    inbox_capacity: usize,
) -> JoinSet<u64> {
    let mut consumers = JoinSet::new();
    for user_id in user_ids {
        let (inbox, mut receiver) = mpsc::channel::<Message>(inbox_capacity.max(1));
        broker.register_user(user_id.clone(), inbox).await;
        consumers.spawn(async move {
            let mut count = 0;
            while receiver.recv().await.is_some() {
                count += 1;
            }
            count
        });
    }
    consumers
}

async fn produce(broker: &Broker, user_ids: &[String], rounds: usize) -> Result<u64> {
    let mut producers = JoinSet::new();
    for (index, sender) in user_ids.iter().enumerate() {
        let broker = broker.clone();
        let sender = sender.clone();
        let next = user_ids[(index + 1) % user_ids.len()].clone();
        producers.spawn(async move {
            let mut sent = 0u64;
            for round in 0..rounds {
                broker
                    .send_message(Message::broadcast(&sender, format!("round {round} from {sender}")))
                    .await?;
                broker
                    .send_message(Message::direct(&sender, &next, format!("round {round} hello {next}")))
                    .await?;
                sent += 2;
            }
            anyhow::Ok(sent)
        });
    }

    let mut submitted = 0;
    while let Some(result) = producers.join_next().await {
        submitted += result.context("producer task panicked")??;
    }
    Ok(submitted)
}

async fn wait_for_dispatch(broker: &Broker, submitted: u64, limit: Duration) -> Result<()> {
    let deadline = Instant::now() + limit;
    while broker.stats().dispatched < submitted {
        if broker.is_cancelled() {
            bail!("broker cancelled before all messages were dispatched");
        }
        if Instant::now() >= deadline {
            warn!(
                dispatched = broker.stats().dispatched,
                submitted, "timed out waiting for dispatch"
            );
            bail!("timed out waiting for the broker to dispatch {submitted} messages");
        }
        tokio::time::sleep(DISPATCH_POLL_INTERVAL).await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::BrokerArgs;

    fn args(users: usize, rounds: usize, inbox_capacity: usize) -> SimulateArgs {
        SimulateArgs {
            broker: BrokerArgs { queue_capacity: 8 },
            users,
            rounds,
            inbox_capacity,
            timeout_secs: 5,
            json: false,
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn every_delivery_is_received_with_roomy_inboxes() {
        let summary = run(args(3, 2, 64), CancellationToken::new())
            .await
            .expect("simulation succeeds");

        // Each user sends `rounds` broadcasts to every user plus `rounds` direct messages.
        assert_eq!(summary.submitted, 12);
        assert_eq!(summary.received, 3 * 3 * 2 + 3 * 2);
        assert_eq!(summary.stats.delivered, summary.received);
        assert_eq!(summary.stats.dropped(), 0);
        assert_eq!(summary.stats.unroutable, 0);
    }

    #[tokio::test]
    async fn zero_users_is_rejected() {
        assert!(run(args(0, 1, 1), CancellationToken::new()).await.is_err());
    }

    #[tokio::test]
    async fn cancelled_session_fails() {
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        assert!(run(args(2, 1, 8), shutdown).await.is_err());
    }
}
