use clap::{Args, Parser, Subcommand};

use crate::config::{BrokerConfig, DEFAULT_QUEUE_CAPACITY};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run an in-process chat session against the broker and print delivery totals.
    Simulate(SimulateArgs),
}

#[derive(Args, Debug, Clone)]
pub struct BrokerArgs {
    /// Messages the broker input queue holds before senders wait.
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,
}

impl From<&BrokerArgs> for BrokerConfig {
    fn from(args: &BrokerArgs) -> Self {
        BrokerConfig::with_queue_capacity(args.queue_capacity)
    }
}

#[derive(Args, Debug, Clone)]
pub struct SimulateArgs {
    #[command(flatten)]
    pub broker: BrokerArgs,

    /// Number of simulated users, each with its own inbox.
    #[arg(long, default_value_t = 4)]
    pub users: usize,

    /// Rounds per user; every round sends one broadcast and one direct message.
    #[arg(long, default_value_t = 3)]
    pub rounds: usize,

    /// Capacity of each user's inbox. Smaller values provoke dropped deliveries.
    #[arg(long, default_value_t = 256)]
    pub inbox_capacity: usize,

    /// Seconds to wait for the router to dispatch everything.
    #[arg(long, default_value_t = 10)]
    pub timeout_secs: u64,

    /// Print the summary as JSON instead of text.
    #[arg(long)]
    pub json: bool,
}
