//! Chat platform abstraction for message I/O.

pub mod channel;
pub mod cli;
pub mod collector;
pub mod discord;

pub use channel::*;
pub use cli::CliChannel;
pub use collector::{PendingReply, ReplyCollector};
pub use discord::DiscordChannel;
