pub mod coalesce;
pub mod config;
pub mod error;
pub mod fleet;
pub mod logging;
pub mod transport;

pub use coalesce::{request_key, with_rate_limit_backoff, Coalescer};
pub use config::Config;
pub use error::RelayError;
pub use fleet::board::FleetBoard;
pub use fleet::dispatcher::{CommandDispatcher, Notifier};
pub use fleet::models::{
    CommandKind, CommandOutcome, OutcomeStatus, RobotInfo, RobotPresence, RobotStatus,
};
pub use fleet::poller::{PollHandle, StatusPoller};
pub use transport::{HttpRelayTransport, RelayTransport};
