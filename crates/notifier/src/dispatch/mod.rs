//! Outbound dispatchers and the registry that selects them.

mod registry;
mod sendgrid;

pub use registry::{DispatchRegistry, DispatcherFactory};
pub use sendgrid::SendGridDispatcher;

use async_trait::async_trait;

use missive_common::error::NotifyError;
use missive_common::types::DispatchOutcome;

/// One outbound delivery attempt, already bound to its envelope.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Provider identifier, for logging.
    fn provider(&self) -> &str;

    /// Perform the delivery. Errors and `success = false` both count as failure.
    async fn dispatch(&self) -> Result<DispatchOutcome, NotifyError>;
}
