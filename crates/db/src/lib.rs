pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;
pub mod service;
pub mod sweep;

pub use connection::{
    begin_immediate, connect, connect_with_config, connect_with_settings, DbPool, DbTransaction,
};
pub use fixtures::{HelpdeskSeedDataset, SeedResult, TicketSeedInfo, VerificationResult};
pub use repositories::{ReportWindow, RepositoryError, SqlComplianceAnalytics, SqlEngineStore};
pub use service::{new_correlation_id, SlaService};
pub use sweep::{run_auto_close, SweepFailure, SweepReport};
