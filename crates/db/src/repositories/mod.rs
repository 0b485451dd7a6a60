use routedesk_core::chrono::{DateTime, SecondsFormat, Utc};
use routedesk_core::errors::ApplicationError;
use thiserror::Error;

pub mod analytics;
pub mod engine_store;

pub use analytics::{
    ActiveGroup, ComplianceDashboard, GroupLogRecord, GroupPerformance, GroupViolationSummary,
    ReportWindow, SqlComplianceAnalytics, TicketSlaInfo, TicketViolationRecord,
    ViolationTypeSummary,
};
pub use engine_store::SqlEngineStore;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for ApplicationError {
    fn from(error: RepositoryError) -> Self {
        ApplicationError::Persistence(error.to_string())
    }
}

/// Storage encoding for every timestamp column. Fixed width with a `Z`
/// suffix so that text comparison in SQL matches chronological order.
pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

pub(crate) fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|timestamp| parse_timestamp(column, timestamp)).transpose()
}

pub(crate) fn parse_bool_flag(column: &str, value: i64) -> Result<bool, RepositoryError> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        raw => Err(RepositoryError::Decode(format!("invalid boolean flag for `{column}`: {raw}"))),
    }
}

pub(crate) fn parse_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!(
            "invalid value for `{column}` (expected non-negative u32): {value}"
        ))
    })
}

#[cfg(test)]
mod tests {
    use routedesk_core::chrono::{DateTime, Duration, Utc};
    use routedesk_core::errors::ApplicationError;

    use super::{format_timestamp, parse_bool_flag, parse_timestamp, RepositoryError};

    #[test]
    fn stored_timestamps_sort_lexically_in_time_order() {
        let earlier = DateTime::parse_from_rfc3339("2026-03-01T09:00:00Z")
            .expect("valid rfc3339")
            .with_timezone(&Utc);
        let later = earlier + Duration::milliseconds(1500);

        let (a, b) = (format_timestamp(earlier), format_timestamp(later));
        assert_eq!(a, "2026-03-01T09:00:00.000Z");
        assert!(a < b);
        assert_eq!(parse_timestamp("at", b).expect("parse stored timestamp"), later);
    }

    #[test]
    fn decode_failures_surface_as_persistence_errors() {
        let error = parse_bool_flag("is_active", 7).expect_err("7 is not a flag");
        assert!(matches!(error, RepositoryError::Decode(_)));

        let application = ApplicationError::from(error);
        assert!(matches!(
            application,
            ApplicationError::Persistence(ref message) if message.contains("is_active")
        ));
    }
}
