pub mod config;
pub mod domain;
pub mod engine;
pub mod errors;
pub mod residency;
pub mod resolution;
pub mod routing;

pub use chrono;

pub use domain::group::{GroupId, MemberCandidate, Membership, UserId};
pub use domain::residency::{IntervalRelease, NewResidencyInterval, ResidencyId, TicketGroupLogEntry};
pub use domain::service::{ServiceClassification, ServiceCombo, ServiceId, TicketServiceId};
pub use domain::sla::{Sla, SlaGroupBudget, SlaId, SlaMapping};
pub use domain::ticket::{StatusId, TicketId, TicketSnapshot};
pub use domain::violation::{NewSlaViolation, SlaViolation, ViolationId, ViolationType};
pub use engine::{
    AssignmentChangeOutcome, Clock, EngineStore, ManualClock, SlaEngine, SystemClock,
    TicketClosureOutcome,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use resolution::{select_sla_mapping, SpecificityTier};
pub use routing::{pick_member, primary_group};
