pub mod group;
pub mod residency;
pub mod service;
pub mod sla;
pub mod ticket;
pub mod violation;
