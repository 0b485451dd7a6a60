use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TicketServiceId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceCombo {
    pub ticket_service_id: Option<TicketServiceId>,
    pub service_id: Option<ServiceId>,
}

/// The classification a ticket is filed under: one ticket service and the
/// ordered list of services declared beneath it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceClassification {
    pub ticket_service_id: Option<TicketServiceId>,
    pub service_ids: Vec<ServiceId>,
}

impl ServiceClassification {
    pub fn new(ticket_service_id: Option<TicketServiceId>, service_ids: Vec<ServiceId>) -> Self {
        Self { ticket_service_id, service_ids }
    }

    pub fn is_empty(&self) -> bool {
        self.ticket_service_id.is_none() && self.service_ids.is_empty()
    }
}
