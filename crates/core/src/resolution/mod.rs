//! SLA specificity ladder.
//!
//! A mapping can name both sides of the combo, only the ticket service, or
//! only the service. The most specific tier with any hit wins; within a tier
//! the caller's service order decides, then the lowest mapping id.

use serde::{Deserialize, Serialize};

use crate::domain::service::ServiceClassification;
use crate::domain::sla::SlaMapping;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecificityTier {
    Exact,
    TicketServiceOnly,
    ServiceOnly,
}

impl SpecificityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::TicketServiceOnly => "ticket_service_only",
            Self::ServiceOnly => "service_only",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlaMatch<'a> {
    pub mapping: &'a SlaMapping,
    pub tier: SpecificityTier,
}

/// Classifies a mapping against the ticket's classification, returning its
/// tier and the position of the matched service in the caller's list.
fn classify(
    mapping: &SlaMapping,
    classification: &ServiceClassification,
) -> Option<(SpecificityTier, usize)> {
    let service_position = mapping
        .service_id
        .and_then(|service_id| classification.service_ids.iter().position(|id| *id == service_id));

    match (mapping.ticket_service_id, mapping.service_id) {
        (Some(ticket_service_id), Some(_)) => {
            if classification.ticket_service_id != Some(ticket_service_id) {
                return None;
            }
            service_position.map(|position| (SpecificityTier::Exact, position))
        }
        (Some(ticket_service_id), None) => (classification.ticket_service_id
            == Some(ticket_service_id))
        .then_some((SpecificityTier::TicketServiceOnly, 0)),
        (None, Some(_)) => service_position.map(|position| (SpecificityTier::ServiceOnly, position)),
        (None, None) => None,
    }
}

pub fn select_sla_mapping<'a>(
    mappings: &'a [SlaMapping],
    classification: &ServiceClassification,
) -> Option<SlaMatch<'a>> {
    mappings
        .iter()
        .filter_map(|mapping| {
            classify(mapping, classification).map(|(tier, position)| (tier, position, mapping))
        })
        .min_by_key(|(tier, position, mapping)| (*tier, *position, mapping.id))
        .map(|(tier, _, mapping)| SlaMatch { mapping, tier })
}

#[cfg(test)]
mod tests {
    use super::{select_sla_mapping, SpecificityTier};
    use crate::domain::service::{ServiceClassification, ServiceId, TicketServiceId};
    use crate::domain::sla::{SlaId, SlaMapping};

    fn mapping(id: i64, sla_id: i64, ticket_service: Option<i64>, service: Option<i64>) -> SlaMapping {
        SlaMapping {
            id,
            sla_id: SlaId(sla_id),
            ticket_service_id: ticket_service.map(TicketServiceId),
            service_id: service.map(ServiceId),
        }
    }

    fn classification(ticket_service: i64, services: &[i64]) -> ServiceClassification {
        ServiceClassification::new(
            Some(TicketServiceId(ticket_service)),
            services.iter().copied().map(ServiceId).collect(),
        )
    }

    #[test]
    fn exact_mapping_beats_service_only_mapping() {
        let mappings = [mapping(1, 10, None, Some(5)), mapping(2, 20, Some(1), Some(5))];

        let selected =
            select_sla_mapping(&mappings, &classification(1, &[5])).expect("sla should resolve");
        assert_eq!(selected.mapping.sla_id, SlaId(20));
        assert_eq!(selected.tier, SpecificityTier::Exact);
    }

    #[test]
    fn ticket_service_only_beats_service_only() {
        let mappings = [mapping(1, 10, None, Some(5)), mapping(2, 30, Some(1), None)];

        let selected =
            select_sla_mapping(&mappings, &classification(1, &[5])).expect("sla should resolve");
        assert_eq!(selected.mapping.sla_id, SlaId(30));
        assert_eq!(selected.tier, SpecificityTier::TicketServiceOnly);
    }

    #[test]
    fn exact_mapping_for_other_ticket_service_is_ignored() {
        let mappings = [mapping(1, 10, Some(2), Some(5)), mapping(2, 40, None, Some(5))];

        let selected =
            select_sla_mapping(&mappings, &classification(1, &[5])).expect("sla should resolve");
        assert_eq!(selected.mapping.sla_id, SlaId(40));
        assert_eq!(selected.tier, SpecificityTier::ServiceOnly);
    }

    #[test]
    fn caller_service_order_breaks_ties_inside_a_tier() {
        let mappings = [mapping(1, 10, Some(1), Some(8)), mapping(2, 20, Some(1), Some(7))];

        let selected =
            select_sla_mapping(&mappings, &classification(1, &[7, 8])).expect("sla should resolve");
        assert_eq!(selected.mapping.sla_id, SlaId(20));
    }

    #[test]
    fn lowest_mapping_id_breaks_remaining_ties() {
        let mappings = [mapping(9, 90, Some(1), None), mapping(3, 30, Some(1), None)];

        let selected =
            select_sla_mapping(&mappings, &classification(1, &[])).expect("sla should resolve");
        assert_eq!(selected.mapping.id, 3);
    }

    #[test]
    fn unrelated_mappings_resolve_to_none() {
        let mappings = [mapping(1, 10, Some(2), None), mapping(2, 20, None, Some(99))];

        assert!(select_sla_mapping(&mappings, &classification(1, &[5])).is_none());
        assert!(select_sla_mapping(&[], &classification(1, &[5])).is_none());
    }
}
