//! Pinned-record view: one consignment cached by `datasetId`.

use portal_types::{Consignment, TransportMode, TransportMovement, UilSearchRequest, UsedTransportEquipment};

use crate::aggregate::{SortDirection, SortState};
use crate::cache::ResultCache;
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct IdentifiersDisplay {
    record: Consignment,
    sort: SortState,
}

impl IdentifiersDisplay {
    /// Load the consignment pinned under `dataset_id`. A missing or
    /// unreadable entry is `NotFound`.
    pub fn load(cache: &ResultCache, dataset_id: &str) -> Result<Self> {
        let record = cache.get::<Consignment>(dataset_id)?;
        tracing::debug!(dataset_id, "Pinned record loaded");
        Ok(Self::new(record))
    }

    pub fn new(record: Consignment) -> Self {
        Self {
            record,
            sort: SortState::default(),
        }
    }

    pub fn record(&self) -> &Consignment {
        &self.record
    }

    pub fn equipment(&self) -> &[UsedTransportEquipment] {
        &self.record.used_transport_equipment
    }

    pub fn movements(&self) -> &[TransportMovement] {
        &self.record.main_carriage_transport_movement
    }

    /// Toggle-sort the used transport equipment on `key`.
    pub fn sort_equipment(&mut self, key: &str) -> SortDirection {
        self.sort
            .apply(&mut self.record.used_transport_equipment, key)
    }

    /// Toggle-sort the main carriage movements on `key`. Shares its sort
    /// state with [`Self::sort_equipment`].
    pub fn sort_movements(&mut self, key: &str) -> SortDirection {
        self.sort
            .apply(&mut self.record.main_carriage_transport_movement, key)
    }

    /// UIL request prefilled from this record.
    pub fn uil_request(&self) -> UilSearchRequest {
        UilSearchRequest::new(
            &self.record.dataset_id,
            &self.record.platform_id,
            &self.record.gate_id,
        )
    }
}

pub fn transport_mode_label(code: &str) -> Option<&'static str> {
    TransportMode::from_code(code).map(|mode| mode.label())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn equipment(seq: i64, category: &str) -> UsedTransportEquipment {
        UsedTransportEquipment {
            sequence_number: Some(seq),
            category_code: Some(category.to_string()),
            ..Default::default()
        }
    }

    fn movement(mode: &str) -> TransportMovement {
        TransportMovement {
            mode_code: Some(mode.to_string()),
            ..Default::default()
        }
    }

    fn record() -> Consignment {
        let mut record = Consignment::new("D1", "FR", "ttf");
        record.used_transport_equipment = vec![equipment(2, "AE"), equipment(1, "CN"), equipment(3, "BX")];
        record.main_carriage_transport_movement = vec![movement("3"), movement("1")];
        record
    }

    fn sequence(display: &IdentifiersDisplay) -> Vec<i64> {
        display
            .equipment()
            .iter()
            .filter_map(|e| e.sequence_number)
            .collect()
    }

    #[test]
    fn load_reads_the_pinned_record() {
        let cache = ResultCache::in_memory();
        cache.put("D1", &record()).unwrap();

        let display = IdentifiersDisplay::load(&cache, "D1").unwrap();
        assert_eq!(display.record().gate_id, "FR");
        assert!(IdentifiersDisplay::load(&cache, "D2")
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn equipment_sort_toggles() {
        let mut display = IdentifiersDisplay::new(record());
        assert_eq!(display.sort_equipment("sequenceNumber"), SortDirection::Ascending);
        assert_eq!(sequence(&display), vec![1, 2, 3]);
        assert_eq!(display.sort_equipment("sequenceNumber"), SortDirection::Descending);
        assert_eq!(sequence(&display), vec![3, 2, 1]);
        assert_eq!(display.sort_equipment("sequenceNumber"), SortDirection::Ascending);
    }

    #[test]
    fn sort_state_is_shared_between_tables() {
        let mut display = IdentifiersDisplay::new(record());
        display.sort_equipment("schemeAgencyId");
        // same key on the other table continues the toggle
        assert_eq!(display.sort_movements("schemeAgencyId"), SortDirection::Descending);
        assert_eq!(display.sort_movements("modeCode"), SortDirection::Ascending);
        let modes: Vec<_> = display
            .movements()
            .iter()
            .filter_map(|m| m.mode_code.as_deref())
            .collect();
        assert_eq!(modes, vec!["1", "3"]);
    }

    #[test]
    fn uil_request_is_prefilled() {
        let display = IdentifiersDisplay::new(record());
        assert_eq!(display.uil_request(), UilSearchRequest::new("D1", "ttf", "FR"));
    }

    #[test]
    fn transport_mode_labels() {
        assert_eq!(transport_mode_label("3"), Some("ROAD"));
        assert_eq!(transport_mode_label("0"), Some("NOT_SPECIFIED"));
        assert_eq!(transport_mode_label("42"), None);
    }
}
