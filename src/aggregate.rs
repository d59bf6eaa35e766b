//! ResultAggregator - flat record view, per-gate summary, click-to-toggle sort.
//!
//! `aggregate` concatenates each gate's consignments in gate order and never
//! reorders on its own. `summarize` buckets every known gate for the map
//! view; only COMPLETE gates carry a record count, every other bucket reports
//! zero even when records are available.

use std::cmp::Ordering;

use portal_types::{
    Consignment, GateResult, RequestStatus, TransportMovement, UsedTransportEquipment,
};
use serde::Serialize;
use serde_json::Value;

use crate::status::classify;

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

/// Union of all gates' records, in gate order then record order.
pub fn aggregate(results: &[GateResult]) -> Vec<Consignment> {
    results
        .iter()
        .flat_map(|gate| gate.consignments.iter().cloned())
        .collect()
}

/// `aggregate`, then a stable sort when a key is supplied.
pub fn aggregate_sorted(
    results: &[GateResult],
    sort: Option<(&str, SortDirection)>,
) -> Vec<Consignment> {
    let mut records = aggregate(results);
    if let Some((key, direction)) = sort {
        sort_by(&mut records, key, direction);
    }
    records
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateBucket {
    NotCalled,
    InProgress,
    Success,
    Error,
    Timeout,
}

impl GateBucket {
    /// Series order of the map legend.
    pub const ALL: [GateBucket; 5] = [
        Self::NotCalled,
        Self::InProgress,
        Self::Success,
        Self::Error,
        Self::Timeout,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::NotCalled => "Not called",
            Self::InProgress => "In Progress",
            Self::Success => "Success",
            Self::Error => "Error",
            Self::Timeout => "Timeout",
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            Self::NotCalled => "grey",
            Self::InProgress => "#003088",
            Self::Success => "green",
            Self::Error => "red",
            Self::Timeout => "#ff9900",
        }
    }

    fn from_status(status: RequestStatus) -> Self {
        match status {
            RequestStatus::Pending => Self::InProgress,
            RequestStatus::Complete => Self::Success,
            RequestStatus::Error => Self::Error,
            RequestStatus::Timeout => Self::Timeout,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GateSummaryEntry {
    /// Lower-cased gate code, as the map keys regions.
    pub gate: String,
    pub bucket: GateBucket,
    pub count: usize,
}

/// One map series: every gate in a bucket with its count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummarySeries {
    pub name: &'static str,
    pub color: &'static str,
    pub data: Vec<(String, usize)>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GateSummary {
    pub entries: Vec<GateSummaryEntry>,
}

impl GateSummary {
    pub fn get(&self, gate: &str) -> Option<&GateSummaryEntry> {
        let gate = gate.to_lowercase();
        self.entries.iter().find(|e| e.gate == gate)
    }

    pub fn in_bucket(&self, bucket: GateBucket) -> impl Iterator<Item = &GateSummaryEntry> {
        self.entries.iter().filter(move |e| e.bucket == bucket)
    }

    /// The five map series in legend order; empty series are kept.
    pub fn series(&self) -> Vec<SummarySeries> {
        GateBucket::ALL
            .iter()
            .map(|bucket| SummarySeries {
                name: bucket.label(),
                color: bucket.color(),
                data: self
                    .in_bucket(*bucket)
                    .map(|e| (e.gate.clone(), e.count))
                    .collect(),
            })
            .collect()
    }
}

/// Bucket every known gate. `None` (no search yet) puts all gates in
/// `NotCalled`. A gate reported twice uses its first result.
pub fn summarize(results: Option<&[GateResult]>, known_gates: &[String]) -> GateSummary {
    let entries = known_gates
        .iter()
        .map(|gate| {
            let found = results
                .and_then(|results| results.iter().find(|r| r.gate_indicator == *gate));
            let (bucket, count) = match found {
                None => (GateBucket::NotCalled, 0),
                Some(result) => {
                    let bucket = GateBucket::from_status(classify(&result.status).status);
                    let count = if bucket == GateBucket::Success {
                        result.consignments.len()
                    } else {
                        0
                    };
                    (bucket, count)
                }
            };
            GateSummaryEntry {
                gate: gate.to_lowercase(),
                bucket,
                count,
            }
        })
        .collect();

    GateSummary { entries }
}

// ---------------------------------------------------------------------------
// Sorting
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// Comparable projection of one field. Missing values sort first.
#[derive(Debug, Clone, PartialEq, PartialOrd)]
pub enum SortValue {
    Missing,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl SortValue {
    fn compare(&self, other: &Self) -> Ordering {
        self.partial_cmp(other).unwrap_or(Ordering::Equal)
    }
}

impl From<Option<&str>> for SortValue {
    fn from(v: Option<&str>) -> Self {
        v.map_or(Self::Missing, |s| Self::Text(s.to_string()))
    }
}

impl From<Option<i64>> for SortValue {
    fn from(v: Option<i64>) -> Self {
        v.map_or(Self::Missing, |n| Self::Number(n as f64))
    }
}

impl From<Option<bool>> for SortValue {
    fn from(v: Option<bool>) -> Self {
        v.map_or(Self::Missing, Self::Bool)
    }
}

impl From<Option<&Value>> for SortValue {
    fn from(v: Option<&Value>) -> Self {
        match v {
            None | Some(Value::Null) => Self::Missing,
            Some(Value::Bool(b)) => Self::Bool(*b),
            Some(Value::Number(n)) => n.as_f64().map_or(Self::Missing, Self::Number),
            Some(Value::String(s)) => Self::Text(s.clone()),
            Some(other) => Self::Text(other.to_string()),
        }
    }
}

/// Field lookup by wire (camelCase) name.
pub trait Sortable {
    fn sort_value(&self, key: &str) -> SortValue;
}

/// Stable sort on `key`. Descending reverses the comparison, so ties keep
/// their relative order in both directions.
pub fn sort_by<T: Sortable>(items: &mut [T], key: &str, direction: SortDirection) {
    items.sort_by(|a, b| {
        let ord = a.sort_value(key).compare(&b.sort_value(key));
        match direction {
            SortDirection::Ascending => ord,
            SortDirection::Descending => ord.reverse(),
        }
    });
}

/// Click-to-toggle sort state: the same key again flips the direction, a
/// new key starts ascending.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortState {
    current: Option<(String, SortDirection)>,
}

impl SortState {
    pub fn current(&self) -> Option<(&str, SortDirection)> {
        self.current.as_ref().map(|(k, d)| (k.as_str(), *d))
    }

    pub fn toggle(&mut self, key: &str) -> SortDirection {
        let direction = match &self.current {
            Some((current, SortDirection::Ascending)) if current == key => {
                SortDirection::Descending
            }
            _ => SortDirection::Ascending,
        };
        self.current = Some((key.to_string(), direction));
        direction
    }

    /// Toggle on `key` and sort `items` accordingly.
    pub fn apply<T: Sortable>(&mut self, items: &mut [T], key: &str) -> SortDirection {
        let direction = self.toggle(key);
        sort_by(items, key, direction);
        direction
    }

    pub fn reset(&mut self) {
        self.current = None;
    }
}

impl Sortable for GateResult {
    fn sort_value(&self, key: &str) -> SortValue {
        match key {
            "gateIndicator" => Some(self.gate_indicator.as_str()).into(),
            "status" => Some(self.status.as_str()).into(),
            "errorCode" => self.error_code.as_deref().into(),
            "errorDescription" => self.error_description.as_deref().into(),
            _ => SortValue::Missing,
        }
    }
}

impl Sortable for Consignment {
    fn sort_value(&self, key: &str) -> SortValue {
        match key {
            "id" => self.id.as_ref().into(),
            "datasetId" => Some(self.dataset_id.as_str()).into(),
            "gateId" => Some(self.gate_id.as_str()).into(),
            "platformId" => Some(self.platform_id.as_str()).into(),
            "carrierAcceptanceDatetime" => self.carrier_acceptance_datetime.as_deref().into(),
            "deliveryEventActualOccurrenceDatetime" => self
                .delivery_event_actual_occurrence_datetime
                .as_deref()
                .into(),
            other => self.extra.get(other).into(),
        }
    }
}

impl Sortable for TransportMovement {
    fn sort_value(&self, key: &str) -> SortValue {
        match key {
            "id" => self.id.as_ref().into(),
            "modeCode" => self.mode_code.as_deref().into(),
            "schemeAgencyId" => self.scheme_agency_id.as_deref().into(),
            "dangerousGoodsIndicator" => self.dangerous_goods_indicator.into(),
            "registrationCountryCode" => self.registration_country_code.as_deref().into(),
            _ => SortValue::Missing,
        }
    }
}

impl Sortable for UsedTransportEquipment {
    fn sort_value(&self, key: &str) -> SortValue {
        match key {
            "id" => self.id.as_ref().into(),
            "sequenceNumber" => self.sequence_number.into(),
            "schemeAgencyId" => self.scheme_agency_id.as_deref().into(),
            "registrationCountryCode" => self.registration_country_code.as_deref().into(),
            "categoryCode" => self.category_code.as_deref().into(),
            _ => SortValue::Missing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate(code: &str, status: &str, datasets: &[&str]) -> GateResult {
        datasets.iter().fold(GateResult::new(code, status), |g, id| {
            g.with_consignment(Consignment::new(*id, code, "acme"))
        })
    }

    fn ids(records: &[Consignment]) -> Vec<&str> {
        records.iter().map(|r| r.dataset_id.as_str()).collect()
    }

    #[test]
    fn aggregate_concatenates_in_gate_order() {
        let g1 = gate("FR", "COMPLETE", &["D1", "D2"]);
        let g2 = gate("BO", "COMPLETE", &["D3"]);

        let all = aggregate(&[g1.clone(), g2.clone()]);
        assert_eq!(ids(&all), vec!["D1", "D2", "D3"]);

        let mut split = aggregate(std::slice::from_ref(&g1));
        split.extend(aggregate(std::slice::from_ref(&g2)));
        assert_eq!(all, split);
        assert_eq!(aggregate(&[g1, g2]), all);
    }

    #[test]
    fn aggregate_of_nothing_is_empty() {
        assert!(aggregate(&[]).is_empty());
        assert!(aggregate(&[gate("FR", "PENDING", &[])]).is_empty());
    }

    #[test]
    fn aggregate_sorted_only_sorts_with_a_key() {
        let results = [gate("FR", "COMPLETE", &["D2", "D1"]), gate("SY", "COMPLETE", &["D0"])];
        assert_eq!(ids(&aggregate_sorted(&results, None)), vec!["D2", "D1", "D0"]);
        assert_eq!(
            ids(&aggregate_sorted(&results, Some(("datasetId", SortDirection::Ascending)))),
            vec!["D0", "D1", "D2"]
        );
    }

    #[test]
    fn summary_buckets_known_gates() {
        let known: Vec<String> = ["FR", "BO", "SY", "LI", "AT"].iter().map(|s| s.to_string()).collect();
        let results = [
            gate("FR", "COMPLETE", &["D1", "D2"]),
            gate("BO", "PENDING", &["D3"]),
            gate("SY", "ERROR", &["D4"]),
            gate("LI", "TIMEOUT", &[]),
        ];

        let summary = summarize(Some(&results[..]), &known);
        assert_eq!(summary.entries.len(), 5);

        let fr = summary.get("FR").unwrap();
        assert_eq!((fr.gate.as_str(), fr.bucket, fr.count), ("fr", GateBucket::Success, 2));
        // in-progress buckets never carry partial counts
        assert_eq!(summary.get("bo").unwrap().bucket, GateBucket::InProgress);
        assert_eq!(summary.get("bo").unwrap().count, 0);
        assert_eq!(summary.get("sy").unwrap().count, 0);
        assert_eq!(summary.get("li").unwrap().bucket, GateBucket::Timeout);
        assert_eq!(summary.get("at").unwrap().bucket, GateBucket::NotCalled);
    }

    #[test]
    fn summary_without_search_is_all_not_called() {
        let known: Vec<String> = vec!["FR".into(), "BO".into()];
        let summary = summarize(None, &known);
        assert!(summary.entries.iter().all(|e| e.bucket == GateBucket::NotCalled));

        let series = summary.series();
        assert_eq!(series.len(), 5);
        assert_eq!(series[0].name, "Not called");
        assert_eq!(series[0].data, vec![("fr".to_string(), 0), ("bo".to_string(), 0)]);
        assert!(series[2].data.is_empty());
    }

    #[test]
    fn unknown_gate_status_counts_as_in_progress() {
        let known = vec!["FR".to_string()];
        let results = [gate("FR", "QUEUED", &["D1"])];
        let summary = summarize(Some(&results[..]), &known);
        assert_eq!(summary.get("fr").unwrap().bucket, GateBucket::InProgress);
    }

    #[test]
    fn same_key_toggles_and_reverses() {
        let mut results = vec![
            gate("SY", "COMPLETE", &[]),
            gate("AT", "COMPLETE", &[]),
            gate("FR", "COMPLETE", &[]),
        ];
        let mut state = SortState::default();

        assert_eq!(state.apply(&mut results, "gateIndicator"), SortDirection::Ascending);
        let ascending: Vec<_> = results.iter().map(|g| g.gate_indicator.clone()).collect();
        assert_eq!(ascending, vec!["AT", "FR", "SY"]);

        assert_eq!(state.apply(&mut results, "gateIndicator"), SortDirection::Descending);
        let descending: Vec<_> = results.iter().map(|g| g.gate_indicator.clone()).collect();
        let mut reversed = ascending.clone();
        reversed.reverse();
        assert_eq!(descending, reversed);

        // third click flips back
        assert_eq!(state.toggle("gateIndicator"), SortDirection::Ascending);
    }

    #[test]
    fn new_key_resets_to_ascending() {
        let mut state = SortState::default();
        state.toggle("status");
        state.toggle("status");
        assert_eq!(state.current(), Some(("status", SortDirection::Descending)));
        assert_eq!(state.toggle("gateIndicator"), SortDirection::Ascending);
    }

    #[test]
    fn sort_is_stable_for_ties() {
        let mut results = vec![
            gate("FR", "PENDING", &["a"]),
            gate("BO", "COMPLETE", &["b"]),
            gate("SY", "PENDING", &["c"]),
        ];
        sort_by(&mut results, "status", SortDirection::Descending);
        let order: Vec<_> = results.iter().map(|g| g.gate_indicator.as_str()).collect();
        assert_eq!(order, vec!["FR", "SY", "BO"]);
    }

    #[test]
    fn numeric_and_missing_values_order() {
        let mut equipment = vec![
            UsedTransportEquipment {
                sequence_number: Some(10),
                ..Default::default()
            },
            UsedTransportEquipment {
                sequence_number: None,
                ..Default::default()
            },
            UsedTransportEquipment {
                sequence_number: Some(2),
                ..Default::default()
            },
        ];
        sort_by(&mut equipment, "sequenceNumber", SortDirection::Ascending);
        let order: Vec<_> = equipment.iter().map(|e| e.sequence_number).collect();
        assert_eq!(order, vec![None, Some(2), Some(10)]);
    }
}
