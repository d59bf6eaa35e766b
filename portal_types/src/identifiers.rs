use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// SEARCH REQUEST
// ============================================================================

/// Body of `POST /identifiers`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifiersSearchRequest {
    pub identifier: String,
    #[serde(default)]
    pub identifier_type: Vec<String>,
    pub mode_code: Option<String>,
    pub registration_country_code: Option<String>,
    /// `null` on the wire means "no filter".
    pub dangerous_goods_indicator: Option<bool>,
    #[serde(default)]
    pub efti_gate_indicator: Vec<String>,
}

impl IdentifiersSearchRequest {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            ..Default::default()
        }
    }

    pub fn with_gates<I, S>(mut self, gates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.efti_gate_indicator = gates.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_identifier_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.identifier_type = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_dangerous_goods(mut self, choice: DangerousGoods) -> Self {
        self.dangerous_goods_indicator = choice.indicator();
        self
    }
}

/// Identifier kinds a search may be restricted to.
pub const IDENTIFIER_TYPES: [&str; 3] = ["means", "equipment", "carried"];

/// Tri-state dangerous goods filter as offered by the search form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DangerousGoods {
    Yes,
    No,
    #[default]
    NotApplicable,
}

impl DangerousGoods {
    /// `YES` and `NO` select a filter; any other form value means "no filter".
    pub fn from_form(value: &str) -> Self {
        match value {
            "YES" => Self::Yes,
            "NO" => Self::No,
            _ => Self::NotApplicable,
        }
    }

    pub fn indicator(&self) -> Option<bool> {
        match self {
            Self::Yes => Some(true),
            Self::No => Some(false),
            Self::NotApplicable => None,
        }
    }
}

// ============================================================================
// POLL RESPONSE
// ============================================================================

/// Body of `GET /identifiers?requestId=<id>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifiersResponse {
    #[serde(rename = "eFTIGate", default)]
    pub efti_gate: Option<String>,
    pub request_id: String,
    pub status: String,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
    #[serde(default)]
    pub identifiers: Vec<GateResult>,
}

impl IdentifiersResponse {
    pub fn new(request_id: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            efti_gate: None,
            request_id: request_id.into(),
            status: status.into(),
            error_code: None,
            error_description: None,
            identifiers: Vec::new(),
        }
    }

    pub fn with_gate_result(mut self, result: GateResult) -> Self {
        self.identifiers.push(result);
        self
    }
}

/// One gate's contribution to a federated identifiers search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GateResult {
    pub gate_indicator: String,
    pub status: String,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
    #[serde(default)]
    pub consignments: Vec<Consignment>,
}

impl GateResult {
    pub fn new(gate_indicator: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            gate_indicator: gate_indicator.into(),
            status: status.into(),
            error_code: None,
            error_description: None,
            consignments: Vec::new(),
        }
    }

    pub fn with_consignment(mut self, consignment: Consignment) -> Self {
        self.consignments.push(consignment);
        self
    }
}

// ============================================================================
// RECORDS
// ============================================================================

/// A consignment record returned by a gate.
///
/// Fields the portal does not model are kept in `extra` so a cached record
/// is stored verbatim.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Consignment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub dataset_id: String,
    #[serde(default)]
    pub gate_id: String,
    #[serde(default)]
    pub platform_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carrier_acceptance_datetime: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_event_actual_occurrence_datetime: Option<String>,
    #[serde(default)]
    pub main_carriage_transport_movement: Vec<TransportMovement>,
    #[serde(default)]
    pub used_transport_equipment: Vec<UsedTransportEquipment>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Consignment {
    pub fn new(
        dataset_id: impl Into<String>,
        gate_id: impl Into<String>,
        platform_id: impl Into<String>,
    ) -> Self {
        Self {
            dataset_id: dataset_id.into(),
            gate_id: gate_id.into(),
            platform_id: platform_id.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportMovement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default)]
    pub mode_code: Option<String>,
    #[serde(default)]
    pub scheme_agency_id: Option<String>,
    #[serde(default)]
    pub dangerous_goods_indicator: Option<bool>,
    #[serde(default)]
    pub registration_country_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsedTransportEquipment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default)]
    pub sequence_number: Option<i64>,
    #[serde(default)]
    pub scheme_agency_id: Option<String>,
    #[serde(default, alias = "registrationCountry")]
    pub registration_country_code: Option<String>,
    #[serde(default)]
    pub category_code: Option<String>,
    #[serde(default)]
    pub carried_transport_equipment: Vec<CarriedTransportEquipment>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CarriedTransportEquipment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default)]
    pub sequence_number: Option<i64>,
    #[serde(default)]
    pub scheme_agency_id: Option<String>,
}

// ============================================================================
// TRANSPORT MODE
// ============================================================================

/// UN/ECE Recommendation 19 transport mode codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportMode {
    NotSpecified,
    Maritime,
    Rail,
    Road,
    Air,
    Mail,
    Multimodal,
    FixedInstallation,
    InlandWater,
    NotApplicable,
}

impl TransportMode {
    pub const ALL: [TransportMode; 10] = [
        Self::NotSpecified,
        Self::Maritime,
        Self::Rail,
        Self::Road,
        Self::Air,
        Self::Mail,
        Self::Multimodal,
        Self::FixedInstallation,
        Self::InlandWater,
        Self::NotApplicable,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Self::NotSpecified => "0",
            Self::Maritime => "1",
            Self::Rail => "2",
            Self::Road => "3",
            Self::Air => "4",
            Self::Mail => "5",
            Self::Multimodal => "6",
            Self::FixedInstallation => "7",
            Self::InlandWater => "8",
            Self::NotApplicable => "9",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::NotSpecified => "NOT_SPECIFIED",
            Self::Maritime => "MARITIME",
            Self::Rail => "RAIL",
            Self::Road => "ROAD",
            Self::Air => "AIR",
            Self::Mail => "MAIL",
            Self::Multimodal => "MULTIMODAL",
            Self::FixedInstallation => "FIXED_INSTALLATION",
            Self::InlandWater => "INLAND_WATER",
            Self::NotApplicable => "NOT_APPLICABLE",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|mode| mode.code() == code.trim())
    }
}
