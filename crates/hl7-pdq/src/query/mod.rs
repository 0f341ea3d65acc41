//! PDQ query parameters and the search predicate built from them.
//!
//! QPD-3 carries repeating `code^value` pairs such as `@PID.5.1.1^SMITH`.
//! Codes are checked against the allow-list of the query kind, values are
//! checked for presence and, for the birth date, for a valid HL7 date. The
//! accepted parameters become a [`PatientQuery`]: identifiers and codes match
//! exactly, names and address parts match by pattern.

use std::fmt;

use hl7_core::{Message, MessageType, PartialDate};

use crate::error::PdqError;
use crate::store::PatientRecord;

/// Segment holding the query parameters.
pub const QUERY_SEGMENT: &str = "QPD";

/// Field of [`QUERY_SEGMENT`] holding the query tag.
pub const QUERY_TAG_FIELD: usize = 2;

/// Field of [`QUERY_SEGMENT`] holding the `code^value` pairs.
pub const PARAMETERS_FIELD: usize = 3;

const WILDCARD: char = '*';

/// The two PDQ transactions this supplier answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    /// Patient demographics query, `QBP^Q22^QBP_Q21`.
    Pdq,
    /// Patient demographics and visit query, `QBP^ZV1^QBP_Q21`.
    Pdqv,
}

impl QueryKind {
    /// Both kinds, in registration order.
    pub const ALL: [Self; 2] = [Self::Pdq, Self::Pdqv];

    /// Request message type.
    #[must_use]
    pub const fn request_type(self) -> &'static str {
        match self {
            Self::Pdq => "QBP^Q22^QBP_Q21",
            Self::Pdqv => "QBP^ZV1^QBP_Q21",
        }
    }

    /// Response message type.
    #[must_use]
    pub const fn response_type(self) -> &'static str {
        match self {
            Self::Pdq => "RSP^K22^RSP_K21",
            Self::Pdqv => "RSP^ZV2^RSP_ZV2",
        }
    }

    /// Response message structure.
    #[must_use]
    pub const fn structure(self) -> &'static str {
        match self {
            Self::Pdq => "RSP_K21",
            Self::Pdqv => "RSP_ZV2",
        }
    }

    /// Parameter codes this kind accepts. PDQV adds the ward.
    #[must_use]
    pub fn allowed_codes(self) -> &'static [ParameterCode] {
        match self {
            Self::Pdq => ParameterCode::DEMOGRAPHIC.as_slice(),
            Self::Pdqv => ParameterCode::ALL.as_slice(),
        }
    }

    /// Whether `code` may appear in a query of this kind.
    #[must_use]
    pub fn allows(self, code: ParameterCode) -> bool {
        self.allowed_codes().contains(&code)
    }

    /// Kind of a request, if it is a PDQ request at all.
    #[must_use]
    pub fn from_message_type(message_type: &MessageType) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.request_type() == message_type.as_str())
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::Pdq => "pdq",
            Self::Pdqv => "pdqv",
        })
    }
}

/// Demographic attribute a parameter constrains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DemographicField {
    /// Patient identifier.
    Identifier,
    /// Family name.
    FamilyName,
    /// Given name.
    GivenName,
    /// Date of birth.
    BirthDate,
    /// Administrative sex.
    Sex,
    /// Street address.
    Street,
    /// City.
    City,
    /// State or province.
    State,
    /// Postal code.
    PostalCode,
    /// Patient account number.
    AccountNumber,
    /// Ward of the current visit.
    Ward,
}

/// How a criterion compares its value with a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchRule {
    /// Equal after trimming, ignoring ASCII case.
    Exact,
    /// Case-insensitive pattern where `*` matches any run of characters. A
    /// value without `*` matches as a prefix.
    Pattern,
}

/// Query parameter codes accepted in QPD-3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterCode {
    /// `@PID.3.1`, patient identifier.
    PatientIdentifier,
    /// `@PID.5.1.1`, family name.
    FamilyName,
    /// `@PID.5.2`, given name.
    GivenName,
    /// `@PID.7.1`, date of birth.
    BirthDate,
    /// `@PID.8`, administrative sex.
    Sex,
    /// `@PID.11.1.1`, street address.
    Street,
    /// `@PID.11.3`, city.
    City,
    /// `@PID.11.4`, state or province.
    State,
    /// `@PID.11.5`, postal code.
    PostalCode,
    /// `@PID.18.1`, patient account number.
    AccountNumber,
    /// `@PV1.3.1`, assigned ward. PDQV only.
    Ward,
}

impl ParameterCode {
    /// Codes accepted by plain PDQ.
    pub const DEMOGRAPHIC: [Self; 10] = [
        Self::PatientIdentifier,
        Self::FamilyName,
        Self::GivenName,
        Self::BirthDate,
        Self::Sex,
        Self::Street,
        Self::City,
        Self::State,
        Self::PostalCode,
        Self::AccountNumber,
    ];

    /// Every known code.
    pub const ALL: [Self; 11] = [
        Self::PatientIdentifier,
        Self::FamilyName,
        Self::GivenName,
        Self::BirthDate,
        Self::Sex,
        Self::Street,
        Self::City,
        Self::State,
        Self::PostalCode,
        Self::AccountNumber,
        Self::Ward,
    ];

    /// Wire form, for example `@PID.5.1.1`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PatientIdentifier => "@PID.3.1",
            Self::FamilyName => "@PID.5.1.1",
            Self::GivenName => "@PID.5.2",
            Self::BirthDate => "@PID.7.1",
            Self::Sex => "@PID.8",
            Self::Street => "@PID.11.1.1",
            Self::City => "@PID.11.3",
            Self::State => "@PID.11.4",
            Self::PostalCode => "@PID.11.5",
            Self::AccountNumber => "@PID.18.1",
            Self::Ward => "@PV1.3.1",
        }
    }

    /// Parses the wire form.
    #[must_use]
    pub fn parse(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|known| known.as_str() == code)
    }

    /// Attribute the code constrains.
    #[must_use]
    pub const fn field(self) -> DemographicField {
        match self {
            Self::PatientIdentifier => DemographicField::Identifier,
            Self::FamilyName => DemographicField::FamilyName,
            Self::GivenName => DemographicField::GivenName,
            Self::BirthDate => DemographicField::BirthDate,
            Self::Sex => DemographicField::Sex,
            Self::Street => DemographicField::Street,
            Self::City => DemographicField::City,
            Self::State => DemographicField::State,
            Self::PostalCode => DemographicField::PostalCode,
            Self::AccountNumber => DemographicField::AccountNumber,
            Self::Ward => DemographicField::Ward,
        }
    }

    /// Comparison applied to the code's value.
    #[must_use]
    pub const fn match_rule(self) -> MatchRule {
        match self {
            Self::FamilyName | Self::GivenName | Self::Street | Self::City | Self::State => {
                MatchRule::Pattern
            }
            Self::PatientIdentifier
            | Self::BirthDate
            | Self::Sex
            | Self::PostalCode
            | Self::AccountNumber
            | Self::Ward => MatchRule::Exact,
        }
    }
}

impl fmt::Display for ParameterCode {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Validated value of a query parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterValue {
    /// Free text, unescaped and trimmed.
    Text(String),
    /// Birth date at the precision it was written with.
    Date(PartialDate),
}

/// One accepted `code^value` pair from QPD-3.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryParameter {
    /// Allow-listed code.
    pub code: ParameterCode,
    /// Validated value.
    pub value: ParameterValue,
    /// One-based repetition of QPD-3 the pair came from.
    pub position: usize,
}

/// Reads and validates the parameters of a PDQ request.
///
/// Codes are checked for every pair before any value is inspected.
///
/// # Errors
///
/// Returns [`PdqError::MissingQueryParameters`] when QPD-3 is absent or
/// empty, [`PdqError::InvalidQueryParameterCode`] for a code outside the
/// kind's allow-list, [`PdqError::MissingQueryParameterValue`] for a blank
/// value and [`PdqError::InvalidDateParameterValue`] for a malformed date.
pub fn extract_parameters(
    message: &Message,
    kind: QueryKind,
) -> Result<Vec<QueryParameter>, PdqError> {
    let qpd = message
        .segment(QUERY_SEGMENT)
        .ok_or(PdqError::MissingQueryParameters)?;
    let delimiters = qpd.delimiters();
    let pairs: Vec<(usize, &str, &str)> = qpd
        .repetitions(PARAMETERS_FIELD)
        .enumerate()
        .filter(|(_, repetition)| !repetition.trim().is_empty())
        .map(|(index, repetition)| {
            let mut components = repetition.split(delimiters.component);
            let code = components.next().unwrap_or_default().trim();
            let value = components.next().unwrap_or_default();
            (index + 1, code, value)
        })
        .collect();
    if pairs.is_empty() {
        return Err(PdqError::MissingQueryParameters);
    }

    let codes = pairs
        .iter()
        .map(|(_, raw_code, _)| {
            ParameterCode::parse(raw_code)
                .filter(|code| kind.allows(*code))
                .ok_or_else(|| PdqError::invalid_code(*raw_code, kind))
        })
        .collect::<Result<Vec<_>, _>>()?;

    pairs
        .iter()
        .zip(codes)
        .map(|((position, _, raw_value), code)| {
            let text = delimiters.unescape(raw_value).trim().to_owned();
            if text.is_empty() {
                return Err(PdqError::MissingQueryParameterValue { code });
            }
            let value = if code == ParameterCode::BirthDate {
                PartialDate::parse(&text)
                    .map(ParameterValue::Date)
                    .ok_or(PdqError::InvalidDateParameterValue { value: text })?
            } else {
                ParameterValue::Text(text)
            };
            Ok(QueryParameter {
                code,
                value,
                position: *position,
            })
        })
        .collect()
}

/// One constraint of a [`PatientQuery`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Criterion {
    /// Constrained attribute.
    pub field: DemographicField,
    /// Comparison to apply.
    pub rule: MatchRule,
    /// Value to compare with.
    pub value: ParameterValue,
}

impl Criterion {
    /// Whether `record` satisfies this criterion.
    #[must_use]
    pub fn matches(&self, record: &PatientRecord) -> bool {
        match &self.value {
            ParameterValue::Date(date) => record
                .birth_date
                .is_some_and(|birth_date| date.contains(birth_date)),
            ParameterValue::Text(expected) => record
                .text(self.field)
                .is_some_and(|actual| match self.rule {
                    MatchRule::Exact => actual.trim().eq_ignore_ascii_case(expected),
                    MatchRule::Pattern => pattern_matches(expected, actual.trim()),
                }),
        }
    }
}

/// Conjunction of criteria, in request order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatientQuery {
    criteria: Vec<Criterion>,
}

impl PatientQuery {
    /// Builds the predicate for validated parameters. A repeated code adds
    /// one criterion per occurrence.
    #[must_use]
    pub fn from_parameters(parameters: &[QueryParameter]) -> Self {
        Self {
            criteria: parameters
                .iter()
                .map(|parameter| Criterion {
                    field: parameter.code.field(),
                    rule: parameter.code.match_rule(),
                    value: parameter.value.clone(),
                })
                .collect(),
        }
    }

    /// Criteria in request order.
    #[must_use]
    pub fn criteria(&self) -> &[Criterion] {
        &self.criteria
    }

    /// Whether every criterion holds for `record`.
    #[must_use]
    pub fn matches(&self, record: &PatientRecord) -> bool {
        self.criteria.iter().all(|criterion| criterion.matches(record))
    }
}

fn pattern_matches(pattern: &str, text: &str) -> bool {
    let mut wanted: Vec<char> = pattern.to_lowercase().chars().collect();
    if !wanted.contains(&WILDCARD) {
        wanted.push(WILDCARD);
    }
    let candidate: Vec<char> = text.to_lowercase().chars().collect();
    wildcard_match(&wanted, &candidate)
}

fn wildcard_match(pattern: &[char], text: &[char]) -> bool {
    let mut pattern_index = 0;
    let mut text_index = 0;
    let mut backtrack: Option<(usize, usize)> = None;
    while text_index < text.len() {
        match pattern.get(pattern_index) {
            Some(&WILDCARD) => {
                backtrack = Some((pattern_index, text_index));
                pattern_index += 1;
            }
            Some(expected) if text.get(text_index) == Some(expected) => {
                pattern_index += 1;
                text_index += 1;
            }
            _ => match backtrack {
                Some((star, consumed)) => {
                    backtrack = Some((star, consumed + 1));
                    pattern_index = star + 1;
                    text_index = consumed + 1;
                }
                None => return false,
            },
        }
    }
    pattern
        .get(pattern_index..)
        .is_some_and(|rest| rest.iter().all(|c| *c == WILDCARD))
}
