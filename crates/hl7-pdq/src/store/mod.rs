//! Demographics lookup behind the PDQ supplier.
//!
//! The supplier only sees the [`DemographicsStore`] trait. Deployments
//! without a patient database use [`InMemoryDemographicsStore`], loaded from
//! a JSON array of [`PatientRecord`]s.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::Date;

use crate::error::StoreError;
use crate::query::{DemographicField, PatientQuery, QueryKind};

time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");

/// Demographics of one patient as returned by a store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PatientRecord {
    /// Patient identifier, written to PID-3.
    pub identifier: String,
    /// Family name, PID-5.1.
    pub family_name: String,
    /// Given name, PID-5.2.
    pub given_name: String,
    /// Date of birth, PID-7, as `YYYY-MM-DD` in JSON.
    #[serde(with = "iso_date::option")]
    pub birth_date: Option<Date>,
    /// Administrative sex, PID-8.
    pub sex: String,
    /// Street address, PID-11.1.
    pub street: String,
    /// City, PID-11.3.
    pub city: String,
    /// State or province, PID-11.4.
    pub state: String,
    /// Postal code, PID-11.5.
    pub postal_code: String,
    /// Marital status, PID-16.
    pub marital_status: String,
    /// Patient account number, PID-18.
    pub account_number: String,
    /// Ward of the current visit, PV1-3. Only visit queries report it.
    pub ward: Option<String>,
}

impl PatientRecord {
    /// Text of `field`, or `None` when the record has no value for it.
    ///
    /// The birth date is not text and always yields `None`.
    #[must_use]
    pub fn text(&self, field: DemographicField) -> Option<&str> {
        let value = match field {
            DemographicField::Identifier => self.identifier.as_str(),
            DemographicField::FamilyName => self.family_name.as_str(),
            DemographicField::GivenName => self.given_name.as_str(),
            DemographicField::Sex => self.sex.as_str(),
            DemographicField::Street => self.street.as_str(),
            DemographicField::City => self.city.as_str(),
            DemographicField::State => self.state.as_str(),
            DemographicField::PostalCode => self.postal_code.as_str(),
            DemographicField::AccountNumber => self.account_number.as_str(),
            DemographicField::Ward => self.ward.as_deref().unwrap_or_default(),
            DemographicField::BirthDate => "",
        };
        Some(value).filter(|text| !text.trim().is_empty())
    }
}

/// Source of demographics for PDQ queries.
#[cfg_attr(test, mockall::automock)]
pub trait DemographicsStore: Send + Sync {
    /// Records satisfying `query`, in the store's natural order.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the store cannot be searched.
    fn search(&self, query: &PatientQuery, kind: QueryKind) -> Result<Vec<PatientRecord>, StoreError>;
}

/// Store holding every record in memory, searched linearly.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDemographicsStore {
    records: Arc<[PatientRecord]>,
}

impl InMemoryDemographicsStore {
    /// Wraps `records`, keeping their order.
    #[must_use]
    pub fn new(records: Vec<PatientRecord>) -> Self {
        Self {
            records: records.into(),
        }
    }

    /// Loads records from a JSON array.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Decode`] when the text is not an array of
    /// records.
    pub fn from_json_str(text: &str) -> Result<Self, StoreError> {
        serde_json::from_str::<Vec<PatientRecord>>(text)
            .map(Self::new)
            .map_err(|source| StoreError::Decode {
                source: Arc::new(source),
            })
    }

    /// Loads records from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Read`] when the file cannot be read and
    /// [`StoreError::Decode`] when its content is not an array of records.
    pub fn from_json_file(path: &Path) -> Result<Self, StoreError> {
        let text = fs::read_to_string(path).map_err(|source| StoreError::Read {
            path: path.to_path_buf(),
            source: Arc::new(source),
        })?;
        Self::from_json_str(&text)
    }

    /// Number of records held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl DemographicsStore for InMemoryDemographicsStore {
    fn search(&self, query: &PatientQuery, _kind: QueryKind) -> Result<Vec<PatientRecord>, StoreError> {
        Ok(self
            .records
            .iter()
            .filter(|record| query.matches(record))
            .cloned()
            .collect())
    }
}
