//! Patient Demographics Query (PDQ) supplier for the HL7 daemon.
//!
//! The crate answers IHE PDQ (`QBP^Q22^QBP_Q21`) and its visit variant
//! (`QBP^ZV1^QBP_Q21`) from a [`DemographicsStore`]. Query parameters arrive
//! in QPD-3 as `code^value` repetitions; see [`query`] for the accepted codes
//! and how each one matches. [`register`] installs the supplier into a
//! [`HandlerRegistry`] for both message types.

pub mod error;
pub mod query;
pub mod store;
pub mod supplier;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use hl7_core::{HandlerRegistry, RegistryError, Stamper};
use tracing::info;

pub use self::error::{PdqError, StoreError};
pub use self::query::{ParameterCode, PatientQuery, QueryKind};
pub use self::store::{DemographicsStore, InMemoryDemographicsStore, PatientRecord};
pub use self::supplier::{ApplicationFilter, PdqConfig, PdqSupplier};

/// Builds a [`PdqSupplier`] and routes both PDQ message types to it.
///
/// # Errors
///
/// Propagates the [`RegistryError`] of a rejected registration.
pub fn register(
    registry: &mut HandlerRegistry,
    config: PdqConfig,
    store: Arc<dyn DemographicsStore>,
    stamper: Arc<dyn Stamper>,
) -> Result<Arc<PdqSupplier>, RegistryError> {
    let supplier = Arc::new(PdqSupplier::new(config, store, stamper));
    for kind in QueryKind::ALL {
        registry.register(kind.request_type(), supplier.clone())?;
    }
    info!(
        target: concat!(env!("CARGO_PKG_NAME"), "::register"),
        message_types = ?QueryKind::ALL.map(QueryKind::request_type),
        "registered PDQ supplier"
    );
    Ok(supplier)
}
