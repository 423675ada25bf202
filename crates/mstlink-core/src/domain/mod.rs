//! # Domain Models
//!
//! Canonical domain types for MST enrichment.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Mst`] | Validated, normalized tax identifier |
//! | [`SourceResult`] | Immutable per-source fetch outcome |
//! | [`SourceOutcome`] | Outcome classification (success, not found, ...) |
//! | [`FieldSpec`] / [`EXPECTED_FIELDS`] | Expected output field catalog |
//! | [`FieldCategory`] | Conflict-resolution grouping for catalog fields |
//!
//! All types enforce invariants at construction time; a [`SourceResult`] is
//! never mutated after the client returns it.

mod models;
mod mst;

pub use models::{
    field_spec, FieldCategory, FieldMap, FieldSpec, SourceOutcome, SourceResult, EXPECTED_FIELDS,
};
pub use mst::Mst;
