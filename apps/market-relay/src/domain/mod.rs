//! Domain Layer - Core relay types and pure transforms.
//!
//! This layer holds the instrument model, topic construction, field
//! normalization and the canonical event schema. Nothing here performs I/O.

/// Currencies, instruments and per-exchange symbol tables.
pub mod instrument;

/// Recursive field mappings from exchange wire codes to canonical names.
pub mod mapping;

/// Statistic records handed to the persistence sink.
pub mod statistic;

/// Canonical events, exchange identities and connection states.
pub mod streaming;

/// Subscription topic construction.
pub mod topic;
