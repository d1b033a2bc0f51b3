// Veterinary Clinic Records - Core Library
// Exposes all modules for use in the CLI, the API server, and tests

pub mod error;
pub mod entities;
pub mod schema;         // Draft validation
pub mod db;             // SQLite schema + row mapping
pub mod ownership;      // Owner <-> pet association table
pub mod store;          // Relationship store
pub mod export;         // CSV export
pub mod autocomplete;
pub mod api;            // JSON action endpoint
pub mod config;

// Client engine
pub mod query;
pub mod source;
pub mod cache;
pub mod search;
pub mod reconciliation;
pub mod gate;
pub mod live;
pub mod form;           // Record forms for the terminal client

#[cfg(feature = "tui")]
pub mod ui;

// Re-export commonly used types
pub use api::{dispatch, ApiReply, ApiRequest};
pub use cache::CollectionCache;
pub use config::{ClientConfig, ClinicConfig, ConfigError};
pub use entities::{
    Domain, Owner, OwnerDraft, Pet, PetDetails, PetDraft, PetSummary, Record, Visit, VisitDate,
    VisitDraft,
};
pub use error::ClinicError;
pub use gate::{Debouncer, RequestGate};
pub use live::{LiveTable, PollHandle};
pub use query::{parse_query, ParsedQuery, SearchDomain};
pub use reconciliation::{Diff, ReconciliationEngine, TableModel};
pub use schema::{ValidationError, ValidationResult};
pub use search::{SearchEngine, SearchResult};
#[cfg(feature = "remote")]
pub use source::HttpSource;
pub use form::{FormMode, RecordForm};
pub use source::{
    reply_error, ClinicClient, CollectionSource, FetchError, RetryPolicy, Retrying, StoreSource,
};
pub use store::ClinicStore;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
