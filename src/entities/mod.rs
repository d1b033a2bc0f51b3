// Entity Models - owners, pets and visits
//
// Each entity has:
// - Integer identity assigned by the database on creation
// - A draft type (raw client input) that is validated before persistence
// - A read model that also carries the resolved owner<->pet association ids

pub mod owner;
pub mod pet;
pub mod visit;

pub use owner::{Owner, OwnerDraft, OwnerFields};
pub use pet::{Pet, PetDetails, PetDraft, PetFields, PetSummary, DEFAULT_CONDITION};
pub use visit::{Visit, VisitDate, VisitDraft, VisitFields};

use crate::store::ClinicStore;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

// ============================================================================
// DOMAIN
// ============================================================================

/// Record collections the client can fetch and search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Owners,
    Pets,
    Visits,
}

impl Domain {
    pub const ALL: [Domain; 3] = [Domain::Owners, Domain::Pets, Domain::Visits];

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Owners => "owners",
            Domain::Pets => "pets",
            Domain::Visits => "visits",
        }
    }

    /// Endpoint action returning the full collection.
    pub fn list_action(&self) -> &'static str {
        match self {
            Domain::Owners => "list_owners",
            Domain::Pets => "list_pets",
            Domain::Visits => "list_visits",
        }
    }

    /// Key the collection is stored under in the list response body.
    pub fn collection_key(&self) -> &'static str {
        self.as_str()
    }

    pub fn parse(s: &str) -> Option<Domain> {
        match s.trim().to_lowercase().as_str() {
            "owners" | "owner" => Some(Domain::Owners),
            "pets" | "pet" => Some(Domain::Pets),
            "visits" | "visit" => Some(Domain::Visits),
            _ => None,
        }
    }
}

// ============================================================================
// RECORD
// ============================================================================

/// A row type the client engine can cache, search and reconcile.
pub trait Record:
    Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    const DOMAIN: Domain;

    /// Primary key.
    fn key(&self) -> i64;

    /// Field values text terms are matched against, in display form.
    fn search_fields(&self) -> Vec<String>;

    /// Whether an exact-id filter selects this row.
    fn matches_id(&self, id: i64) -> bool {
        self.key() == id
    }

    /// Full collection as the store lists it.
    fn list_from(store: &ClinicStore) -> crate::error::Result<Vec<Self>>;
}

pub(crate) fn trimmed(value: &str) -> String {
    value.trim().to_string()
}
