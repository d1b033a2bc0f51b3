// 🧑 Owner Entity - people responsible for one or more pets
//
// The owner row holds identity and contact data. Which pets an owner has is
// stored in the ownership table and resolved into `pet_ids` on read.

use super::{trimmed, Domain, Record};
use crate::store::ClinicStore;
use serde::{Deserialize, Serialize};

// ============================================================================
// OWNER (read model)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub age: i64,
    #[serde(default)]
    pub phone: Option<String>,

    /// Pets paired with this owner, ascending.
    #[serde(default)]
    pub pet_ids: Vec<i64>,
}

impl Owner {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

impl Record for Owner {
    const DOMAIN: Domain = Domain::Owners;

    fn key(&self) -> i64 {
        self.id
    }

    fn search_fields(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.first_name.clone(),
            self.last_name.clone(),
        ]
    }

    fn list_from(store: &ClinicStore) -> crate::error::Result<Vec<Self>> {
        store.list_owners()
    }
}

// ============================================================================
// DRAFT (raw input) / FIELDS (validated)
// ============================================================================

/// Owner data as received from a client, before validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OwnerDraft {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub age: Option<i64>,
    #[serde(default)]
    pub phone: Option<String>,
}

impl OwnerDraft {
    pub fn new(first_name: &str, last_name: &str, age: i64) -> Self {
        OwnerDraft {
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            age: Some(age),
            phone: None,
        }
    }

    pub fn with_phone(mut self, phone: &str) -> Self {
        self.phone = Some(phone.to_string());
        self
    }

    /// Draft pre-filled with the stored values, for partial edits.
    pub fn from_owner(owner: &Owner) -> Self {
        OwnerDraft {
            first_name: owner.first_name.clone(),
            last_name: owner.last_name.clone(),
            age: Some(owner.age),
            phone: owner.phone.clone(),
        }
    }
}

/// Validated owner columns, ready to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerFields {
    pub first_name: String,
    pub last_name: String,
    pub age: i64,
    pub phone: Option<String>,
}

impl OwnerFields {
    pub(crate) fn from_draft(draft: &OwnerDraft, age: i64) -> Self {
        let phone = draft
            .phone
            .as_deref()
            .map(trimmed)
            .filter(|p| !p.is_empty());

        OwnerFields {
            first_name: trimmed(&draft.first_name),
            last_name: trimmed(&draft.last_name),
            age,
            phone,
        }
    }
}
