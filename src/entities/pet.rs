// 🐾 Pet Entity - the animals under the clinic's care
//
// A pet may have several owners; the association lives in the ownership table
// and is resolved into `owner_ids` on read.

use super::{trimmed, Domain, Owner, Record, Visit};
use crate::store::ClinicStore;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Condition stored when a draft does not name one.
pub const DEFAULT_CONDITION: &str = "Healthy";

// ============================================================================
// PET (read model)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pet {
    pub id: i64,
    pub name: String,
    pub age: i64,
    pub species: String,
    pub birth_date: NaiveDate,
    pub condition: String,

    /// Owners paired with this pet, ascending.
    #[serde(default)]
    pub owner_ids: Vec<i64>,
}

impl Record for Pet {
    const DOMAIN: Domain = Domain::Pets;

    fn key(&self) -> i64 {
        self.id
    }

    fn search_fields(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.name.clone(),
            self.species.clone(),
            self.condition.clone(),
        ]
    }

    fn list_from(store: &ClinicStore) -> crate::error::Result<Vec<Self>> {
        store.list_pets()
    }
}

/// Pet together with its owners and visit history (newest visit first).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PetDetails {
    pub pet: Pet,
    pub owners: Vec<Owner>,
    pub visits: Vec<Visit>,
}

/// List row: pet plus joined owner names and its most recent visit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PetSummary {
    pub id: i64,
    pub name: String,
    pub age: i64,
    pub species: String,
    pub birth_date: NaiveDate,
    pub condition: String,
    /// "First Last" of every owner joined with " || ", empty when none.
    pub owners: String,
    pub last_visit_id: Option<i64>,
    pub last_visit_date: Option<NaiveDate>,
    pub last_visit_diagnosis: Option<String>,
    pub last_visit_treatment: Option<String>,
}

// ============================================================================
// DRAFT (raw input) / FIELDS (validated)
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PetDraft {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub age: Option<i64>,
    #[serde(default)]
    pub species: String,
    /// Expected as `YYYY-MM-DD`.
    #[serde(default)]
    pub birth_date: String,
    #[serde(default)]
    pub condition: Option<String>,
}

impl PetDraft {
    pub fn new(name: &str, age: i64, species: &str, birth_date: &str) -> Self {
        PetDraft {
            name: name.to_string(),
            age: Some(age),
            species: species.to_string(),
            birth_date: birth_date.to_string(),
            condition: None,
        }
    }

    pub fn with_condition(mut self, condition: &str) -> Self {
        self.condition = Some(condition.to_string());
        self
    }

    pub fn from_pet(pet: &Pet) -> Self {
        PetDraft {
            name: pet.name.clone(),
            age: Some(pet.age),
            species: pet.species.clone(),
            birth_date: pet.birth_date.format("%Y-%m-%d").to_string(),
            condition: Some(pet.condition.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PetFields {
    pub name: String,
    pub age: i64,
    pub species: String,
    pub birth_date: NaiveDate,
    pub condition: String,
}

impl PetFields {
    pub(crate) fn from_draft(draft: &PetDraft, age: i64, birth_date: NaiveDate) -> Self {
        let condition = draft
            .condition
            .as_deref()
            .map(trimmed)
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| DEFAULT_CONDITION.to_string());

        PetFields {
            name: trimmed(&draft.name),
            age,
            species: trimmed(&draft.species),
            birth_date,
            condition,
        }
    }
}
