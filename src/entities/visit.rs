// 🩺 Visit Entity - one medical visit of one pet

use super::{trimmed, Domain, Record};
use crate::store::ClinicStore;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Visit {
    pub id: i64,
    pub pet_id: i64,
    pub date: NaiveDate,
    pub diagnosis: String,
    pub treatment: String,
}

impl Record for Visit {
    const DOMAIN: Domain = Domain::Visits;

    fn key(&self) -> i64 {
        self.id
    }

    fn search_fields(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.date.format("%Y-%m-%d").to_string(),
            self.diagnosis.clone(),
        ]
    }

    /// An id filter finds a visit by its own id or by the pet it belongs to.
    fn matches_id(&self, id: i64) -> bool {
        self.id == id || self.pet_id == id
    }

    fn list_from(store: &ClinicStore) -> crate::error::Result<Vec<Self>> {
        store.list_visits()
    }
}

/// Lightweight visit listing (id + date only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitDate {
    pub id: i64,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisitDraft {
    #[serde(default)]
    pub pet_id: Option<i64>,
    /// Expected as `YYYY-MM-DD`.
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub diagnosis: String,
    #[serde(default)]
    pub treatment: String,
}

impl VisitDraft {
    pub fn new(pet_id: i64, date: &str, diagnosis: &str, treatment: &str) -> Self {
        VisitDraft {
            pet_id: Some(pet_id),
            date: date.to_string(),
            diagnosis: diagnosis.to_string(),
            treatment: treatment.to_string(),
        }
    }

    pub fn from_visit(visit: &Visit) -> Self {
        VisitDraft {
            pet_id: Some(visit.pet_id),
            date: visit.date.format("%Y-%m-%d").to_string(),
            diagnosis: visit.diagnosis.clone(),
            treatment: visit.treatment.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisitFields {
    pub pet_id: i64,
    pub date: NaiveDate,
    pub diagnosis: String,
    pub treatment: String,
}

impl VisitFields {
    pub(crate) fn from_draft(draft: &VisitDraft, pet_id: i64, date: NaiveDate) -> Self {
        VisitFields {
            pet_id,
            date,
            diagnosis: trimmed(&draft.diagnosis),
            treatment: trimmed(&draft.treatment),
        }
    }
}
