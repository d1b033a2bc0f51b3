// 📐 Shape Layer - Draft Validation
// Turns raw drafts into validated field sets. Every problem is collected,
// so a client sees all of them at once instead of one per round trip.

use crate::entities::{OwnerDraft, OwnerFields, PetDraft, PetFields, VisitDraft, VisitFields};
use crate::error::ClinicError;
use chrono::NaiveDate;

/// Oldest age accepted for an owner.
pub const MAX_OWNER_AGE: i64 = 140;

// ============================================================================
// VALIDATION RESULT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: &str) -> Self {
        ValidationError {
            field,
            message: message.to_string(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult<T> = Result<T, Vec<ValidationError>>;

impl From<Vec<ValidationError>> for ClinicError {
    fn from(errors: Vec<ValidationError>) -> Self {
        ClinicError::Validation(errors.iter().map(|e| e.to_string()).collect())
    }
}

// ============================================================================
// DATES
// ============================================================================

/// Parse a strict `YYYY-MM-DD` calendar date.
///
/// Zero padding is required and the date must exist (no 2023-02-30).
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    let shaped = value.len() == 10
        && value.char_indices().all(|(i, c)| match i {
            4 | 7 => c == '-',
            _ => c.is_ascii_digit(),
        });

    if !shaped {
        return None;
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

// ============================================================================
// VALIDATORS
// ============================================================================

pub fn validate_owner(draft: &OwnerDraft) -> ValidationResult<OwnerFields> {
    let mut errors = Vec::new();

    if draft.first_name.trim().is_empty() {
        errors.push(ValidationError::new("first_name", "first_name is required"));
    }

    if draft.last_name.trim().is_empty() {
        errors.push(ValidationError::new("last_name", "last_name is required"));
    }

    let age = match draft.age {
        Some(age) if (0..=MAX_OWNER_AGE).contains(&age) => Some(age),
        _ => {
            errors.push(ValidationError::new(
                "age",
                &format!("age must be between 0 and {}", MAX_OWNER_AGE),
            ));
            None
        }
    };

    match age {
        Some(age) if errors.is_empty() => Ok(OwnerFields::from_draft(draft, age)),
        _ => Err(errors),
    }
}

pub fn validate_pet(draft: &PetDraft) -> ValidationResult<PetFields> {
    let mut errors = Vec::new();

    if draft.name.trim().is_empty() {
        errors.push(ValidationError::new("name", "name is required"));
    }

    let age = match draft.age {
        Some(age) if age >= 0 => Some(age),
        _ => {
            errors.push(ValidationError::new("age", "age must be >= 0"));
            None
        }
    };

    if draft.species.trim().is_empty() {
        errors.push(ValidationError::new("species", "species is required"));
    }

    let birth_date = parse_date(&draft.birth_date);
    if birth_date.is_none() {
        errors.push(ValidationError::new(
            "birth_date",
            "birth_date must be YYYY-MM-DD",
        ));
    }

    match (age, birth_date) {
        (Some(age), Some(birth_date)) if errors.is_empty() => {
            Ok(PetFields::from_draft(draft, age, birth_date))
        }
        _ => Err(errors),
    }
}

pub fn validate_visit(draft: &VisitDraft) -> ValidationResult<VisitFields> {
    let mut errors = Vec::new();

    let pet_id = match draft.pet_id {
        Some(id) if id > 0 => Some(id),
        _ => {
            errors.push(ValidationError::new("pet_id", "pet_id is invalid"));
            None
        }
    };

    let date = parse_date(&draft.date);
    if date.is_none() {
        errors.push(ValidationError::new("date", "date must be YYYY-MM-DD"));
    }

    if draft.diagnosis.trim().is_empty() {
        errors.push(ValidationError::new("diagnosis", "diagnosis is required"));
    }

    if draft.treatment.trim().is_empty() {
        errors.push(ValidationError::new("treatment", "treatment is required"));
    }

    match (pet_id, date) {
        (Some(pet_id), Some(date)) if errors.is_empty() => {
            Ok(VisitFields::from_draft(draft, pet_id, date))
        }
        _ => Err(errors),
    }
}

// ============================================================================
// TESTS
// ============================================================================
