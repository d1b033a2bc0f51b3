// Autocomplete - substring suggestions for search inputs, prefix matches first

use crate::db::{like_pattern, prefix_pattern};
use crate::error::{ClinicError, Result};
use rusqlite::{params, Connection};
use serde::Serialize;

pub const DEFAULT_LIMIT: usize = 10;
pub const MIN_LIMIT: usize = 5;
pub const MAX_LIMIT: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuggestField {
    Owner,
    Pet,
    Species,
}

impl SuggestField {
    /// Accepts the field names clients have historically sent.
    pub fn parse(s: &str) -> Option<SuggestField> {
        match s.trim().to_lowercase().as_str() {
            "owner" | "dueno" | "dueño" => Some(SuggestField::Owner),
            "pet" | "mascota" | "nombre_mascota" => Some(SuggestField::Pet),
            "species" | "especie" => Some(SuggestField::Species),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Suggestion {
    Owner { id: i64, label: String },
    Pet { id: i64, label: String, species: String },
    Species(String),
}

/// Clamp a requested limit into `MIN_LIMIT..=MAX_LIMIT`; `None` means the default.
pub fn clamp_limit(requested: Option<i64>) -> usize {
    match requested {
        Some(n) => n.clamp(MIN_LIMIT as i64, MAX_LIMIT as i64) as usize,
        None => DEFAULT_LIMIT,
    }
}

pub fn suggest(
    conn: &Connection,
    field: SuggestField,
    query: &str,
    limit: usize,
) -> Result<Vec<Suggestion>> {
    let pattern =
        like_pattern(query).ok_or_else(|| ClinicError::InvalidArgument("q is required".into()))?;
    let prefix = prefix_pattern(query).unwrap_or_default();
    let limit = limit as i64;

    let suggestions = match field {
        SuggestField::Owner => {
            let mut stmt = conn.prepare_cached(
                "SELECT id, first_name || ' ' || last_name FROM owners
                 WHERE unicode_lower(first_name) LIKE ?1 ESCAPE '\\'
                    OR unicode_lower(last_name) LIKE ?1 ESCAPE '\\'
                    OR unicode_lower(first_name || ' ' || last_name) LIKE ?1 ESCAPE '\\'
                 ORDER BY CASE WHEN unicode_lower(first_name) LIKE ?3 ESCAPE '\\'
                                 OR unicode_lower(last_name) LIKE ?3 ESCAPE '\\' THEN 0 ELSE 1 END,
                          first_name, last_name
                 LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![pattern, limit, prefix], |row| {
                Ok(Suggestion::Owner {
                    id: row.get(0)?,
                    label: row.get(1)?,
                })
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        }
        SuggestField::Pet => {
            let mut stmt = conn.prepare_cached(
                "SELECT id, name, species FROM pets
                 WHERE unicode_lower(name) LIKE ?1 ESCAPE '\\' OR unicode_lower(species) LIKE ?1 ESCAPE '\\'
                 ORDER BY CASE WHEN unicode_lower(name) LIKE ?3 ESCAPE '\\' THEN 0 ELSE 1 END, name
                 LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![pattern, limit, prefix], |row| {
                Ok(Suggestion::Pet {
                    id: row.get(0)?,
                    label: row.get(1)?,
                    species: row.get(2)?,
                })
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        }
        SuggestField::Species => {
            let mut stmt = conn.prepare_cached(
                "SELECT species FROM pets
                 WHERE unicode_lower(species) LIKE ?1 ESCAPE '\\'
                 GROUP BY species
                 ORDER BY CASE WHEN unicode_lower(species) LIKE ?3 ESCAPE '\\' THEN 0 ELSE 1 END, species
                 LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![pattern, limit, prefix], |row| {
                Ok(Suggestion::Species(row.get(0)?))
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        }
    };

    Ok(suggestions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{OwnerDraft, PetDraft};
    use crate::store::ClinicStore;
    use std::collections::BTreeSet;

    fn store() -> ClinicStore {
        let mut store = ClinicStore::open_in_memory().unwrap();
        let none = BTreeSet::new();
        store.create_owner(&OwnerDraft::new("Ana", "Ruiz", 30), &none).unwrap();
        store.create_owner(&OwnerDraft::new("Mariana", "Soto", 25), &none).unwrap();
        store.create_pet(&PetDraft::new("Toby", 2, "Perro", "2022-01-01"), &none).unwrap();
        store.create_pet(&PetDraft::new("Rex", 5, "Perro", "2019-01-01"), &none).unwrap();
        store.create_pet(&PetDraft::new("Mishi", 4, "Gato", "2020-02-02"), &none).unwrap();
        store
    }

    #[test]
    fn test_clamp_limit() {
        assert_eq!(clamp_limit(None), 10);
        assert_eq!(clamp_limit(Some(1)), 5);
        assert_eq!(clamp_limit(Some(12)), 12);
        assert_eq!(clamp_limit(Some(500)), 20);
    }

    #[test]
    fn test_field_aliases() {
        assert_eq!(SuggestField::parse("Dueño"), Some(SuggestField::Owner));
        assert_eq!(SuggestField::parse("mascota"), Some(SuggestField::Pet));
        assert_eq!(SuggestField::parse("especie"), Some(SuggestField::Species));
        assert_eq!(SuggestField::parse("visit"), None);
    }

    #[test]
    fn test_owner_suggestions() {
        let store = store();
        let found = suggest(store.connection(), SuggestField::Owner, "ana", 10).unwrap();

        assert_eq!(
            found,
            vec![
                Suggestion::Owner { id: 1, label: "Ana Ruiz".into() },
                Suggestion::Owner { id: 2, label: "Mariana Soto".into() },
            ]
        );
    }

    #[test]
    fn test_species_suggestions_are_distinct() {
        let store = store();
        let found = suggest(store.connection(), SuggestField::Species, "per", 10).unwrap();
        assert_eq!(found, vec![Suggestion::Species("Perro".into())]);
    }

    #[test]
    fn test_pet_suggestions_respect_limit_and_serialize() {
        let store = store();
        let found = suggest(store.connection(), SuggestField::Pet, "perro", 1).unwrap();
        assert_eq!(found.len(), 1);

        let json = serde_json::to_value(&found[0]).unwrap();
        assert_eq!(json["label"], "Rex");
        assert_eq!(json["species"], "Perro");
    }

    #[test]
    fn test_prefix_matches_rank_first() {
        let mut store = store();
        store
            .create_pet(&PetDraft::new("Otto", 1, "Perro", "2023-03-03"), &BTreeSet::new())
            .unwrap();

        let found = suggest(store.connection(), SuggestField::Pet, "to", 10).unwrap();
        let labels: Vec<_> = found
            .iter()
            .map(|s| match s {
                Suggestion::Pet { label, .. } => label.as_str(),
                other => panic!("unexpected suggestion: {other:?}"),
            })
            .collect();

        // Mishi matches through its species ("Gato").
        assert_eq!(labels, vec!["Toby", "Mishi", "Otto"]);
    }

    #[test]
    fn test_accented_owner_matches_any_case() {
        let mut store = store();
        store
            .create_owner(&OwnerDraft::new("Óscar", "Ñúñez", 44), &BTreeSet::new())
            .unwrap();

        let found = suggest(store.connection(), SuggestField::Owner, "ñú", 10).unwrap();
        assert_eq!(found, vec![Suggestion::Owner { id: 3, label: "Óscar Ñúñez".into() }]);
    }

    #[test]
    fn test_blank_query_is_invalid() {
        let store = store();
        let err = suggest(store.connection(), SuggestField::Pet, "  ", 10).unwrap_err();
        assert_eq!(err.status(), 422);
    }
}
