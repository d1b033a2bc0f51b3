// CSV export of every pet with its owners' names

use crate::error::{ClinicError, Result};
use crate::store::ClinicStore;
use chrono::{DateTime, Utc};
use std::io::Write;
use tracing::info;

pub const CSV_HEADER: [&str; 7] = [
    "id",
    "name",
    "age",
    "species",
    "birth_date",
    "condition",
    "owners",
];

/// Attachment name for an export produced at `at`.
pub fn export_filename(at: DateTime<Utc>) -> String {
    format!("pets_export_{}.csv", at.format("%Y%m%d_%H%M%S"))
}

/// Write one row per pet, ordered by name. Owner names are joined with `"; "`.
pub fn write_pets_csv<W: Write>(store: &ClinicStore, out: W) -> Result<usize> {
    let pets = store.list_pets()?;
    let mut names = store.owner_names_by_pet()?;

    let mut wtr = csv::Writer::from_writer(out);
    wtr.write_record(CSV_HEADER)?;

    for pet in &pets {
        let owners = names.remove(&pet.id).unwrap_or_default().join("; ");
        wtr.write_record([
            pet.id.to_string(),
            pet.name.clone(),
            pet.age.to_string(),
            pet.species.clone(),
            pet.birth_date.format("%Y-%m-%d").to_string(),
            pet.condition.clone(),
            owners,
        ])?;
    }

    wtr.flush().map_err(|e| ClinicError::Csv(e.into()))?;
    info!(rows = pets.len(), "pets exported");
    Ok(pets.len())
}

/// Export into an in-memory buffer (for HTTP attachments).
pub fn pets_csv_bytes(store: &ClinicStore) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    write_pets_csv(store, &mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{OwnerDraft, PetDraft};
    use chrono::TimeZone;
    use std::collections::BTreeSet;

    #[test]
    fn test_export_filename() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(export_filename(at), "pets_export_20240309_140507.csv");
    }

    #[test]
    fn test_pets_csv_joins_owner_names() {
        let mut store = ClinicStore::open_in_memory().unwrap();
        let none = BTreeSet::new();
        store.create_owner(&OwnerDraft::new("Luis", "Mora", 41), &none).unwrap();
        store.create_owner(&OwnerDraft::new("Ana", "Ruiz", 30), &none).unwrap();
        store
            .create_pet(
                &PetDraft::new("Toby", 2, "Perro", "2022-01-01"),
                &[1, 2].into_iter().collect(),
            )
            .unwrap();
        store
            .create_pet(&PetDraft::new("Mishi", 4, "Gato", "2020-02-02").with_condition("Alergia, leve"), &none)
            .unwrap();

        let text = String::from_utf8(pets_csv_bytes(&store).unwrap()).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "id,name,age,species,birth_date,condition,owners");
        assert_eq!(lines[1], "2,Mishi,4,Gato,2020-02-02,\"Alergia, leve\",");
        assert_eq!(lines[2], "1,Toby,2,Perro,2022-01-01,Healthy,Ana Ruiz; Luis Mora");
    }

    #[test]
    fn test_export_to_file() {
        let store = ClinicStore::open_in_memory().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pets.csv");

        let file = std::fs::File::create(&path).unwrap();
        let rows = write_pets_csv(&store, file).unwrap();

        assert_eq!(rows, 0);
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.trim_end(), CSV_HEADER.join(","));
    }
}
