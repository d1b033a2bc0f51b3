// Ownership - the owner <-> pet association table
//
// All writes to `ownership` go through `set_associations`. It runs inside the
// caller's transaction, so an entity write and its association rows commit or
// roll back together.

use crate::error::{ClinicError, Result};
use rusqlite::{params, Connection, ErrorCode};
use std::collections::{BTreeSet, HashMap};

/// Which end of the association an entity id sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnershipSide {
    Pet,
    Owner,
}

impl OwnershipSide {
    fn own_column(&self) -> &'static str {
        match self {
            OwnershipSide::Pet => "pet_id",
            OwnershipSide::Owner => "owner_id",
        }
    }

    fn other_column(&self) -> &'static str {
        match self {
            OwnershipSide::Pet => "owner_id",
            OwnershipSide::Owner => "pet_id",
        }
    }

    /// Entity named by the ids on the other end.
    fn other_entity(&self) -> &'static str {
        match self {
            OwnershipSide::Pet => "owner",
            OwnershipSide::Owner => "pet",
        }
    }
}

/// Drop non-positive ids and duplicates; result is ascending.
pub fn normalize_ids<I>(ids: I) -> BTreeSet<i64>
where
    I: IntoIterator<Item = i64>,
{
    ids.into_iter().filter(|id| *id > 0).collect()
}

/// Replace every association of `entity_id` with exactly `ids`.
///
/// An empty set clears the entity's associations. Applying the same set twice
/// leaves the table unchanged.
pub fn set_associations(
    conn: &Connection,
    side: OwnershipSide,
    entity_id: i64,
    ids: &BTreeSet<i64>,
) -> Result<()> {
    let delete = format!("DELETE FROM ownership WHERE {} = ?1", side.own_column());
    conn.execute(&delete, params![entity_id])?;

    insert_associations(conn, side, entity_id, ids)
}

/// Insert one association row per id, without touching existing rows.
pub fn insert_associations(
    conn: &Connection,
    side: OwnershipSide,
    entity_id: i64,
    ids: &BTreeSet<i64>,
) -> Result<()> {
    if ids.is_empty() {
        return Ok(());
    }

    let insert = format!(
        "INSERT OR IGNORE INTO ownership ({}, {}) VALUES (?1, ?2)",
        side.own_column(),
        side.other_column()
    );
    let mut stmt = conn.prepare_cached(&insert)?;

    for other_id in ids.iter().filter(|id| **id > 0) {
        stmt.execute(params![entity_id, other_id])
            .map_err(|e| missing_reference(e, side, *other_id))?;
    }

    Ok(())
}

/// Ids on the other end of `entity_id`'s associations, ascending.
pub fn associated_ids(conn: &Connection, side: OwnershipSide, entity_id: i64) -> Result<Vec<i64>> {
    let query = format!(
        "SELECT {} FROM ownership WHERE {} = ?1 ORDER BY {}",
        side.other_column(),
        side.own_column(),
        side.other_column()
    );
    let mut stmt = conn.prepare_cached(&query)?;

    let ids = stmt
        .query_map(params![entity_id], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<i64>>>()?;

    Ok(ids)
}

/// Every association keyed by the `side` entity, values ascending.
pub fn association_map(conn: &Connection, side: OwnershipSide) -> Result<HashMap<i64, Vec<i64>>> {
    let query = format!(
        "SELECT {}, {} FROM ownership ORDER BY {}, {}",
        side.own_column(),
        side.other_column(),
        side.own_column(),
        side.other_column()
    );
    let mut stmt = conn.prepare_cached(&query)?;
    let mut rows = stmt.query([])?;

    let mut map: HashMap<i64, Vec<i64>> = HashMap::new();
    while let Some(row) = rows.next()? {
        map.entry(row.get(0)?).or_default().push(row.get(1)?);
    }

    Ok(map)
}

pub fn is_paired(conn: &Connection, pet_id: i64, owner_id: i64) -> Result<bool> {
    let mut stmt =
        conn.prepare_cached("SELECT 1 FROM ownership WHERE pet_id = ?1 AND owner_id = ?2")?;
    Ok(stmt.exists(params![pet_id, owner_id])?)
}

fn missing_reference(err: rusqlite::Error, side: OwnershipSide, other_id: i64) -> ClinicError {
    match err.sqlite_error_code() {
        Some(ErrorCode::ConstraintViolation) => ClinicError::MissingReference(format!(
            "{} {} does not exist",
            side.other_entity(),
            other_id
        )),
        _ => ClinicError::Storage(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn seeded() -> Connection {
        let conn = db::open_in_memory().unwrap();
        conn.execute_batch(
            "INSERT INTO owners (first_name, last_name, age) VALUES ('Ana', 'Ruiz', 30), ('Luis', 'Mora', 41);
             INSERT INTO pets (name, age, species, birth_date) VALUES ('Toby', 2, 'Perro', '2022-01-01'), ('Mishi', 4, 'Gato', '2020-02-02');",
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_normalize_ids_filters_and_dedupes() {
        let ids = normalize_ids(vec![3, 1, 0, -2, 3, 1]);
        assert_eq!(ids.into_iter().collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn test_set_associations_replaces_not_merges() {
        let conn = seeded();

        set_associations(&conn, OwnershipSide::Pet, 1, &normalize_ids([1, 2])).unwrap();
        assert_eq!(associated_ids(&conn, OwnershipSide::Pet, 1).unwrap(), vec![1, 2]);

        set_associations(&conn, OwnershipSide::Pet, 1, &normalize_ids([2])).unwrap();
        assert_eq!(associated_ids(&conn, OwnershipSide::Pet, 1).unwrap(), vec![2]);
        assert_eq!(associated_ids(&conn, OwnershipSide::Owner, 1).unwrap(), Vec::<i64>::new());
    }

    #[test]
    fn test_set_associations_is_idempotent() {
        let conn = seeded();
        let ids = normalize_ids([1, 2]);

        set_associations(&conn, OwnershipSide::Owner, 1, &ids).unwrap();
        set_associations(&conn, OwnershipSide::Owner, 1, &ids).unwrap();

        assert_eq!(associated_ids(&conn, OwnershipSide::Owner, 1).unwrap(), vec![1, 2]);
        assert!(is_paired(&conn, 2, 1).unwrap());
        assert!(!is_paired(&conn, 2, 2).unwrap());
    }

    #[test]
    fn test_unknown_id_is_missing_reference() {
        let conn = seeded();

        let err = set_associations(&conn, OwnershipSide::Pet, 1, &normalize_ids([1, 77]))
            .unwrap_err();

        match err {
            ClinicError::MissingReference(msg) => assert_eq!(msg, "owner 77 does not exist"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
