use crate::entities::{Owner, Pet, Visit, VisitDate};
use crate::error::Result;
use rusqlite::functions::FunctionFlags;
use rusqlite::{Connection, Row};
use std::path::Path;

/// Open (or create) the clinic database at `path` and make sure the schema exists.
pub fn open(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;

    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    setup_database(&conn)?;
    Ok(conn)
}

/// Fresh private in-memory database with the schema applied.
pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    setup_database(&conn)?;
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Cascades on ownership and visits depend on this; it is per connection.
    conn.pragma_update(None, "foreign_keys", "ON")?;

    // SQLite's LOWER() only folds ASCII; names like "Ángel" need full Unicode.
    register_unicode_lower(conn)?;

    // ==========================================================================
    // Entity tables
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS owners (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            age INTEGER NOT NULL CHECK (age >= 0),
            phone TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS pets (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            age INTEGER NOT NULL CHECK (age >= 0),
            species TEXT NOT NULL,
            birth_date TEXT NOT NULL,
            condition TEXT NOT NULL DEFAULT 'Healthy',
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS visits (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            pet_id INTEGER NOT NULL REFERENCES pets(id) ON DELETE CASCADE,
            date TEXT NOT NULL,
            diagnosis TEXT NOT NULL,
            treatment TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Ownership (owner <-> pet, many-to-many)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS ownership (
            owner_id INTEGER NOT NULL REFERENCES owners(id) ON DELETE CASCADE,
            pet_id INTEGER NOT NULL REFERENCES pets(id) ON DELETE CASCADE,
            PRIMARY KEY (owner_id, pet_id)
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_ownership_pet ON ownership(pet_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_visits_pet_date ON visits(pet_id, date)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_pets_species ON pets(species)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// ROW MAPPING
// Association ids are resolved by the store after the row is read.
// ============================================================================

pub const OWNER_COLUMNS: &str = "o.id, o.first_name, o.last_name, o.age, o.phone";
pub const PET_COLUMNS: &str = "p.id, p.name, p.age, p.species, p.birth_date, p.condition";
pub const VISIT_COLUMNS: &str = "v.id, v.pet_id, v.date, v.diagnosis, v.treatment";

pub fn owner_from_row(row: &Row<'_>) -> rusqlite::Result<Owner> {
    Ok(Owner {
        id: row.get(0)?,
        first_name: row.get(1)?,
        last_name: row.get(2)?,
        age: row.get(3)?,
        phone: row.get(4)?,
        pet_ids: Vec::new(),
    })
}

pub fn pet_from_row(row: &Row<'_>) -> rusqlite::Result<Pet> {
    Ok(Pet {
        id: row.get(0)?,
        name: row.get(1)?,
        age: row.get(2)?,
        species: row.get(3)?,
        birth_date: row.get(4)?,
        condition: row.get(5)?,
        owner_ids: Vec::new(),
    })
}

pub fn visit_from_row(row: &Row<'_>) -> rusqlite::Result<Visit> {
    Ok(Visit {
        id: row.get(0)?,
        pet_id: row.get(1)?,
        date: row.get(2)?,
        diagnosis: row.get(3)?,
        treatment: row.get(4)?,
    })
}

pub fn visit_date_from_row(row: &Row<'_>) -> rusqlite::Result<VisitDate> {
    Ok(VisitDate {
        id: row.get(0)?,
        date: row.get(1)?,
    })
}

/// `unicode_lower(text)`: Rust's Unicode lowercasing as a SQL function. NULL stays NULL.
pub fn register_unicode_lower(conn: &Connection) -> Result<()> {
    conn.create_scalar_function(
        "unicode_lower",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| Ok(ctx.get::<Option<String>>(0)?.map(|s| s.to_lowercase())),
    )?;
    Ok(())
}

/// `term%`, for ranking prefix matches ahead of other substring matches.
pub(crate) fn prefix_pattern(query: &str) -> Option<String> {
    like_pattern(query).map(|pattern| pattern[1..].to_string())
}

/// `%term%` for a case-insensitive LIKE, with wildcards in the term escaped.
pub(crate) fn like_pattern(query: &str) -> Option<String> {
    let term = query.trim().to_lowercase();
    if term.is_empty() {
        return None;
    }

    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');

    Some(pattern)
}

pub fn count_rows(conn: &Connection, table: &str) -> Result<i64> {
    let sql = format!("SELECT COUNT(*) FROM {}", table);
    let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;

    Ok(count)
}
