// Clinic Store - owners, pets, visits and their ownership links
//
// Every write that touches an entity row and its ownership rows runs in one
// IMMEDIATE transaction. Dropping the transaction on an early `?` rolls the
// whole write back.

use crate::db::{
    self, like_pattern, owner_from_row, pet_from_row, visit_date_from_row, visit_from_row, OWNER_COLUMNS,
    PET_COLUMNS, VISIT_COLUMNS,
};
use crate::entities::{
    Owner, OwnerDraft, Pet, PetDetails, PetDraft, PetSummary, Visit, VisitDate, VisitDraft,
};
use crate::error::{ClinicError, Result};
use crate::ownership::{self, OwnershipSide};
use crate::schema::{validate_owner, validate_pet, validate_visit};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use tracing::{debug, info};

pub struct ClinicStore {
    conn: Connection,
}

impl ClinicStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = db::open(path)?;
        info!(path = %path.display(), "clinic database opened");
        Ok(ClinicStore { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(ClinicStore {
            conn: db::open_in_memory()?,
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    // ========================================================================
    // OWNERS
    // ========================================================================

    pub fn create_owner(&mut self, draft: &OwnerDraft, pet_ids: &BTreeSet<i64>) -> Result<i64> {
        let fields = validate_owner(draft)?;

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO owners (first_name, last_name, age, phone) VALUES (?1, ?2, ?3, ?4)",
            params![fields.first_name, fields.last_name, fields.age, fields.phone],
        )?;
        let id = tx.last_insert_rowid();
        ownership::insert_associations(&tx, OwnershipSide::Owner, id, pet_ids)?;
        tx.commit()?;

        info!(owner_id = id, pets = pet_ids.len(), "owner created");
        Ok(id)
    }

    /// Update every mutable owner field. `Some(ids)` replaces the owner's pets
    /// (an empty set clears them); `None` leaves them untouched.
    pub fn update_owner(
        &mut self,
        id: i64,
        draft: &OwnerDraft,
        pet_ids: Option<&BTreeSet<i64>>,
    ) -> Result<()> {
        let fields = validate_owner(draft)?;

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let updated = tx.execute(
            "UPDATE owners SET first_name = ?1, last_name = ?2, age = ?3, phone = ?4 WHERE id = ?5",
            params![fields.first_name, fields.last_name, fields.age, fields.phone, id],
        )?;
        if updated == 0 {
            return Err(ClinicError::not_found("owner", id));
        }
        if let Some(ids) = pet_ids {
            ownership::set_associations(&tx, OwnershipSide::Owner, id, ids)?;
        }
        tx.commit()?;

        info!(owner_id = id, replaced_pets = pet_ids.is_some(), "owner updated");
        Ok(())
    }

    /// Returns whether a row was removed. Ownership rows cascade.
    pub fn delete_owner(&mut self, id: i64) -> Result<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM owners WHERE id = ?1", params![id])?;
        info!(owner_id = id, removed = removed > 0, "owner delete");
        Ok(removed > 0)
    }

    pub fn get_owner(&self, id: i64) -> Result<Option<Owner>> {
        let sql = format!("SELECT {} FROM owners o WHERE o.id = ?1", OWNER_COLUMNS);
        let owner = self
            .conn
            .query_row(&sql, params![id], owner_from_row)
            .optional()?;

        match owner {
            Some(mut owner) => {
                owner.pet_ids = self.pet_ids_for_owner(owner.id)?;
                Ok(Some(owner))
            }
            None => Ok(None),
        }
    }

    pub fn list_owners(&self) -> Result<Vec<Owner>> {
        let sql = format!(
            "SELECT {} FROM owners o ORDER BY o.first_name, o.last_name, o.id",
            OWNER_COLUMNS
        );
        self.owners_with_pets(&sql, params![])
    }

    /// Case-insensitive substring match on first, last and full name.
    /// A blank query matches nothing.
    pub fn search_owners(&self, query: &str) -> Result<Vec<Owner>> {
        let Some(pattern) = like_pattern(query) else {
            return Ok(Vec::new());
        };

        let sql = format!(
            "SELECT {} FROM owners o
             WHERE unicode_lower(o.first_name) LIKE ?1 ESCAPE '\\'
                OR unicode_lower(o.last_name) LIKE ?1 ESCAPE '\\'
                OR unicode_lower(o.first_name || ' ' || o.last_name) LIKE ?1 ESCAPE '\\'
             ORDER BY o.first_name, o.last_name, o.id",
            OWNER_COLUMNS
        );
        self.owners_with_pets(&sql, params![pattern])
    }

    pub fn owners_for_pet(&self, pet_id: i64) -> Result<Vec<Owner>> {
        let sql = format!(
            "SELECT {} FROM owners o
             JOIN ownership ow ON ow.owner_id = o.id
             WHERE ow.pet_id = ?1
             ORDER BY o.first_name, o.last_name, o.id",
            OWNER_COLUMNS
        );
        self.owners_with_pets(&sql, params![pet_id])
    }

    pub fn owner_ids_for_pet(&self, pet_id: i64) -> Result<Vec<i64>> {
        ownership::associated_ids(&self.conn, OwnershipSide::Pet, pet_id)
    }

    fn owners_with_pets(&self, sql: &str, args: impl rusqlite::Params) -> Result<Vec<Owner>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut owners = stmt
            .query_map(args, owner_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut pets = ownership::association_map(&self.conn, OwnershipSide::Owner)?;
        for owner in &mut owners {
            owner.pet_ids = pets.remove(&owner.id).unwrap_or_default();
        }

        Ok(owners)
    }

    // ========================================================================
    // PETS
    // ========================================================================

    /// Insert the pet and one ownership row per owner id, atomically. An
    /// unknown owner id rolls the pet insert back.
    pub fn create_pet(&mut self, draft: &PetDraft, owner_ids: &BTreeSet<i64>) -> Result<i64> {
        let fields = validate_pet(draft)?;

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO pets (name, age, species, birth_date, condition) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                fields.name,
                fields.age,
                fields.species,
                fields.birth_date,
                fields.condition
            ],
        )?;
        let id = tx.last_insert_rowid();
        ownership::insert_associations(&tx, OwnershipSide::Pet, id, owner_ids)?;
        tx.commit()?;

        info!(pet_id = id, owners = owner_ids.len(), "pet created");
        Ok(id)
    }

    pub fn update_pet(
        &mut self,
        id: i64,
        draft: &PetDraft,
        owner_ids: Option<&BTreeSet<i64>>,
    ) -> Result<()> {
        let fields = validate_pet(draft)?;

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let updated = tx.execute(
            "UPDATE pets SET name = ?1, age = ?2, species = ?3, birth_date = ?4, condition = ?5
             WHERE id = ?6",
            params![
                fields.name,
                fields.age,
                fields.species,
                fields.birth_date,
                fields.condition,
                id
            ],
        )?;
        if updated == 0 {
            return Err(ClinicError::not_found("pet", id));
        }
        if let Some(ids) = owner_ids {
            ownership::set_associations(&tx, OwnershipSide::Pet, id, ids)?;
        }
        tx.commit()?;

        info!(pet_id = id, replaced_owners = owner_ids.is_some(), "pet updated");
        Ok(())
    }

    /// Returns whether a row was removed. Ownership and visits cascade.
    pub fn delete_pet(&mut self, id: i64) -> Result<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM pets WHERE id = ?1", params![id])?;
        info!(pet_id = id, removed = removed > 0, "pet delete");
        Ok(removed > 0)
    }

    pub fn get_pet(&self, id: i64) -> Result<Option<Pet>> {
        let sql = format!("SELECT {} FROM pets p WHERE p.id = ?1", PET_COLUMNS);
        let pet = self
            .conn
            .query_row(&sql, params![id], pet_from_row)
            .optional()?;

        match pet {
            Some(mut pet) => {
                pet.owner_ids = self.owner_ids_for_pet(pet.id)?;
                Ok(Some(pet))
            }
            None => Ok(None),
        }
    }

    pub fn list_pets(&self) -> Result<Vec<Pet>> {
        let sql = format!("SELECT {} FROM pets p ORDER BY p.name, p.id", PET_COLUMNS);
        self.pets_with_owners(&sql, params![])
    }

    pub fn pets_for_owner(&self, owner_id: i64) -> Result<Vec<Pet>> {
        let sql = format!(
            "SELECT {} FROM pets p
             JOIN ownership ow ON ow.pet_id = p.id
             WHERE ow.owner_id = ?1
             ORDER BY p.name, p.id",
            PET_COLUMNS
        );
        self.pets_with_owners(&sql, params![owner_id])
    }

    pub fn pet_ids_for_owner(&self, owner_id: i64) -> Result<Vec<i64>> {
        ownership::associated_ids(&self.conn, OwnershipSide::Owner, owner_id)
    }

    /// Case-insensitive substring match on species. A blank query matches nothing.
    pub fn pets_by_species(&self, species: &str) -> Result<Vec<Pet>> {
        let Some(pattern) = like_pattern(species) else {
            return Ok(Vec::new());
        };

        let sql = format!(
            "SELECT {} FROM pets p WHERE unicode_lower(p.species) LIKE ?1 ESCAPE '\\' ORDER BY p.name, p.id",
            PET_COLUMNS
        );
        self.pets_with_owners(&sql, params![pattern])
    }

    /// Pets whose name contains `name`, each with its owners and visits.
    pub fn search_pets(&self, name: &str) -> Result<Vec<PetDetails>> {
        let Some(pattern) = like_pattern(name) else {
            return Ok(Vec::new());
        };

        let sql = format!(
            "SELECT {} FROM pets p WHERE unicode_lower(p.name) LIKE ?1 ESCAPE '\\' ORDER BY p.name, p.id",
            PET_COLUMNS
        );
        let pets = self.pets_with_owners(&sql, params![pattern])?;
        pets.into_iter().map(|pet| self.details_for(pet)).collect()
    }

    pub fn pet_details(&self, pet_id: i64) -> Result<Option<PetDetails>> {
        match self.get_pet(pet_id)? {
            Some(pet) => Ok(Some(self.details_for(pet)?)),
            None => Ok(None),
        }
    }

    pub fn pet_details_for_owner(&self, owner_id: i64) -> Result<Vec<PetDetails>> {
        self.pets_for_owner(owner_id)?
            .into_iter()
            .map(|pet| self.details_for(pet))
            .collect()
    }

    /// Every pet with its owners' names joined by `" || "` and its latest visit.
    pub fn pet_summaries(&self) -> Result<Vec<PetSummary>> {
        let mut names = self.owner_names_by_pet()?;

        let sql = format!(
            "SELECT {}, v.id, v.date, v.diagnosis, v.treatment
             FROM pets p
             LEFT JOIN visits v ON v.id = (
                 SELECT v2.id FROM visits v2
                 WHERE v2.pet_id = p.id
                 ORDER BY v2.date DESC, v2.id DESC
                 LIMIT 1
             )
             ORDER BY p.name, p.id",
            PET_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], |row| {
                let pet = pet_from_row(row)?;
                Ok((
                    pet,
                    row.get::<_, Option<i64>>(6)?,
                    row.get::<_, Option<NaiveDate>>(7)?,
                    row.get::<_, Option<String>>(8)?,
                    row.get::<_, Option<String>>(9)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let summaries = rows
            .into_iter()
            .map(|(pet, visit_id, visit_date, diagnosis, treatment)| PetSummary {
                owners: names.remove(&pet.id).unwrap_or_default().join(" || "),
                id: pet.id,
                name: pet.name,
                age: pet.age,
                species: pet.species,
                birth_date: pet.birth_date,
                condition: pet.condition,
                last_visit_id: visit_id,
                last_visit_date: visit_date,
                last_visit_diagnosis: diagnosis,
                last_visit_treatment: treatment,
            })
            .collect();

        Ok(summaries)
    }

    /// "First Last" of every owner, per pet, ordered by owner name.
    pub fn owner_names_by_pet(&self) -> Result<HashMap<i64, Vec<String>>> {
        let mut stmt = self.conn.prepare(
            "SELECT ow.pet_id, o.first_name || ' ' || o.last_name
             FROM ownership ow
             JOIN owners o ON o.id = ow.owner_id
             ORDER BY o.first_name, o.last_name, o.id",
        )?;
        let mut rows = stmt.query([])?;

        let mut names: HashMap<i64, Vec<String>> = HashMap::new();
        while let Some(row) = rows.next()? {
            names.entry(row.get(0)?).or_default().push(row.get(1)?);
        }

        Ok(names)
    }

    fn pets_with_owners(&self, sql: &str, args: impl rusqlite::Params) -> Result<Vec<Pet>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut pets = stmt
            .query_map(args, pet_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut owners = ownership::association_map(&self.conn, OwnershipSide::Pet)?;
        for pet in &mut pets {
            pet.owner_ids = owners.remove(&pet.id).unwrap_or_default();
        }

        Ok(pets)
    }

    fn details_for(&self, pet: Pet) -> Result<PetDetails> {
        let owners = self.owners_for_pet(pet.id)?;
        let visits = self.visits_for_pet(pet.id)?;
        Ok(PetDetails { pet, owners, visits })
    }

    // ========================================================================
    // VISITS
    // ========================================================================

    /// The referenced pet must exist; otherwise nothing is written.
    pub fn create_visit(&mut self, draft: &VisitDraft) -> Result<i64> {
        let fields = validate_visit(draft)?;

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        ensure_pet_exists(&tx, fields.pet_id)?;
        tx.execute(
            "INSERT INTO visits (pet_id, date, diagnosis, treatment) VALUES (?1, ?2, ?3, ?4)",
            params![fields.pet_id, fields.date, fields.diagnosis, fields.treatment],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        info!(visit_id = id, pet_id = fields.pet_id, "visit created");
        Ok(id)
    }

    pub fn update_visit(&mut self, id: i64, draft: &VisitDraft) -> Result<()> {
        let fields = validate_visit(draft)?;

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        ensure_pet_exists(&tx, fields.pet_id)?;
        let updated = tx.execute(
            "UPDATE visits SET pet_id = ?1, date = ?2, diagnosis = ?3, treatment = ?4 WHERE id = ?5",
            params![fields.pet_id, fields.date, fields.diagnosis, fields.treatment, id],
        )?;
        if updated == 0 {
            return Err(ClinicError::not_found("visit", id));
        }
        tx.commit()?;

        info!(visit_id = id, pet_id = fields.pet_id, "visit updated");
        Ok(())
    }

    pub fn delete_visit(&mut self, id: i64) -> Result<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM visits WHERE id = ?1", params![id])?;
        info!(visit_id = id, removed = removed > 0, "visit delete");
        Ok(removed > 0)
    }

    pub fn get_visit(&self, id: i64) -> Result<Option<Visit>> {
        let sql = format!("SELECT {} FROM visits v WHERE v.id = ?1", VISIT_COLUMNS);
        Ok(self
            .conn
            .query_row(&sql, params![id], visit_from_row)
            .optional()?)
    }

    /// All visits, newest first.
    pub fn list_visits(&self) -> Result<Vec<Visit>> {
        let sql = format!(
            "SELECT {} FROM visits v ORDER BY v.date DESC, v.id DESC",
            VISIT_COLUMNS
        );
        self.query_visits(&sql, params![])
    }

    pub fn visits_for_pet(&self, pet_id: i64) -> Result<Vec<Visit>> {
        let sql = format!(
            "SELECT {} FROM visits v WHERE v.pet_id = ?1 ORDER BY v.date DESC, v.id DESC",
            VISIT_COLUMNS
        );
        self.query_visits(&sql, params![pet_id])
    }

    pub fn visits_for_pet_on(&self, pet_id: i64, date: NaiveDate) -> Result<Vec<Visit>> {
        let sql = format!(
            "SELECT {} FROM visits v WHERE v.pet_id = ?1 AND v.date = ?2 ORDER BY v.id DESC",
            VISIT_COLUMNS
        );
        self.query_visits(&sql, params![pet_id, date])
    }

    pub fn visit_dates_for_pet(&self, pet_id: i64) -> Result<Vec<VisitDate>> {
        let mut stmt = self.conn.prepare(
            "SELECT v.id, v.date FROM visits v WHERE v.pet_id = ?1 ORDER BY v.date DESC, v.id DESC",
        )?;
        let dates = stmt
            .query_map(params![pet_id], visit_date_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(dates)
    }

    fn query_visits(&self, sql: &str, args: impl rusqlite::Params) -> Result<Vec<Visit>> {
        let mut stmt = self.conn.prepare(sql)?;
        let visits = stmt
            .query_map(args, visit_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(visits)
    }

    // ========================================================================
    // OWNERSHIP
    // ========================================================================

    /// The owner and pet of one ownership pair, or `None` when they are not paired.
    pub fn ownership(&self, pet_id: i64, owner_id: i64) -> Result<Option<(Owner, Pet)>> {
        if !ownership::is_paired(&self.conn, pet_id, owner_id)? {
            debug!(pet_id, owner_id, "ownership pair not found");
            return Ok(None);
        }

        match (self.get_owner(owner_id)?, self.get_pet(pet_id)?) {
            (Some(owner), Some(pet)) => Ok(Some((owner, pet))),
            _ => Ok(None),
        }
    }
}

fn ensure_pet_exists(conn: &Connection, pet_id: i64) -> Result<()> {
    let exists = conn
        .prepare_cached("SELECT 1 FROM pets WHERE id = ?1")?
        .exists(params![pet_id])?;

    if exists {
        Ok(())
    } else {
        Err(ClinicError::MissingReference(format!(
            "pet {} does not exist",
            pet_id
        )))
    }
}
