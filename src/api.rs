// 🔌 Action Endpoint - one JSON entry point dispatching on `action`
//
// Framework independent: the server binary turns an HTTP request into an
// `ApiRequest` and writes the `ApiReply` back. Inputs are the query string
// merged with a JSON object body, the body winning on conflicts.
//
// Status mapping:
//   validation → 422 {ok:false, errors:[...]}
//   invalid argument → 422, not found on edit → 404
//   missing parameter / unknown action / bad reference → 400
//   storage → 500 "database error", anything else → 500 "server error"

use crate::autocomplete::{self, SuggestField};
use crate::entities::{OwnerDraft, PetDraft, VisitDraft};
use crate::error::{ClinicError, Result};
use crate::export;
use crate::ownership::normalize_ids;
use crate::schema::parse_date;
use crate::store::ClinicStore;
use chrono::Utc;
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info};

// ============================================================================
// REQUEST / REPLY
// ============================================================================

/// Merged request parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApiRequest {
    params: Map<String, Value>,
}

impl ApiRequest {
    /// Merge query parameters with a JSON body. Only object bodies contribute.
    pub fn new<I, K, V>(query: I, body: Option<Value>) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut params: Map<String, Value> = query
            .into_iter()
            .map(|(k, v)| (k.into(), Value::String(v.into())))
            .collect();

        match body {
            Some(Value::Object(fields)) => params.extend(fields),
            Some(Value::Null) | None => {}
            Some(other) => debug!(kind = json_kind(&other), "ignoring non-object body"),
        }

        ApiRequest { params }
    }

    pub fn from_json(body: Value) -> Self {
        ApiRequest::new(std::iter::empty::<(String, String)>(), Some(body))
    }

    pub fn action(&self) -> Option<String> {
        self.text("action").filter(|a| !a.is_empty())
    }

    pub fn has(&self, key: &str) -> bool {
        self.params.contains_key(key)
    }

    /// Parameter as text, trimmed. Numbers and booleans are rendered.
    pub fn text(&self, key: &str) -> Option<String> {
        match self.params.get(key)? {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Integer parameter. Fractional numbers such as `3.7` are not integers.
    pub fn int(&self, key: &str) -> Option<i64> {
        match self.params.get(key)? {
            Value::Number(n) => n.as_i64().or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                    .map(|f| f as i64)
            }),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// A positive id, or `BadRequest` naming the parameter.
    pub fn require_id(&self, key: &str) -> Result<i64> {
        self.int(key)
            .filter(|id| *id > 0)
            .ok_or_else(|| ClinicError::BadRequest(format!("{} is required", key)))
    }

    /// Non-blank text, or `InvalidArgument` naming the parameter.
    pub fn require_text(&self, key: &str) -> Result<String> {
        self.text(key)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ClinicError::InvalidArgument(format!("{} is required", key)))
    }

    /// Relationship list; `None` when the parameter was not sent at all.
    pub fn ids(&self, key: &str) -> Option<BTreeSet<i64>> {
        self.params.get(key).map(parse_ids)
    }
}

/// Ids from a JSON array or from a string separated by commas, semicolons or
/// whitespace. Unparseable, duplicate and non-positive entries are dropped.
pub fn parse_ids(raw: &Value) -> BTreeSet<i64> {
    let ids: Vec<i64> = match raw {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::Number(n) => n.as_i64(),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            })
            .collect(),
        Value::String(s) => s
            .split(|c: char| c == ',' || c == ';' || c.is_whitespace())
            .filter_map(|part| part.trim().parse().ok())
            .collect(),
        Value::Number(n) => n.as_i64().into_iter().collect(),
        _ => Vec::new(),
    };

    normalize_ids(ids)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ApiReply {
    Json { status: u16, body: Value },
    Csv { filename: String, body: Vec<u8> },
}

impl ApiReply {
    fn ok(body: Value) -> Self {
        ApiReply::Json { status: 200, body }
    }

    fn created(body: Value) -> Self {
        ApiReply::Json { status: 201, body }
    }

    pub fn status(&self) -> u16 {
        match self {
            ApiReply::Json { status, .. } => *status,
            ApiReply::Csv { .. } => 200,
        }
    }

    /// The JSON body, `None` for CSV attachments.
    pub fn json(&self) -> Option<&Value> {
        match self {
            ApiReply::Json { body, .. } => Some(body),
            ApiReply::Csv { .. } => None,
        }
    }

    pub fn from_error(err: &ClinicError) -> Self {
        let status = err.status();
        if status >= 500 {
            error!(error = %err, "action failed");
        } else {
            debug!(status, error = %err, "action rejected");
        }

        let body = match err {
            ClinicError::Validation(errors) => json!({ "ok": false, "errors": errors }),
            other => json!({ "ok": false, "error": other.public_message() }),
        };

        ApiReply::Json { status, body }
    }
}

// ============================================================================
// DISPATCH
// ============================================================================

/// Run one action against the store. Never fails: errors become replies.
pub fn dispatch(store: &Mutex<ClinicStore>, request: &ApiRequest) -> ApiReply {
    let action = request.action().unwrap_or_default();
    match handle(store, &action, request) {
        Ok(reply) => {
            debug!(%action, status = reply.status(), "action handled");
            reply
        }
        Err(err) => ApiReply::from_error(&err),
    }
}

fn lock(store: &Mutex<ClinicStore>) -> Result<MutexGuard<'_, ClinicStore>> {
    store.lock().map_err(|_| ClinicError::Poisoned)
}

fn handle(store: &Mutex<ClinicStore>, action: &str, req: &ApiRequest) -> Result<ApiReply> {
    if action.is_empty() {
        return Err(ClinicError::BadRequest("action is required".into()));
    }

    let reply = match action {
        "health" => ApiReply::ok(json!({ "ok": true, "status": "ok" })),

        // Owners
        "create_owner" => create_owner(store, req)?,
        "edit_owner" => edit_owner(store, req)?,
        "delete_owner" => {
            let id = req.require_id("id")?;
            if !lock(store)?.delete_owner(id)? {
                return Err(ClinicError::BadRequest(format!("owner {} could not be deleted", id)));
            }
            ApiReply::ok(json!({ "ok": true, "owner_id": id }))
        }
        "get_owner" => {
            let id = req.require_id("id")?;
            let owner = lock(store)?.get_owner(id)?;
            ApiReply::ok(json!({ "ok": true, "owner": owner }))
        }
        "list_owners" => {
            let owners = lock(store)?.list_owners()?;
            ApiReply::ok(json!({ "ok": true, "owners": owners }))
        }
        "search_owners" => {
            let q = req.require_text("q")?;
            let results = lock(store)?.search_owners(&q)?;
            ApiReply::ok(json!({ "ok": true, "results": results }))
        }
        "owners_by_pet" => {
            let pet_id = req.require_id("pet_id")?;
            let owners = lock(store)?.owners_for_pet(pet_id)?;
            ApiReply::ok(json!({ "ok": true, "owners": owners }))
        }

        // Pets
        "create_pet" => create_pet(store, req)?,
        "edit_pet" => edit_pet(store, req)?,
        "delete_pet" => {
            let id = req.require_id("id")?;
            if !lock(store)?.delete_pet(id)? {
                return Err(ClinicError::BadRequest(format!("pet {} could not be deleted", id)));
            }
            ApiReply::ok(json!({ "ok": true, "pet_id": id }))
        }
        "get_pet" => {
            let id = req.require_id("id")?;
            let pet = lock(store)?.get_pet(id)?;
            ApiReply::ok(json!({ "ok": true, "pet": pet }))
        }
        "list_pets" => {
            let pets = lock(store)?.list_pets()?;
            ApiReply::ok(json!({ "ok": true, "pets": pets }))
        }
        "pet_summaries" => {
            let pets = lock(store)?.pet_summaries()?;
            ApiReply::ok(json!({ "ok": true, "pets": pets }))
        }
        "search_pets" => {
            let name = req.require_text("name")?;
            let results = lock(store)?.search_pets(&name)?;
            ApiReply::ok(json!({ "ok": true, "results": results }))
        }
        "pets_by_species" => {
            let species = req.require_text("species")?;
            let pets = lock(store)?.pets_by_species(&species)?;
            ApiReply::ok(json!({ "ok": true, "pets": pets }))
        }
        "pets_by_owner" => {
            let owner_id = req.require_id("owner_id")?;
            let pets = lock(store)?.pets_for_owner(owner_id)?;
            ApiReply::ok(json!({ "ok": true, "pets": pets }))
        }
        "pets_by_owner_full" => {
            let owner_id = req.require_id("owner_id")?;
            let results = lock(store)?.pet_details_for_owner(owner_id)?;
            ApiReply::ok(json!({ "ok": true, "results": results }))
        }

        // Visits
        "create_visit" => {
            let draft = visit_draft(req, VisitDraft::default());
            let id = lock(store)?.create_visit(&draft)?;
            ApiReply::created(json!({ "ok": true, "visit_id": id }))
        }
        "edit_visit" => {
            let id = req.require_id("id")?;
            let mut store = lock(store)?;
            let existing = store
                .get_visit(id)?
                .ok_or_else(|| ClinicError::not_found("visit", id))?;
            let draft = visit_draft(req, VisitDraft::from_visit(&existing));
            store.update_visit(id, &draft)?;
            ApiReply::ok(json!({ "ok": true, "visit_id": id }))
        }
        "delete_visit" => {
            let id = req.require_id("id")?;
            if !lock(store)?.delete_visit(id)? {
                return Err(ClinicError::BadRequest(format!("visit {} could not be deleted", id)));
            }
            ApiReply::ok(json!({ "ok": true, "visit_id": id }))
        }
        "get_visit" => {
            let id = req.require_id("id")?;
            let visit = lock(store)?.get_visit(id)?;
            ApiReply::ok(json!({ "ok": true, "visit": visit }))
        }
        "list_visits" => {
            let visits = lock(store)?.list_visits()?;
            ApiReply::ok(json!({ "ok": true, "visits": visits }))
        }
        "visits_by_pet" => {
            let pet_id = req.require_id("pet_id")?;
            let visits = lock(store)?.visits_for_pet(pet_id)?;
            ApiReply::ok(json!({ "ok": true, "visits": visits }))
        }
        "visits_by_pet_lite" => {
            let pet_id = req.require_id("pet_id")?;
            let visits = lock(store)?.visit_dates_for_pet(pet_id)?;
            ApiReply::ok(json!({ "ok": true, "visits": visits }))
        }
        "visits_by_date" => {
            let pet_id = req.require_id("pet_id")?;
            let raw = req.require_text("date")?;
            let date = parse_date(&raw)
                .ok_or_else(|| ClinicError::InvalidArgument("date must be YYYY-MM-DD".into()))?;
            let visits = lock(store)?.visits_for_pet_on(pet_id, date)?;
            ApiReply::ok(json!({ "ok": true, "visits": visits }))
        }

        // Ownership
        "ownership" => {
            let pet_id = req.require_id("pet_id")?;
            let owner_id = req.require_id("owner_id")?;
            let (owner, pet) = lock(store)?.ownership(pet_id, owner_id)?.ok_or_else(|| {
                ClinicError::NotFound(format!("pet {} is not owned by owner {}", pet_id, owner_id))
            })?;
            ApiReply::ok(json!({ "ok": true, "owner": owner, "pet": pet }))
        }

        // Export / autocomplete
        "export_csv" => {
            let body = export::pets_csv_bytes(&*lock(store)?)?;
            let filename = export::export_filename(Utc::now());
            info!(%filename, bytes = body.len(), "pets exported");
            ApiReply::Csv { filename, body }
        }
        "autocomplete" => {
            let raw_field = req.text("field").unwrap_or_default();
            let field = SuggestField::parse(&raw_field).ok_or_else(|| {
                ClinicError::InvalidArgument(format!("unknown field '{}'", raw_field))
            })?;
            let q = req.text("q").unwrap_or_default();
            let limit = autocomplete::clamp_limit(req.int("limit"));
            let data = autocomplete::suggest(lock(store)?.connection(), field, &q, limit)?;
            ApiReply::ok(json!({ "ok": true, "data": data }))
        }

        other => return Err(ClinicError::BadRequest(format!("unknown action '{}'", other))),
    };

    Ok(reply)
}

// ============================================================================
// WRITE ACTIONS
// ============================================================================

fn create_owner(store: &Mutex<ClinicStore>, req: &ApiRequest) -> Result<ApiReply> {
    let draft = owner_draft(req, OwnerDraft::default());
    let pet_ids = req.ids("pet_ids").unwrap_or_default();
    let id = lock(store)?.create_owner(&draft, &pet_ids)?;
    Ok(ApiReply::created(json!({ "ok": true, "owner_id": id })))
}

fn edit_owner(store: &Mutex<ClinicStore>, req: &ApiRequest) -> Result<ApiReply> {
    let id = req.require_id("id")?;
    let mut store = lock(store)?;
    let existing = store
        .get_owner(id)?
        .ok_or_else(|| ClinicError::not_found("owner", id))?;

    let draft = owner_draft(req, OwnerDraft::from_owner(&existing));
    let pet_ids = req.ids("pet_ids");
    store.update_owner(id, &draft, pet_ids.as_ref())?;
    Ok(ApiReply::ok(json!({ "ok": true, "owner_id": id })))
}

fn create_pet(store: &Mutex<ClinicStore>, req: &ApiRequest) -> Result<ApiReply> {
    let draft = pet_draft(req, PetDraft::default());
    let owner_ids = req.ids("owner_ids").unwrap_or_default();
    let id = lock(store)?.create_pet(&draft, &owner_ids)?;
    Ok(ApiReply::created(json!({ "ok": true, "pet_id": id })))
}

fn edit_pet(store: &Mutex<ClinicStore>, req: &ApiRequest) -> Result<ApiReply> {
    let id = req.require_id("id")?;
    let mut store = lock(store)?;
    let existing = store
        .get_pet(id)?
        .ok_or_else(|| ClinicError::not_found("pet", id))?;

    let draft = pet_draft(req, PetDraft::from_pet(&existing));
    let owner_ids = req.ids("owner_ids");
    store.update_pet(id, &draft, owner_ids.as_ref())?;
    Ok(ApiReply::ok(json!({ "ok": true, "pet_id": id })))
}

// Overlay the fields a request sent onto `base`. A field that is present but
// unusable (an age of "abc") clears the value so validation reports it.

fn owner_draft(req: &ApiRequest, mut draft: OwnerDraft) -> OwnerDraft {
    if req.has("first_name") {
        draft.first_name = req.text("first_name").unwrap_or_default();
    }
    if req.has("last_name") {
        draft.last_name = req.text("last_name").unwrap_or_default();
    }
    if req.has("age") {
        draft.age = req.int("age");
    }
    if req.has("phone") {
        draft.phone = req.text("phone");
    }
    draft
}

fn pet_draft(req: &ApiRequest, mut draft: PetDraft) -> PetDraft {
    if req.has("name") {
        draft.name = req.text("name").unwrap_or_default();
    }
    if req.has("age") {
        draft.age = req.int("age");
    }
    if req.has("species") {
        draft.species = req.text("species").unwrap_or_default();
    }
    if req.has("birth_date") {
        draft.birth_date = req.text("birth_date").unwrap_or_default();
    }
    if req.has("condition") {
        draft.condition = req.text("condition");
    }
    draft
}

fn visit_draft(req: &ApiRequest, mut draft: VisitDraft) -> VisitDraft {
    if req.has("pet_id") {
        draft.pet_id = req.int("pet_id");
    }
    if req.has("date") {
        draft.date = req.text("date").unwrap_or_default();
    }
    if req.has("diagnosis") {
        draft.diagnosis = req.text("diagnosis").unwrap_or_default();
    }
    if req.has("treatment") {
        draft.treatment = req.text("treatment").unwrap_or_default();
    }
    draft
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> Mutex<ClinicStore> {
        Mutex::new(ClinicStore::open_in_memory().unwrap())
    }

    fn call(store: &Mutex<ClinicStore>, body: Value) -> (u16, Value) {
        match dispatch(store, &ApiRequest::from_json(body)) {
            ApiReply::Json { status, body } => (status, body),
            ApiReply::Csv { .. } => panic!("expected json reply"),
        }
    }

    fn seed_owner(store: &Mutex<ClinicStore>, first: &str) -> i64 {
        let (status, body) = call(
            store,
            json!({"action": "create_owner", "first_name": first, "last_name": "Ruiz", "age": 40}),
        );
        assert_eq!(status, 201, "{body}");
        body["owner_id"].as_i64().unwrap()
    }

    #[test]
    fn test_parse_ids_accepts_arrays_and_strings() {
        let expected: BTreeSet<i64> = [1, 2, 3].into_iter().collect();
        assert_eq!(parse_ids(&json!([3, "2", 1, 1, -4, 0])), expected);
        assert_eq!(parse_ids(&json!("1, 2;3  x")), expected);
        assert!(parse_ids(&json!("")).is_empty());
        assert!(parse_ids(&Value::Null).is_empty());
    }

    #[test]
    fn test_body_wins_over_query() {
        let req = ApiRequest::new(
            [("action", "get_pet"), ("id", "1")],
            Some(json!({"id": 2})),
        );
        assert_eq!(req.int("id"), Some(2));
        assert_eq!(req.action().as_deref(), Some("get_pet"));
    }

    #[test]
    fn test_fractional_age_is_rejected() {
        let req = ApiRequest::from_json(json!({"age": 3.7, "limit": 8.0}));
        assert_eq!(req.int("age"), None);
        assert_eq!(req.int("limit"), Some(8));

        let store = store();
        let (status, body) = call(
            &store,
            json!({"action": "create_pet", "name": "Toby", "age": 3.7, "species": "Perro", "birth_date": "2021-01-01"}),
        );
        assert_eq!(status, 422);
        assert_eq!(body["errors"], json!(["age must be >= 0"]));
    }

    #[test]
    fn test_missing_and_unknown_action_are_bad_requests() {
        let store = store();
        assert_eq!(call(&store, json!({})).0, 400);

        let (status, body) = call(&store, json!({"action": "launch"}));
        assert_eq!(status, 400);
        assert_eq!(body["error"], "unknown action 'launch'");
    }

    #[test]
    fn test_validation_errors_are_listed() {
        let store = store();
        let (status, body) = call(
            &store,
            json!({"action": "create_pet", "name": " ", "age": 2, "species": "Gato", "birth_date": "2024-13-01"}),
        );

        assert_eq!(status, 422);
        assert_eq!(body["ok"], false);
        assert_eq!(
            body["errors"],
            json!(["name is required", "birth_date must be YYYY-MM-DD"])
        );
    }

    #[test]
    fn test_create_pet_with_owner_string_list() {
        let store = store();
        let a = seed_owner(&store, "Ana");
        let b = seed_owner(&store, "Beto");

        let (status, body) = call(
            &store,
            json!({"action": "create_pet", "name": "Toby", "age": 3, "species": "Perro",
                   "birth_date": "2021-05-01", "owner_ids": format!("{a};{b}")}),
        );
        assert_eq!(status, 201);
        let pet_id = body["pet_id"].as_i64().unwrap();

        let (_, body) = call(&store, json!({"action": "get_pet", "id": pet_id}));
        assert_eq!(body["pet"]["owner_ids"], json!([a, b]));
        assert_eq!(body["pet"]["condition"], "Healthy");
    }

    #[test]
    fn test_unknown_owner_id_is_bad_request() {
        let store = store();
        let (status, body) = call(
            &store,
            json!({"action": "create_pet", "name": "Toby", "age": 3, "species": "Perro",
                   "birth_date": "2021-05-01", "owner_ids": [77]}),
        );

        assert_eq!(status, 400);
        assert_eq!(body["error"], "owner 77 does not exist");
        assert_eq!(call(&store, json!({"action": "list_pets"})).1["pets"], json!([]));
    }

    #[test]
    fn test_partial_edit_keeps_other_fields_and_links() {
        let store = store();
        let owner = seed_owner(&store, "Ana");
        let (_, body) = call(
            &store,
            json!({"action": "create_pet", "name": "Toby", "age": 3, "species": "Perro",
                   "birth_date": "2021-05-01", "owner_ids": [owner]}),
        );
        let pet_id = body["pet_id"].as_i64().unwrap();

        let (status, _) = call(&store, json!({"action": "edit_pet", "id": pet_id, "age": 4}));
        assert_eq!(status, 200);

        let (_, body) = call(&store, json!({"action": "get_pet", "id": pet_id}));
        assert_eq!(body["pet"]["age"], 4);
        assert_eq!(body["pet"]["name"], "Toby");
        assert_eq!(body["pet"]["owner_ids"], json!([owner]));

        call(&store, json!({"action": "edit_pet", "id": pet_id, "owner_ids": []}));
        let (_, body) = call(&store, json!({"action": "get_pet", "id": pet_id}));
        assert_eq!(body["pet"]["owner_ids"], json!([]));
    }

    #[test]
    fn test_edit_missing_is_not_found_and_delete_missing_is_bad_request() {
        let store = store();
        assert_eq!(call(&store, json!({"action": "edit_owner", "id": 9, "age": 3})).0, 404);
        assert_eq!(call(&store, json!({"action": "delete_owner", "id": 9})).0, 400);
        assert_eq!(call(&store, json!({"action": "delete_owner"})).0, 400);
    }

    #[test]
    fn test_get_missing_returns_null() {
        let store = store();
        let (status, body) = call(&store, json!({"action": "get_owner", "id": 5}));
        assert_eq!(status, 200);
        assert_eq!(body["owner"], Value::Null);
    }

    #[test]
    fn test_visit_for_missing_pet_is_rejected() {
        let store = store();
        let (status, body) = call(
            &store,
            json!({"action": "create_visit", "pet_id": 12, "date": "2024-03-01",
                   "diagnosis": "Otitis", "treatment": "Gotas"}),
        );

        assert_eq!(status, 400);
        assert_eq!(body["error"], "pet 12 does not exist");
        assert_eq!(call(&store, json!({"action": "list_visits"})).1["visits"], json!([]));
    }

    #[test]
    fn test_ownership_unpaired_is_not_found() {
        let store = store();
        let owner = seed_owner(&store, "Ana");
        let (_, body) = call(
            &store,
            json!({"action": "create_pet", "name": "Toby", "age": 3, "species": "Perro",
                   "birth_date": "2021-05-01"}),
        );
        let pet_id = body["pet_id"].as_i64().unwrap();

        let query = json!({"action": "ownership", "pet_id": pet_id, "owner_id": owner});
        assert_eq!(call(&store, query.clone()).0, 404);

        call(&store, json!({"action": "edit_owner", "id": owner, "pet_ids": [pet_id]}));
        let (status, body) = call(&store, query);
        assert_eq!(status, 200);
        assert_eq!(body["pet"]["name"], "Toby");
        assert_eq!(body["owner"]["first_name"], "Ana");
    }

    #[test]
    fn test_search_requires_query() {
        let store = store();
        let (status, body) = call(&store, json!({"action": "search_owners", "q": "  "}));
        assert_eq!(status, 422);
        assert_eq!(body["error"], "q is required");
    }

    #[test]
    fn test_visits_by_date_rejects_malformed_date() {
        let store = store();
        let (status, _) = call(
            &store,
            json!({"action": "visits_by_date", "pet_id": 1, "date": "01/02/2024"}),
        );
        assert_eq!(status, 422);
    }

    #[test]
    fn test_autocomplete_field_aliases() {
        let store = store();
        seed_owner(&store, "Ana");

        let (status, body) = call(&store, json!({"action": "autocomplete", "field": "dueno", "q": "an"}));
        assert_eq!(status, 200);
        assert_eq!(body["data"][0]["label"], "Ana Ruiz");

        assert_eq!(
            call(&store, json!({"action": "autocomplete", "field": "color", "q": "an"})).0,
            422
        );
    }

    #[test]
    fn test_export_is_csv_attachment() {
        let store = store();
        match dispatch(&store, &ApiRequest::from_json(json!({"action": "export_csv"}))) {
            ApiReply::Csv { filename, body } => {
                assert!(filename.starts_with("pets_export_"));
                assert!(String::from_utf8(body)
                    .unwrap()
                    .starts_with("id,name,age,species,birth_date,condition,owners"));
            }
            other => panic!("unexpected reply {:?}", other),
        }
    }

    #[test]
    fn test_health() {
        let (status, body) = call(&store(), json!({"action": "health"}));
        assert_eq!(status, 200);
        assert_eq!(body["status"], "ok");
    }
}
