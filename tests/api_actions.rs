// End-to-end: action endpoint against a file database, then the client
// engine reading the same store.

use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use vet_clinic::{
    dispatch, parse_query, ApiReply, ApiRequest, ClinicStore, CollectionCache, LiveTable, Pet,
    SearchEngine, SearchResult, StoreSource,
};

fn call(store: &Mutex<ClinicStore>, body: Value) -> (u16, Value) {
    match dispatch(store, &ApiRequest::from_json(body)) {
        ApiReply::Json { status, body } => (status, body),
        ApiReply::Csv { .. } => panic!("expected json"),
    }
}

fn id(body: &Value, key: &str) -> i64 {
    body[key].as_i64().unwrap_or_else(|| panic!("missing {key} in {body}"))
}

#[test]
fn test_clinic_workflow_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clinic.db");

    let (ana, beto, toby) = {
        let store = Mutex::new(ClinicStore::open(&path).unwrap());

        let (status, body) = call(
            &store,
            json!({"action": "create_owner", "first_name": "Ana", "last_name": "Ruiz", "age": 34, "phone": "555-0101"}),
        );
        assert_eq!(status, 201);
        let ana = id(&body, "owner_id");

        let (_, body) = call(
            &store,
            json!({"action": "create_owner", "first_name": "Beto", "last_name": "Paz", "age": 51}),
        );
        let beto = id(&body, "owner_id");

        let (status, body) = call(
            &store,
            json!({"action": "create_pet", "name": "Toby", "age": 4, "species": "Perro",
                   "birth_date": "2020-02-29", "owner_ids": [ana, beto]}),
        );
        assert_eq!(status, 201);
        let toby = id(&body, "pet_id");

        for (date, diagnosis) in [("2024-01-10", "Otitis"), ("2024-03-05", "Control anual")] {
            let (status, _) = call(
                &store,
                json!({"action": "create_visit", "pet_id": toby, "date": date,
                       "diagnosis": diagnosis, "treatment": "Reposo"}),
            );
            assert_eq!(status, 201);
        }

        (ana, beto, toby)
    };

    let store = Mutex::new(ClinicStore::open(&path).unwrap());

    let (_, body) = call(&store, json!({"action": "owners_by_pet", "pet_id": toby}));
    let owners: Vec<i64> = body["owners"]
        .as_array()
        .unwrap()
        .iter()
        .map(|o| o["id"].as_i64().unwrap())
        .collect();
    assert_eq!(owners, vec![ana, beto]);

    let (_, body) = call(&store, json!({"action": "pet_summaries"}));
    let summary = &body["pets"][0];
    assert_eq!(summary["owners"], "Ana Ruiz || Beto Paz");
    assert_eq!(summary["last_visit_diagnosis"], "Control anual");

    let (_, body) = call(&store, json!({"action": "visits_by_pet_lite", "pet_id": toby}));
    assert_eq!(body["visits"][0]["date"], "2024-03-05");

    // Deleting an owner drops only its ownership rows.
    let (status, _) = call(&store, json!({"action": "delete_owner", "id": ana}));
    assert_eq!(status, 200);
    let (_, body) = call(&store, json!({"action": "pets_by_owner", "owner_id": ana}));
    assert_eq!(body["pets"], json!([]));
    let (_, body) = call(&store, json!({"action": "get_pet", "id": toby}));
    assert_eq!(body["pet"]["owner_ids"], json!([beto]));

    // Deleting the pet cascades to its visits.
    call(&store, json!({"action": "delete_pet", "id": toby}));
    let (_, body) = call(&store, json!({"action": "list_visits"}));
    assert_eq!(body["visits"], json!([]));
}

#[test]
fn test_query_string_and_body_merge() {
    let store = Mutex::new(ClinicStore::open_in_memory().unwrap());
    call(
        &store,
        json!({"action": "create_owner", "first_name": "Ana", "last_name": "Ruiz", "age": 34}),
    );

    let request = ApiRequest::new(
        [("action", "edit_owner"), ("id", "1"), ("age", "20")],
        Some(json!({"age": 35, "pet_ids": ""})),
    );
    assert_eq!(dispatch(&store, &request).status(), 200);

    let (_, body) = call(&store, json!({"action": "get_owner", "id": 1}));
    assert_eq!(body["owner"]["age"], 35);
    assert_eq!(body["owner"]["pet_ids"], json!([]));
}

#[tokio::test]
async fn test_client_engine_over_store() {
    let store = Arc::new(Mutex::new(ClinicStore::open_in_memory().unwrap()));
    for (name, species) in [("Negro", "Gato"), ("Negro", "Perro"), ("Luna", "Gato")] {
        let (status, _) = call(
            &store,
            json!({"action": "create_pet", "name": name, "age": 2, "species": species,
                   "birth_date": "2022-01-01"}),
        );
        assert_eq!(status, 201);
    }

    let source = Arc::new(StoreSource::new(Arc::clone(&store)));
    let cache = || Arc::new(CollectionCache::new(Arc::clone(&source), Duration::from_secs(10)));

    let engine = SearchEngine::new(cache());
    let results = engine.search(&parse_query("negro gato")).await.unwrap();
    let pets = results
        .iter()
        .find_map(|r| match r {
            SearchResult::Pets(page) => Some(page),
            _ => None,
        })
        .unwrap();
    assert_eq!(pets.total, 1);
    assert_eq!(pets.data[0].species, "Gato");

    let table: LiveTable<Pet, _> = LiveTable::new(cache());
    table.refresh().await.unwrap();
    assert_eq!(table.rows().len(), 3);

    call(&store, json!({"action": "edit_pet", "id": 3, "condition": "Vacunada"}));
    call(&store, json!({"action": "delete_pet", "id": 1}));
    let diff = table.refresh().await.unwrap().unwrap();

    assert_eq!(diff.removed, vec![1]);
    assert_eq!(diff.changed.iter().map(|p| p.id).collect::<Vec<_>>(), vec![3]);
    assert!(diff.added.is_empty());
}
