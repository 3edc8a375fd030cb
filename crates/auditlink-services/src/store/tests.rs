use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use auditlink_core::{AuditResult, NetworkId};
use axum::extract::{RawQuery, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Value, json};

use super::*;

const WALLET: &str = "0x00000000000000000000000000000000000000aa";
const OTHER_WALLET: &str = "0x00000000000000000000000000000000000000bb";
const CONTRACT: &str = "0x742d35Cc6634C0532925a3b844Bc454e4438f44e";
const OTHER_CONTRACT: &str = "0x3C80147017b6Cb11c6cD76fEa3160302A549AF0a";

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_767_225_600 + secs, 0).unwrap()
}

fn badge(wallet: &str, contract: &str, minted_at: DateTime<Utc>) -> NewBadge {
    let result = AuditResult {
        score: 88,
        ..AuditResult::default()
    };
    NewBadge::from_audit(&result, contract, NetworkId::Sepolia, wallet, minted_at)
}

// =============================================================================
// Badge construction
// =============================================================================

#[test]
fn new_badge_names_contract_and_score() {
    let b = badge(WALLET, CONTRACT, at(0));
    assert_eq!(b.metadata.name, "AuditLinkAI Verification");
    assert!(b.metadata.description.contains(CONTRACT));
    assert!(b.metadata.description.contains("88/100"));
    assert_eq!(b.metadata.attribute("Contract Address"), Some(CONTRACT));
    assert_eq!(b.metadata.attribute("Date"), Some("2026-01-01"));
}

// =============================================================================
// SQLite backend
// =============================================================================

#[tokio::test]
async fn sqlite_new_wallet_gets_initial_allotment() {
    let store = SqliteStore::open_in_memory(20).await.unwrap();
    assert_eq!(store.balance(WALLET).await.unwrap(), 20);
    // Second read does not re-grant.
    store.deduct(WALLET).await.unwrap();
    assert_eq!(store.balance(WALLET).await.unwrap(), 19);
}

#[tokio::test]
async fn sqlite_deduct_creates_row_first() {
    let store = SqliteStore::open_in_memory(5).await.unwrap();
    store.deduct(WALLET).await.unwrap();
    assert_eq!(store.balance(WALLET).await.unwrap(), 4);
}

#[tokio::test]
async fn sqlite_balance_never_goes_negative() {
    let store = SqliteStore::open_in_memory(1).await.unwrap();
    store.deduct(WALLET).await.unwrap();
    store.deduct(WALLET).await.unwrap();
    store.deduct(WALLET).await.unwrap();
    assert_eq!(store.balance(WALLET).await.unwrap(), 0);
}

#[tokio::test]
async fn sqlite_charges_each_request_once() {
    let store = SqliteStore::open_in_memory(20).await.unwrap();
    assert!(store.charge(WALLET, "0x01").await.unwrap());
    assert!(!store.charge(WALLET, "0x01").await.unwrap());
    assert_eq!(store.balance(WALLET).await.unwrap(), 19);

    assert!(store.charge(WALLET, "0x02").await.unwrap());
    assert_eq!(store.balance(WALLET).await.unwrap(), 18);
}

#[tokio::test]
async fn sqlite_concurrent_first_reads_agree() {
    let store = SqliteStore::open_in_memory(20).await.unwrap();
    let (a, b) = tokio::join!(store.balance(WALLET), store.balance(WALLET));
    assert_eq!(a.unwrap(), 20);
    assert_eq!(b.unwrap(), 20);
}

#[tokio::test]
async fn sqlite_wallets_are_independent() {
    let store = SqliteStore::open_in_memory(3).await.unwrap();
    store.deduct(WALLET).await.unwrap();
    assert_eq!(store.balance(OTHER_WALLET).await.unwrap(), 3);
}

#[tokio::test]
async fn sqlite_rejects_invalid_wallet() {
    let store = SqliteStore::open_in_memory(20).await.unwrap();
    let err = store.balance("not-a-wallet").await.unwrap_err();
    assert!(matches!(err, StoreError::InvalidWallet(_)));
    let err = store.track_user("0x123").await.unwrap_err();
    assert!(matches!(err, StoreError::InvalidWallet(_)));
}

#[tokio::test]
async fn sqlite_track_user_is_idempotent() {
    let store = SqliteStore::open_in_memory(20).await.unwrap();
    store.track_user(WALLET).await.unwrap();
    store.track_user(WALLET).await.unwrap();
}

#[tokio::test]
async fn sqlite_badge_saved_once_per_contract() {
    let store = SqliteStore::open_in_memory(20).await.unwrap();
    let first = store.save_badge(&badge(WALLET, CONTRACT, at(0))).await.unwrap();
    let BadgeSaveOutcome::Stored(id) = first else {
        panic!("expected Stored, got {first:?}");
    };
    let again = store.save_badge(&badge(WALLET, CONTRACT, at(60))).await.unwrap();
    assert_eq!(again, BadgeSaveOutcome::AlreadyStored(id));

    // Another wallet may hold a badge for the same contract.
    let other = store
        .save_badge(&badge(OTHER_WALLET, CONTRACT, at(0)))
        .await
        .unwrap();
    assert!(matches!(other, BadgeSaveOutcome::Stored(_)));
}

#[tokio::test]
async fn sqlite_lists_newest_first_and_deletes() {
    let store = SqliteStore::open_in_memory(20).await.unwrap();
    store.save_badge(&badge(WALLET, CONTRACT, at(0))).await.unwrap();
    store
        .save_badge(&badge(WALLET, OTHER_CONTRACT, at(3600)))
        .await
        .unwrap();

    let badges = store.list_badges(WALLET).await.unwrap();
    assert_eq!(badges.len(), 2);
    assert_eq!(badges[0].minted_at, at(3600));
    assert!(badges[0].description.contains(OTHER_CONTRACT));
    assert_eq!(badges[1].attributes.len(), 6);
    assert!(store.list_badges(OTHER_WALLET).await.unwrap().is_empty());

    assert!(store.delete_badge(badges[0].id).await.unwrap());
    assert!(!store.delete_badge(badges[0].id).await.unwrap());
    assert_eq!(store.list_badges(WALLET).await.unwrap().len(), 1);
}

// =============================================================================
// Hosted backend (in-process PostgREST stand-in)
// =============================================================================

const KEY: &str = "service-key";

#[derive(Default)]
struct Tables {
    credits: HashMap<String, i64>,
    users: HashMap<String, u32>,
    badges: Vec<Value>,
    next_id: i64,
    charged: HashSet<String>,
    /// Answer badge inserts with an empty representation.
    empty_insert_reply: bool,
    /// Simulate a concurrent writer creating the credit row first.
    race_on_insert: bool,
}

type Shared = Arc<Mutex<Tables>>;

fn param(query: Option<&str>, key: &str) -> Option<String> {
    query?
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v.to_string())
}

fn eq_filter(query: Option<&str>, key: &str) -> Option<String> {
    param(query, key).and_then(|v| v.strip_prefix("eq.").map(str::to_string))
}

fn authorized(headers: &HeaderMap) -> bool {
    headers.get("apikey").is_some_and(|v| v == KEY)
        && headers
            .get("authorization")
            .is_some_and(|v| v == format!("Bearer {KEY}").as_str())
}

fn unauthorized() -> (StatusCode, Json<Value>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "code": "PGRST301", "message": "Invalid API key" })),
    )
}

async fn credits_get(
    State(db): State<Shared>,
    RawQuery(query): RawQuery,
) -> (StatusCode, Json<Value>) {
    let wallet = eq_filter(query.as_deref(), "wallet_address").unwrap_or_default();
    let db = db.lock().unwrap();
    let rows: Vec<Value> = db
        .credits
        .get(&wallet)
        .map(|c| json!({ "credits_remaining": c }))
        .into_iter()
        .collect();
    (StatusCode::OK, Json(Value::Array(rows)))
}

async fn credits_insert(State(db): State<Shared>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    let wallet = body["wallet_address"].as_str().unwrap().to_string();
    let mut db = db.lock().unwrap();
    if db.race_on_insert {
        db.race_on_insert = false;
        db.credits.insert(wallet.clone(), 7);
    }
    if db.credits.contains_key(&wallet) {
        return (
            StatusCode::CONFLICT,
            Json(json!({ "code": "23505", "message": "duplicate key value violates unique constraint" })),
        );
    }
    let credits = body["credits_remaining"].as_i64().unwrap();
    db.credits.insert(wallet, credits);
    (StatusCode::CREATED, Json(json!([{ "credits_remaining": credits }])))
}

async fn deduct_credit(
    State(db): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return unauthorized();
    }
    let wallet = body["p_wallet_address"].as_str().unwrap().to_string();
    let mut db = db.lock().unwrap();
    let entry = db.credits.entry(wallet).or_insert(20);
    *entry = (*entry - 1).max(0);
    (StatusCode::OK, Json(Value::Null))
}

async fn charged_insert(State(db): State<Shared>, Json(body): Json<Value>) -> StatusCode {
    let request_id = body["request_id"].as_str().unwrap().to_string();
    if db.lock().unwrap().charged.insert(request_id) {
        StatusCode::CREATED
    } else {
        StatusCode::CONFLICT
    }
}

async fn users_upsert(
    State(db): State<Shared>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let merge = headers
        .get("prefer")
        .is_some_and(|v| v == "resolution=merge-duplicates");
    let wallet = body["wallet_address"].as_str().unwrap().to_string();
    let mut db = db.lock().unwrap();
    if db.users.contains_key(&wallet) && !(merge && param(query.as_deref(), "on_conflict").is_some()) {
        return (StatusCode::CONFLICT, Json(json!({ "message": "duplicate key" })));
    }
    *db.users.entry(wallet).or_default() += 1;
    (StatusCode::CREATED, Json(Value::Null))
}

async fn badges_get(
    State(db): State<Shared>,
    RawQuery(query): RawQuery,
) -> (StatusCode, Json<Value>) {
    let query = query.as_deref();
    let wallet = eq_filter(query, "wallet_address").unwrap_or_default();
    let ilike = param(query, "description").and_then(|v| {
        v.strip_prefix("ilike.*")
            .and_then(|p| p.strip_suffix('*'))
            .map(str::to_ascii_lowercase)
    });
    let db = db.lock().unwrap();
    let mut rows: Vec<Value> = db
        .badges
        .iter()
        .filter(|b| b["wallet_address"] == wallet.as_str())
        .filter(|b| {
            ilike.as_ref().is_none_or(|needle| {
                b["description"]
                    .as_str()
                    .unwrap()
                    .to_ascii_lowercase()
                    .contains(needle.as_str())
            })
        })
        .cloned()
        .collect();
    if param(query, "order").as_deref() == Some("minted_at.desc") {
        rows.sort_by(|a, b| b["minted_at"].as_str().cmp(&a["minted_at"].as_str()));
    }
    (StatusCode::OK, Json(Value::Array(rows)))
}

async fn badges_insert(State(db): State<Shared>, Json(mut body): Json<Value>) -> (StatusCode, Json<Value>) {
    let mut db = db.lock().unwrap();
    if db.empty_insert_reply {
        return (StatusCode::CREATED, Json(json!([])));
    }
    db.next_id += 1;
    body["id"] = json!(db.next_id);
    db.badges.push(body.clone());
    (StatusCode::CREATED, Json(json!([body])))
}

async fn badges_delete(
    State(db): State<Shared>,
    RawQuery(query): RawQuery,
) -> (StatusCode, Json<Value>) {
    let id: i64 = eq_filter(query.as_deref(), "id").unwrap().parse().unwrap();
    let mut db = db.lock().unwrap();
    let (removed, kept): (Vec<Value>, Vec<Value>) =
        db.badges.drain(..).partition(|b| b["id"] == id);
    db.badges = kept;
    (StatusCode::OK, Json(Value::Array(removed)))
}

async fn spawn_supabase(key: &str) -> (SupabaseStore, Shared) {
    let db: Shared = Arc::default();
    let app = Router::new()
        .route("/rest/v1/user_credits", get(credits_get).post(credits_insert))
        .route("/rest/v1/rpc/deduct_credit", post(deduct_credit))
        .route("/rest/v1/charged_requests", post(charged_insert))
        .route("/rest/v1/users", post(users_upsert))
        .route(
            "/rest/v1/badges",
            get(badges_get).post(badges_insert).delete(badges_delete),
        )
        .with_state(db.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    let store = SupabaseStore::new(&format!("http://{addr}/"), key, 20).unwrap();
    (store, db)
}

#[test]
fn supabase_requires_url_and_key() {
    assert!(matches!(
        SupabaseStore::new("", KEY, 20),
        Err(StoreError::Config(_))
    ));
    assert!(matches!(
        SupabaseStore::new("https://x.supabase.co", "", 20),
        Err(StoreError::Config(_))
    ));
}

#[tokio::test]
async fn supabase_first_read_creates_row() {
    let (store, db) = spawn_supabase(KEY).await;
    assert_eq!(store.balance(WALLET).await.unwrap(), 20);
    assert_eq!(db.lock().unwrap().credits.get(WALLET), Some(&20));

    store.deduct(WALLET).await.unwrap();
    assert_eq!(store.balance(WALLET).await.unwrap(), 19);
}

#[tokio::test]
async fn supabase_charges_each_request_once() {
    let (store, db) = spawn_supabase(KEY).await;
    assert!(store.charge(WALLET, "0x01").await.unwrap());
    assert!(!store.charge(WALLET, "0x01").await.unwrap());
    assert!(store.charge(WALLET, "0x02").await.unwrap());
    assert_eq!(store.balance(WALLET).await.unwrap(), 18);
    assert_eq!(db.lock().unwrap().charged.len(), 2);
}

#[tokio::test]
async fn supabase_insert_conflict_rereads() {
    let (store, db) = spawn_supabase(KEY).await;
    db.lock().unwrap().race_on_insert = true;
    assert_eq!(store.balance(WALLET).await.unwrap(), 7);
}

#[tokio::test]
async fn supabase_error_message_is_extracted() {
    let (store, _) = spawn_supabase("wrong-key").await;
    match store.deduct(WALLET).await.unwrap_err() {
        StoreError::Api { status, message } => {
            assert_eq!(status, 401);
            assert_eq!(message, "Invalid API key");
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn supabase_track_user_upserts() {
    let (store, db) = spawn_supabase(KEY).await;
    store.track_user(WALLET).await.unwrap();
    store.track_user(WALLET).await.unwrap();
    assert_eq!(db.lock().unwrap().users.get(WALLET), Some(&2));
}

#[tokio::test]
async fn supabase_badge_lifecycle() {
    let (store, _) = spawn_supabase(KEY).await;
    let first = store.save_badge(&badge(WALLET, CONTRACT, at(0))).await.unwrap();
    assert_eq!(first, BadgeSaveOutcome::Stored(1));
    let again = store.save_badge(&badge(WALLET, CONTRACT, at(60))).await.unwrap();
    assert_eq!(again, BadgeSaveOutcome::AlreadyStored(1));
    store
        .save_badge(&badge(WALLET, OTHER_CONTRACT, at(3600)))
        .await
        .unwrap();

    let badges = store.list_badges(WALLET).await.unwrap();
    assert_eq!(badges.len(), 2);
    assert_eq!(badges[0].id, 2);
    assert_eq!(badges[0].minted_at, at(3600));
    assert_eq!(badges[1].attributes[0].trait_type, "Audit Score");

    assert!(store.delete_badge(1).await.unwrap());
    assert!(!store.delete_badge(1).await.unwrap());
    assert_eq!(store.list_badges(WALLET).await.unwrap().len(), 1);
}

#[tokio::test]
async fn supabase_badge_dedupe_ignores_address_case() {
    let (store, _) = spawn_supabase(KEY).await;
    store.save_badge(&badge(WALLET, CONTRACT, at(0))).await.unwrap();
    let lower = CONTRACT.to_ascii_lowercase();
    let again = store.save_badge(&badge(WALLET, &lower, at(60))).await.unwrap();
    assert_eq!(again, BadgeSaveOutcome::AlreadyStored(1));
}

#[tokio::test]
async fn supabase_empty_insert_reply_is_error() {
    let (store, db) = spawn_supabase(KEY).await;
    db.lock().unwrap().empty_insert_reply = true;
    let err = store
        .save_badge(&badge(WALLET, CONTRACT, at(0)))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Api { status: 201, .. }));
}
