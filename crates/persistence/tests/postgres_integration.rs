//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p persistence --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use common::{FieldKind, FieldSpec, FieldValue, Filter, ListQuery, OrderBy, UserId};
use persistence::postgres::run_migrations;
use persistence::{
    Change, Document, DomainEvent, PersistenceError, PostgresStore, Store, StoreExt, Version,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

const ACCOUNTS_TABLE: &str = r#"
CREATE TABLE accounts (
    id UUID PRIMARY KEY,
    version BIGINT NOT NULL,
    state JSONB NOT NULL,
    terms TEXT[] NOT NULL DEFAULT '{}',
    unique_key TEXT,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE UNIQUE INDEX accounts_unique_key ON accounts (unique_key) WHERE unique_key IS NOT NULL;
CREATE SEQUENCE account_number_seq START 1;
"#;

#[derive(Debug, Clone)]
struct Touched;

impl DomainEvent for Touched {
    const EVENT_TYPES: &'static [&'static str] = &["Touched"];

    fn event_type(&self) -> &'static str {
        "Touched"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Account {
    id: UserId,
    #[serde(default)]
    version: Version,
    name: String,
    score: i64,
    number: Option<i64>,
    labels: Vec<String>,
}

impl Account {
    fn new(name: &str, score: i64) -> Self {
        Self {
            id: UserId::new(),
            version: Version::initial(),
            name: name.to_string(),
            score,
            number: None,
            labels: Vec::new(),
        }
    }
}

const SCHEMA: &[FieldSpec] = &[
    FieldSpec::new("name", FieldKind::Text),
    FieldSpec::new("score", FieldKind::Integer),
    FieldSpec::new("number", FieldKind::Integer),
];

impl Document for Account {
    type Id = UserId;
    type Event = Touched;

    fn document_type() -> &'static str {
        "Account"
    }

    fn collection() -> &'static str {
        "accounts"
    }

    fn schema() -> &'static [FieldSpec] {
        SCHEMA
    }

    fn id(&self) -> UserId {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "name" => Some(self.name.clone().into()),
            "score" => Some(self.score.into()),
            "number" => self.number.map(FieldValue::from),
            _ => None,
        }
    }

    fn take_events(&mut self) -> Vec<Touched> {
        Vec::new()
    }

    fn index_terms(&self) -> Vec<String> {
        self.labels.iter().map(|l| format!("label:{l}")).collect()
    }

    fn unique_key(&self) -> Option<String> {
        Some(format!("name:{}", self.name))
    }

    fn sequence_name() -> Option<&'static str> {
        Some("account_number_seq")
    }

    fn assign_sequence(&mut self, value: i64) {
        self.number = Some(value);
    }
}

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            run_migrations(&temp_pool).await.unwrap();
            sqlx::raw_sql(ACCOUNTS_TABLE)
                .execute(&temp_pool)
                .await
                .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and a cleared table
async fn get_test_store() -> PostgresStore<Account> {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE accounts")
        .execute(&pool)
        .await
        .unwrap();

    PostgresStore::new(pool)
}

fn cancel() -> CancellationToken {
    CancellationToken::new()
}

#[tokio::test]
async fn insert_and_find_document() {
    let store = get_test_store().await;
    let account = Account::new("ada", 7);
    let id = account.id;

    let saved = store
        .save(vec![Change::Insert(account)], &cancel())
        .await
        .unwrap();
    assert_eq!(saved[0].version, Version::first());
    assert!(saved[0].number.is_some());

    let found = store.find(id, &cancel()).await.unwrap().unwrap();
    assert_eq!(found.name, "ada");
    assert_eq!(found.version, Version::first());
    assert_eq!(found.number, saved[0].number);
}

#[tokio::test]
async fn sequence_numbers_increase() {
    let store = get_test_store().await;
    let saved = store
        .save(
            vec![
                Change::Insert(Account::new("a", 1)),
                Change::Insert(Account::new("b", 2)),
            ],
            &cancel(),
        )
        .await
        .unwrap();

    let first = saved[0].number.unwrap();
    let second = saved[1].number.unwrap();
    assert!(second > first);
}

#[tokio::test]
async fn stale_update_is_rejected() {
    let store = get_test_store().await;
    let saved = store
        .save(vec![Change::Insert(Account::new("ada", 1))], &cancel())
        .await
        .unwrap();

    let mut winner = saved[0].clone();
    winner.score = 2;
    let mut loser = saved[0].clone();
    loser.score = 3;

    store
        .save(vec![Change::Update(winner)], &cancel())
        .await
        .unwrap();
    let result = store.save(vec![Change::Update(loser)], &cancel()).await;

    assert!(matches!(
        result,
        Err(PersistenceError::ConcurrencyConflict { expected, actual, .. })
            if expected == Version::first() && actual == Version::new(2)
    ));
}

#[tokio::test]
async fn unique_key_violation_rolls_back_batch() {
    let store = get_test_store().await;
    let result = store
        .save(
            vec![
                Change::Insert(Account::new("grace", 1)),
                Change::Insert(Account::new("grace", 2)),
            ],
            &cancel(),
        )
        .await;

    assert!(matches!(
        result,
        Err(PersistenceError::UniqueViolation { ref key, .. }) if key == "name:grace"
    ));
    let page = store.list(&ListQuery::new(), &cancel()).await.unwrap();
    assert_eq!(page.total_count, 0);
}

#[tokio::test]
async fn duplicate_insert_is_already_exists() {
    let store = get_test_store().await;
    let account = Account::new("linus", 1);
    store
        .save(vec![Change::Insert(account.clone())], &cancel())
        .await
        .unwrap();

    let mut again = account;
    again.name = "someone else".into();
    let result = store.save(vec![Change::Insert(again)], &cancel()).await;
    assert!(matches!(result, Err(PersistenceError::AlreadyExists { .. })));
}

#[tokio::test]
async fn remove_deletes_document() {
    let store = get_test_store().await;
    let saved = store
        .save(vec![Change::Insert(Account::new("ada", 1))], &cancel())
        .await
        .unwrap();
    let id = saved[0].id;

    store
        .save(vec![Change::Remove(saved[0].clone())], &cancel())
        .await
        .unwrap();
    assert!(!store.exists(id, &cancel()).await.unwrap());
}

#[tokio::test]
async fn list_filters_orders_and_pages() {
    let store = get_test_store().await;
    let changes = (1..=12)
        .map(|n| Change::Insert(Account::new(&format!("user-{n:02}"), n)))
        .collect();
    store.save(changes, &cancel()).await.unwrap();

    let query = ListQuery::new()
        .filter(Filter::min("score", 3i64))
        .filter(Filter::max("score", 10i64))
        .order(OrderBy::desc("score"))
        .size(5)
        .page(2);
    let page = store.list(&query, &cancel()).await.unwrap();

    assert_eq!(page.total_count, 8);
    assert_eq!(page.total_pages, 2);
    let scores: Vec<i64> = page.items.iter().map(|a| a.score).collect();
    assert_eq!(scores, vec![5, 4, 3]);

    let like = store
        .list(
            &ListQuery::new().filter(Filter::like("name", "USER-1*")),
            &cancel(),
        )
        .await
        .unwrap();
    assert_eq!(like.total_count, 3);
}

#[tokio::test]
async fn term_filter_uses_index_terms() {
    let store = get_test_store().await;
    let mut tagged = Account::new("tagged", 1);
    tagged.labels.push("vip".into());
    store
        .save(
            vec![Change::Insert(tagged), Change::Insert(Account::new("plain", 2))],
            &cancel(),
        )
        .await
        .unwrap();

    let found = store
        .find_all(ListQuery::new().filter(Filter::term("label:vip")), &cancel())
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].name, "tagged");
}
