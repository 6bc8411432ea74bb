use common::{FieldKind, FieldSpec, FieldValue, Filter, ListQuery, OrderBy, UserId};
use criterion::{Criterion, criterion_group, criterion_main};
use persistence::{
    Change, Document, DomainEvent, EventDispatcher, InMemoryStore, Repository, Store, Version,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

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
    version: Version,
    name: String,
    score: i64,
}

const SCHEMA: &[FieldSpec] = &[
    FieldSpec::new("name", FieldKind::Text),
    FieldSpec::new("score", FieldKind::Integer),
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
            _ => None,
        }
    }

    fn take_events(&mut self) -> Vec<Touched> {
        Vec::new()
    }
}

fn account(n: i64) -> Account {
    Account {
        id: UserId::new(),
        version: Version::initial(),
        name: format!("account-{n:04}"),
        score: n % 97,
    }
}

fn bench_insert_batch_10(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let cancel = CancellationToken::new();

    c.bench_function("store/insert_batch_10", |b| {
        b.iter(|| {
            rt.block_on(async {
                let store = InMemoryStore::<Account>::new();
                let changes = (0..10).map(|n| Change::Insert(account(n))).collect();
                store.save(changes, &cancel).await.unwrap();
            });
        });
    });
}

fn bench_list_filtered_page(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let cancel = CancellationToken::new();
    let store = InMemoryStore::<Account>::new();

    // Pre-populate with 1000 documents
    rt.block_on(async {
        let changes = (0..1000).map(|n| Change::Insert(account(n))).collect();
        store.save(changes, &cancel).await.unwrap();
    });

    let query = ListQuery::new()
        .filter(Filter::min("score", 50i64))
        .filter(Filter::like("name", "account-0*"))
        .order(OrderBy::desc("score"))
        .size(20);

    c.bench_function("store/list_filtered_page", |b| {
        b.iter(|| {
            rt.block_on(async {
                store.list(&query, &cancel).await.unwrap();
            });
        });
    });
}

fn bench_unit_of_work_commit(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let cancel = CancellationToken::new();
    let repository = Repository::new(
        Arc::new(InMemoryStore::<Account>::new()),
        EventDispatcher::empty(),
    );

    c.bench_function("store/unit_of_work_commit", |b| {
        b.iter(|| {
            rt.block_on(async {
                let mut uow = repository.begin();
                uow.add(account(1));
                uow.commit(&cancel).await.unwrap();
            });
        });
    });
}

criterion_group!(
    benches,
    bench_insert_batch_10,
    bench_list_filtered_page,
    bench_unit_of_work_commit
);
criterion_main!(benches);
