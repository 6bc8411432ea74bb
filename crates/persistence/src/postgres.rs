use std::marker::PhantomData;

use async_trait::async_trait;
use common::{EntityId, FieldKind, FieldSpec, Filter, ListQuery, Page};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{Postgres, QueryBuilder, Row, Transaction};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::cancel::guard;
use crate::{Change, Document, PersistenceError, Result, Store, Version};

/// Runs the database migrations shared by every module.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("../../migrations").run(pool).await?;
    Ok(())
}

/// PostgreSQL-backed document store.
///
/// Each document type lives in its own table (see [`Document::collection`])
/// with the JSON state, the version, index terms and an optional unique key
/// guarded by a partial unique index.
pub struct PostgresStore<D> {
    pool: PgPool,
    _document: PhantomData<fn() -> D>,
}

impl<D> Clone for PostgresStore<D> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            _document: PhantomData,
        }
    }
}

impl<D: Document> PostgresStore<D> {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            _document: PhantomData,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_document(row: PgRow) -> Result<D> {
        let state: serde_json::Value = row.try_get("state")?;
        let version: i64 = row.try_get("version")?;
        let mut document: D = serde_json::from_value(state)?;
        document.set_version(Version::new(version));
        Ok(document)
    }

    fn map_write_error(error: sqlx::Error, id: Uuid, key: Option<String>) -> PersistenceError {
        if let sqlx::Error::Database(ref db_err) = error
            && db_err.is_unique_violation()
        {
            let primary_key = format!("{}_pkey", D::collection());
            if db_err.constraint() == Some(primary_key.as_str()) {
                return PersistenceError::AlreadyExists {
                    document_type: D::document_type(),
                    id,
                };
            }
            return PersistenceError::UniqueViolation {
                document_type: D::document_type(),
                key: key.unwrap_or_default(),
            };
        }
        PersistenceError::Database(error)
    }

    async fn stored_version(
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
    ) -> Result<Option<Version>> {
        let version: Option<i64> = sqlx::query_scalar(&format!(
            "SELECT version FROM {} WHERE id = $1",
            D::collection()
        ))
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(version.map(Version::new))
    }

    async fn version_mismatch(
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
        expected: Version,
    ) -> PersistenceError {
        match Self::stored_version(tx, id).await {
            Ok(Some(actual)) => PersistenceError::ConcurrencyConflict {
                document_type: D::document_type(),
                id,
                expected,
                actual,
            },
            Ok(None) => PersistenceError::NotFound {
                document_type: D::document_type(),
                id,
            },
            Err(e) => e,
        }
    }

    async fn insert(tx: &mut Transaction<'_, Postgres>, mut document: D) -> Result<D> {
        let id = document.id().as_uuid();
        if !document.version().is_initial() {
            return Err(PersistenceError::ConcurrencyConflict {
                document_type: D::document_type(),
                id,
                expected: document.version(),
                actual: Version::initial(),
            });
        }
        if let Some(sequence) = D::sequence_name() {
            let value: i64 = sqlx::query_scalar("SELECT nextval($1::regclass)")
                .bind(sequence)
                .fetch_one(&mut **tx)
                .await?;
            document.assign_sequence(value);
        }
        document.set_version(Version::first());

        let key = document.unique_key();
        sqlx::query(&format!(
            "INSERT INTO {} (id, version, state, terms, unique_key) VALUES ($1, $2, $3, $4, $5)",
            D::collection()
        ))
        .bind(id)
        .bind(Version::first().as_i64())
        .bind(serde_json::to_value(&document)?)
        .bind(document.index_terms())
        .bind(&key)
        .execute(&mut **tx)
        .await
        .map_err(|e| Self::map_write_error(e, id, key.clone()))?;
        Ok(document)
    }

    async fn update(tx: &mut Transaction<'_, Postgres>, mut document: D) -> Result<D> {
        let id = document.id().as_uuid();
        let expected = document.version();
        document.set_version(expected.next());

        let key = document.unique_key();
        let result = sqlx::query(&format!(
            "UPDATE {} SET version = $1, state = $2, terms = $3, unique_key = $4, updated_at = now() \
             WHERE id = $5 AND version = $6",
            D::collection()
        ))
        .bind(document.version().as_i64())
        .bind(serde_json::to_value(&document)?)
        .bind(document.index_terms())
        .bind(&key)
        .bind(id)
        .bind(expected.as_i64())
        .execute(&mut **tx)
        .await
        .map_err(|e| Self::map_write_error(e, id, key.clone()))?;

        if result.rows_affected() == 0 {
            return Err(Self::version_mismatch(tx, id, expected).await);
        }
        Ok(document)
    }

    async fn remove(tx: &mut Transaction<'_, Postgres>, document: D) -> Result<()> {
        let id = document.id().as_uuid();
        let result = sqlx::query(&format!(
            "DELETE FROM {} WHERE id = $1 AND version = $2",
            D::collection()
        ))
        .bind(id)
        .bind(document.version().as_i64())
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Self::version_mismatch(tx, id, document.version()).await);
        }
        Ok(())
    }
}

/// SQL expression reading a schema field out of the JSON state.
fn field_expression(spec: &FieldSpec) -> String {
    let text = format!("(state->>'{}')", spec.name);
    match spec.kind {
        FieldKind::Text => text,
        FieldKind::Integer => format!("{text}::bigint"),
        FieldKind::Decimal => format!("{text}::numeric"),
        FieldKind::Timestamp => format!("{text}::timestamptz"),
        FieldKind::Uuid => format!("{text}::uuid"),
        FieldKind::Bool => format!("{text}::boolean"),
    }
}

fn cast(kind: FieldKind) -> &'static str {
    match kind {
        FieldKind::Text => "::text",
        FieldKind::Integer => "::bigint",
        FieldKind::Decimal => "::numeric",
        FieldKind::Timestamp => "::timestamptz",
        FieldKind::Uuid => "::uuid",
        FieldKind::Bool => "::boolean",
    }
}

/// Translates a `*` wildcard pattern into an `ILIKE` pattern.
fn like_pattern(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        match c {
            '\\' | '%' | '_' => {
                out.push('\\');
                out.push(c);
            }
            '*' => out.push('%'),
            _ => out.push(c),
        }
    }
    out
}

fn schema_field(schema: &[FieldSpec], name: &str) -> Result<FieldSpec> {
    schema
        .iter()
        .find(|s| s.name == name)
        .copied()
        .ok_or_else(|| common::QueryError::UnknownField(name.to_string()).into())
}

fn push_conditions<'a>(
    builder: &mut QueryBuilder<'a, Postgres>,
    schema: &[FieldSpec],
    filters: &'a [Filter],
) -> Result<()> {
    builder.push(" WHERE TRUE");
    for filter in filters {
        builder.push(" AND ");
        match filter {
            Filter::Eq { field, value }
            | Filter::Min { field, value }
            | Filter::Max { field, value } => {
                let spec = schema_field(schema, field)?;
                let op = match filter {
                    Filter::Eq { .. } => " = ",
                    Filter::Min { .. } => " >= ",
                    _ => " <= ",
                };
                builder.push(field_expression(&spec));
                builder.push(op);
                builder.push_bind(value.to_query_text());
                builder.push(cast(spec.kind));
            }
            Filter::Like { field, pattern } => {
                let spec = schema_field(schema, field)?;
                builder.push(field_expression(&spec));
                builder.push(" ILIKE ");
                builder.push_bind(like_pattern(pattern));
            }
            Filter::Term(term) => {
                builder.push_bind(term.as_str());
                builder.push(" = ANY(terms)");
            }
        }
    }
    Ok(())
}

#[async_trait]
impl<D: Document> Store<D> for PostgresStore<D> {
    async fn find(&self, id: D::Id, cancel: &CancellationToken) -> Result<Option<D>> {
        guard(cancel, async {
            let row = sqlx::query(&format!(
                "SELECT version, state FROM {} WHERE id = $1",
                D::collection()
            ))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
            row.map(Self::row_to_document).transpose()
        })
        .await
    }

    async fn list(&self, query: &ListQuery, cancel: &CancellationToken) -> Result<Page<D>> {
        query.validate(D::schema())?;
        let schema = D::schema();
        guard(cancel, async {
            let mut count = QueryBuilder::new(format!("SELECT COUNT(*) FROM {}", D::collection()));
            push_conditions(&mut count, schema, &query.filters)?;
            let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

            let mut select =
                QueryBuilder::new(format!("SELECT version, state FROM {}", D::collection()));
            push_conditions(&mut select, schema, &query.filters)?;
            select.push(" ORDER BY ");
            for order in &query.order_by {
                let spec = schema_field(schema, order.field)?;
                select.push(field_expression(&spec));
                select.push(if order.descending { " DESC, " } else { " ASC, " });
            }
            select.push("id ASC LIMIT ");
            select.push_bind(i64::from(query.size));
            select.push(" OFFSET ");
            select.push_bind(query.offset() as i64);

            let rows = select.build().fetch_all(&self.pool).await?;
            let items = rows
                .into_iter()
                .map(Self::row_to_document)
                .collect::<Result<Vec<_>>>()?;
            Ok(Page::new(items, total as u64, query.page, query.size))
        })
        .await
    }

    #[tracing::instrument(skip(self, changes, cancel), fields(document_type = D::document_type()))]
    async fn save(&self, changes: Vec<Change<D>>, cancel: &CancellationToken) -> Result<Vec<D>> {
        guard(cancel, async {
            let mut tx = self.pool.begin().await?;
            let mut saved = Vec::new();
            for change in changes {
                match change {
                    Change::Insert(document) => saved.push(Self::insert(&mut tx, document).await?),
                    Change::Update(document) => saved.push(Self::update(&mut tx, document).await?),
                    Change::Remove(document) => Self::remove(&mut tx, document).await?,
                }
            }
            tx.commit().await?;
            Ok(saved)
        })
        .await
    }
}
