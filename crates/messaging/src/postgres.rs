use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::MessageId;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use uuid::Uuid;

use crate::bus::{BusSettings, DeadLetter, Delivery, MessageBus, NackOutcome, Subscription};
use crate::{MessageEnvelope, MessagingError, Result};

/// PostgreSQL-backed persistent bus.
///
/// Publishing stores the message and fans out one delivery row per
/// subscribed consumer in the same transaction. Polling claims deliveries
/// with `FOR UPDATE SKIP LOCKED`, so several workers can share a consumer
/// queue.
#[derive(Clone)]
pub struct PostgresMessageBus {
    pool: PgPool,
    settings: BusSettings,
}

impl PostgresMessageBus {
    pub fn new(pool: PgPool, settings: BusSettings) -> Self {
        Self { pool, settings }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn millis(duration: std::time::Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

fn row_to_envelope(row: &PgRow) -> Result<MessageEnvelope> {
    let metadata: serde_json::Value = row.try_get("metadata")?;
    Ok(MessageEnvelope {
        id: MessageId::from_uuid(row.try_get::<Uuid, _>("id")?),
        event_type: row.try_get("event_type")?,
        payload: row.try_get("payload")?,
        published_at: row.try_get::<DateTime<Utc>, _>("published_at")?,
        metadata: serde_json::from_value::<BTreeMap<String, String>>(metadata)?,
    })
}

fn attempts(row: &PgRow) -> Result<u32> {
    let attempts: i32 = row.try_get("attempts")?;
    Ok(u32::try_from(attempts).unwrap_or_default())
}

#[async_trait]
impl MessageBus for PostgresMessageBus {
    #[tracing::instrument(skip(self, envelope), fields(message_id = %envelope.id, event_type = %envelope.event_type))]
    async fn publish(&self, envelope: MessageEnvelope) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO bus_messages (id, event_type, payload, metadata, published_at) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(envelope.id.as_uuid())
        .bind(&envelope.event_type)
        .bind(&envelope.payload)
        .bind(serde_json::to_value(&envelope.metadata)?)
        .bind(envelope.published_at)
        .execute(&mut *tx)
        .await?;

        let fanned_out = sqlx::query(
            "INSERT INTO bus_deliveries (message_id, consumer) \
             SELECT $1, consumer FROM bus_subscriptions WHERE event_type = $2 \
             ON CONFLICT (message_id, consumer) DO NOTHING",
        )
        .bind(envelope.id.as_uuid())
        .bind(&envelope.event_type)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        tx.commit().await?;

        metrics::counter!("bus_messages_published_total", "event_type" => envelope.event_type.clone())
            .increment(1);
        tracing::debug!(consumers = fanned_out, "message published");
        Ok(())
    }

    async fn subscribe(
        &self,
        consumer: &str,
        event_types: &[&str],
    ) -> Result<Box<dyn Subscription>> {
        for event_type in event_types {
            sqlx::query(
                "INSERT INTO bus_subscriptions (consumer, event_type) VALUES ($1, $2) \
                 ON CONFLICT DO NOTHING",
            )
            .bind(consumer)
            .bind(event_type)
            .execute(&self.pool)
            .await?;
        }
        Ok(Box::new(PostgresSubscription {
            consumer: consumer.to_string(),
            pool: self.pool.clone(),
            settings: self.settings,
        }))
    }

    async fn dead_letters(&self, consumer: &str) -> Result<Vec<DeadLetter>> {
        let rows = sqlx::query(
            "SELECT m.id, m.event_type, m.payload, m.metadata, m.published_at, \
                    d.attempts, d.last_error, d.available_at \
             FROM bus_deliveries d JOIN bus_messages m ON m.id = d.message_id \
             WHERE d.consumer = $1 AND d.status = 'dead' \
             ORDER BY d.available_at, m.id",
        )
        .bind(consumer)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(DeadLetter {
                    consumer: consumer.to_string(),
                    envelope: row_to_envelope(row)?,
                    attempts: attempts(row)?,
                    reason: row
                        .try_get::<Option<String>, _>("last_error")?
                        .unwrap_or_default(),
                    dead_lettered_at: row.try_get("available_at")?,
                })
            })
            .collect()
    }
}

struct PostgresSubscription {
    consumer: String,
    pool: PgPool,
    settings: BusSettings,
}

impl PostgresSubscription {
    async fn mark_dead(&self, delivery: &Delivery, reason: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE bus_deliveries SET status = 'dead', last_error = $3, available_at = now() \
             WHERE message_id = $1 AND consumer = $2 AND status = 'in_flight'",
        )
        .bind(delivery.envelope.id.as_uuid())
        .bind(&self.consumer)
        .bind(reason)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(self.unknown(delivery));
        }
        tracing::warn!(
            consumer = %self.consumer,
            message_id = %delivery.envelope.id,
            attempts = delivery.attempt,
            reason,
            "message dead-lettered"
        );
        metrics::counter!("bus_messages_dead_lettered_total", "consumer" => self.consumer.clone())
            .increment(1);
        Ok(())
    }

    fn unknown(&self, delivery: &Delivery) -> MessagingError {
        MessagingError::UnknownDelivery {
            message_id: delivery.envelope.id,
            consumer: self.consumer.clone(),
        }
    }
}

#[async_trait]
impl Subscription for PostgresSubscription {
    fn consumer(&self) -> &str {
        &self.consumer
    }

    #[tracing::instrument(skip(self), fields(consumer = %self.consumer))]
    async fn poll(&self, max: usize) -> Result<Vec<Delivery>> {
        let max_attempts = i32::try_from(self.settings.max_delivery_attempts).unwrap_or(i32::MAX);

        // In-flight deliveries that timed out on their last attempt.
        let expired = sqlx::query(
            "UPDATE bus_deliveries SET status = 'dead', last_error = 'visibility timeout expired' \
             WHERE consumer = $1 AND status = 'in_flight' AND available_at <= now() \
               AND attempts >= $2",
        )
        .bind(&self.consumer)
        .bind(max_attempts)
        .execute(&self.pool)
        .await?
        .rows_affected();
        if expired > 0 {
            tracing::warn!(expired, "in-flight deliveries dead-lettered after timeout");
            metrics::counter!("bus_messages_dead_lettered_total", "consumer" => self.consumer.clone())
                .increment(expired);
        }

        let rows = sqlx::query(
            "WITH claimed AS ( \
                 SELECT message_id FROM bus_deliveries \
                 WHERE consumer = $1 AND status IN ('pending', 'in_flight') AND available_at <= now() \
                 ORDER BY available_at \
                 LIMIT $2 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             UPDATE bus_deliveries d \
             SET status = 'in_flight', attempts = d.attempts + 1, \
                 available_at = now() + ($3::bigint * interval '1 millisecond') \
             FROM claimed, bus_messages m \
             WHERE d.consumer = $1 AND d.message_id = claimed.message_id AND m.id = d.message_id \
             RETURNING m.id, m.event_type, m.payload, m.metadata, m.published_at, d.attempts",
        )
        .bind(&self.consumer)
        .bind(i64::try_from(max).unwrap_or(i64::MAX))
        .bind(millis(self.settings.visibility_timeout))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(Delivery {
                    envelope: row_to_envelope(row)?,
                    attempt: attempts(row)?,
                })
            })
            .collect()
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        let result = sqlx::query(
            "UPDATE bus_deliveries SET status = 'acked' \
             WHERE message_id = $1 AND consumer = $2 AND status = 'in_flight'",
        )
        .bind(delivery.envelope.id.as_uuid())
        .bind(&self.consumer)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(self.unknown(delivery));
        }
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery, reason: &str) -> Result<NackOutcome> {
        if delivery.attempt >= self.settings.max_delivery_attempts {
            self.mark_dead(delivery, reason).await?;
            return Ok(NackOutcome::DeadLettered);
        }

        let delay = self.settings.redelivery_delay;
        let result = sqlx::query(
            "UPDATE bus_deliveries \
             SET status = 'pending', last_error = $3, \
                 available_at = now() + ($4::bigint * interval '1 millisecond') \
             WHERE message_id = $1 AND consumer = $2 AND status = 'in_flight'",
        )
        .bind(delivery.envelope.id.as_uuid())
        .bind(&self.consumer)
        .bind(reason)
        .bind(millis(delay))
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(self.unknown(delivery));
        }
        metrics::counter!("bus_messages_redelivered_total", "consumer" => self.consumer.clone())
            .increment(1);
        Ok(NackOutcome::Requeued { delay })
    }

    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> Result<()> {
        self.mark_dead(delivery, reason).await
    }
}
