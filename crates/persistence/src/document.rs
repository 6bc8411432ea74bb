//! Storage contract for aggregates and their domain events.

use std::fmt::Debug;

use common::{EntityId, FieldSpec, FieldValue};
use serde::{Serialize, de::DeserializeOwned};

use crate::Version;

/// Trait for domain events.
///
/// Domain events are facts raised by an aggregate while it changes. They are
/// buffered inside the aggregate and dispatched when its unit of work commits.
pub trait DomainEvent: Debug + Clone + Send + Sync + 'static {
    /// Every tag [`DomainEvent::event_type`] can return.
    const EVENT_TYPES: &'static [&'static str];

    /// Returns the event type name used to route the event to its handlers.
    fn event_type(&self) -> &'static str;
}

/// An aggregate that can be stored as a versioned JSON document.
pub trait Document: Debug + Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    type Id: EntityId;
    type Event: DomainEvent;

    /// Document type name, used in errors and logs.
    fn document_type() -> &'static str;

    /// Storage collection (table) holding documents of this type.
    fn collection() -> &'static str;

    /// Fields that listings may filter and order on.
    fn schema() -> &'static [FieldSpec];

    fn id(&self) -> Self::Id;

    fn version(&self) -> Version;

    /// Called by stores after loading or saving the document.
    fn set_version(&mut self, version: Version);

    /// Returns the current value of a schema field.
    fn field(&self, name: &str) -> Option<FieldValue>;

    /// Drains the domain events raised since the last drain.
    fn take_events(&mut self) -> Vec<Self::Event>;

    /// Index terms used for [`common::Filter::Term`] lookups.
    fn index_terms(&self) -> Vec<String> {
        Vec::new()
    }

    /// A key no other stored document of this type may share.
    fn unique_key(&self) -> Option<String> {
        None
    }

    /// Storage sequence feeding [`Document::assign_sequence`] on insert.
    fn sequence_name() -> Option<&'static str> {
        None
    }

    fn assign_sequence(&mut self, _value: i64) {}
}
