//! Producers, the events they turn into, and elections.

pub mod annotation;
pub mod election;
mod error;
pub mod event;
mod models;
pub mod producer;
mod store;

pub use annotation::{pause_annotation, Annotation, AnnotationLabel};
pub use election::{Election, ElectionEntry};
pub use error::{is_conflict, ScheduleError};
pub use event::{Event, EventBody, FixedListEvent};
pub use models::{Crossfade, ElectionFlavor, ProducerKind, ProducerState};
pub use producer::{AdvanceStep, Producer, ProducerContext};
pub use store::{
    ElectionRecord, EntryRecord, NewProducer, ProducerRecord, ScheduleStore, SqliteScheduleStore,
};
