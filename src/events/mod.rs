pub mod publisher;

pub use publisher::{DispatchEvent, EventPublisher, PublishedEvent};
