pub mod alerts;
pub mod api;
mod ingest;
mod store;

#[cfg(test)]
pub(crate) mod test_util;

pub use ingest::ingest_event;
pub use store::{PgStore, RecordedOccurrence, Store};
