pub mod cache;
pub mod classify;
pub mod config;
pub mod error;
pub mod index;
pub mod query;
pub mod reader;
pub mod record;
pub mod stream;
pub mod types;
pub mod variant;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{Config, Options};
pub use error::{Error, Result};
pub use query::{Query, RawLines};
pub use reader::TabixReader;
pub use record::Record;
pub use types::Region;
