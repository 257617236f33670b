pub mod types;

pub use types::{IngestError, RowProcessingError};
