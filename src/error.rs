use thiserror::Error;

pub type Result<T> = std::result::Result<T, BloomError>;

#[derive(Error, Debug)]
pub enum BloomError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Filters are not compatible: {0}")]
    IncompatibleFilters(String),

    #[error("Corrupt filter data: {0}")]
    CorruptData(String),

    #[error("Index out of bounds: {index} >= {capacity}")]
    IndexOutOfBounds { index: u64, capacity: u64 },

    #[error("Filter has been closed")]
    ClosedFilter,

    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),
}
