//! Self-play worker: drives UCI engines through games and writes the
//! results as PGN or plain training records.

pub mod batch;
pub mod board;
pub mod book_cache;
pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod pgn_import;

pub use error::WorkerError;
