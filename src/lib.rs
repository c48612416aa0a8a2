pub mod cache;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod frame;
pub mod results;
pub mod storage;
pub mod types;
pub mod unify;
pub mod validate;

pub use cache::{CacheKey, CacheOutcome, QueryCache};
pub use config::DuckOpts;
pub use db::{DuckDb, QueryOutput};
pub use engine::{DuckDbEngine, Engine, Launcher};
pub use error::{AppError, AppResult};
pub use frame::{Field, FieldKind, FieldType, Frame, Value};
pub use storage::{Dirs, Materializer};

// Timing printer for debug builds and tests: tprintln!("took {:?}", t0.elapsed());
#[cfg(any(test, debug_assertions))]
#[macro_export]
macro_rules! tprintln {
    ($($arg:tt)*) => ( eprintln!($($arg)*) );
}

// Release builds keep the format arguments type-checked but print nothing.
#[cfg(not(any(test, debug_assertions)))]
#[macro_export]
macro_rules! tprintln {
    ($($arg:tt)*) => ({
        if false { let _ = format!($($arg)*); }
    });
}
