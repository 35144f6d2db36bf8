pub mod clock;
pub mod compactor;
pub mod config;
pub mod engine;
pub mod limits;
pub mod lookup;
pub mod model;
pub mod notify;
pub mod observability;
pub mod plan;
pub mod wal;
