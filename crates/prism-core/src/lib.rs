pub mod compare;
pub mod engine;
pub mod errors;
pub mod evaluate;
pub mod model;
pub mod providers;
pub mod snapshot;
pub mod storage;
