pub mod classify;
pub mod config;
pub mod errors;
pub mod hooks;
pub mod looper;
pub mod orchestrator;
pub mod pipeline;
pub mod project;
pub mod serve;
pub mod session;
pub mod snapshot;
pub mod store;
pub mod summary;
pub mod team;
