pub mod log;

pub mod collaborators;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod executor;
pub mod lock;
pub mod preflight;
pub mod reconcile;
pub mod scheduler;
pub mod session;
pub mod state;
pub mod timestamp;
pub mod types;
