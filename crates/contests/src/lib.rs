pub mod config;
pub mod error;
pub mod hooks;
pub mod participants;
pub mod posting;
pub mod reconcile;
pub mod records;
pub mod service;
pub mod state;

pub use config::ContestSettings;
pub use error::{ContestError, ErrorKind, Result};
pub use service::ContestService;
pub use state::{Role, TransitionOutcome, UpdateReport};
