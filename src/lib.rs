pub mod errors;
pub mod urls;
pub mod models;
pub mod config;
pub mod control;
pub mod fetcher;
pub mod parser;
pub mod crawler;
pub mod payloads;
pub mod mutator;
pub mod generator;
pub mod executor;
pub mod analyzer;
pub mod auth;
pub mod orchestrator;
pub mod reporting;

// Re-export commonly used items
pub use errors::*;
pub use urls::*;
pub use models::*;
pub use config::*;
pub use control::*;
pub use fetcher::*;
pub use parser::*;
pub use crawler::*;
pub use payloads::*;
pub use mutator::*;
pub use generator::*;
pub use executor::*;
pub use analyzer::*;
pub use auth::*;
pub use orchestrator::*;
pub use reporting::*;
