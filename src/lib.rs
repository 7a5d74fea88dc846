//! CRM Intent Execution Engine
//!
//! Turns structured intents produced by a language model into CRM record
//! operations and always answers with a uniform [`ExecutionResult`]:
//! - Untrusted entity bags are parsed into typed commands before any write
//! - Informal company and project names resolve by substring match
//! - Composite writes run as two-step sagas with declared failure policies
//! - Project budgets and margins are recomputed on every budget change
//!
//! FLOW:
//! TEXT → PARSE INTENT → DISPATCH → HANDLE → RESULT → REPLY

pub mod api;
pub mod audit;
pub mod budget;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod gemini;
pub mod handlers;
pub mod intent;
pub mod models;
pub mod parser;
pub mod reply;
pub mod resolver;
pub mod result;
pub mod saga;
pub mod store;

pub use error::{EngineError, Result};

// Re-export common types
pub use budget::{BudgetEngine, BudgetInputs, ProjectBudget};
pub use dispatcher::IntentDispatcher;
pub use intent::{ActionTag, Entities, StructuredIntent};
pub use result::ExecutionResult;
pub use store::{InMemoryRecordStore, RecordStore};
