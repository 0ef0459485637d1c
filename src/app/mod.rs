//! Application layer containing business logic and shared state.

pub mod assembler;
pub mod service;
pub mod state;
pub mod validator;

pub use assembler::TransactionAssembler;
pub use service::{ServiceSettings, TransferDomainService, TransferReceipt};
pub use state::AppState;
pub use validator::{PreconditionValidator, RULES, Rule};
