mod circulation_service;
mod errors;

pub use circulation_service::{
    BorrowReceipt, CirculationSettings, DEFAULT_TRANSACTION_TIMEOUT, ReturnReceipt,
    ServiceDependencies, borrow_book, return_book,
};
pub use errors::{
    CirculationError, ConflictReason, EntityKind, ForbiddenReason, Result, TransactionTimeout,
};
