pub mod book_catalog;
pub mod borrow_ledger;
pub mod circulation_store;
pub mod clock;
pub mod library_directory;
pub mod member_registry;

pub use book_catalog::{BookCatalog, StockDecrement};
pub use borrow_ledger::{BorrowLedger, ReturnMark};
pub use circulation_store::{CirculationStore, CirculationTransaction};
pub use clock::Clock;
pub use library_directory::{
    BookUpdate, BorrowEntry, LibraryDirectory, MemberSummary, MemberUpdate, NewBook, NewMember,
    Registration, Removal,
};
pub use member_registry::MemberRegistry;
