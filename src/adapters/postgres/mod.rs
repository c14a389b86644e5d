mod book_catalog;
mod borrow_ledger;
pub mod circulation_store;
pub mod connection;
pub mod library_directory;
mod member_registry;

// パブリックに型を再エクスポート
pub use circulation_store::{
    CirculationStore as PostgresCirculationStore, PgCirculationTransaction,
};
pub use connection::{Database, KeepAlive};
pub use library_directory::LibraryDirectory as PostgresLibraryDirectory;
