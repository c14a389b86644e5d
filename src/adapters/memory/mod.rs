pub mod library;

pub use library::{FailurePoint, Fault, InMemoryLibrary, InjectedFailure, LibrarySnapshot};
