pub mod book;
pub mod borrow;
pub mod commands;
pub mod errors;
pub mod member;
pub mod policy;
pub mod value_objects;

pub use book::Book;
pub use borrow::{ActiveBorrow, BorrowCore, BorrowRecord, ReturnedBorrow};
pub use errors::*;
pub use member::Member;
pub use value_objects::*;
