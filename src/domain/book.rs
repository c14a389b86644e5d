use serde::{Deserialize, Serialize};

use super::{BookCode, BookId};

/// 書籍
///
/// `stock`は貸し出されていない、手元にある冊数。0未満にはならない。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub id: BookId,
    pub code: BookCode,
    pub title: String,
    pub author: String,
    pub stock: i32,
}

impl Book {
    pub fn in_stock(&self) -> bool {
        self.stock > 0
    }
}
