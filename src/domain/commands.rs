use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{BookCode, MemberCode};

/// コマンド：書籍を借りる
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowBook {
    pub member_code: MemberCode,
    pub book_code: BookCode,
    pub borrowed_on: NaiveDate,
}

/// コマンド：書籍を返却する
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnBook {
    pub member_code: MemberCode,
    pub book_code: BookCode,
    pub returned_on: NaiveDate,
}
