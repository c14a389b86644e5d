use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::application::circulation::{BorrowReceipt, ReturnReceipt};
use crate::domain::{Book, BookCode, CodeError, MemberCode, commands};
use crate::ports::library_directory::{
    BookUpdate, BorrowEntry, MemberSummary, MemberUpdate, NewBook, NewMember,
};

/// 入力フィールドの検証エラー
#[derive(Debug, thiserror::Error)]
#[error("{field}: {message}")]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    fn new(field: &'static str, message: impl ToString) -> Self {
        Self {
            field,
            message: message.to_string(),
        }
    }
}

fn parse_book_code(field: &'static str, raw: &str) -> Result<BookCode, FieldError> {
    BookCode::parse(raw).map_err(|e: CodeError| FieldError::new(field, e))
}

fn parse_member_code(field: &'static str, raw: &str) -> Result<MemberCode, FieldError> {
    MemberCode::parse(raw).map_err(|e: CodeError| FieldError::new(field, e))
}

/// パスパラメータの書籍コード
pub fn parse_book_code_param(raw: &str) -> Result<BookCode, FieldError> {
    parse_book_code("code", raw)
}

/// パスパラメータの会員コード
pub fn parse_member_code_param(raw: &str) -> Result<MemberCode, FieldError> {
    parse_member_code("code", raw)
}

/// 空白だけの文字列は受け付けない
fn non_blank(field: &'static str, value: Option<&str>) -> Result<Option<String>, FieldError> {
    match value.map(str::trim) {
        Some("") => Err(FieldError::new(field, "must not be empty")),
        other => Ok(other.map(str::to_string)),
    }
}

/// 貸出・返却リクエスト（POST /borrow と POST /return）
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CirculationRequest {
    pub member_code: String,
    pub book_code: String,
}

impl CirculationRequest {
    pub fn to_borrow_command(&self, today: NaiveDate) -> Result<commands::BorrowBook, FieldError> {
        Ok(commands::BorrowBook {
            member_code: parse_member_code("member_code", &self.member_code)?,
            book_code: parse_book_code("book_code", &self.book_code)?,
            borrowed_on: today,
        })
    }

    pub fn to_return_command(&self, today: NaiveDate) -> Result<commands::ReturnBook, FieldError> {
        Ok(commands::ReturnBook {
            member_code: parse_member_code("member_code", &self.member_code)?,
            book_code: parse_book_code("book_code", &self.book_code)?,
            returned_on: today,
        })
    }
}

/// 貸出レスポンス
#[derive(Debug, Serialize, Deserialize)]
pub struct BorrowResponse {
    pub borrow_id: Uuid,
    pub member_code: String,
    pub book_code: String,
    pub borrow_date: NaiveDate,
    pub remaining_stock: i32,
}

impl From<BorrowReceipt> for BorrowResponse {
    fn from(receipt: BorrowReceipt) -> Self {
        Self {
            borrow_id: receipt.borrow_id.value(),
            member_code: receipt.member_code.to_string(),
            book_code: receipt.book_code.to_string(),
            borrow_date: receipt.borrow_date,
            remaining_stock: receipt.remaining_stock,
        }
    }
}

/// 返却レスポンス
#[derive(Debug, Serialize, Deserialize)]
pub struct ReturnResponse {
    pub borrow_id: Uuid,
    pub return_date: NaiveDate,
    pub days_held: i64,
    pub penalized: bool,
}

impl From<ReturnReceipt> for ReturnResponse {
    fn from(receipt: ReturnReceipt) -> Self {
        Self {
            borrow_id: receipt.borrow_id.value(),
            return_date: receipt.return_date,
            days_held: receipt.days_held,
            penalized: receipt.penalized,
        }
    }
}

/// 書籍登録リクエスト
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CreateBookRequest {
    pub code: String,
    pub title: String,
    pub author: String,
    pub stock: i32,
}

impl CreateBookRequest {
    pub fn to_new_book(&self) -> Result<NewBook, FieldError> {
        if self.stock < 0 {
            return Err(FieldError::new("stock", "must not be negative"));
        }
        if self.title.trim().is_empty() {
            return Err(FieldError::new("title", "must not be empty"));
        }

        Ok(NewBook {
            code: parse_book_code("code", &self.code)?,
            title: self.title.trim().to_string(),
            author: self.author.trim().to_string(),
            stock: self.stock,
        })
    }
}

/// 書籍更新リクエスト（PUT /book/:code）。省略した項目は変更しない
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct UpdateBookRequest {
    pub title: Option<String>,
    pub author: Option<String>,
    pub stock: Option<i32>,
}

impl UpdateBookRequest {
    pub fn to_book_update(&self) -> Result<BookUpdate, FieldError> {
        if self.stock.is_some_and(|stock| stock < 0) {
            return Err(FieldError::new("stock", "must not be negative"));
        }

        Ok(BookUpdate {
            title: non_blank("title", self.title.as_deref())?,
            author: self.author.as_ref().map(|a| a.trim().to_string()),
            stock: self.stock,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BookResponse {
    pub book_id: Uuid,
    pub code: String,
    pub title: String,
    pub author: String,
    pub stock: i32,
}

impl From<Book> for BookResponse {
    fn from(book: Book) -> Self {
        Self {
            book_id: book.id.value(),
            code: book.code.to_string(),
            title: book.title,
            author: book.author,
            stock: book.stock,
        }
    }
}

/// 会員登録リクエスト
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CreateMemberRequest {
    pub code: String,
    pub name: String,
}

impl CreateMemberRequest {
    pub fn to_new_member(&self) -> Result<NewMember, FieldError> {
        if self.name.trim().is_empty() {
            return Err(FieldError::new("name", "must not be empty"));
        }

        Ok(NewMember {
            code: parse_member_code("code", &self.code)?,
            name: self.name.trim().to_string(),
        })
    }
}

/// 会員更新リクエスト（PUT /member/:code）
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct UpdateMemberRequest {
    pub name: Option<String>,
}

impl UpdateMemberRequest {
    pub fn to_member_update(&self) -> Result<MemberUpdate, FieldError> {
        Ok(MemberUpdate {
            name: non_blank("name", self.name.as_deref())?,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MemberResponse {
    pub member_id: Uuid,
    pub code: String,
    pub name: String,
    pub penalized: bool,
    pub active_borrows: u32,
}

impl From<MemberSummary> for MemberResponse {
    fn from(summary: MemberSummary) -> Self {
        Self {
            member_id: summary.member.id.value(),
            code: summary.member.code.to_string(),
            name: summary.member.name,
            penalized: summary.member.penalized,
            active_borrows: summary.active_borrows,
        }
    }
}

/// 貸出台帳の1行（GET /borrow）
#[derive(Debug, Serialize, Deserialize)]
pub struct BorrowEntryResponse {
    pub borrow_id: Uuid,
    pub book_code: String,
    pub book_title: String,
    pub book_author: String,
    pub member_code: String,
    pub member_name: String,
    pub borrow_date: NaiveDate,
    pub is_returned: bool,
    pub return_date: Option<NaiveDate>,
    pub total_days: Option<i64>,
}

impl From<BorrowEntry> for BorrowEntryResponse {
    fn from(entry: BorrowEntry) -> Self {
        Self {
            borrow_id: entry.borrow_id.value(),
            book_code: entry.book_code.to_string(),
            book_title: entry.book_title,
            book_author: entry.book_author,
            member_code: entry.member_code.to_string(),
            member_name: entry.member_name,
            borrow_date: entry.borrow_date,
            is_returned: entry.is_returned,
            return_date: entry.return_date,
            total_days: entry.total_days,
        }
    }
}

/// エラーレスポンス
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }
}
