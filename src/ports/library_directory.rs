use crate::domain::{Book, BookCode, BorrowId, Member, MemberCode};
use async_trait::async_trait;
use chrono::NaiveDate;
use futures::stream::BoxStream;

pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// 新規書籍
#[derive(Debug, Clone)]
pub struct NewBook {
    pub code: BookCode,
    pub title: String,
    pub author: String,
    pub stock: i32,
}

/// 新規会員
#[derive(Debug, Clone)]
pub struct NewMember {
    pub code: MemberCode,
    pub name: String,
}

/// 登録結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration<T> {
    Created(T),
    /// 同じコードが既に存在する
    DuplicateCode,
}

/// 書籍の部分更新。`None`の項目は変更しない
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookUpdate {
    pub title: Option<String>,
    pub author: Option<String>,
    pub stock: Option<i32>,
}

/// 会員の部分更新
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberUpdate {
    pub name: Option<String>,
}

/// 削除結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// 行と、その返却済みの貸出記録を削除した
    Deleted,
    NotFound,
    /// 貸出中の記録があるため削除しない
    HasActiveBorrows,
}

/// 会員と貸出中の冊数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberSummary {
    pub member: Member,
    pub active_borrows: u32,
}

/// 貸出台帳の一覧用ビュー（書籍・会員を結合済み）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BorrowEntry {
    pub borrow_id: BorrowId,
    pub book_code: BookCode,
    pub book_title: String,
    pub book_author: String,
    pub member_code: MemberCode,
    pub member_name: String,
    pub borrow_date: NaiveDate,
    pub is_returned: bool,
    pub return_date: Option<NaiveDate>,
    pub total_days: Option<i64>,
}

/// 単一テーブルの登録・参照ポート
///
/// 貸出ルールに関わらない単純なCRUD。トランザクションは不要。
#[async_trait]
pub trait LibraryDirectory: Send + Sync {
    async fn register_book(&self, new_book: NewBook) -> Result<Registration<Book>>;

    /// 在庫のある書籍の一覧（貸出中の冊は数えない）
    async fn list_available_books(&self) -> Result<Vec<Book>>;

    async fn get_book(&self, code: &BookCode) -> Result<Option<Book>>;

    async fn update_book(&self, code: &BookCode, update: BookUpdate) -> Result<Option<Book>>;

    /// 書籍を削除する
    ///
    /// 貸出中の記録があれば削除しない。返却済みの記録は書籍と一緒に削除する。
    async fn delete_book(&self, code: &BookCode) -> Result<Removal>;

    async fn register_member(&self, new_member: NewMember) -> Result<Registration<Member>>;

    async fn get_member(&self, code: &MemberCode) -> Result<Option<MemberSummary>>;

    async fn update_member(
        &self,
        code: &MemberCode,
        update: MemberUpdate,
    ) -> Result<Option<Member>>;

    /// 会員を削除する。規則は`delete_book`と同じ
    async fn delete_member(&self, code: &MemberCode) -> Result<Removal>;

    /// 全会員と、それぞれの貸出中の冊数
    async fn list_members(&self) -> Result<Vec<MemberSummary>>;

    /// 貸出台帳の全記録を貸出日順にストリーム配信する
    fn stream_borrows(&self) -> BoxStream<'_, Result<BorrowEntry>>;

    /// ストアに到達できるか確認する（readiness用）
    async fn ping(&self) -> Result<()>;
}
