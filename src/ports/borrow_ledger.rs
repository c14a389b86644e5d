use crate::domain::{ActiveBorrow, BookId, BorrowId, ReturnedBorrow};
use async_trait::async_trait;

pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// 返却マークの結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnMark {
    Marked,
    /// 既に返却済みだったので何も変更していない
    AlreadyReturned,
}

/// 貸出台帳ポート
///
/// 記録は追記され、返却時に一度だけ更新される。置き換えや削除はしない。
#[async_trait]
pub trait BorrowLedger: Send {
    /// 貸出中の記録を追加する
    async fn create_active(&mut self, borrow: &ActiveBorrow) -> Result<BorrowId>;

    /// 書籍の貸出中の記録を取得する
    ///
    /// 書籍ごとに貸出中の記録は高々1件。
    /// 実装はトランザクション終了まで該当行をロックすること。
    async fn find_active_by_book(&mut self, book_id: BookId) -> Result<Option<ActiveBorrow>>;

    /// 記録を返却済みにする
    ///
    /// 貸出中の記録だけを更新する条件付き書き込み。
    /// 同時返却の後着側は `ReturnMark::AlreadyReturned` を受け取る。
    async fn mark_returned(&mut self, returned: &ReturnedBorrow) -> Result<ReturnMark>;
}
