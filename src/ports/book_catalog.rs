use crate::domain::{Book, BookCode};
use async_trait::async_trait;

pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// 条件付き在庫減算の結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockDecrement {
    /// 減算した。`remaining`は減算後の在庫
    Decremented { remaining: i32 },
    /// 在庫が0だったので何も変更していない
    OutOfStock,
}

/// 蔵書カタログポート
///
/// 貸出トランザクションの中からのみ使われる。
/// すべての操作は同じトランザクションに属し、コミットされるまで外から見えない。
#[async_trait]
pub trait BookCatalog: Send {
    /// コードで書籍を取得する
    ///
    /// 実装はトランザクション終了まで書籍行を排他ロックすること。
    /// 同じ書籍への貸出・返却が直列化される。
    async fn get_by_code(&mut self, code: &BookCode) -> Result<Option<Book>>;

    /// 在庫を1減らす（stock > 0 のときだけ）
    ///
    /// 「読んでから書く」のではなく、書き込み時点の在庫で判定する
    /// 比較交換（compare-and-swap）であること。
    /// 同じ書籍への同時貸出が両方成功して在庫が負になることを防ぐ。
    async fn conditional_decrement_stock(&mut self, code: &BookCode) -> Result<StockDecrement>;

    /// 在庫を1増やす（返却時）
    async fn increment_stock(&mut self, code: &BookCode) -> Result<()>;
}
