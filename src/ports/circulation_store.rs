use async_trait::async_trait;

use super::{BookCatalog, BorrowLedger, MemberRegistry};

pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// 貸出・返却用のトランザクションを開くポート
///
/// 1回の貸出・返却は1つのトランザクションで実行される。
#[async_trait]
pub trait CirculationStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn CirculationTransaction>>;
}

/// 進行中のトランザクション
///
/// 3つのコラボレーター（カタログ・名簿・台帳）への読み書きはすべて
/// このトランザクションを通る。`commit`を呼ばずに破棄した場合は
/// ロールバックされ、途中までの変更は一切残らない。
/// 呼び出し側のタイムアウトやキャンセルでFutureが破棄された場合も同じ。
#[async_trait]
pub trait CirculationTransaction: Send {
    fn books(&mut self) -> &mut dyn BookCatalog;

    fn members(&mut self) -> &mut dyn MemberRegistry;

    fn ledger(&mut self) -> &mut dyn BorrowLedger;

    /// すべての変更をまとめて確定する
    async fn commit(self: Box<Self>) -> Result<()>;
}
