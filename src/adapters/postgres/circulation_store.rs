use crate::ports::book_catalog::{BookCatalog, Result};
use crate::ports::borrow_ledger::BorrowLedger;
use crate::ports::circulation_store::{
    CirculationStore as CirculationStoreTrait, CirculationTransaction,
};
use crate::ports::member_registry::MemberRegistry;
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};

/// CirculationStoreのPostgreSQL実装
///
/// 貸出・返却ごとにREAD COMMITTEDのトランザクションを開始する。
/// 競合の防止は行ロック（`FOR UPDATE`）と条件付きUPDATEで行う：
/// - 会員行を最初にロックし、同じ会員の貸出を直列化する
/// - 書籍行をロックし、同じ書籍への貸出・返却を直列化する
/// - 在庫は `stock > 0` を条件に減算する
/// - 返却済み化は `NOT is_returned` を条件に更新する
///
/// ロック順は常に 会員 → 書籍 → 貸出記録 なので、デッドロックしない。
pub struct CirculationStore {
    pool: PgPool,
}

impl CirculationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CirculationStoreTrait for CirculationStore {
    async fn begin(&self) -> Result<Box<dyn CirculationTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgCirculationTransaction { tx }))
    }
}

/// PostgreSQLのトランザクション
///
/// コミットせずに破棄されるとsqlxがロールバックする。
pub struct PgCirculationTransaction {
    pub(super) tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl CirculationTransaction for PgCirculationTransaction {
    fn books(&mut self) -> &mut dyn BookCatalog {
        self
    }

    fn members(&mut self) -> &mut dyn MemberRegistry {
        self
    }

    fn ledger(&mut self) -> &mut dyn BorrowLedger {
        self
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
