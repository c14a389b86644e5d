use crate::domain::{BookCode, BorrowId, MemberCode, borrow, commands::*, policy};
use crate::ports::*;
use chrono::NaiveDate;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::errors::{
    CirculationError, ConflictReason, EntityKind, ForbiddenReason, Result, TransactionTimeout,
};

/// トランザクション期限のデフォルト
pub const DEFAULT_TRANSACTION_TIMEOUT: Duration = Duration::from_secs(5);

/// 貸出エンジンの設定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CirculationSettings {
    /// 1回の貸出・返却トランザクションの期限。超えたらロールバックする
    pub transaction_timeout: Duration,
}

impl Default for CirculationSettings {
    fn default() -> Self {
        Self {
            transaction_timeout: DEFAULT_TRANSACTION_TIMEOUT,
        }
    }
}

/// サービスの依存関係
///
/// 振る舞いは持たず、純粋な関数に依存関係を渡すためのデータ構造。
/// ストアはここから注入され、グローバルな接続状態は持たない。
#[derive(Clone)]
pub struct ServiceDependencies {
    pub store: Arc<dyn CirculationStore>,
    pub directory: Arc<dyn LibraryDirectory>,
    pub clock: Arc<dyn Clock>,
    pub settings: CirculationSettings,
}

/// 貸出の受領書
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BorrowReceipt {
    pub borrow_id: BorrowId,
    pub member_code: MemberCode,
    pub book_code: BookCode,
    pub borrow_date: NaiveDate,
    /// 貸出後の在庫
    pub remaining_stock: i32,
}

/// 返却の受領書
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnReceipt {
    pub borrow_id: BorrowId,
    pub return_date: NaiveDate,
    pub days_held: i64,
    /// 今回の返却で設定されたペナルティ（前回の値は上書き）
    pub penalized: bool,
}

/// コミット直前までの処理を受け取ったトランザクション
type Prepared<T> = (Box<dyn CirculationTransaction>, T);

/// 期限付きで実行する
///
/// 期限切れのときは`op`を破棄する。破棄されたトランザクションはロールバックされる。
/// 期限はコミット前の手順だけにかける。COMMIT送信後に打ち切ると、
/// 確定したかどうか呼び出し元に分からなくなるため。
async fn with_deadline<T>(limit: Duration, op: impl Future<Output = Result<T>>) -> Result<T> {
    match tokio::time::timeout(limit, op).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(timeout = ?limit, "circulation transaction timed out, rolled back");
            let timeout = TransactionTimeout(limit);
            Err(CirculationError::Unavailable(Box::new(timeout)))
        }
    }
}

/// 書籍を貸し出す
///
/// ビジネスルール（この順に評価）：
/// 1. 会員が存在すること
/// 2. 会員がペナルティ中でないこと
/// 3. 会員の貸出中の冊数が2冊未満であること
/// 4. 書籍が存在すること
/// 5. 書籍が他の会員に貸出中でなく、在庫があること
///
/// # 一貫性保証
///
/// 在庫の減算と貸出記録の作成は1つのトランザクションでコミットされる。
/// どちらか一方だけが残ることはない。
/// 在庫は条件付き減算で更新するため、在庫1冊への同時貸出は片方だけが成功し、
/// もう片方は`Conflict(OutOfStock)`になる。
///
/// # エラー
/// - NotFound(Member / Book)
/// - Forbidden(PenaltyActive / BorrowLimitExceeded)
/// - Conflict(OutOfStock)
/// - Unavailable: ストア障害またはトランザクション期限切れ（コミット前の手順のみ）
#[tracing::instrument(
    skip(deps, cmd),
    fields(member = %cmd.member_code, book = %cmd.book_code)
)]
pub async fn borrow_book(deps: &ServiceDependencies, cmd: BorrowBook) -> Result<BorrowReceipt> {
    let (tx, receipt) = with_deadline(
        deps.settings.transaction_timeout,
        prepare_borrow(deps.store.as_ref(), cmd),
    )
    .await?;

    tx.commit().await.map_err(CirculationError::Unavailable)?;

    tracing::info!(
        borrow_id = %receipt.borrow_id.value(),
        remaining_stock = receipt.remaining_stock,
        "book borrowed"
    );

    Ok(receipt)
}

async fn prepare_borrow(
    store: &dyn CirculationStore,
    cmd: BorrowBook,
) -> Result<Prepared<BorrowReceipt>> {
    let mut tx = store.begin().await.map_err(CirculationError::Unavailable)?;

    // 1. 会員の解決（会員行はトランザクション終了までロックされる）
    let member = tx
        .members()
        .get_by_code(&cmd.member_code)
        .await
        .map_err(CirculationError::Unavailable)?
        .ok_or_else(|| CirculationError::not_found(EntityKind::Member, &cmd.member_code))?;

    // 2. ペナルティ確認
    if member.penalized {
        return Err(CirculationError::forbidden(
            ForbiddenReason::PenaltyActive,
            &member.code,
        ));
    }

    // 3. 貸出上限確認（2冊まで）
    let active_count = tx
        .members()
        .count_active_borrows(member.id)
        .await
        .map_err(CirculationError::Unavailable)?;

    if !policy::can_borrow(active_count) {
        return Err(CirculationError::forbidden(
            ForbiddenReason::BorrowLimitExceeded,
            &member.code,
        ));
    }

    // 4. 書籍の解決（書籍行もロックされる）
    let book = tx
        .books()
        .get_by_code(&cmd.book_code)
        .await
        .map_err(CirculationError::Unavailable)?
        .ok_or_else(|| CirculationError::not_found(EntityKind::Book, &cmd.book_code))?;

    // 5. 貸出中の記録は書籍ごとに1件まで
    if tx
        .ledger()
        .find_active_by_book(book.id)
        .await
        .map_err(CirculationError::Unavailable)?
        .is_some()
    {
        return Err(CirculationError::conflict(
            ConflictReason::OutOfStock,
            &book.code,
        ));
    }

    // 6. 在庫確認と減算は同じ条件付き書き込みで行う
    let remaining_stock = match tx
        .books()
        .conditional_decrement_stock(&book.code)
        .await
        .map_err(CirculationError::Unavailable)?
    {
        StockDecrement::Decremented { remaining } => remaining,
        StockDecrement::OutOfStock => {
            return Err(CirculationError::conflict(
                ConflictReason::OutOfStock,
                &book.code,
            ));
        }
    };

    // 貸出記録の作成
    let active = borrow::open_borrow(book.id, member.id, cmd.borrowed_on);
    let borrow_id = tx
        .ledger()
        .create_active(&active)
        .await
        .map_err(CirculationError::Unavailable)?;

    let receipt = BorrowReceipt {
        borrow_id,
        member_code: member.code,
        book_code: book.code,
        borrow_date: active.borrow_date,
        remaining_stock,
    };

    Ok((tx, receipt))
}

/// 書籍を返却する
///
/// ビジネスルール：
/// - 会員と書籍が存在すること
/// - その書籍に、この会員の貸出中の記録があること
/// - 保持日数が7日を超えたらペナルティ。フラグは毎回上書きされる（累積しない）
///
/// # 一貫性保証
///
/// ペナルティの設定、記録の返却済み化、在庫の加算は1つのトランザクションで
/// コミットされる。記録は貸出中のものだけが更新されるので、同じ書籍への
/// 同時返却は片方だけが成功し、もう片方は`NotFound(ActiveBorrow)`になる。
/// 在庫が二重に戻ることはない。
///
/// # エラー
/// - NotFound(Member / Book / ActiveBorrow)
/// - Invalid: 返却日が貸出日より前
/// - Unavailable: ストア障害またはトランザクション期限切れ（コミット前の手順のみ）
#[tracing::instrument(
    skip(deps, cmd),
    fields(member = %cmd.member_code, book = %cmd.book_code)
)]
pub async fn return_book(deps: &ServiceDependencies, cmd: ReturnBook) -> Result<ReturnReceipt> {
    let (tx, receipt) = with_deadline(
        deps.settings.transaction_timeout,
        prepare_return(deps.store.as_ref(), cmd),
    )
    .await?;

    tx.commit().await.map_err(CirculationError::Unavailable)?;

    tracing::info!(
        borrow_id = %receipt.borrow_id.value(),
        days_held = receipt.days_held,
        penalized = receipt.penalized,
        "book returned"
    );

    Ok(receipt)
}

async fn prepare_return(
    store: &dyn CirculationStore,
    cmd: ReturnBook,
) -> Result<Prepared<ReturnReceipt>> {
    let mut tx = store.begin().await.map_err(CirculationError::Unavailable)?;

    // 1. 会員と書籍の解決
    let member = tx
        .members()
        .get_by_code(&cmd.member_code)
        .await
        .map_err(CirculationError::Unavailable)?
        .ok_or_else(|| CirculationError::not_found(EntityKind::Member, &cmd.member_code))?;

    let book = tx
        .books()
        .get_by_code(&cmd.book_code)
        .await
        .map_err(CirculationError::Unavailable)?
        .ok_or_else(|| CirculationError::not_found(EntityKind::Book, &cmd.book_code))?;

    // 2. 貸出中の記録（行ロック）
    let active = tx
        .ledger()
        .find_active_by_book(book.id)
        .await
        .map_err(CirculationError::Unavailable)?
        .filter(|active| active.member_id == member.id)
        .ok_or_else(|| CirculationError::not_found(EntityKind::ActiveBorrow, &book.code))?;

    let borrow_id = active.borrow_id;

    // 3-4. 保持日数とペナルティ判定（ドメイン層の純粋関数）
    let outcome = borrow::close_borrow(active, cmd.returned_on)
        .map_err(|e| CirculationError::Invalid(e.to_string()))?;

    // 5. ペナルティを上書き
    tx.members()
        .set_penalty(&member.code, outcome.penalized)
        .await
        .map_err(CirculationError::Unavailable)?;

    // 6. 記録を返却済みにする
    match tx
        .ledger()
        .mark_returned(&outcome.returned)
        .await
        .map_err(CirculationError::Unavailable)?
    {
        ReturnMark::Marked => {}
        ReturnMark::AlreadyReturned => {
            return Err(CirculationError::not_found(
                EntityKind::ActiveBorrow,
                &book.code,
            ));
        }
    }

    // 7. 在庫を戻す
    tx.books()
        .increment_stock(&book.code)
        .await
        .map_err(CirculationError::Unavailable)?;

    let receipt = ReturnReceipt {
        borrow_id,
        return_date: outcome.returned.return_date,
        days_held: outcome.days_held,
        penalized: outcome.penalized,
    };

    Ok((tx, receipt))
}
