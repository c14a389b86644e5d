use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{BookId, BorrowId, MemberId, ReturnBeforeBorrow, ReturnBookError, policy};

// ============================================================================
// 型安全な状態パターン
// ============================================================================

/// 貸出記録の共通フィールド
///
/// Active / Returned の両状態で共有されるコアデータ。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowCore {
    pub borrow_id: BorrowId,

    // 他の集約への参照（IDのみ）
    pub book_id: BookId,
    pub member_id: MemberId,

    /// 貸出日（日付のみ、時刻は持たない）
    pub borrow_date: NaiveDate,
}

/// 貸出中状態
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveBorrow {
    #[serde(flatten)]
    pub core: BorrowCore,
}

impl std::ops::Deref for ActiveBorrow {
    type Target = BorrowCore;

    fn deref(&self) -> &Self::Target {
        &self.core
    }
}

/// 返却済み状態
///
/// ビジネスルール：
/// - return_date と total_days が必須（型で保証）
/// - 以降は変更不可
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnedBorrow {
    #[serde(flatten)]
    pub core: BorrowCore,
    pub return_date: NaiveDate,
    pub total_days: i64,
}

impl std::ops::Deref for ReturnedBorrow {
    type Target = BorrowCore;

    fn deref(&self) -> &Self::Target {
        &self.core
    }
}

/// 貸出記録
///
/// 遷移は Active → Returned の一方向のみ。Returned から Active に戻ることはない。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BorrowRecord {
    Active(ActiveBorrow),
    Returned(ReturnedBorrow),
}

impl BorrowRecord {
    pub fn core(&self) -> &BorrowCore {
        match self {
            BorrowRecord::Active(active) => &active.core,
            BorrowRecord::Returned(returned) => &returned.core,
        }
    }

    pub fn is_returned(&self) -> bool {
        matches!(self, BorrowRecord::Returned(_))
    }

    pub fn return_date(&self) -> Option<NaiveDate> {
        match self {
            BorrowRecord::Active(_) => None,
            BorrowRecord::Returned(returned) => Some(returned.return_date),
        }
    }

    pub fn total_days(&self) -> Option<i64> {
        match self {
            BorrowRecord::Active(_) => None,
            BorrowRecord::Returned(returned) => Some(returned.total_days),
        }
    }
}

/// 返却の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnOutcome {
    pub returned: ReturnedBorrow,
    pub days_held: i64,
    pub penalized: bool,
}

/// 暦日での保持日数
///
/// 経過時間ではなく日付同士の差。借りた当日に返せば0日。
pub fn days_held(borrow_date: NaiveDate, return_date: NaiveDate) -> i64 {
    (return_date - borrow_date).num_days()
}

/// 純粋関数：書籍を貸し出す
///
/// 新しい貸出中の記録を返す。在庫や上限の確認は呼び出し側（エンジン）の責務。
pub fn open_borrow(book_id: BookId, member_id: MemberId, borrow_date: NaiveDate) -> ActiveBorrow {
    ActiveBorrow {
        core: BorrowCore {
            borrow_id: BorrowId::new(),
            book_id,
            member_id,
            borrow_date,
        },
    }
}

/// 純粋関数：貸出中の記録を返却済みにする
///
/// 保持日数を計算し、PenaltyPolicy でペナルティを判定する。
/// 返却日が貸出日より前なら遷移しない。
/// 貸出中の記録しか受け取らないので、二重返却はここでは起こり得ない。
pub fn close_borrow(
    active: ActiveBorrow,
    return_date: NaiveDate,
) -> Result<ReturnOutcome, ReturnBeforeBorrow> {
    if return_date < active.borrow_date {
        return Err(ReturnBeforeBorrow {
            borrowed_on: active.borrow_date,
            returned_on: return_date,
        });
    }

    let days_held = days_held(active.borrow_date, return_date);
    let penalized = policy::is_late(days_held);

    let returned = ReturnedBorrow {
        core: active.core,
        return_date,
        total_days: days_held,
    };

    Ok(ReturnOutcome {
        returned,
        days_held,
        penalized,
    })
}

/// 純粋関数：任意状態の記録に返却を適用する
///
/// 返却済みの記録は `AlreadyReturned`。
/// ストアから読んだ状態の分からない記録を扱うときに使う。
/// 貸出エンジンは貸出中の記録だけを取得するので `close_borrow` を直接呼ぶ。
pub fn return_book(
    record: BorrowRecord,
    return_date: NaiveDate,
) -> Result<ReturnOutcome, ReturnBookError> {
    match record {
        BorrowRecord::Active(active) => Ok(close_borrow(active, return_date)?),
        BorrowRecord::Returned(_) => Err(ReturnBookError::AlreadyReturned),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_open_borrow_is_active_with_given_date() {
        let book_id = BookId::new();
        let member_id = MemberId::new();

        let active = open_borrow(book_id, member_id, date(2024, 11, 1));
        let record = BorrowRecord::Active(active.clone());

        assert_eq!(active.book_id, book_id);
        assert_eq!(active.member_id, member_id);
        assert_eq!(active.borrow_date, date(2024, 11, 1));
        assert!(!record.is_returned());
        assert_eq!(record.return_date(), None);
        assert_eq!(record.total_days(), None);
    }

    #[test]
    fn test_days_held_is_calendar_difference() {
        assert_eq!(days_held(date(2024, 11, 1), date(2024, 11, 1)), 0);
        assert_eq!(days_held(date(2024, 11, 1), date(2024, 11, 8)), 7);
        // 月またぎ・うるう年
        assert_eq!(days_held(date(2024, 2, 27), date(2024, 3, 1)), 3);
    }

    #[test]
    fn test_close_borrow_on_seventh_day_is_not_penalized() {
        let active = open_borrow(BookId::new(), MemberId::new(), date(2024, 11, 1));

        let outcome = close_borrow(active, date(2024, 11, 8)).unwrap();

        assert_eq!(outcome.days_held, 7);
        assert!(!outcome.penalized);
        assert_eq!(outcome.returned.total_days, 7);
        assert_eq!(outcome.returned.return_date, date(2024, 11, 8));
    }

    #[test]
    fn test_close_borrow_on_eighth_day_is_penalized() {
        let active = open_borrow(BookId::new(), MemberId::new(), date(2024, 11, 1));

        let outcome = close_borrow(active, date(2024, 11, 9)).unwrap();

        assert_eq!(outcome.days_held, 8);
        assert!(outcome.penalized);
    }

    #[test]
    fn test_close_borrow_keeps_identity() {
        let active = open_borrow(BookId::new(), MemberId::new(), date(2024, 11, 1));
        let core = active.core.clone();

        let outcome = close_borrow(active, date(2024, 11, 3)).unwrap();

        assert_eq!(outcome.returned.core, core);
    }

    #[test]
    fn test_close_borrow_rejects_return_before_borrow() {
        let active = open_borrow(BookId::new(), MemberId::new(), date(2024, 11, 5));

        let result = close_borrow(active, date(2024, 11, 4));

        assert_eq!(
            result.unwrap_err(),
            ReturnBeforeBorrow {
                borrowed_on: date(2024, 11, 5),
                returned_on: date(2024, 11, 4),
            }
        );
    }

    #[test]
    fn test_return_book_fails_when_already_returned() {
        let active = open_borrow(BookId::new(), MemberId::new(), date(2024, 11, 1));
        let outcome = close_borrow(active, date(2024, 11, 2)).unwrap();
        let record = BorrowRecord::Returned(outcome.returned);

        let result = return_book(record, date(2024, 11, 3));

        assert_eq!(result.unwrap_err(), ReturnBookError::AlreadyReturned);
    }

    #[test]
    fn test_return_book_wraps_clock_skew() {
        let active = open_borrow(BookId::new(), MemberId::new(), date(2024, 11, 5));

        let result = return_book(BorrowRecord::Active(active), date(2024, 11, 1));

        assert!(matches!(
            result.unwrap_err(),
            ReturnBookError::ReturnBeforeBorrow(_)
        ));
    }

    #[test]
    fn test_returned_record_accessors() {
        let active = open_borrow(BookId::new(), MemberId::new(), date(2024, 11, 1));
        let outcome = return_book(BorrowRecord::Active(active), date(2024, 11, 10)).unwrap();
        let record = BorrowRecord::Returned(outcome.returned);

        assert!(record.is_returned());
        assert_eq!(record.return_date(), Some(date(2024, 11, 10)));
        assert_eq!(record.total_days(), Some(9));
    }
}
