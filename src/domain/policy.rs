//! 貸出ルールの純粋関数
//!
//! どちらも副作用を持たず、ストアにも依存しない。

/// 会員1人あたりの同時貸出上限
pub const MAX_ACTIVE_BORROWS: u32 = 2;

/// 延滞とみなさない最長保持日数
pub const LATE_RETURN_THRESHOLD_DAYS: i64 = 7;

/// PenaltyPolicy: 返却が延滞か判定する
///
/// ちょうど7日目の返却は延滞ではない。8日目からペナルティ対象。
pub fn is_late(days_held: i64) -> bool {
    days_held > LATE_RETURN_THRESHOLD_DAYS
}

/// BorrowLimitPolicy: さらに借りられるか判定する
pub fn can_borrow(active_count: u32) -> bool {
    active_count < MAX_ACTIVE_BORROWS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_late_boundary() {
        assert!(!is_late(0));
        assert!(!is_late(7));
        assert!(is_late(8));
        assert!(is_late(30));
    }

    #[test]
    fn test_can_borrow_boundary() {
        assert!(can_borrow(0));
        assert!(can_borrow(1));
        assert!(!can_borrow(2));
        assert!(!can_borrow(3));
    }
}
