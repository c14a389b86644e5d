use std::time::Duration;
use thiserror::Error;

/// 見つからなかったエンティティの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Member,
    Book,
    /// 書籍の貸出中の記録
    ActiveBorrow,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Member => f.write_str("member"),
            EntityKind::Book => f.write_str("book"),
            EntityKind::ActiveBorrow => f.write_str("active borrow"),
        }
    }
}

/// 状態の競合理由
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictReason {
    /// 在庫切れ（他の会員が貸出中）
    OutOfStock,
}

impl std::fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictReason::OutOfStock => f.write_str("book is out of stock"),
        }
    }
}

/// 貸出を拒否する理由
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForbiddenReason {
    /// ペナルティ中
    PenaltyActive,
    /// 貸出上限（2冊）に達している
    BorrowLimitExceeded,
}

impl std::fmt::Display for ForbiddenReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ForbiddenReason::PenaltyActive => f.write_str("member is penalized"),
            ForbiddenReason::BorrowLimitExceeded => f.write_str("member already borrows 2 books"),
        }
    }
}

/// トランザクションが期限内に終わらなかった
#[derive(Debug, Error)]
#[error("transaction did not finish within {0:?}")]
pub struct TransactionTimeout(pub Duration);

/// 貸出エンジンのエラー
///
/// ビジネスルール違反はすべてコミット前に検出され、
/// トランザクションはロールバックされる。
#[derive(Debug, Error)]
pub enum CirculationError {
    /// 会員・書籍・貸出中記録が存在しない
    #[error("{kind} not found: {code}")]
    NotFound { kind: EntityKind, code: String },

    /// 書籍の状態と競合
    #[error("{reason}: {code}")]
    Conflict {
        reason: ConflictReason,
        code: String,
    },

    /// 会員が借りられない
    #[error("{reason}: {code}")]
    Forbidden {
        reason: ForbiddenReason,
        code: String,
    },

    /// ストアの障害。業務トランザクションは自動で再試行しない
    #[error("storage unavailable")]
    Unavailable(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// 入力が不正
    #[error("invalid input: {0}")]
    Invalid(String),
}

impl CirculationError {
    pub fn not_found(kind: EntityKind, code: impl std::fmt::Display) -> Self {
        CirculationError::NotFound {
            kind,
            code: code.to_string(),
        }
    }

    pub fn conflict(reason: ConflictReason, code: impl std::fmt::Display) -> Self {
        CirculationError::Conflict {
            reason,
            code: code.to_string(),
        }
    }

    pub fn forbidden(reason: ForbiddenReason, code: impl std::fmt::Display) -> Self {
        CirculationError::Forbidden {
            reason,
            code: code.to_string(),
        }
    }
}

/// アプリケーション層の Result型
pub type Result<T> = std::result::Result<T, CirculationError>;
