use thiserror::Error;

/// コード（書籍・会員）の検証エラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodeError {
    #[error("code must not be empty")]
    Empty,

    #[error("code must be at most {max} characters")]
    TooLong { max: usize },

    #[error("code must not contain whitespace or control characters")]
    IllegalCharacter,
}

/// 返却日が貸出日より前（時計のずれ）
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("return date {returned_on} is before borrow date {borrowed_on}")]
pub struct ReturnBeforeBorrow {
    pub borrowed_on: chrono::NaiveDate,
    pub returned_on: chrono::NaiveDate,
}

/// 任意状態の記録に返却を適用したときのエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReturnBookError {
    /// 既に返却済み
    #[error("borrow record is already returned")]
    AlreadyReturned,

    #[error(transparent)]
    ReturnBeforeBorrow(#[from] ReturnBeforeBorrow),
}
