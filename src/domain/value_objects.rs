use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::CodeError;

/// 書籍・会員コードの最大長
pub const MAX_CODE_LEN: usize = 32;

/// 貸出記録ID - 貸出台帳の行ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BorrowId(Uuid);

impl BorrowId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn value(&self) -> Uuid {
        self.0
    }
}

impl Default for BorrowId {
    fn default() -> Self {
        Self::new()
    }
}

/// 書籍ID - 蔵書カタログの行ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BookId(Uuid);

impl BookId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn value(&self) -> Uuid {
        self.0
    }
}

impl Default for BookId {
    fn default() -> Self {
        Self::new()
    }
}

/// 会員ID - 会員名簿の行ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemberId(Uuid);

impl MemberId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn value(&self) -> Uuid {
        self.0
    }
}

impl Default for MemberId {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_code(raw: &str) -> Result<String, CodeError> {
    let code = raw.trim();
    if code.is_empty() {
        return Err(CodeError::Empty);
    }
    if code.chars().count() > MAX_CODE_LEN {
        return Err(CodeError::TooLong { max: MAX_CODE_LEN });
    }
    if code.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(CodeError::IllegalCharacter);
    }
    Ok(code.to_string())
}

/// 書籍コード（例: "JK-45"）
///
/// 不変条件：前後の空白を除去済み、空でない、32文字以内、空白・制御文字を含まない。
/// 利用者が入力する業務キーなので、ストアへ問い合わせる前にここで検証する。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BookCode(String);

impl BookCode {
    pub fn parse(raw: &str) -> Result<Self, CodeError> {
        validate_code(raw).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for BookCode {
    type Error = CodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<BookCode> for String {
    fn from(code: BookCode) -> Self {
        code.0
    }
}

impl std::fmt::Display for BookCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// 会員コード（例: "M001"）
///
/// 検証ルールは書籍コードと同じ。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MemberCode(String);

impl MemberCode {
    pub fn parse(raw: &str) -> Result<Self, CodeError> {
        validate_code(raw).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for MemberCode {
    type Error = CodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<MemberCode> for String {
    fn from(code: MemberCode) -> Self {
        code.0
    }
}

impl std::fmt::Display for MemberCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
