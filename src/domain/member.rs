use serde::{Deserialize, Serialize};

use super::{MemberCode, MemberId};

/// 会員
///
/// `penalized`を書き換えるのは返却処理だけ。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    pub code: MemberCode,
    pub name: String,
    pub penalized: bool,
}
