use crate::domain::{Member, MemberCode, MemberId};
use async_trait::async_trait;

pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// 会員名簿ポート
///
/// 貸出トランザクションの中からのみ使われる。
#[async_trait]
pub trait MemberRegistry: Send {
    /// コードで会員を取得する
    ///
    /// 実装はトランザクション終了まで会員行を排他ロックすること。
    /// 同じ会員の同時貸出が直列化され、貸出数の確認と記録作成の間に
    /// 別の貸出が割り込めなくなる。
    async fn get_by_code(&mut self, code: &MemberCode) -> Result<Option<Member>>;

    /// ペナルティフラグを上書きする（累積しない）
    async fn set_penalty(&mut self, code: &MemberCode, penalized: bool) -> Result<()>;

    /// 会員の貸出中（未返却）の記録数
    async fn count_active_borrows(&mut self, member_id: MemberId) -> Result<u32>;
}
