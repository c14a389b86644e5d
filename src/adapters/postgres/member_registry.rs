use crate::domain::{Member, MemberCode, MemberId};
use crate::ports::member_registry::{MemberRegistry, Result};
use async_trait::async_trait;
use sqlx::{Row, postgres::PgRow};

use super::circulation_store::PgCirculationTransaction;

pub(super) fn map_row_to_member(row: &PgRow) -> Result<Member> {
    let code: String = row.try_get("code")?;

    Ok(Member {
        id: MemberId::from_uuid(row.try_get("id")?),
        code: MemberCode::parse(&code)?,
        name: row.try_get("name")?,
        penalized: row.try_get("penalized")?,
    })
}

#[async_trait]
impl MemberRegistry for PgCirculationTransaction {
    /// 会員行を取得してロックする
    ///
    /// 同じ会員の貸出・返却はこのロックで直列化される。
    async fn get_by_code(&mut self, code: &MemberCode) -> Result<Option<Member>> {
        let row = sqlx::query(
            r#"
            SELECT id, code, name, penalized
            FROM members
            WHERE code = $1
            FOR UPDATE
            "#,
        )
        .bind(code.as_str())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.as_ref().map(map_row_to_member).transpose()
    }

    async fn set_penalty(&mut self, code: &MemberCode, penalized: bool) -> Result<()> {
        let result = sqlx::query("UPDATE members SET penalized = $2 WHERE code = $1")
            .bind(code.as_str())
            .bind(penalized)
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(format!("member {} vanished mid-transaction", code).into());
        }
        Ok(())
    }

    async fn count_active_borrows(&mut self, member_id: MemberId) -> Result<u32> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM borrows
            WHERE member_id = $1 AND NOT is_returned
            "#,
        )
        .bind(member_id.value())
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(u32::try_from(count)?)
    }
}
