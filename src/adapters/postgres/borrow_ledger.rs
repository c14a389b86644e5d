use crate::domain::{ActiveBorrow, BookId, BorrowCore, BorrowId, MemberId, ReturnedBorrow};
use crate::ports::borrow_ledger::{BorrowLedger, Result, ReturnMark};
use async_trait::async_trait;
use sqlx::Row;

use super::circulation_store::PgCirculationTransaction;

#[async_trait]
impl BorrowLedger for PgCirculationTransaction {
    async fn create_active(&mut self, borrow: &ActiveBorrow) -> Result<BorrowId> {
        sqlx::query(
            r#"
            INSERT INTO borrows (id, book_id, member_id, borrow_date, is_returned)
            VALUES ($1, $2, $3, $4, FALSE)
            "#,
        )
        .bind(borrow.borrow_id.value())
        .bind(borrow.book_id.value())
        .bind(borrow.member_id.value())
        .bind(borrow.borrow_date)
        .execute(&mut *self.tx)
        .await?;

        Ok(borrow.borrow_id)
    }

    /// 貸出中の記録を取得してロックする
    ///
    /// 同時返却の後着側はここでロック待ちになり、先着のコミット後は
    /// `NOT is_returned` に一致しなくなるので None を受け取る。
    async fn find_active_by_book(&mut self, book_id: BookId) -> Result<Option<ActiveBorrow>> {
        let row = sqlx::query(
            r#"
            SELECT id, book_id, member_id, borrow_date
            FROM borrows
            WHERE book_id = $1 AND NOT is_returned
            FOR UPDATE
            "#,
        )
        .bind(book_id.value())
        .fetch_optional(&mut *self.tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(ActiveBorrow {
            core: BorrowCore {
                borrow_id: BorrowId::from_uuid(row.try_get("id")?),
                book_id: BookId::from_uuid(row.try_get("book_id")?),
                member_id: MemberId::from_uuid(row.try_get("member_id")?),
                borrow_date: row.try_get("borrow_date")?,
            },
        }))
    }

    /// 貸出中の記録だけを返却済みにする
    async fn mark_returned(&mut self, returned: &ReturnedBorrow) -> Result<ReturnMark> {
        let result = sqlx::query(
            r#"
            UPDATE borrows
            SET is_returned = TRUE,
                return_date = $2,
                total_days = $3
            WHERE id = $1 AND NOT is_returned
            "#,
        )
        .bind(returned.borrow_id.value())
        .bind(returned.return_date)
        .bind(returned.total_days)
        .execute(&mut *self.tx)
        .await?;

        Ok(if result.rows_affected() == 0 {
            ReturnMark::AlreadyReturned
        } else {
            ReturnMark::Marked
        })
    }
}
