use crate::domain::{Book, BookCode, BookId, BorrowId, Member, MemberCode, MemberId};
use crate::ports::library_directory::{
    BookUpdate, BorrowEntry, LibraryDirectory as LibraryDirectoryTrait, MemberSummary, MemberUpdate,
    NewBook, NewMember, Registration, Removal, Result,
};
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use super::book_catalog::map_row_to_book;
use super::member_registry::map_row_to_member;

fn map_row_to_borrow_entry(row: &PgRow) -> Result<BorrowEntry> {
    let book_code: String = row.try_get("book_code")?;
    let member_code: String = row.try_get("member_code")?;

    Ok(BorrowEntry {
        borrow_id: BorrowId::from_uuid(row.try_get("id")?),
        book_code: BookCode::parse(&book_code)?,
        book_title: row.try_get("book_title")?,
        book_author: row.try_get("book_author")?,
        member_code: MemberCode::parse(&member_code)?,
        member_name: row.try_get("member_name")?,
        borrow_date: row.try_get("borrow_date")?,
        is_returned: row.try_get("is_returned")?,
        return_date: row.try_get("return_date")?,
        total_days: row.try_get("total_days")?,
    })
}

fn map_row_to_member_summary(row: &PgRow) -> Result<MemberSummary> {
    let active_borrows: i64 = row.try_get("active_borrows")?;

    Ok(MemberSummary {
        member: map_row_to_member(row)?,
        active_borrows: u32::try_from(active_borrows)?,
    })
}

/// 行の削除に使うクエリ一式
struct RemovalQueries {
    has_active: &'static str,
    delete_history: &'static str,
    delete_row: &'static str,
}

const BOOK_REMOVAL: RemovalQueries = RemovalQueries {
    has_active: "SELECT EXISTS (SELECT 1 FROM borrows WHERE book_id = $1 AND NOT is_returned)",
    delete_history: "DELETE FROM borrows WHERE book_id = $1",
    delete_row: "DELETE FROM books WHERE id = $1",
};

const MEMBER_REMOVAL: RemovalQueries = RemovalQueries {
    has_active: "SELECT EXISTS (SELECT 1 FROM borrows WHERE member_id = $1 AND NOT is_returned)",
    delete_history: "DELETE FROM borrows WHERE member_id = $1",
    delete_row: "DELETE FROM members WHERE id = $1",
};

/// ロック済みの行を、返却済みの貸出記録ごと削除する
///
/// 貸出中の記録が残っていれば何もしない。
async fn remove_with_history(
    tx: &mut Transaction<'static, Postgres>,
    queries: &RemovalQueries,
    id: Uuid,
) -> Result<Removal> {
    let has_active: bool = sqlx::query_scalar(queries.has_active)
        .bind(id)
        .fetch_one(&mut **tx)
        .await?;

    if has_active {
        return Ok(Removal::HasActiveBorrows);
    }

    sqlx::query(queries.delete_history)
        .bind(id)
        .execute(&mut **tx)
        .await?;
    sqlx::query(queries.delete_row)
        .bind(id)
        .execute(&mut **tx)
        .await?;

    Ok(Removal::Deleted)
}

/// LibraryDirectoryのPostgreSQL実装
///
/// 単一テーブルの登録・参照のみ。各クエリはプールから直接実行する。
pub struct LibraryDirectory {
    pool: PgPool,
}

impl LibraryDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LibraryDirectoryTrait for LibraryDirectory {
    async fn register_book(&self, new_book: NewBook) -> Result<Registration<Book>> {
        let id = BookId::new();

        let row = sqlx::query(
            r#"
            INSERT INTO books (id, code, title, author, stock)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (code) DO NOTHING
            RETURNING id, code, title, author, stock
            "#,
        )
        .bind(id.value())
        .bind(new_book.code.as_str())
        .bind(&new_book.title)
        .bind(&new_book.author)
        .bind(new_book.stock)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Registration::Created(map_row_to_book(&row)?)),
            None => Ok(Registration::DuplicateCode),
        }
    }

    async fn list_available_books(&self) -> Result<Vec<Book>> {
        let rows = sqlx::query(
            r#"
            SELECT id, code, title, author, stock
            FROM books
            WHERE stock > 0
            ORDER BY code
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_row_to_book).collect()
    }

    async fn get_book(&self, code: &BookCode) -> Result<Option<Book>> {
        let row = sqlx::query(
            r#"
            SELECT id, code, title, author, stock
            FROM books
            WHERE code = $1
            "#,
        )
        .bind(code.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(map_row_to_book).transpose()
    }

    /// 指定された項目だけを更新する
    ///
    /// 在庫の下限はテーブルのCHECK制約でも守られる。
    async fn update_book(&self, code: &BookCode, update: BookUpdate) -> Result<Option<Book>> {
        let row = sqlx::query(
            r#"
            UPDATE books
            SET title = COALESCE($2, title),
                author = COALESCE($3, author),
                stock = COALESCE($4, stock)
            WHERE code = $1
            RETURNING id, code, title, author, stock
            "#,
        )
        .bind(code.as_str())
        .bind(update.title)
        .bind(update.author)
        .bind(update.stock)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(map_row_to_book).transpose()
    }

    /// 書籍行をロックしてから削除する
    ///
    /// 貸出トランザクションも書籍行をロックするので、確認から削除までの間に
    /// 新しい貸出が割り込むことはない。
    async fn delete_book(&self, code: &BookCode) -> Result<Removal> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT id FROM books WHERE code = $1 FOR UPDATE")
            .bind(code.as_str())
            .fetch_optional(&mut *tx)
            .await?;

        let Some(row) = row else {
            return Ok(Removal::NotFound);
        };

        let removal = remove_with_history(&mut tx, &BOOK_REMOVAL, row.try_get("id")?).await?;
        if removal == Removal::Deleted {
            tx.commit().await?;
        }

        Ok(removal)
    }

    async fn register_member(&self, new_member: NewMember) -> Result<Registration<Member>> {
        let id = MemberId::new();

        let row = sqlx::query(
            r#"
            INSERT INTO members (id, code, name, penalized)
            VALUES ($1, $2, $3, FALSE)
            ON CONFLICT (code) DO NOTHING
            RETURNING id, code, name, penalized
            "#,
        )
        .bind(id.value())
        .bind(new_member.code.as_str())
        .bind(&new_member.name)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Registration::Created(map_row_to_member(&row)?)),
            None => Ok(Registration::DuplicateCode),
        }
    }

    async fn list_members(&self) -> Result<Vec<MemberSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT m.id, m.code, m.name, m.penalized,
                   COUNT(b.id) FILTER (WHERE NOT b.is_returned) AS active_borrows
            FROM members m
            LEFT JOIN borrows b ON b.member_id = m.id
            GROUP BY m.id, m.code, m.name, m.penalized
            ORDER BY m.code
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_row_to_member_summary).collect()
    }

    async fn get_member(&self, code: &MemberCode) -> Result<Option<MemberSummary>> {
        let row = sqlx::query(
            r#"
            SELECT m.id, m.code, m.name, m.penalized,
                   COUNT(b.id) FILTER (WHERE NOT b.is_returned) AS active_borrows
            FROM members m
            LEFT JOIN borrows b ON b.member_id = m.id
            WHERE m.code = $1
            GROUP BY m.id, m.code, m.name, m.penalized
            "#,
        )
        .bind(code.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(map_row_to_member_summary).transpose()
    }

    async fn update_member(
        &self,
        code: &MemberCode,
        update: MemberUpdate,
    ) -> Result<Option<Member>> {
        let row = sqlx::query(
            r#"
            UPDATE members
            SET name = COALESCE($2, name)
            WHERE code = $1
            RETURNING id, code, name, penalized
            "#,
        )
        .bind(code.as_str())
        .bind(update.name)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(map_row_to_member).transpose()
    }

    /// 会員行をロックしてから削除する（貸出・返却と同じく会員行が最初のロック）
    async fn delete_member(&self, code: &MemberCode) -> Result<Removal> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT id FROM members WHERE code = $1 FOR UPDATE")
            .bind(code.as_str())
            .fetch_optional(&mut *tx)
            .await?;

        let Some(row) = row else {
            return Ok(Removal::NotFound);
        };

        let removal = remove_with_history(&mut tx, &MEMBER_REMOVAL, row.try_get("id")?).await?;
        if removal == Removal::Deleted {
            tx.commit().await?;
        }

        Ok(removal)
    }

    /// 貸出台帳を貸出日順にストリーム配信する
    ///
    /// 全件をメモリに載せずに、行ごとに変換して返す。
    fn stream_borrows(&self) -> BoxStream<'_, Result<BorrowEntry>> {
        let stream = sqlx::query(
            r#"
            SELECT b.id, b.borrow_date, b.is_returned, b.return_date, b.total_days,
                   bk.code AS book_code, bk.title AS book_title, bk.author AS book_author,
                   m.code AS member_code, m.name AS member_name
            FROM borrows b
            JOIN books bk ON bk.id = b.book_id
            JOIN members m ON m.id = b.member_id
            ORDER BY b.borrow_date, b.created_at
            "#,
        )
        .fetch(&self.pool)
        .map(|row_result| {
            let row = row_result
                .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)?;
            map_row_to_borrow_entry(&row)
        });

        Box::pin(stream)
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
