use crate::domain::{Book, BookCode, BookId};
use crate::ports::book_catalog::{BookCatalog, Result, StockDecrement};
use async_trait::async_trait;
use sqlx::{Row, postgres::PgRow};

use super::circulation_store::PgCirculationTransaction;

/// PostgreSQLの行データをBookに変換する
pub(super) fn map_row_to_book(row: &PgRow) -> Result<Book> {
    let code: String = row.try_get("code")?;

    Ok(Book {
        id: BookId::from_uuid(row.try_get("id")?),
        code: BookCode::parse(&code)?,
        title: row.try_get("title")?,
        author: row.try_get("author")?,
        stock: row.try_get("stock")?,
    })
}

#[async_trait]
impl BookCatalog for PgCirculationTransaction {
    /// 書籍行を取得してロックする
    async fn get_by_code(&mut self, code: &BookCode) -> Result<Option<Book>> {
        let row = sqlx::query(
            r#"
            SELECT id, code, title, author, stock
            FROM books
            WHERE code = $1
            FOR UPDATE
            "#,
        )
        .bind(code.as_str())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.as_ref().map(map_row_to_book).transpose()
    }

    /// `stock > 0` を条件に1減らす
    ///
    /// 影響行がなければ在庫切れ。
    async fn conditional_decrement_stock(&mut self, code: &BookCode) -> Result<StockDecrement> {
        let remaining: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE books
            SET stock = stock - 1
            WHERE code = $1 AND stock > 0
            RETURNING stock
            "#,
        )
        .bind(code.as_str())
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(match remaining {
            Some(remaining) => StockDecrement::Decremented { remaining },
            None => StockDecrement::OutOfStock,
        })
    }

    async fn increment_stock(&mut self, code: &BookCode) -> Result<()> {
        let result = sqlx::query("UPDATE books SET stock = stock + 1 WHERE code = $1")
            .bind(code.as_str())
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(format!("book {} vanished mid-transaction", code).into());
        }
        Ok(())
    }
}
