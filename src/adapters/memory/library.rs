use crate::domain::{
    ActiveBorrow, Book, BookCode, BookId, BorrowId, BorrowRecord, Member, MemberCode, MemberId,
    ReturnedBorrow,
};
use crate::ports::book_catalog::{BookCatalog, Result, StockDecrement};
use crate::ports::borrow_ledger::{BorrowLedger, ReturnMark};
use crate::ports::circulation_store::{CirculationStore, CirculationTransaction};
use crate::ports::library_directory::{
    BookUpdate, BorrowEntry, LibraryDirectory, MemberSummary, MemberUpdate, NewBook, NewMember,
    Registration, Removal,
};
use crate::ports::member_registry::MemberRegistry;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// 障害を注入できる箇所
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePoint {
    Begin,
    GetMember,
    CountActiveBorrows,
    SetPenalty,
    GetBook,
    DecrementStock,
    IncrementStock,
    CreateActive,
    FindActive,
    MarkReturned,
    Commit,
}

/// 次に該当箇所を通過したときに一度だけ発生する障害
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// ストアエラーを返す
    Fail(FailurePoint),
    /// 指定時間だけ停止してから続行する
    Stall(FailurePoint, Duration),
}

impl Fault {
    fn point(&self) -> FailurePoint {
        match self {
            Fault::Fail(point) | Fault::Stall(point, _) => *point,
        }
    }
}

/// 注入された障害
#[derive(Debug, thiserror::Error)]
#[error("injected storage failure at {0:?}")]
pub struct InjectedFailure(pub FailurePoint);

/// ストア全体の状態
///
/// 挿入順を保つためVecで保持する。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LibrarySnapshot {
    pub books: Vec<Book>,
    pub members: Vec<Member>,
    pub borrows: Vec<BorrowRecord>,
}

impl LibrarySnapshot {
    pub fn book(&self, code: &BookCode) -> Option<&Book> {
        self.books.iter().find(|b| &b.code == code)
    }

    pub fn member(&self, code: &MemberCode) -> Option<&Member> {
        self.members.iter().find(|m| &m.code == code)
    }

    pub fn active_borrows_for_book(&self, book_id: BookId) -> usize {
        self.borrows
            .iter()
            .filter(|r| !r.is_returned() && r.core().book_id == book_id)
            .count()
    }

    pub fn active_borrows_for_member(&self, member_id: MemberId) -> usize {
        self.borrows
            .iter()
            .filter(|r| !r.is_returned() && r.core().member_id == member_id)
            .count()
    }

    fn member_summary(&self, member: &Member) -> MemberSummary {
        MemberSummary {
            member: member.clone(),
            active_borrows: self.active_borrows_for_member(member.id) as u32,
        }
    }

    fn borrow_entries(&self) -> Vec<BorrowEntry> {
        self.borrows
            .iter()
            .filter_map(|record| {
                let core = record.core();
                let book = self.books.iter().find(|b| b.id == core.book_id)?;
                let member = self.members.iter().find(|m| m.id == core.member_id)?;
                Some(BorrowEntry {
                    borrow_id: core.borrow_id,
                    book_code: book.code.clone(),
                    book_title: book.title.clone(),
                    book_author: book.author.clone(),
                    member_code: member.code.clone(),
                    member_name: member.name.clone(),
                    borrow_date: core.borrow_date,
                    is_returned: record.is_returned(),
                    return_date: record.return_date(),
                    total_days: record.total_days(),
                })
            })
            .collect()
    }
}

/// 全ポートのインメモリ実装
///
/// トランザクションはストア全体の排他ロックを保持した作業コピーで実行し、
/// コミット時にだけ書き戻す。コミットせずに破棄すれば作業コピーごと捨てられる。
/// 直列化可能（serializable）と同等の分離レベルになる。
///
/// テスト用に障害注入（`inject_fault`）と状態の参照（`snapshot`）をサポート。
#[derive(Clone, Default)]
pub struct InMemoryLibrary {
    state: Arc<AsyncMutex<LibrarySnapshot>>,
    fault: Arc<Mutex<Option<Fault>>>,
}

impl InMemoryLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// 次に該当箇所を通過したときの障害を設定
    pub fn inject_fault(&self, fault: Fault) {
        *self.fault.lock().unwrap() = Some(fault);
    }

    /// 現在のコミット済み状態のコピー
    pub async fn snapshot(&self) -> LibrarySnapshot {
        self.state.lock().await.clone()
    }

    /// テスト用に会員のペナルティを直接設定
    pub async fn set_penalty_flag(&self, code: &MemberCode, penalized: bool) {
        let mut state = self.state.lock().await;
        if let Some(member) = state.members.iter_mut().find(|m| &m.code == code) {
            member.penalized = penalized;
        }
    }
}

async fn checkpoint(fault: &Mutex<Option<Fault>>, point: FailurePoint) -> Result<()> {
    let triggered = {
        let mut slot = fault.lock().unwrap();
        let current = *slot;
        match current {
            Some(f) if f.point() == point => slot.take(),
            _ => None,
        }
    };

    match triggered {
        Some(Fault::Fail(point)) => Err(InjectedFailure(point).into()),
        Some(Fault::Stall(_, duration)) => {
            tokio::time::sleep(duration).await;
            Ok(())
        }
        None => Ok(()),
    }
}

#[async_trait]
impl CirculationStore for InMemoryLibrary {
    async fn begin(&self) -> Result<Box<dyn CirculationTransaction>> {
        checkpoint(&self.fault, FailurePoint::Begin).await?;

        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();

        Ok(Box::new(InMemoryTransaction {
            guard,
            working,
            fault: Arc::clone(&self.fault),
        }))
    }
}

/// インメモリのトランザクション
struct InMemoryTransaction {
    guard: OwnedMutexGuard<LibrarySnapshot>,
    working: LibrarySnapshot,
    fault: Arc<Mutex<Option<Fault>>>,
}

#[async_trait]
impl CirculationTransaction for InMemoryTransaction {
    fn books(&mut self) -> &mut dyn BookCatalog {
        self
    }

    fn members(&mut self) -> &mut dyn MemberRegistry {
        self
    }

    fn ledger(&mut self) -> &mut dyn BorrowLedger {
        self
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        checkpoint(&self.fault, FailurePoint::Commit).await?;

        let mut this = *self;
        *this.guard = this.working;
        Ok(())
    }
}

#[async_trait]
impl BookCatalog for InMemoryTransaction {
    async fn get_by_code(&mut self, code: &BookCode) -> Result<Option<Book>> {
        checkpoint(&self.fault, FailurePoint::GetBook).await?;
        Ok(self.working.book(code).cloned())
    }

    async fn conditional_decrement_stock(&mut self, code: &BookCode) -> Result<StockDecrement> {
        checkpoint(&self.fault, FailurePoint::DecrementStock).await?;

        let book = self
            .working
            .books
            .iter_mut()
            .find(|b| &b.code == code)
            .ok_or_else(|| format!("book {} disappeared during transaction", code))?;

        if book.stock <= 0 {
            return Ok(StockDecrement::OutOfStock);
        }
        book.stock -= 1;
        Ok(StockDecrement::Decremented {
            remaining: book.stock,
        })
    }

    async fn increment_stock(&mut self, code: &BookCode) -> Result<()> {
        checkpoint(&self.fault, FailurePoint::IncrementStock).await?;

        let book = self
            .working
            .books
            .iter_mut()
            .find(|b| &b.code == code)
            .ok_or_else(|| format!("book {} disappeared during transaction", code))?;
        book.stock += 1;
        Ok(())
    }
}

#[async_trait]
impl MemberRegistry for InMemoryTransaction {
    async fn get_by_code(&mut self, code: &MemberCode) -> Result<Option<Member>> {
        checkpoint(&self.fault, FailurePoint::GetMember).await?;
        Ok(self.working.member(code).cloned())
    }

    async fn set_penalty(&mut self, code: &MemberCode, penalized: bool) -> Result<()> {
        checkpoint(&self.fault, FailurePoint::SetPenalty).await?;

        let member = self
            .working
            .members
            .iter_mut()
            .find(|m| &m.code == code)
            .ok_or_else(|| format!("member {} disappeared during transaction", code))?;
        member.penalized = penalized;
        Ok(())
    }

    async fn count_active_borrows(&mut self, member_id: MemberId) -> Result<u32> {
        checkpoint(&self.fault, FailurePoint::CountActiveBorrows).await?;
        Ok(self.working.active_borrows_for_member(member_id) as u32)
    }
}

#[async_trait]
impl BorrowLedger for InMemoryTransaction {
    async fn create_active(&mut self, borrow: &ActiveBorrow) -> Result<BorrowId> {
        checkpoint(&self.fault, FailurePoint::CreateActive).await?;

        // 書籍ごとに貸出中は1件まで（DBの部分ユニークインデックスに相当）
        if self.working.active_borrows_for_book(borrow.book_id) > 0 {
            return Err(format!(
                "book {} already has an active borrow",
                borrow.book_id.value()
            )
            .into());
        }

        self.working.borrows.push(BorrowRecord::Active(borrow.clone()));
        Ok(borrow.borrow_id)
    }

    async fn find_active_by_book(&mut self, book_id: BookId) -> Result<Option<ActiveBorrow>> {
        checkpoint(&self.fault, FailurePoint::FindActive).await?;

        Ok(self.working.borrows.iter().find_map(|record| match record {
            BorrowRecord::Active(active) if active.book_id == book_id => Some(active.clone()),
            _ => None,
        }))
    }

    async fn mark_returned(&mut self, returned: &ReturnedBorrow) -> Result<ReturnMark> {
        checkpoint(&self.fault, FailurePoint::MarkReturned).await?;

        let record = self
            .working
            .borrows
            .iter_mut()
            .find(|r| r.core().borrow_id == returned.borrow_id)
            .ok_or_else(|| {
                format!(
                    "borrow record {} does not exist",
                    returned.borrow_id.value()
                )
            })?;

        if record.is_returned() {
            return Ok(ReturnMark::AlreadyReturned);
        }
        *record = BorrowRecord::Returned(returned.clone());
        Ok(ReturnMark::Marked)
    }
}

#[async_trait]
impl LibraryDirectory for InMemoryLibrary {
    async fn register_book(&self, new_book: NewBook) -> Result<Registration<Book>> {
        let mut state = self.state.lock().await;
        if state.book(&new_book.code).is_some() {
            return Ok(Registration::DuplicateCode);
        }

        let book = Book {
            id: BookId::new(),
            code: new_book.code,
            title: new_book.title,
            author: new_book.author,
            stock: new_book.stock,
        };
        state.books.push(book.clone());
        Ok(Registration::Created(book))
    }

    async fn list_available_books(&self) -> Result<Vec<Book>> {
        let state = self.state.lock().await;
        Ok(state
            .books
            .iter()
            .filter(|b| b.in_stock())
            .cloned()
            .collect())
    }

    async fn get_book(&self, code: &BookCode) -> Result<Option<Book>> {
        let state = self.state.lock().await;
        Ok(state.book(code).cloned())
    }

    async fn update_book(&self, code: &BookCode, update: BookUpdate) -> Result<Option<Book>> {
        let mut state = self.state.lock().await;
        let Some(book) = state.books.iter_mut().find(|b| &b.code == code) else {
            return Ok(None);
        };

        if update.stock.is_some_and(|stock| stock < 0) {
            return Err(format!("negative stock for book {}", code).into());
        }
        if let Some(title) = update.title {
            book.title = title;
        }
        if let Some(author) = update.author {
            book.author = author;
        }
        if let Some(stock) = update.stock {
            book.stock = stock;
        }
        Ok(Some(book.clone()))
    }

    async fn delete_book(&self, code: &BookCode) -> Result<Removal> {
        let mut state = self.state.lock().await;
        let Some(book_id) = state.book(code).map(|b| b.id) else {
            return Ok(Removal::NotFound);
        };
        if state.active_borrows_for_book(book_id) > 0 {
            return Ok(Removal::HasActiveBorrows);
        }

        state.borrows.retain(|r| r.core().book_id != book_id);
        state.books.retain(|b| b.id != book_id);
        Ok(Removal::Deleted)
    }

    async fn register_member(&self, new_member: NewMember) -> Result<Registration<Member>> {
        let mut state = self.state.lock().await;
        if state.member(&new_member.code).is_some() {
            return Ok(Registration::DuplicateCode);
        }

        let member = Member {
            id: MemberId::new(),
            code: new_member.code,
            name: new_member.name,
            penalized: false,
        };
        state.members.push(member.clone());
        Ok(Registration::Created(member))
    }

    async fn list_members(&self) -> Result<Vec<MemberSummary>> {
        let state = self.state.lock().await;
        Ok(state
            .members
            .iter()
            .map(|m| state.member_summary(m))
            .collect())
    }

    async fn get_member(&self, code: &MemberCode) -> Result<Option<MemberSummary>> {
        let state = self.state.lock().await;
        Ok(state.member(code).map(|m| state.member_summary(m)))
    }

    async fn update_member(
        &self,
        code: &MemberCode,
        update: MemberUpdate,
    ) -> Result<Option<Member>> {
        let mut state = self.state.lock().await;
        let Some(member) = state.members.iter_mut().find(|m| &m.code == code) else {
            return Ok(None);
        };

        if let Some(name) = update.name {
            member.name = name;
        }
        Ok(Some(member.clone()))
    }

    async fn delete_member(&self, code: &MemberCode) -> Result<Removal> {
        let mut state = self.state.lock().await;
        let Some(member_id) = state.member(code).map(|m| m.id) else {
            return Ok(Removal::NotFound);
        };
        if state.active_borrows_for_member(member_id) > 0 {
            return Ok(Removal::HasActiveBorrows);
        }

        state.borrows.retain(|r| r.core().member_id != member_id);
        state.members.retain(|m| m.id != member_id);
        Ok(Removal::Deleted)
    }

    fn stream_borrows(&self) -> BoxStream<'_, Result<BorrowEntry>> {
        let state = Arc::clone(&self.state);
        stream::once(async move { state.lock().await.borrow_entries() })
            .flat_map(|entries| stream::iter(entries.into_iter().map(Ok)))
            .boxed()
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::borrow;
    use chrono::NaiveDate;

    async fn seeded() -> (InMemoryLibrary, Book, Member) {
        let library = InMemoryLibrary::new();
        let book = match library
            .register_book(NewBook {
                code: BookCode::parse("JK-45").unwrap(),
                title: "Harry Potter".to_string(),
                author: "J.K Rowling".to_string(),
                stock: 1,
            })
            .await
            .unwrap()
        {
            Registration::Created(book) => book,
            Registration::DuplicateCode => panic!("unexpected duplicate"),
        };
        let member = match library
            .register_member(NewMember {
                code: MemberCode::parse("M001").unwrap(),
                name: "Angga".to_string(),
            })
            .await
            .unwrap()
        {
            Registration::Created(member) => member,
            Registration::DuplicateCode => panic!("unexpected duplicate"),
        };
        (library, book, member)
    }

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 11, d).unwrap()
    }

    #[tokio::test]
    async fn test_uncommitted_transaction_is_discarded() {
        let (library, book, _) = seeded().await;

        {
            let mut tx = library.begin().await.unwrap();
            let result = tx
                .books()
                .conditional_decrement_stock(&book.code)
                .await
                .unwrap();
            assert_eq!(result, StockDecrement::Decremented { remaining: 0 });
            // commitせずに破棄
        }

        let snapshot = library.snapshot().await;
        assert_eq!(snapshot.book(&book.code).unwrap().stock, 1);
    }

    #[tokio::test]
    async fn test_committed_transaction_is_visible() {
        let (library, book, member) = seeded().await;

        let mut tx = library.begin().await.unwrap();
        tx.books()
            .conditional_decrement_stock(&book.code)
            .await
            .unwrap();
        let active = borrow::open_borrow(book.id, member.id, date(1));
        tx.ledger().create_active(&active).await.unwrap();
        tx.commit().await.unwrap();

        let snapshot = library.snapshot().await;
        assert_eq!(snapshot.book(&book.code).unwrap().stock, 0);
        assert_eq!(snapshot.active_borrows_for_book(book.id), 1);
        assert_eq!(snapshot.active_borrows_for_member(member.id), 1);
    }

    #[tokio::test]
    async fn test_conditional_decrement_refuses_at_zero() {
        let (library, book, _) = seeded().await;

        let mut tx = library.begin().await.unwrap();
        let first = tx
            .books()
            .conditional_decrement_stock(&book.code)
            .await
            .unwrap();
        let second = tx
            .books()
            .conditional_decrement_stock(&book.code)
            .await
            .unwrap();

        assert_eq!(first, StockDecrement::Decremented { remaining: 0 });
        assert_eq!(second, StockDecrement::OutOfStock);
    }

    #[tokio::test]
    async fn test_second_active_borrow_for_same_book_is_rejected() {
        let (library, book, member) = seeded().await;

        let mut tx = library.begin().await.unwrap();
        let first = borrow::open_borrow(book.id, member.id, date(1));
        let second = borrow::open_borrow(book.id, member.id, date(1));

        tx.ledger().create_active(&first).await.unwrap();
        assert!(tx.ledger().create_active(&second).await.is_err());
    }

    #[tokio::test]
    async fn test_mark_returned_only_once() {
        let (library, book, member) = seeded().await;

        let mut tx = library.begin().await.unwrap();
        let active = borrow::open_borrow(book.id, member.id, date(1));
        tx.ledger().create_active(&active).await.unwrap();

        let outcome = borrow::close_borrow(active, date(3)).unwrap();
        let first = tx.ledger().mark_returned(&outcome.returned).await.unwrap();
        let second = tx.ledger().mark_returned(&outcome.returned).await.unwrap();

        assert_eq!(first, ReturnMark::Marked);
        assert_eq!(second, ReturnMark::AlreadyReturned);
        let remaining = tx.ledger().find_active_by_book(book.id).await.unwrap();
        assert_eq!(remaining, None);
    }

    #[tokio::test]
    async fn test_injected_failure_fires_once() {
        let (library, book, _) = seeded().await;
        library.inject_fault(Fault::Fail(FailurePoint::GetBook));

        let mut tx = library.begin().await.unwrap();
        assert!(tx.books().get_by_code(&book.code).await.is_err());
        assert!(tx.books().get_by_code(&book.code).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_duplicate_codes_are_reported() {
        let (library, _, _) = seeded().await;

        let book = library
            .register_book(NewBook {
                code: BookCode::parse("JK-45").unwrap(),
                title: "Another".to_string(),
                author: "Someone".to_string(),
                stock: 3,
            })
            .await
            .unwrap();
        let member = library
            .register_member(NewMember {
                code: MemberCode::parse("M001").unwrap(),
                name: "Ferry".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(book, Registration::DuplicateCode);
        assert_eq!(member, Registration::DuplicateCode);
    }

    #[tokio::test]
    async fn test_update_book_changes_only_given_fields() {
        let (library, book, _) = seeded().await;

        let updated = library
            .update_book(
                &book.code,
                BookUpdate {
                    stock: Some(4),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.stock, 4);
        assert_eq!(updated.title, "Harry Potter");
        assert_eq!(updated.author, "J.K Rowling");

        let missing = library
            .update_book(&BookCode::parse("NOPE").unwrap(), BookUpdate::default())
            .await
            .unwrap();
        assert_eq!(missing, None);
    }

    #[tokio::test]
    async fn test_delete_refuses_while_borrowed() {
        let (library, book, member) = seeded().await;

        let mut tx = library.begin().await.unwrap();
        let active = borrow::open_borrow(book.id, member.id, date(1));
        tx.ledger().create_active(&active).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(
            library.delete_book(&book.code).await.unwrap(),
            Removal::HasActiveBorrows
        );
        assert_eq!(
            library.delete_member(&member.code).await.unwrap(),
            Removal::HasActiveBorrows
        );

        let snapshot = library.snapshot().await;
        assert!(snapshot.book(&book.code).is_some());
        assert!(snapshot.member(&member.code).is_some());
        assert_eq!(snapshot.borrows.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_removes_returned_history() {
        let (library, book, member) = seeded().await;

        let mut tx = library.begin().await.unwrap();
        let active = borrow::open_borrow(book.id, member.id, date(1));
        tx.ledger().create_active(&active).await.unwrap();
        let outcome = borrow::close_borrow(active, date(2)).unwrap();
        tx.ledger().mark_returned(&outcome.returned).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(
            library.delete_book(&book.code).await.unwrap(),
            Removal::Deleted
        );
        assert_eq!(
            library.delete_book(&book.code).await.unwrap(),
            Removal::NotFound
        );

        let snapshot = library.snapshot().await;
        assert!(snapshot.book(&book.code).is_none());
        assert!(snapshot.borrows.is_empty());
        let summary = library.get_member(&member.code).await.unwrap().unwrap();
        assert_eq!(summary.active_borrows, 0);
    }
}
