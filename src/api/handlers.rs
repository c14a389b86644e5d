use crate::application::circulation::{
    ServiceDependencies, borrow_book as execute_borrow_book, return_book as execute_return_book,
};
use crate::ports::library_directory::{Registration, Removal};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use futures::TryStreamExt;
use std::sync::Arc;

use super::{
    error::{ApiError, QueryError},
    types::{
        BookResponse, BorrowEntryResponse, BorrowResponse, CirculationRequest, CreateBookRequest,
        CreateMemberRequest, MemberResponse, ReturnResponse, UpdateBookRequest, UpdateMemberRequest,
        parse_book_code_param, parse_member_code_param,
    },
};

// ============================================================================
// State
// ============================================================================

/// ハンドラー間で共有されるアプリケーション状態
#[derive(Clone)]
pub struct AppState {
    pub service_deps: ServiceDependencies,
}

// ============================================================================
// Circulation handlers
// ============================================================================

/// POST /borrow - 書籍を借りる
///
/// 貸出日はサーバーの日付。
///
/// 強制されるビジネスルール:
/// - 会員と書籍が存在すること
/// - 会員がペナルティ中でないこと
/// - 会員の貸出中の冊数が2冊未満であること
/// - 在庫があること
pub async fn borrow_book(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CirculationRequest>,
) -> Result<(StatusCode, Json<BorrowResponse>), ApiError> {
    let cmd = req.to_borrow_command(state.service_deps.clock.today())?;

    let receipt = execute_borrow_book(&state.service_deps, cmd).await?;

    Ok((StatusCode::CREATED, Json(BorrowResponse::from(receipt))))
}

/// POST /return - 書籍を返却する
///
/// 保持日数が7日を超えていれば会員にペナルティが設定され、
/// そうでなければ解除される。
pub async fn return_book(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CirculationRequest>,
) -> Result<Json<ReturnResponse>, ApiError> {
    let cmd = req.to_return_command(state.service_deps.clock.today())?;

    let receipt = execute_return_book(&state.service_deps, cmd).await?;

    Ok(Json(ReturnResponse::from(receipt)))
}

// ============================================================================
// Directory handlers
// ============================================================================

/// POST /book - 書籍を登録
pub async fn create_book(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateBookRequest>,
) -> Result<(StatusCode, Json<BookResponse>), QueryError> {
    let new_book = req.to_new_book()?;
    let code = new_book.code.clone();

    match state
        .service_deps
        .directory
        .register_book(new_book)
        .await
        .map_err(|e| QueryError::Unavailable(e.to_string()))?
    {
        Registration::Created(book) => Ok((StatusCode::CREATED, Json(BookResponse::from(book)))),
        Registration::DuplicateCode => Err(QueryError::Conflict(format!(
            "Book {} already exists",
            code
        ))),
    }
}

/// GET /book - 在庫のある書籍の一覧
pub async fn list_books(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<BookResponse>>, QueryError> {
    let books = state
        .service_deps
        .directory
        .list_available_books()
        .await
        .map_err(|e| QueryError::Unavailable(e.to_string()))?;

    Ok(Json(books.into_iter().map(BookResponse::from).collect()))
}

/// GET /book/:code - 書籍をコードで取得
pub async fn get_book(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<Json<BookResponse>, QueryError> {
    let code = parse_book_code_param(&code)?;

    match state.service_deps.directory.get_book(&code).await {
        Ok(Some(book)) => Ok(Json(BookResponse::from(book))),
        Ok(None) => Err(QueryError::NotFound(format!("Book {} not found", code))),
        Err(e) => Err(QueryError::Unavailable(e.to_string())),
    }
}

/// PUT /book/:code - 書籍の部分更新
pub async fn update_book(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    Json(req): Json<UpdateBookRequest>,
) -> Result<Json<BookResponse>, QueryError> {
    let code = parse_book_code_param(&code)?;
    let update = req.to_book_update()?;
    let directory = &state.service_deps.directory;

    match directory.update_book(&code, update).await {
        Ok(Some(book)) => Ok(Json(BookResponse::from(book))),
        Ok(None) => Err(QueryError::NotFound(format!("Book {} not found", code))),
        Err(e) => Err(QueryError::Unavailable(e.to_string())),
    }
}

/// DELETE /book/:code - 書籍を削除
///
/// 貸出中の書籍は削除できない（409）。
pub async fn delete_book(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<StatusCode, QueryError> {
    let code = parse_book_code_param(&code)?;

    match state.service_deps.directory.delete_book(&code).await {
        Ok(Removal::Deleted) => Ok(StatusCode::NO_CONTENT),
        Ok(Removal::NotFound) => Err(QueryError::NotFound(format!("Book {} not found", code))),
        Ok(Removal::HasActiveBorrows) => Err(QueryError::Conflict(format!(
            "Book {} is currently borrowed",
            code
        ))),
        Err(e) => Err(QueryError::Unavailable(e.to_string())),
    }
}

/// POST /member - 会員を登録
pub async fn create_member(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateMemberRequest>,
) -> Result<(StatusCode, Json<MemberResponse>), QueryError> {
    let new_member = req.to_new_member()?;
    let code = new_member.code.clone();

    match state
        .service_deps
        .directory
        .register_member(new_member)
        .await
        .map_err(|e| QueryError::Unavailable(e.to_string()))?
    {
        Registration::Created(member) => Ok((
            StatusCode::CREATED,
            Json(MemberResponse {
                member_id: member.id.value(),
                code: member.code.to_string(),
                name: member.name,
                penalized: member.penalized,
                active_borrows: 0,
            }),
        )),
        Registration::DuplicateCode => Err(QueryError::Conflict(format!(
            "Member {} already exists",
            code
        ))),
    }
}

/// GET /member - 会員一覧（貸出中の冊数つき）
pub async fn list_members(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<MemberResponse>>, QueryError> {
    let members = state
        .service_deps
        .directory
        .list_members()
        .await
        .map_err(|e| QueryError::Unavailable(e.to_string()))?;

    let members = members.into_iter().map(MemberResponse::from).collect();

    Ok(Json(members))
}

/// GET /member/:code - 会員をコードで取得（貸出中の冊数つき）
pub async fn get_member(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<Json<MemberResponse>, QueryError> {
    let code = parse_member_code_param(&code)?;

    match state.service_deps.directory.get_member(&code).await {
        Ok(Some(summary)) => Ok(Json(MemberResponse::from(summary))),
        Ok(None) => Err(QueryError::NotFound(format!("Member {} not found", code))),
        Err(e) => Err(QueryError::Unavailable(e.to_string())),
    }
}

/// PUT /member/:code - 会員の部分更新
pub async fn update_member(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    Json(req): Json<UpdateMemberRequest>,
) -> Result<Json<MemberResponse>, QueryError> {
    let code = parse_member_code_param(&code)?;
    let update = req.to_member_update()?;
    let directory = &state.service_deps.directory;

    if directory
        .update_member(&code, update)
        .await
        .map_err(|e| QueryError::Unavailable(e.to_string()))?
        .is_none()
    {
        return Err(QueryError::NotFound(format!("Member {} not found", code)));
    }

    // 貸出中の冊数を含めて返す
    match directory.get_member(&code).await {
        Ok(Some(summary)) => Ok(Json(MemberResponse::from(summary))),
        Ok(None) => Err(QueryError::NotFound(format!("Member {} not found", code))),
        Err(e) => Err(QueryError::Unavailable(e.to_string())),
    }
}

/// DELETE /member/:code - 会員を削除
///
/// 貸出中の書籍がある会員は削除できない（409）。
pub async fn delete_member(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<StatusCode, QueryError> {
    let code = parse_member_code_param(&code)?;

    match state.service_deps.directory.delete_member(&code).await {
        Ok(Removal::Deleted) => Ok(StatusCode::NO_CONTENT),
        Ok(Removal::NotFound) => Err(QueryError::NotFound(format!("Member {} not found", code))),
        Ok(Removal::HasActiveBorrows) => Err(QueryError::Conflict(format!(
            "Member {} still has borrowed books",
            code
        ))),
        Err(e) => Err(QueryError::Unavailable(e.to_string())),
    }
}

/// GET /borrow - 貸出台帳
pub async fn list_borrows(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<BorrowEntryResponse>>, QueryError> {
    let entries: Vec<BorrowEntryResponse> = state
        .service_deps
        .directory
        .stream_borrows()
        .map_ok(BorrowEntryResponse::from)
        .try_collect()
        .await
        .map_err(|e| QueryError::Unavailable(e.to_string()))?;

    Ok(Json(entries))
}

// ============================================================================
// Health
// ============================================================================

/// GET /health - プロセスが応答できるか
pub async fn health_check() -> &'static str {
    "OK"
}

/// GET /ready - ストアに到達できるか
pub async fn readiness_check(
    State(state): State<Arc<AppState>>,
) -> Result<&'static str, QueryError> {
    state
        .service_deps
        .directory
        .ping()
        .await
        .map_err(|e| QueryError::Unavailable(e.to_string()))?;

    Ok("READY")
}
