//! Library-mode routes.

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use crate::core::api::{ApiError, CommandHandler, Shelf};
use crate::core::error::{DeviceError, TransferError};

pub fn router(handler: CommandHandler) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/files", get(list_files))
        .route("/transfer", post(start_transfer))
        .route("/transfer/progress", get(transfer_progress))
        .route("/transfer/cancel", post(cancel_transfer))
        .route("/eject", post(eject))
        .route("/shutdown", post(shutdown))
        .with_state(handler)
}

#[derive(Deserialize)]
struct ListQuery {
    shelf: Shelf,
}

#[derive(Deserialize)]
struct TransferBody {
    source: Shelf,
    destination: Shelf,
    filename: String,
}

#[derive(Serialize)]
struct Message {
    success: bool,
    message: String,
}

impl Message {
    fn ok(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.into(),
        })
    }

    fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Transfer(TransferError::Busy) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Transfer(TransferError::SourceUnreadable(_)) => StatusCode::NOT_FOUND,
            ApiError::Device(DeviceError::NotConnected) => StatusCode::CONFLICT,
            ApiError::InvalidFilename | ApiError::SameShelf => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(Message::fail(self.to_string()))).into_response()
    }
}

async fn status(State(handler): State<CommandHandler>) -> Response {
    Json(handler.status()).into_response()
}

async fn list_files(
    State(handler): State<CommandHandler>,
    Query(query): Query<ListQuery>,
) -> Result<Response, ApiError> {
    let files = handler.list_files(query.shelf)?;
    Ok(Json(files).into_response())
}

async fn start_transfer(
    State(handler): State<CommandHandler>,
    Json(body): Json<TransferBody>,
) -> Result<Response, ApiError> {
    match handler
        .start_transfer(body.source, body.destination, &body.filename)
        .await
    {
        Ok(()) => Ok(Message::ok("transfer complete").into_response()),
        // a cancelled transfer is an orderly outcome, not a server error
        Err(ApiError::Transfer(TransferError::Cancelled)) => {
            Ok(Json(Message::fail("transfer cancelled")).into_response())
        }
        Err(e) => Err(e),
    }
}

async fn transfer_progress(State(handler): State<CommandHandler>) -> Response {
    match handler.transfer_progress() {
        Some(session) => Json(session).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn cancel_transfer(State(handler): State<CommandHandler>) -> Response {
    if handler.cancel_transfer() {
        Message::ok("cancel requested").into_response()
    } else {
        Json(Message::fail("no active transfer")).into_response()
    }
}

async fn eject(State(handler): State<CommandHandler>) -> Result<Response, ApiError> {
    handler.eject().await?;
    Ok(Message::ok("reader ejected").into_response())
}

async fn shutdown(State(handler): State<CommandHandler>) -> Response {
    handler.shutdown();
    Message::ok("shutting down").into_response()
}
