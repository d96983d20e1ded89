use chrono::{DateTime, Utc};
use nested_errors::{errors::SessionError, guards::jwt::AccessToken, session::Tx};
use rocket::{Route, serde::json::Json};
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use uuid::Uuid;

use super::errors::AppResult;

pub fn routes() -> Vec<Route> {
    rocket::routes![list_notes, create_note]
}

#[derive(FromRow, Serialize)]
struct Note {
    id: Uuid,
    author: String,
    body: String,
    created_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct CreateNoteDto {
    body: String,
}

// reads go through `Tx` too, so a server without a pool still launches and
// answers with a 500 instead of failing its state check
#[rocket::get("/notes")]
async fn list_notes(token: AccessToken, tx: Tx<'_>) -> AppResult<Json<Vec<Note>>> {
    let mut guard = tx.lock().await;
    let txn = guard.as_mut().ok_or(SessionError::NoTransaction)?;

    let notes = sqlx::query_as("SELECT * FROM notes WHERE author = $1 ORDER BY created_at, id")
        .bind(token.identity())
        .fetch_all(&mut **txn)
        .await?;

    Ok(Json(notes))
}

// a body violating the table's length check fails the insert with a 500;
// the open transaction is then rolled back by the catcher when enabled
#[rocket::post("/notes", data = "<dto>")]
async fn create_note(
    token: AccessToken,
    dto: Json<CreateNoteDto>,
    tx: Tx<'_>,
) -> AppResult<Json<Note>> {
    let mut guard = tx.lock().await;
    let txn = guard.as_mut().ok_or(SessionError::NoTransaction)?;

    let note = sqlx::query_as("INSERT INTO notes (author, body) VALUES ($1, $2) RETURNING *")
        .bind(token.identity())
        .bind(&dto.body)
        .fetch_one(&mut **txn)
        .await?;

    drop(guard);
    tx.commit().await?;

    Ok(Json(note))
}
