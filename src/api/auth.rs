use std::sync::Arc;

use nested_errors::{
    JwtManager,
    guards::jwt::{AccessToken, RefreshToken},
};
use rocket::{Route, State, http::Status, serde::json::Json};
use serde::{Deserialize, Serialize};

use super::errors::{AppError, AppResult};
use crate::blocklist::Blocklist;

pub fn routes() -> Vec<Route> {
    rocket::routes![login, refresh, me, logout]
}

#[derive(Deserialize)]
struct LoginDto {
    username: String,
}

#[derive(Serialize)]
struct TokensDto {
    access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
}

#[derive(Serialize)]
struct IdentityDto {
    identity: String,
    expires_at: i64,
}

// no credentials are checked; any non-empty username gets tokens
#[rocket::post("/login", data = "<dto>")]
async fn login(dto: Json<LoginDto>, jwt: &State<JwtManager>) -> AppResult<Json<TokensDto>> {
    let username = dto.username.trim();
    if username.is_empty() {
        return Err(AppError::EmptyUsername);
    }

    Ok(Json(TokensDto {
        access_token: jwt.create_access_token(username)?,
        refresh_token: Some(jwt.create_refresh_token(username)?),
    }))
}

#[rocket::post("/refresh")]
async fn refresh(token: RefreshToken, jwt: &State<JwtManager>) -> AppResult<Json<TokensDto>> {
    Ok(Json(TokensDto {
        access_token: jwt.create_access_token(token.identity())?,
        refresh_token: None,
    }))
}

#[rocket::get("/me")]
async fn me(token: AccessToken) -> Json<IdentityDto> {
    Json(IdentityDto {
        identity: token.identity().to_owned(),
        expires_at: token.claims().exp,
    })
}

#[rocket::delete("/logout")]
async fn logout(token: AccessToken, blocklist: &State<Arc<Blocklist>>) -> Status {
    blocklist.revoke(&token.claims().jti);

    Status::NoContent
}
