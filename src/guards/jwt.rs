use jsonwebtoken::Header;
use log::*;
use rocket::{
    Request,
    http::Status,
    request::{FromRequest, Outcome},
};

use super::token::BearerToken;
use crate::jwt::{Claims, JwtManager, TokenError, TokenRejection, TokenType, VerifiedToken};

/// A valid, unrevoked access token from the `Authorization` header.
pub struct AccessToken(VerifiedToken);

/// A valid, unrevoked refresh token from the `Authorization` header.
pub struct RefreshToken(VerifiedToken);

macro_rules! token_guard {
    ($name:ident, $kind:expr) => {
        impl $name {
            pub fn identity(&self) -> &str {
                &self.0.claims.sub
            }

            pub fn claims(&self) -> &Claims {
                &self.0.claims
            }

            pub fn header(&self) -> &Header {
                &self.0.header
            }
        }

        #[rocket::async_trait]
        impl<'r> FromRequest<'r> for $name {
            type Error = TokenError;

            async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
                authenticate(req, $kind).map(Self)
            }
        }
    };
}

token_guard!(AccessToken, TokenType::Access);
token_guard!(RefreshToken, TokenType::Refresh);

/// `None` when no bearer token was sent. A token that is sent must still be
/// valid, and is rejected through the hooks otherwise. Unlike
/// `Option<AccessToken>`, an absent token leaves no rejection behind for
/// later errors of the same request.
pub struct OptionalAccessToken(pub Option<AccessToken>);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for OptionalAccessToken {
    type Error = TokenError;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        if BearerToken::from_headers(req).is_err() {
            return Outcome::Success(Self(None));
        }

        authenticate(req, TokenType::Access).map(|token| Self(Some(AccessToken(token))))
    }
}

fn authenticate(req: &Request<'_>, expected: TokenType) -> Outcome<VerifiedToken, TokenError> {
    let Some(manager) = req.rocket().state::<JwtManager>() else {
        error!("While handling [{req}], no JwtManager is managed");
        return Outcome::Error((
            Status::InternalServerError,
            TokenError::Invalid("token verification is not configured".to_owned()),
        ));
    };

    let result = BearerToken::from_headers(req)
        .map_err(TokenError::Missing)
        .and_then(|bearer| manager.verify(bearer.0, expected));

    match result {
        Ok(token) => Outcome::Success(token),
        Err(e) => {
            debug!("Rejected token for [{req}]: {e}");

            let (status, body) = manager.reject(&e);
            req.local_cache(|| TokenRejection(Some((status, body))));

            Outcome::Error((status, e))
        }
    }
}
