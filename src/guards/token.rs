use rocket::{
    Request,
    http::Status,
    request::{FromRequest, Outcome},
};

pub struct BearerToken<'t>(pub &'t str);

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingBearerToken {
    #[error("Missing Authorization Header")]
    Header,
    #[error("Missing 'Bearer' type in 'Authorization' header. Expected 'Authorization: Bearer <JWT>'")]
    AuthScheme,
}

impl<'r> BearerToken<'r> {
    pub fn from_headers(req: &'r Request<'_>) -> Result<Self, MissingBearerToken> {
        let value = req
            .headers()
            .get_one("Authorization")
            .ok_or(MissingBearerToken::Header)?;

        value
            .strip_prefix("Bearer ")
            .map(Self)
            .ok_or(MissingBearerToken::AuthScheme)
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for BearerToken<'r> {
    type Error = MissingBearerToken;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match Self::from_headers(req) {
            Ok(token) => Outcome::Success(token),
            Err(e) => Outcome::Error((Status::Unauthorized, e)),
        }
    }
}
