use chrono::{TimeDelta, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, errors::ErrorKind,
};
use log::*;
use rocket::{
    Build, Catcher, Request, Response, Rocket,
    catcher::{self, Handler},
    http::Status,
    response::Responder,
    serde::json::Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::{errors::JwtError, guards::token::MissingBearerToken};

type ReasonCallback = Box<dyn Fn(&str) -> (Status, Value) + Send + Sync>;
type TokenCallback = Box<dyn Fn(&Header, &Claims) -> (Status, Value) + Send + Sync>;
type BlocklistCallback = Box<dyn Fn(&Header, &Claims) -> bool + Send + Sync>;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Claims {
    pub sub: String,
    pub jti: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
    #[serde(rename = "type")]
    pub token_type: TokenType,
}

#[derive(Debug, Clone)]
pub struct VerifiedToken {
    pub header: Header,
    pub claims: Claims,
}

#[derive(thiserror::Error, Debug)]
pub enum TokenError {
    #[error("{0}")]
    Missing(MissingBearerToken),
    #[error("{0}")]
    Invalid(String),
    #[error("Token has expired")]
    Expired(Box<VerifiedToken>),
    #[error("Token has been revoked")]
    Revoked(Box<VerifiedToken>),
}

/// Issues and verifies HS256 access/refresh tokens.
///
/// Failures are turned into responses by four replaceable hooks; by default
/// they produce flat `{"msg": ...}` bodies.
pub struct JwtManager {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    access_expires: TimeDelta,
    refresh_expires: TimeDelta,

    unauthorized: Option<ReasonCallback>,
    invalid: Option<ReasonCallback>,
    expired: Option<TokenCallback>,
    revoked: Option<TokenCallback>,
    blocklist: Option<BlocklistCallback>,
}

impl JwtManager {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation: {
                let mut validation = Validation::new(Algorithm::HS256);
                validation.leeway = 0;
                validation
            },
            access_expires: TimeDelta::minutes(15),
            refresh_expires: TimeDelta::days(30),
            unauthorized: None,
            invalid: None,
            expired: None,
            revoked: None,
            blocklist: None,
        }
    }

    pub fn access_expires(mut self, delta: TimeDelta) -> Self {
        self.access_expires = delta;
        self
    }

    pub fn refresh_expires(mut self, delta: TimeDelta) -> Self {
        self.refresh_expires = delta;
        self
    }

    /// Seconds of clock skew tolerated on `exp`. Defaults to none.
    pub fn leeway(mut self, seconds: u64) -> Self {
        self.validation.leeway = seconds;
        self
    }

    pub fn unauthorized_loader(
        &mut self,
        f: impl Fn(&str) -> (Status, Value) + Send + Sync + 'static,
    ) -> &mut Self {
        self.unauthorized = Some(Box::new(f));
        self
    }

    pub fn invalid_token_loader(
        &mut self,
        f: impl Fn(&str) -> (Status, Value) + Send + Sync + 'static,
    ) -> &mut Self {
        self.invalid = Some(Box::new(f));
        self
    }

    pub fn expired_token_loader(
        &mut self,
        f: impl Fn(&Header, &Claims) -> (Status, Value) + Send + Sync + 'static,
    ) -> &mut Self {
        self.expired = Some(Box::new(f));
        self
    }

    pub fn revoked_token_loader(
        &mut self,
        f: impl Fn(&Header, &Claims) -> (Status, Value) + Send + Sync + 'static,
    ) -> &mut Self {
        self.revoked = Some(Box::new(f));
        self
    }

    pub fn token_in_blocklist_loader(
        &mut self,
        f: impl Fn(&Header, &Claims) -> bool + Send + Sync + 'static,
    ) -> &mut Self {
        self.blocklist = Some(Box::new(f));
        self
    }

    /// Number of response hooks that no longer use the default body.
    pub fn custom_callbacks(&self) -> usize {
        [
            self.unauthorized.is_some(),
            self.invalid.is_some(),
            self.expired.is_some(),
            self.revoked.is_some(),
        ]
        .into_iter()
        .filter(|&set| set)
        .count()
    }

    pub fn create_access_token(&self, identity: &str) -> Result<String, JwtError> {
        self.create_token(identity, TokenType::Access, self.access_expires)
    }

    pub fn create_refresh_token(&self, identity: &str) -> Result<String, JwtError> {
        self.create_token(identity, TokenType::Refresh, self.refresh_expires)
    }

    fn create_token(
        &self,
        identity: &str,
        token_type: TokenType,
        expires: TimeDelta,
    ) -> Result<String, JwtError> {
        let now = Utc::now();
        let exp = now
            .checked_add_signed(expires)
            .ok_or(JwtError::Lifetime(expires))?;

        let claims = Claims {
            sub: identity.to_owned(),
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: exp.timestamp(),
            token_type,
        };

        Ok(jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.encoding,
        )?)
    }

    pub fn verify(&self, token: &str, expected: TokenType) -> Result<VerifiedToken, TokenError> {
        let data = match jsonwebtoken::decode::<Claims>(token, &self.decoding, &self.validation) {
            Ok(data) => data,
            Err(e) if matches!(e.kind(), ErrorKind::ExpiredSignature) => {
                // decode again, skipping exp, so the hook sees who it was for
                let mut lenient = self.validation.clone();
                lenient.validate_exp = false;

                let data = jsonwebtoken::decode::<Claims>(token, &self.decoding, &lenient)
                    .map_err(|e| TokenError::Invalid(e.to_string()))?;

                return Err(TokenError::Expired(Box::new(VerifiedToken {
                    header: data.header,
                    claims: data.claims,
                })));
            }
            Err(e) => return Err(TokenError::Invalid(e.to_string())),
        };

        let token = VerifiedToken {
            header: data.header,
            claims: data.claims,
        };

        if token.claims.token_type != expected {
            let reason = match expected {
                TokenType::Access => "Only non-refresh tokens are allowed",
                TokenType::Refresh => "Only refresh tokens are allowed",
            };
            return Err(TokenError::Invalid(reason.to_owned()));
        }

        if let Some(blocklist) = &self.blocklist {
            if blocklist(&token.header, &token.claims) {
                return Err(TokenError::Revoked(Box::new(token)));
            }
        }

        Ok(token)
    }

    /// Response for a failed verification, as chosen by the matching hook.
    pub fn reject(&self, err: &TokenError) -> (Status, Value) {
        match err {
            TokenError::Missing(missing) => {
                let reason = missing.to_string();
                match &self.unauthorized {
                    Some(f) => f(&reason),
                    None => (Status::Unauthorized, json!({ "msg": reason })),
                }
            }
            TokenError::Invalid(reason) => match &self.invalid {
                Some(f) => f(reason),
                None => (Status::UnprocessableEntity, json!({ "msg": reason })),
            },
            TokenError::Expired(token) => match &self.expired {
                Some(f) => f(&token.header, &token.claims),
                None => (Status::Unauthorized, json!({ "msg": "Token has expired" })),
            },
            TokenError::Revoked(token) => match &self.revoked {
                Some(f) => f(&token.header, &token.claims),
                None => (Status::Unauthorized, json!({ "msg": "Token has been revoked" })),
            },
        }
    }

    /// Moves the manager into managed state and registers the catchers that
    /// render rejected tokens. Errors not caused by a token rejection get
    /// Rocket's default response.
    pub fn init_app(self, rocket: Rocket<Build>) -> Rocket<Build> {
        debug!(
            "Initialized JWT manager ({} custom callbacks)",
            self.custom_callbacks()
        );

        let catchers = [Status::Unauthorized, Status::UnprocessableEntity]
            .into_iter()
            .map(|status| {
                let mut catcher = Catcher::new(
                    status.code,
                    RejectionCatcher {
                        fallback: Catcher::default().handler,
                    },
                );
                catcher.name = Some(format!("jwt::rejected_{}", status.code).into());
                catcher
            })
            .collect::<Vec<_>>();

        rocket.register("/", catchers).manage(self)
    }
}

/// Response picked by a token hook for the current request, waiting for
/// the catcher of its status.
///
/// Set at most once per request. A route taking `Option<AccessToken>` that
/// later fails with the same status on its own still gets this response;
/// use [`OptionalAccessToken`](crate::guards::jwt::OptionalAccessToken) for
/// routes where a token is optional.
pub(crate) struct TokenRejection(pub(crate) Option<(Status, Value)>);

#[derive(Clone)]
struct RejectionCatcher {
    fallback: Box<dyn Handler>,
}

#[rocket::async_trait]
impl Handler for RejectionCatcher {
    async fn handle<'r>(&self, status: Status, req: &'r Request<'_>) -> catcher::Result<'r> {
        match &req.local_cache(|| TokenRejection(None)).0 {
            Some((status, body)) => {
                let base = Json(body.clone()).respond_to(req)?;

                Response::build_from(base).status(*status).ok()
            }
            None => self.fallback.handle(status, req).await,
        }
    }
}
