use log::*;
use rocket::{
    Build, Catcher, Request, Response, Rocket,
    catcher::{self, Handler},
    http::Status,
    response::Responder,
    serde::json::Json,
};
use serde_json::{Value, json};

use crate::{
    dto::errors::{ErrorField, ErrorPayload},
    jwt::JwtManager,
    session::DbSession,
};

pub const EXTENSION_NAME: &str = "errors-as-nested-dicts";

const TOKEN_MISSING: &str = "Authorization token is missing.";
const TOKEN_INVALID: &str = "Your token is invalid.";
const TOKEN_EXPIRED: &str = "Your token has expired.";

/// Turns Rocket's and [`JwtManager`]'s flat error bodies into the
/// `{"errors": {"json": {...}}}` shape.
///
/// ```no_run
/// use nested_errors::{ErrorsAsNestedDicts, JwtManager};
///
/// let mut jwt = JwtManager::new(b"some secret that is long enough to use");
/// let rocket = ErrorsAsNestedDicts::new(false).init_app(rocket::build(), Some(&mut jwt));
/// let rocket = jwt.init_app(rocket);
/// ```
///
/// The manager must be given here before its own `init_app`, since that moves
/// it into Rocket's managed state.
#[derive(Debug, Clone, Copy)]
pub struct ErrorsAsNestedDicts {
    rollback_on_500: bool,
}

impl ErrorsAsNestedDicts {
    pub fn new(rollback_on_500: bool) -> Self {
        Self { rollback_on_500 }
    }

    pub fn rollback_on_500(&self) -> bool {
        self.rollback_on_500
    }

    /// Registers the 404, 405 and 500 catchers at `/`, overrides the token
    /// hooks of `jwt` (if any), and stores `self` as managed state.
    pub fn init_app(self, rocket: Rocket<Build>, jwt: Option<&mut JwtManager>) -> Rocket<Build> {
        if let Some(jwt) = jwt {
            jwt.unauthorized_loader(|_| token_error(TOKEN_MISSING))
                .revoked_token_loader(|_, _| token_error(TOKEN_INVALID))
                .invalid_token_loader(|_| token_error(TOKEN_INVALID))
                .expired_token_loader(|_, _| token_error(TOKEN_EXPIRED));

            debug!("Installed nested token error callbacks");
        }

        info!(
            "Rendering errors as nested dicts (rollback on 500: {})",
            self.rollback_on_500
        );

        rocket.register("/", self.catchers()).manage(self)
    }

    pub fn catchers(&self) -> Vec<Catcher> {
        vec![
            nested(
                "not_found",
                Status::NotFound,
                ErrorField::Url,
                "Does not exist.",
                false,
            ),
            nested(
                "not_allowed",
                Status::MethodNotAllowed,
                ErrorField::Url,
                "Method not allowed.",
                false,
            ),
            nested(
                "internal_error",
                Status::InternalServerError,
                ErrorField::Server,
                "Internal error.",
                self.rollback_on_500,
            ),
        ]
    }
}

fn token_error(message: &str) -> (Status, Value) {
    (
        Status::Unauthorized,
        json!(ErrorPayload::new(ErrorField::Token, message)),
    )
}

fn nested(
    name: &'static str,
    status: Status,
    field: ErrorField,
    message: &'static str,
    rollback: bool,
) -> Catcher {
    let mut catcher = Catcher::new(
        status.code,
        NestedCatcher {
            status,
            field,
            message,
            rollback,
        },
    );
    catcher.name = Some(format!("{EXTENSION_NAME}::{name}").into());

    catcher
}

#[derive(Clone)]
struct NestedCatcher {
    status: Status,
    field: ErrorField,
    message: &'static str,
    rollback: bool,
}

#[rocket::async_trait]
impl Handler for NestedCatcher {
    async fn handle<'r>(&self, _: Status, req: &'r Request<'_>) -> catcher::Result<'r> {
        if self.rollback {
            rollback_session(req).await;
        }

        let payload = ErrorPayload::new(self.field, self.message);
        let base = Json(payload).respond_to(req)?;

        Response::build_from(base).status(self.status).ok()
    }
}

// a missing session or a failed rollback must not replace the 500 response
async fn rollback_session(req: &Request<'_>) {
    match req.rocket().state::<DbSession>() {
        Some(session) => {
            if let Err(e) = session.rollback(req).await {
                error!("While handling [{req}], failed to roll back session: {e}");
            }
        }
        None => error!("While handling [{req}], rollback requested but no DbSession is managed"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use rocket::{
        http::{Header, Status},
        local::blocking::Client,
    };
    use serde_json::{Value, json};

    use super::*;
    use crate::{errors::SessionError, session::SessionRollback};

    const SECRET: &[u8] = b"catchers-test-secret-catchers-test-secret";

    #[rocket::get("/teapot/<code>")]
    fn fail_with(code: u16) -> Status {
        Status::from_code(code).unwrap_or(Status::InternalServerError)
    }

    #[rocket::get("/panic")]
    fn panics() -> &'static str {
        panic!("handler blew up")
    }

    #[rocket::get("/protected")]
    fn protected(token: crate::guards::jwt::AccessToken) -> String {
        token.identity().to_owned()
    }

    fn client(rocket: Rocket<Build>) -> Client {
        Client::tracked(rocket).expect("valid rocket instance")
    }

    fn app() -> Rocket<Build> {
        rocket::build().mount("/", rocket::routes![fail_with, panics, protected])
    }

    fn nested_body(field: &str, message: &str) -> Value {
        json!({"errors": {"json": {field: [message]}}})
    }

    struct Counting(Arc<AtomicUsize>);

    #[rocket::async_trait]
    impl SessionRollback for Counting {
        async fn rollback(&self, _: &Request<'_>) -> Result<(), SessionError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Failing;

    #[rocket::async_trait]
    impl SessionRollback for Failing {
        async fn rollback(&self, _: &Request<'_>) -> Result<(), SessionError> {
            Err(SessionError::NoTransaction)
        }
    }

    #[test]
    fn registers_three_catchers_without_token_manager() {
        let rocket = ErrorsAsNestedDicts::new(false).init_app(rocket::build(), None);

        let mut codes: Vec<_> = rocket.catchers().filter_map(|c| c.code).collect();
        codes.sort_unstable();

        assert_eq!(codes, [404, 405, 500]);
    }

    #[test]
    fn registers_seven_hooks_with_token_manager() {
        let mut jwt = JwtManager::new(SECRET);
        assert_eq!(jwt.custom_callbacks(), 0);

        let rocket = ErrorsAsNestedDicts::new(false).init_app(rocket::build(), Some(&mut jwt));

        assert_eq!(rocket.catchers().count() + jwt.custom_callbacks(), 7);
    }

    #[test]
    fn stores_itself_as_managed_state() {
        let rocket = ErrorsAsNestedDicts::new(true).init_app(rocket::build(), None);

        let ext = rocket.state::<ErrorsAsNestedDicts>().expect("extension is managed");
        assert!(ext.rollback_on_500());
    }

    #[test]
    fn unknown_route_is_not_found() {
        let client = client(ErrorsAsNestedDicts::new(false).init_app(app(), None));

        let response = client.get("/does/not/exist").dispatch();

        assert_eq!(response.status(), Status::NotFound);
        assert_eq!(
            response.into_json::<Value>(),
            Some(nested_body("url", "Does not exist."))
        );
    }

    #[test]
    fn method_not_allowed() {
        let client = client(ErrorsAsNestedDicts::new(false).init_app(app(), None));

        let response = client.get("/teapot/405").dispatch();

        assert_eq!(response.status(), Status::MethodNotAllowed);
        assert_eq!(
            response.into_json::<Value>(),
            Some(nested_body("url", "Method not allowed."))
        );
    }

    #[test]
    fn panicking_handler_is_internal_error() {
        let client = client(ErrorsAsNestedDicts::new(false).init_app(app(), None));

        let response = client.get("/panic").dispatch();

        assert_eq!(response.status(), Status::InternalServerError);
        assert_eq!(
            response.into_json::<Value>(),
            Some(nested_body("server", "Internal error."))
        );
    }

    #[test]
    fn other_statuses_are_left_alone() {
        let client = client(ErrorsAsNestedDicts::new(false).init_app(app(), None));

        let response = client.get("/teapot/403").dispatch();

        assert_eq!(response.status(), Status::Forbidden);
        let body = response.into_string().unwrap_or_default();
        assert!(!body.contains("errors"));
    }

    #[test]
    fn rolls_back_once_before_internal_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let rocket = app().manage(DbSession::new(Counting(calls.clone())));
        let client = client(ErrorsAsNestedDicts::new(true).init_app(rocket, None));

        let response = client.get("/teapot/500").dispatch();

        assert_eq!(response.status(), Status::InternalServerError);
        assert_eq!(
            response.into_json::<Value>(),
            Some(nested_body("server", "Internal error."))
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn does_not_roll_back_when_disabled() {
        let calls = Arc::new(AtomicUsize::new(0));
        let rocket = app().manage(DbSession::new(Counting(calls.clone())));
        let client = client(ErrorsAsNestedDicts::new(false).init_app(rocket, None));

        client.get("/teapot/500").dispatch();
        client.get("/does/not/exist").dispatch();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn missing_session_still_returns_internal_error() {
        let client = client(ErrorsAsNestedDicts::new(true).init_app(app(), None));

        let response = client.get("/teapot/500").dispatch();

        assert_eq!(response.status(), Status::InternalServerError);
        assert_eq!(
            response.into_json::<Value>(),
            Some(nested_body("server", "Internal error."))
        );
    }

    #[test]
    fn failed_rollback_still_returns_internal_error() {
        let rocket = app().manage(DbSession::new(Failing));
        let client = client(ErrorsAsNestedDicts::new(true).init_app(rocket, None));

        let response = client.get("/teapot/500").dispatch();

        assert_eq!(response.status(), Status::InternalServerError);
        assert_eq!(
            response.into_json::<Value>(),
            Some(nested_body("server", "Internal error."))
        );
    }

    fn token_client(configure: impl FnOnce(&mut JwtManager)) -> (Client, JwtManager) {
        let mut manager = JwtManager::new(SECRET);
        configure(&mut manager);

        // a second manager sharing the secret, used only to mint tokens
        let minter = JwtManager::new(SECRET);

        let rocket = ErrorsAsNestedDicts::new(false).init_app(app(), Some(&mut manager));
        (client(manager.init_app(rocket)), minter)
    }

    #[test]
    fn missing_token() {
        let (client, _) = token_client(|_| {});

        let response = client.get("/protected").dispatch();

        assert_eq!(response.status(), Status::Unauthorized);
        assert_eq!(
            response.into_json::<Value>(),
            Some(nested_body("token", "Authorization token is missing."))
        );
    }

    #[test]
    fn invalid_token() {
        let (client, _) = token_client(|_| {});

        let response = client
            .get("/protected")
            .header(Header::new("Authorization", "Bearer not.a.jwt"))
            .dispatch();

        assert_eq!(response.status(), Status::Unauthorized);
        assert_eq!(
            response.into_json::<Value>(),
            Some(nested_body("token", "Your token is invalid."))
        );
    }

    #[test]
    fn expired_token() {
        let (client, _) = token_client(|_| {});
        let minter = JwtManager::new(SECRET).access_expires(chrono::TimeDelta::hours(-2));
        let token = minter.create_access_token("ada").unwrap();

        let response = client
            .get("/protected")
            .header(Header::new("Authorization", format!("Bearer {token}")))
            .dispatch();

        assert_eq!(response.status(), Status::Unauthorized);
        assert_eq!(
            response.into_json::<Value>(),
            Some(nested_body("token", "Your token has expired."))
        );
    }

    #[test]
    fn revoked_and_invalid_tokens_render_identically() {
        let (client, minter) = token_client(|jwt| {
            jwt.token_in_blocklist_loader(|_, _| true);
        });
        let token = minter.create_access_token("ada").unwrap();

        let revoked = client
            .get("/protected")
            .header(Header::new("Authorization", format!("Bearer {token}")))
            .dispatch();
        assert_eq!(revoked.status(), Status::Unauthorized);
        let revoked = revoked.into_string();

        let invalid = client
            .get("/protected")
            .header(Header::new("Authorization", "Bearer garbage"))
            .dispatch()
            .into_string();

        assert_eq!(
            revoked.as_deref(),
            Some(r#"{"errors":{"json":{"token":["Your token is invalid."]}}}"#)
        );
        assert_eq!(revoked, invalid);
    }

    #[test]
    fn valid_token_passes_through() {
        let (client, minter) = token_client(|_| {});
        let token = minter.create_access_token("ada").unwrap();

        let response = client
            .get("/protected")
            .header(Header::new("Authorization", format!("Bearer {token}")))
            .dispatch();

        assert_eq!(response.status(), Status::Ok);
        assert_eq!(response.into_string().as_deref(), Some("ada"));
    }
}
