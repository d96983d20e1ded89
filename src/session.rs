use log::*;
use rocket::{
    Request,
    http::Status,
    request::{FromRequest, Outcome},
    tokio::sync::{Mutex, MutexGuard},
};
use sqlx::{PgPool, Postgres, Transaction};

use crate::errors::SessionError;

/// Something that can discard the work done so far while handling a request.
#[rocket::async_trait]
pub trait SessionRollback: Send + Sync + 'static {
    async fn rollback(&self, req: &Request<'_>) -> Result<(), SessionError>;
}

/// Database session handle, managed as Rocket state so that catchers can
/// reach it through `req.rocket().state::<DbSession>()`.
pub struct DbSession(Box<dyn SessionRollback>);

impl DbSession {
    pub fn new(session: impl SessionRollback) -> Self {
        Self(Box::new(session))
    }

    pub fn postgres() -> Self {
        Self::new(PgSession)
    }

    pub async fn rollback(&self, req: &Request<'_>) -> Result<(), SessionError> {
        self.0.rollback(req).await
    }
}

/// Request-scoped Postgres transactions, opened through the [`Tx`] guard.
pub struct PgSession;

#[rocket::async_trait]
impl SessionRollback for PgSession {
    async fn rollback(&self, req: &Request<'_>) -> Result<(), SessionError> {
        let open = req.local_cache(OpenTransaction::default);

        // bind first so the guard is released before awaiting the rollback
        let txn = open.0.lock().await.take();
        if let Some(txn) = txn {
            txn.rollback().await?;
            debug!("Rolled back open transaction for [{req}]");
        }

        Ok(())
    }
}

#[derive(Default)]
struct OpenTransaction(Mutex<Option<Transaction<'static, Postgres>>>);

/// Transaction bound to the current request. Anything not committed is
/// rolled back when the connection returns to the pool, or earlier by the
/// 500 catcher when rollbacks are enabled.
pub struct Tx<'r>(&'r OpenTransaction);

impl Tx<'_> {
    pub async fn lock(&self) -> MutexGuard<'_, Option<Transaction<'static, Postgres>>> {
        self.0.0.lock().await
    }

    pub async fn commit(self) -> Result<(), SessionError> {
        let txn = self.0.0.lock().await.take();
        let txn = txn.ok_or(SessionError::NoTransaction)?;

        txn.commit().await?;

        Ok(())
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Tx<'r> {
    type Error = SessionError;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let Some(pool) = req.rocket().state::<PgPool>() else {
            error!("Cannot open transaction for [{req}]: no PgPool is managed");
            return Outcome::Error((Status::InternalServerError, SessionError::MissingPool));
        };

        let open = req.local_cache(OpenTransaction::default);

        let mut slot = open.0.lock().await;
        if slot.is_none() {
            match pool.begin().await {
                Ok(txn) => *slot = Some(txn),
                Err(e) => {
                    error!("Failed to begin transaction for [{req}]: {e}");
                    return Outcome::Error((Status::InternalServerError, e.into()));
                }
            }
        }
        drop(slot);

        Outcome::Success(Self(open))
    }
}
