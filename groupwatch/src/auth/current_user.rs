//! The [`CurrentUser`] extractor.
//!
//! A request authenticates with a session token, carried either as `Authorization: Bearer`
//! or as the session cookie. The token only identifies the caller: the account is re-read on
//! every request, so deleted users lose access immediately and admin changes apply without
//! logging out.

use crate::{
    AppState,
    api::models::users::CurrentUser,
    auth::session::{self, SessionClaims},
    config::Config,
    db::handlers::{Repository, Users},
    errors::{Error, Result},
};
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use tracing::{debug, instrument, trace};

/// Extract session claims from a bearer token if present
/// Returns:
/// - None: No `Authorization: Bearer` header present
/// - Some(Ok(claims)): Valid token
/// - Some(Err(error)): Header present but the token is invalid
#[instrument(skip(parts, config))]
fn try_bearer_auth(parts: &Parts, config: &Config) -> Option<Result<SessionClaims>> {
    let auth_header = parts.headers.get(header::AUTHORIZATION)?;

    let auth_str = match auth_header.to_str() {
        Ok(s) => s,
        Err(e) => {
            return Some(Err(Error::BadRequest {
                message: format!("Invalid authorization header: {e}"),
            }));
        }
    };

    let token = auth_str.strip_prefix("Bearer ")?;
    Some(session::verify_session_token(token.trim(), config))
}

/// Extract session claims from the session cookie if present
#[instrument(skip(parts, config))]
fn try_cookie_auth(parts: &Parts, config: &Config) -> Option<Result<SessionClaims>> {
    let cookie_header = parts.headers.get(header::COOKIE)?;

    let cookie_str = match cookie_header.to_str() {
        Ok(s) => s,
        Err(e) => {
            return Some(Err(Error::BadRequest {
                message: format!("Invalid cookie header: {e}"),
            }));
        }
    };
    let cookie_name = &config.auth.native.session.cookie_name;

    let mut last_error = None;
    for cookie in cookie_str.split(';') {
        let Some((name, value)) = cookie.trim().split_once('=') else {
            continue;
        };
        if name != cookie_name {
            continue;
        }
        // A stale cookie may sit next to a fresh one
        match session::verify_session_token(value, config) {
            Ok(claims) => return Some(Ok(claims)),
            Err(e) => last_error = Some(e),
        }
    }
    last_error.map(Err)
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    #[instrument(skip(parts, state))]
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        // Bearer first, then cookie. A valid credential wins even if the other one is broken.
        let mut auth_errors = Vec::new();
        let mut claims = None;

        for (method, attempt) in [
            ("bearer token", try_bearer_auth(parts, &state.config)),
            ("session cookie", try_cookie_auth(parts, &state.config)),
        ] {
            match attempt {
                Some(Ok(found)) => {
                    claims = Some(found);
                    break;
                }
                Some(Err(e)) => {
                    trace!("{method} authentication failed: {e:?}");
                    auth_errors.push((method, e));
                }
                None => trace!("No {method} presented"),
            }
        }

        let Some(claims) = claims else {
            if let Some(pos) = auth_errors.iter().position(|(_, e)| matches!(e, Error::Internal { .. })) {
                return Err(auth_errors.swap_remove(pos).1);
            }
            trace!("All authentication attempts failed ({}): {:?}", auth_errors.len(), auth_errors);
            return Err(Error::Unauthenticated { message: None });
        };

        let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        let user = Users::new(&mut conn).get_by_id(claims.sub).await?.ok_or_else(|| {
            debug!("Session token refers to a deleted user");
            Error::Unauthenticated { message: None }
        })?;

        debug!("Authenticated user {}", user.id);
        Ok(CurrentUser::from(user))
    }
}
