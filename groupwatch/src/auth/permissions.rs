//! Access control.
//!
//! Two rules cover the whole API:
//!
//! - admin-only operations (plan management, listing and deleting other users) require
//!   `is_admin`, and fail with 403 otherwise;
//! - user-owned resources (instances, groups, summaries, subscriptions) are visible to their
//!   owner and to admins. Everyone else gets a 404, so ids of other users' resources cannot be
//!   probed.

use std::{marker::PhantomData, ops::Deref};

use axum::{
    extract::FromRequestParts,
    http::{Method, request::Parts},
};
use uuid::Uuid;

use crate::{
    AppState,
    api::models::users::CurrentUser,
    errors::{Error, Result},
    types::{Operation, Resource, UserId},
};

/// Type-level resource names for [`RequiresAdmin`]
pub mod resource {
    use crate::types::Resource;

    pub trait AdminResource: Send + Sync + 'static {
        const RESOURCE: Resource;
    }

    pub struct Users;
    pub struct Plans;

    impl AdminResource for Users {
        const RESOURCE: Resource = Resource::Users;
    }

    impl AdminResource for Plans {
        const RESOURCE: Resource = Resource::Plans;
    }
}

/// Extractor for admin-only routes: authenticates like [`CurrentUser`], then rejects
/// non-admins with 403. The operation reported in the error follows the HTTP method.
pub struct RequiresAdmin<R>(pub CurrentUser, PhantomData<R>);

impl<R> Deref for RequiresAdmin<R> {
    type Target = CurrentUser;

    fn deref(&self) -> &CurrentUser {
        &self.0
    }
}

fn operation_for(method: &Method) -> Operation {
    match *method {
        Method::POST => Operation::CreateAll,
        Method::PUT | Method::PATCH => Operation::UpdateAll,
        Method::DELETE => Operation::DeleteAll,
        _ => Operation::ReadAll,
    }
}

impl<R: resource::AdminResource> FromRequestParts<AppState> for RequiresAdmin<R> {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let user = CurrentUser::from_request_parts(parts, state).await?;
        require_admin(&user, operation_for(&parts.method), R::RESOURCE)?;
        Ok(Self(user, PhantomData))
    }
}

pub fn require_admin(user: &CurrentUser, action: Operation, resource: Resource) -> Result<()> {
    if user.is_admin {
        Ok(())
    } else {
        Err(Error::InsufficientPermissions { action, resource })
    }
}

/// Check that `user` may act on a resource owned by `owner`.
pub fn check_owner(user: &CurrentUser, owner: UserId, resource: &str, id: Uuid) -> Result<()> {
    if user.id == owner || user.is_admin {
        Ok(())
    } else {
        Err(Error::NotFound {
            resource: resource.to_string(),
            id: id.to_string(),
        })
    }
}

/// Resolve the target of a `/users/{id}` request.
///
/// `own` is the operation a user performs on themselves; acting on anyone else is the
/// matching `*All` operation and needs admin.
pub fn check_user_target(user: &CurrentUser, target: UserId, own: Operation) -> Result<UserId> {
    if target == user.id {
        return Ok(target);
    }
    let all = match own {
        Operation::CreateOwn | Operation::CreateAll => Operation::CreateAll,
        Operation::ReadOwn | Operation::ReadAll => Operation::ReadAll,
        Operation::UpdateOwn | Operation::UpdateAll => Operation::UpdateAll,
        Operation::DeleteOwn | Operation::DeleteAll => Operation::DeleteAll,
    };
    require_admin(user, all, Resource::Users)?;
    Ok(target)
}
