//! Authentication and authorization.
//!
//! # Authentication
//!
//! Accounts are native: an email and an Argon2id password hash. Logging in or registering
//! issues a signed JWT, returned both as an HTTP-only session cookie (browsers) and in the
//! response body (API clients, which send it back as `Authorization: Bearer <token>`).
//!
//! Handlers ask for the caller by taking a [`CurrentUser`](crate::api::models::users::CurrentUser)
//! argument; requests without a valid credential are rejected with 401 before the handler runs.
//!
//! ```ignore
//! async fn handler(State(state): State<AppState>, current_user: CurrentUser) -> Result<Json<..>> {
//!     ...
//! }
//! ```
//!
//! # Authorization
//!
//! See [`permissions`]: admins manage plans and users, everyone else only sees what they own.
//!
//! # Modules
//!
//! - [`current_user`]: The `CurrentUser` extractor
//! - [`password`]: Password hashing and verification using Argon2
//! - [`permissions`]: Admin and ownership checks
//! - [`session`]: JWT creation and verification

pub mod current_user;
pub mod password;
pub mod permissions;
pub mod session;
