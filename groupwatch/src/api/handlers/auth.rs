use axum::{Json, extract::State};

use crate::{
    AppState,
    api::models::{
        auth::{
            AuthResponse, AuthSuccessResponse, ChangePasswordRequest, LoginInfo, LoginRequest, LoginResponse, LogoutResponse,
            RegisterRequest, RegisterResponse, RegistrationInfo,
        },
        users::{CurrentUser, UserResponse},
    },
    auth::{
        password::{self, Argon2Params},
        session,
    },
    db::{
        handlers::{Repository, Users},
        models::users::{UserCreateDBRequest, UserUpdateDBRequest},
    },
    errors::Error,
};

fn invalid_credentials() -> Error {
    Error::Unauthenticated {
        message: Some("Invalid email or password".to_string()),
    }
}

fn require_native_auth(state: &AppState) -> Result<(), Error> {
    if state.config.auth.native.enabled {
        Ok(())
    } else {
        Err(Error::BadRequest {
            message: "Native authentication is disabled".to_string(),
        })
    }
}

/// Get registration information
#[utoipa::path(
    get,
    path = "/authentication/register",
    tag = "authentication",
    responses(
        (status = 200, description = "Registration info", body = RegistrationInfo),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_registration_info(State(state): State<AppState>) -> Result<Json<RegistrationInfo>, Error> {
    let enabled = state.config.auth.native.enabled && state.config.auth.native.allow_registration;
    Ok(Json(RegistrationInfo {
        enabled,
        message: if enabled {
            "Registration is enabled".to_string()
        } else {
            "Registration is disabled".to_string()
        },
    }))
}

/// Register a new user account
#[utoipa::path(
    post,
    path = "/authentication/register",
    request_body = RegisterRequest,
    tag = "authentication",
    responses(
        (status = 201, description = "User registered successfully", body = AuthResponse),
        (status = 400, description = "Invalid input"),
        (status = 409, description = "User already exists"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn register(State(state): State<AppState>, Json(request): Json<RegisterRequest>) -> Result<RegisterResponse, Error> {
    require_native_auth(&state)?;
    if !state.config.auth.native.allow_registration {
        return Err(Error::BadRequest {
            message: "User registration is disabled".to_string(),
        });
    }

    let email = request.email.trim().to_string();
    if email.is_empty() || !email.contains('@') {
        return Err(Error::BadRequest {
            message: "A valid email address is required".to_string(),
        });
    }

    let password_config = &state.config.auth.native.password;
    password::validate_length(&request.password, password_config)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    if Users::new(&mut conn).get_user_by_email(&email).await?.is_some() {
        return Err(Error::Conflict {
            message: "An account with this email address already exists".to_string(),
        });
    }

    let password_hash = password::hash_password(&request.password, Argon2Params::from(password_config)).await?;

    // A concurrent registration with the same email still fails on the unique index
    let created_user = Users::new(&mut conn)
        .create(&UserCreateDBRequest {
            email,
            name: request.name,
            is_admin: false,
            first_user_is_admin: state.config.auth.native.first_user_is_admin,
            auth_source: "native".to_string(),
            password_hash: Some(password_hash),
        })
        .await?;

    let user_response = UserResponse::from(created_user);
    let current_user: CurrentUser = user_response.clone().into();
    let token = session::create_session_token(&current_user, &state.config)?;
    let cookie = create_session_cookie(&token, &state.config);

    let auth_response = AuthResponse {
        user: user_response,
        message: "Registration successful".to_string(),
        token,
    };

    Ok(RegisterResponse { auth_response, cookie })
}

/// Get login information
#[utoipa::path(
    get,
    path = "/authentication/login",
    tag = "authentication",
    responses(
        (status = 200, description = "Login info", body = LoginInfo),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_login_info(State(state): State<AppState>) -> Result<Json<LoginInfo>, Error> {
    Ok(Json(LoginInfo {
        enabled: state.config.auth.native.enabled,
        message: if state.config.auth.native.enabled {
            "Native login is enabled".to_string()
        } else {
            "Native login is disabled".to_string()
        },
    }))
}

/// Login with email and password
#[utoipa::path(
    post,
    path = "/authentication/login",
    request_body = LoginRequest,
    tag = "authentication",
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn login(State(state): State<AppState>, Json(request): Json<LoginRequest>) -> Result<LoginResponse, Error> {
    require_native_auth(&state)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut user_repo = Users::new(&mut conn);

    let user = user_repo
        .get_user_by_email(request.email.trim())
        .await?
        .ok_or_else(invalid_credentials)?;
    let password_hash = user.password_hash.as_ref().ok_or_else(invalid_credentials)?;

    if !password::verify_password(&request.password, password_hash).await? {
        return Err(invalid_credentials());
    }

    let user = user_repo.update_last_login(user.id).await?;
    let user_response = UserResponse::from(user);

    let current_user: CurrentUser = user_response.clone().into();
    let token = session::create_session_token(&current_user, &state.config)?;
    let cookie = create_session_cookie(&token, &state.config);

    let auth_response = AuthResponse {
        user: user_response,
        message: "Login successful".to_string(),
        token,
    };

    Ok(LoginResponse { auth_response, cookie })
}

/// Logout (clear session)
#[utoipa::path(
    post,
    path = "/authentication/logout",
    tag = "authentication",
    responses(
        (status = 200, description = "Logout successful", body = AuthSuccessResponse),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn logout(State(state): State<AppState>) -> Result<LogoutResponse, Error> {
    let cookie = format!(
        "{}=; Path=/; HttpOnly; Secure; SameSite=Strict; Max-Age=0",
        state.config.auth.native.session.cookie_name
    );

    let auth_response = AuthSuccessResponse {
        message: "Logout successful".to_string(),
    };

    Ok(LogoutResponse { auth_response, cookie })
}

/// Change password for authenticated user
#[utoipa::path(
    post,
    path = "/authentication/password-change",
    request_body = ChangePasswordRequest,
    tag = "authentication",
    responses(
        (status = 200, description = "Password changed successfully", body = AuthSuccessResponse),
        (status = 400, description = "Invalid request"),
        (status = 401, description = "Current password is incorrect"),
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn change_password(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<Json<AuthSuccessResponse>, Error> {
    require_native_auth(&state)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut user_repo = Users::new(&mut conn);

    let user = user_repo.get_by_id(current_user.id).await?.ok_or_else(|| Error::Unauthenticated {
        message: Some("User not found".to_string()),
    })?;
    let password_hash = user.password_hash.as_ref().ok_or_else(|| Error::BadRequest {
        message: "This account has no password to change".to_string(),
    })?;

    if !password::verify_password(&request.current_password, password_hash).await? {
        return Err(Error::Unauthenticated {
            message: Some("Current password is incorrect".to_string()),
        });
    }

    let password_config = &state.config.auth.native.password;
    password::validate_length(&request.new_password, password_config)?;
    let new_password_hash = password::hash_password(&request.new_password, Argon2Params::from(password_config)).await?;

    user_repo
        .update(
            current_user.id,
            &UserUpdateDBRequest {
                password_hash: Some(new_password_hash),
                ..Default::default()
            },
        )
        .await?;

    Ok(Json(AuthSuccessResponse {
        message: "Password changed successfully".to_string(),
    }))
}

fn create_session_cookie(token: &str, config: &crate::config::Config) -> String {
    let session_config = &config.auth.native.session;
    let max_age = session_config.timeout.as_secs();

    format!(
        "{}={}; Path=/; HttpOnly; Secure={}; SameSite={}; Max-Age={}",
        session_config.cookie_name, token, session_config.cookie_secure, session_config.cookie_same_site, max_age
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_test_app, create_test_config, create_test_state};
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use serde_json::json;
    use sqlx::PgPool;

    fn auth_server(state: AppState) -> TestServer {
        let app = axum::Router::new()
            .route("/authentication/register", axum::routing::post(register))
            .route("/authentication/login", axum::routing::post(login))
            .route("/authentication/password-change", axum::routing::post(change_password))
            .with_state(state);
        TestServer::new(app).unwrap()
    }

    fn registration(email: &str) -> serde_json::Value {
        json!({"email": email, "password": "password123", "name": "Test User"})
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_register_sets_cookie_and_first_user_is_admin(pool: PgPool) {
        let server = auth_server(create_test_state(pool));

        let response = server.post("/authentication/register").json(&registration("first@example.com")).await;
        response.assert_status(StatusCode::CREATED);
        assert!(response.headers().get("set-cookie").is_some());
        let first: AuthResponse = response.json();
        assert_eq!(first.message, "Registration successful");
        assert!(first.user.is_admin);

        let second: AuthResponse = server
            .post("/authentication/register")
            .json(&registration("second@example.com"))
            .await
            .json();
        assert!(!second.user.is_admin);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_register_duplicate_email_conflicts(pool: PgPool) {
        let server = auth_server(create_test_state(pool));

        server
            .post("/authentication/register")
            .json(&registration("dup@example.com"))
            .await
            .assert_status(StatusCode::CREATED);
        server
            .post("/authentication/register")
            .json(&registration("DUP@example.com"))
            .await
            .assert_status(StatusCode::CONFLICT);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_register_disabled(pool: PgPool) {
        let mut config = create_test_config();
        config.auth.native.allow_registration = false;
        let mut state = create_test_state(pool);
        state.config = config;
        let server = auth_server(state);

        server
            .post("/authentication/register")
            .json(&registration("nobody@example.com"))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_short_password_rejected(pool: PgPool) {
        let server = auth_server(create_test_state(pool));

        let response = server
            .post("/authentication/register")
            .json(&json!({"email": "short@example.com", "password": "short"}))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert!(response.text().contains("at least"));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_login_flow(pool: PgPool) {
        let server = auth_server(create_test_state(pool));
        server.post("/authentication/register").json(&registration("login@example.com")).await;

        let response = server
            .post("/authentication/login")
            .json(&json!({"email": "login@example.com", "password": "password123"}))
            .await;
        response.assert_status_ok();
        let body: AuthResponse = response.json();
        assert!(!body.token.is_empty());
        assert!(body.user.last_login.is_some());

        let response = server
            .post("/authentication/login")
            .json(&json!({"email": "login@example.com", "password": "wrong-password"}))
            .await;
        response.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(response.json::<serde_json::Value>()["error"], "Invalid email or password");

        // Unknown emails look exactly like wrong passwords
        let response = server
            .post("/authentication/login")
            .json(&json!({"email": "ghost@example.com", "password": "password123"}))
            .await;
        response.assert_status(StatusCode::UNAUTHORIZED);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_change_password(pool: PgPool) {
        let server = auth_server(create_test_state(pool));
        let registered: AuthResponse = server
            .post("/authentication/register")
            .json(&registration("change@example.com"))
            .await
            .json();

        server
            .post("/authentication/password-change")
            .authorization_bearer(&registered.token)
            .json(&json!({"current_password": "not-it", "new_password": "new-password-1"}))
            .await
            .assert_status(StatusCode::UNAUTHORIZED);

        server
            .post("/authentication/password-change")
            .authorization_bearer(&registered.token)
            .json(&json!({"current_password": "password123", "new_password": "new-password-1"}))
            .await
            .assert_status_ok();

        server
            .post("/authentication/login")
            .json(&json!({"email": "change@example.com", "password": "new-password-1"}))
            .await
            .assert_status_ok();
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_logout_expires_cookie(pool: PgPool) {
        let server = create_test_app(pool).await;

        let response = server.post("/authentication/logout").await;
        response.assert_status_ok();
        let cookie = response.headers().get("set-cookie").unwrap().to_str().unwrap().to_string();
        assert!(cookie.contains("Max-Age=0"));
    }
}
