use std::sync::Arc;

use axum::{
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
    body::Body,
};

use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;
use shared_config::AppConfig;

use crate::jwt::validate_token;

/// Rejects requests without a valid bearer token and stores the caller's
/// [`User`] in the request extensions.
pub async fn auth_middleware(
    State(config): State<Arc<AppConfig>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let auth_value = request
        .headers()
        .get("Authorization")
        .ok_or_else(|| AppError::Auth("Missing authorization header".to_string()))?
        .to_str()
        .map_err(|_| AppError::Auth("Invalid authorization header format".to_string()))?;

    let token = auth_value
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Auth("Invalid authorization header format".to_string()))?;

    let user = validate_token(token, &config.supabase_jwt_secret)
        .map_err(|e| AppError::Auth(e.to_string()))?;

    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

/// Resolve an optional bearer token. An absent token is anonymous; a present
/// but invalid one is rejected rather than silently downgraded.
pub fn optional_user(token: Option<&str>, config: &AppConfig) -> Result<Option<User>, AppError> {
    match token {
        None => Ok(None),
        Some(token) => validate_token(token, &config.supabase_jwt_secret)
            .map(Some)
            .map_err(|e| AppError::Auth(e.to_string())),
    }
}

/// The caller's id as a UUID. Tokens whose subject is not a UUID are treated
/// as invalid credentials.
pub fn user_uuid(user: &User) -> Result<Uuid, AppError> {
    Uuid::parse_str(&user.id)
        .map_err(|_| AppError::Auth("Invalid user id in token".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{JwtTestUtils, TestUser};

    #[test]
    fn optional_user_resolution() {
        let config = AppConfig::for_memory("extractor-secret");
        assert!(optional_user(None, &config).unwrap().is_none());

        let user = TestUser::patient("p@example.com");
        let token = JwtTestUtils::create_test_token(&user, "extractor-secret", Some(1));
        let resolved = optional_user(Some(&token), &config).unwrap().unwrap();
        assert_eq!(resolved.id, user.id);

        assert!(optional_user(Some("bad.token.value"), &config).is_err());
    }

    #[test]
    fn non_uuid_subject_is_rejected() {
        let mut user = TestUser::patient("p@example.com").to_user();
        assert!(user_uuid(&user).is_ok());
        user.id = "not-a-uuid".to_string();
        assert!(user_uuid(&user).is_err());
    }
}
