use crate::api::state::AppState;
use crate::crypto::ACCESS_ISSUER;
use crate::db::models::Subject;
use crate::error::AppError;

/// Extracts the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: Option<&str>) -> Result<&str, AppError> {
    credential_after(header, "Bearer ")
}

/// Extracts the key from an `Authorization: ApiKey <key>` header value.
pub fn api_key(header: Option<&str>) -> Result<&str, AppError> {
    credential_after(header, "ApiKey ")
}

fn credential_after<'a>(header: Option<&'a str>, scheme: &str) -> Result<&'a str, AppError> {
    let header =
        header.ok_or_else(|| AppError::Unauthorized("Missing Authorization header".to_string()))?;

    let credential = header
        .strip_prefix(scheme)
        .map(str::trim)
        .ok_or_else(|| AppError::Unauthorized("Invalid Authorization format".to_string()))?;

    if credential.is_empty() {
        return Err(AppError::Unauthorized("Empty credential".to_string()));
    }
    Ok(credential)
}

/// Resolves the caller behind an access-token bearer header.
pub fn authenticate(state: &AppState, header: Option<&str>) -> Result<Subject, AppError> {
    let token = bearer_token(header)?;
    state.credentials.validate(token, ACCESS_ISSUER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token(Some("Bearer abc.def")).unwrap(), "abc.def");
        assert!(bearer_token(None).is_err());
        assert!(bearer_token(Some("Basic abc")).is_err());
        assert!(bearer_token(Some("Bearer ")).is_err());
    }

    #[test]
    fn test_api_key_parsing() {
        assert_eq!(api_key(Some("ApiKey f271c81ff7084ee5")).unwrap(), "f271c81ff7084ee5");
        assert!(api_key(Some("Bearer f271c81ff7084ee5")).is_err());
    }
}
