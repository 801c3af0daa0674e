use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::config::security::USER_ID_HEADER;
use crate::utils::error::AppError;

/// Caller identity as asserted by the upstream auth proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentUser(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| AppError::AuthError(format!("missing {USER_ID_HEADER} header")))?;
        value
            .to_str()
            .ok()
            .and_then(|v| Uuid::parse_str(v.trim()).ok())
            .map(CurrentUser)
            .ok_or_else(|| AppError::AuthError(format!("malformed {USER_ID_HEADER} header")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(header: Option<&str>) -> Result<CurrentUser, AppError> {
        let mut builder = Request::builder().uri("/");
        if let Some(value) = header {
            builder = builder.header(USER_ID_HEADER, value);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        CurrentUser::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_valid_header_is_accepted() {
        let id = Uuid::new_v4();
        let user = extract(Some(&format!(" {id} "))).await.unwrap();
        assert_eq!(user, CurrentUser(id));
    }

    #[tokio::test]
    async fn test_missing_or_malformed_header_is_rejected() {
        assert!(matches!(extract(None).await, Err(AppError::AuthError(_))));
        assert!(matches!(
            extract(Some("not-a-uuid")).await,
            Err(AppError::AuthError(_))
        ));
    }
}
