use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::errors::AppError;

pub const IDENTITY_ID_HEADER: &str = "x-identity-id";
pub const IDENTITY_PHONE_HEADER: &str = "x-identity-phone";
pub const IDENTITY_ROLE_HEADER: &str = "x-identity-role";

/// Roles allowed to drive orders they do not own.
const STAFF_ROLES: [&str; 2] = ["staff", "admin"];

/// Caller identity asserted by the trusted upstream that terminates auth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityDescriptor {
    pub user_id: Uuid,
    pub phone_number: String,
}

fn header<'a>(parts: &'a Parts, name: &str) -> Result<&'a str, AppError> {
    let value = parts
        .headers
        .get(name)
        .ok_or_else(|| AppError::Unauthorized(format!("missing {name} header")))?;
    let value = value
        .to_str()
        .map_err(|_| AppError::Unauthorized(format!("malformed {name} header")))?
        .trim();
    if value.is_empty() {
        return Err(AppError::Unauthorized(format!("empty {name} header")));
    }
    Ok(value)
}

impl<S> FromRequestParts<S> for IdentityDescriptor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = Uuid::parse_str(header(parts, IDENTITY_ID_HEADER)?)
            .map_err(|_| AppError::Unauthorized(format!("malformed {IDENTITY_ID_HEADER} header")))?;
        let phone_number = header(parts, IDENTITY_PHONE_HEADER)?.to_string();
        Ok(Self {
            user_id,
            phone_number,
        })
    }
}

/// An identity whose role header names restaurant staff. Anonymous callers
/// are rejected with 401, authenticated non-staff callers with 403.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaffIdentity {
    pub identity: IdentityDescriptor,
    pub role: String,
}

impl<S> FromRequestParts<S> for StaffIdentity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let identity = IdentityDescriptor::from_request_parts(parts, state).await?;
        let role = parts
            .headers
            .get(IDENTITY_ROLE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_ascii_lowercase())
            .unwrap_or_default();
        if !STAFF_ROLES.contains(&role.as_str()) {
            return Err(AppError::Forbidden(format!(
                "user {} is not restaurant staff",
                identity.user_id
            )));
        }
        Ok(Self { identity, role })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(req: Request<()>) -> Result<IdentityDescriptor, AppError> {
        let (mut parts, _) = req.into_parts();
        IdentityDescriptor::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn reads_identity_headers() {
        let id = Uuid::new_v4();
        let req = Request::builder()
            .header(IDENTITY_ID_HEADER, id.to_string())
            .header(IDENTITY_PHONE_HEADER, "+79990000000")
            .body(())
            .unwrap();
        let identity = extract(req).await.unwrap();
        assert_eq!(identity.user_id, id);
        assert_eq!(identity.phone_number, "+79990000000");
    }

    #[tokio::test]
    async fn missing_or_malformed_headers_are_unauthorized() {
        let req = Request::builder().body(()).unwrap();
        assert!(matches!(extract(req).await, Err(AppError::Unauthorized(_))));

        let req = Request::builder()
            .header(IDENTITY_ID_HEADER, "not-a-uuid")
            .header(IDENTITY_PHONE_HEADER, "+79990000000")
            .body(())
            .unwrap();
        assert!(matches!(extract(req).await, Err(AppError::Unauthorized(_))));

        let req = Request::builder()
            .header(IDENTITY_ID_HEADER, Uuid::new_v4().to_string())
            .body(())
            .unwrap();
        assert!(matches!(extract(req).await, Err(AppError::Unauthorized(_))));
    }

    fn request(role: Option<&str>) -> Request<()> {
        let mut builder = Request::builder()
            .header(IDENTITY_ID_HEADER, Uuid::new_v4().to_string())
            .header(IDENTITY_PHONE_HEADER, "+79990000000");
        if let Some(role) = role {
            builder = builder.header(IDENTITY_ROLE_HEADER, role);
        }
        builder.body(()).unwrap()
    }

    async fn extract_staff(req: Request<()>) -> Result<StaffIdentity, AppError> {
        let (mut parts, _) = req.into_parts();
        StaffIdentity::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn staff_roles_are_accepted() {
        let staff = extract_staff(request(Some("Staff"))).await.unwrap();
        assert_eq!(staff.role, "staff");
        assert!(extract_staff(request(Some("admin"))).await.is_ok());
    }

    #[tokio::test]
    async fn customers_are_forbidden_and_anonymous_unauthorized() {
        assert!(matches!(
            extract_staff(request(None)).await,
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            extract_staff(request(Some("customer"))).await,
            Err(AppError::Forbidden(_))
        ));
        let anonymous = Request::builder()
            .header(IDENTITY_ROLE_HEADER, "staff")
            .body(())
            .unwrap();
        assert!(matches!(
            extract_staff(anonymous).await,
            Err(AppError::Unauthorized(_))
        ));
    }
}
