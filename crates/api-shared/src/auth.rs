use crate::models::Role;

/// Header carrying the caller's role, set by the upstream gateway.
pub const ROLE_HEADER: &str = "x-user-role";

/// Header carrying the caller's numeric user id.
pub const USER_ID_HEADER: &str = "x-user-id";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("missing x-user-role header")]
    MissingRole,
    #[error("unknown role: {0}")]
    UnknownRole(String),
    #[error("invalid user id: {0}")]
    InvalidUserId(String),
}

/// Identity of the caller for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthContext {
    pub role: Role,
    pub user_id: Option<i64>,
}

impl AuthContext {
    /// Builds the caller identity from raw header values.
    ///
    /// Returns an error if the role is missing or unknown, or the user id is not numeric.
    pub fn from_header_values(
        role: Option<&str>,
        user_id: Option<&str>,
    ) -> Result<Self, AuthError> {
        let role = role
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .ok_or(AuthError::MissingRole)?;
        let role = role
            .parse::<Role>()
            .map_err(|e| AuthError::UnknownRole(e.value))?;

        let user_id = match user_id.map(str::trim).filter(|v| !v.is_empty()) {
            Some(raw) => Some(
                raw.parse::<i64>()
                    .map_err(|_| AuthError::InvalidUserId(raw.to_string()))?,
            ),
            None => None,
        };

        Ok(Self { role, user_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_role_and_user_id() {
        let ctx = AuthContext::from_header_values(Some("JR"), Some(" 12 ")).unwrap();
        assert_eq!(ctx.role, Role::Jr);
        assert_eq!(ctx.user_id, Some(12));
    }

    #[test]
    fn test_rejects_missing_or_unknown_role() {
        assert_eq!(
            AuthContext::from_header_values(None, None),
            Err(AuthError::MissingRole)
        );
        assert_eq!(
            AuthContext::from_header_values(Some("Nurse"), None),
            Err(AuthError::UnknownRole("Nurse".into()))
        );
        assert!(matches!(
            AuthContext::from_header_values(Some("SR"), Some("abc")),
            Err(AuthError::InvalidUserId(_))
        ));
    }
}
