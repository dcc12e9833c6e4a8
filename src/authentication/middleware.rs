use warp::{reject::Rejection, Filter};

use crate::error::{Error, HtmlError};

use super::jwt::{verify_jwt_session, SessionData, SessionKey};

/// Pulls the token out of `Authorization: Token <jwt>` (or `Bearer <jwt>`).
pub fn parse_authorization(header: &str) -> Result<&str, Error> {
    let (scheme, token) = header
        .trim()
        .split_once(' ')
        .ok_or_else(|| HtmlError::InvalidSession.new("Invalid session; Malformed header"))?;

    match scheme {
        "Token" | "Bearer" if !token.trim().is_empty() => Ok(token.trim()),
        _ => Err(HtmlError::InvalidSession.new("Invalid session; Malformed header")),
    }
}

fn resolve(header: &str, key: &SessionKey) -> Result<SessionData, Error> {
    let token = parse_authorization(header)?;
    verify_jwt_session(token, key).map(SessionData::from)
}

/// Requires a valid session; a missing header is `Unauthorized`.
pub fn with_session(
    key: SessionKey,
) -> impl Filter<Extract = (SessionData,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization").and_then(move |header: Option<String>| {
        let key = key.clone();
        async move {
            match header {
                Some(header) => resolve(&header, &key).map_err(Rejection::from),
                None => Err(Rejection::from(HtmlError::Unauthorized.default())),
            }
        }
    })
}

/// Anonymous callers get `None`. A header that is present but invalid is
/// still rejected.
pub fn with_possible_session(
    key: SessionKey,
) -> impl Filter<Extract = (Option<SessionData>,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization").and_then(move |header: Option<String>| {
        let key = key.clone();
        async move {
            match header {
                Some(header) => resolve(&header, &key)
                    .map(Some)
                    .map_err(Rejection::from),
                None => Ok(None),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::{jwt::JwtSessionData, jwt::sign_jwt_session, schema::UserRole};

    #[rstest]
    #[case("Token abc.def.ghi", "abc.def.ghi")]
    #[case("Bearer abc.def.ghi", "abc.def.ghi")]
    #[case("  Token   abc  ", "abc")]
    fn reads_supported_schemes(#[case] header: &str, #[case] token: &str) {
        assert_eq!(parse_authorization(header).unwrap(), token);
    }

    #[rstest]
    #[case("abc.def.ghi")]
    #[case("Basic dXNlcjpwYXNz")]
    #[case("Token ")]
    fn rejects_other_headers(#[case] header: &str) {
        assert_eq!(
            parse_authorization(header).unwrap_err().kind,
            HtmlError::InvalidSession
        );
    }

    #[tokio::test]
    async fn session_filter_extracts_principal() {
        let key = SessionKey::new(b"secret").unwrap();
        let claims = JwtSessionData::new(3, String::from("cook"), UserRole::User, false);
        let token = sign_jwt_session(&claims, &key).unwrap();

        let session = warp::test::request()
            .header("authorization", format!("Token {token}"))
            .filter(&with_session(key))
            .await
            .unwrap();

        assert_eq!(session.user_id, 3);
    }

    #[tokio::test]
    async fn possible_session_allows_anonymous() {
        let key = SessionKey::new(b"secret").unwrap();

        let session = warp::test::request()
            .filter(&with_possible_session(key))
            .await
            .unwrap();

        assert!(session.is_none());
    }

    #[tokio::test]
    async fn session_filter_rejects_anonymous() {
        let key = SessionKey::new(b"secret").unwrap();

        let rejection = warp::test::request()
            .filter(&with_session(key))
            .await
            .unwrap_err();

        let error = rejection.find::<Error>().unwrap();
        assert_eq!(error.kind, HtmlError::Unauthorized);
    }
}
