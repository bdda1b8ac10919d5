use super::*;

fn alice() -> AuthedUser {
    AuthedUser { id: Uuid::from_u128(1), username: "alice".into() }
}

// =============================================================================
// StaticAuthenticator
// =============================================================================

#[tokio::test]
async fn known_token_resolves_user() {
    let auth = StaticAuthenticator::new([("tok".to_owned(), alice())]);
    let user = auth.authenticate("tok").await.unwrap();
    assert_eq!(user.id, Uuid::from_u128(1));
    assert_eq!(user.username, "alice");
}

#[tokio::test]
async fn unknown_token_is_invalid() {
    let auth = StaticAuthenticator::new([("tok".to_owned(), alice())]);
    let err = auth.authenticate("other").await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidToken));
}

#[tokio::test]
async fn empty_table_rejects_everything() {
    let auth = StaticAuthenticator::new(std::iter::empty::<(String, AuthedUser)>());
    assert!(auth.authenticate("").await.is_err());
    assert!(auth.authenticate("anything").await.is_err());
}

// =============================================================================
// AuthedUser
// =============================================================================

#[test]
fn authed_user_serializes_for_presence() {
    let json = serde_json::to_value(alice()).unwrap();
    assert_eq!(json["username"], "alice");
    assert!(json["id"].is_string());
}

#[test]
fn invalid_token_error_message_names_the_cause() {
    let msg = AuthError::InvalidToken.to_string();
    assert!(msg.contains("token"));
}
