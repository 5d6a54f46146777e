use chrono::{Duration, Utc};
use gatehouse_auth::{AuthError, Authenticator, NewAccount, Registration};
use gatehouse_config::AuthConfig;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;
use tempfile::TempDir;

type TestResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

fn test_auth_config() -> AuthConfig {
    AuthConfig {
        jwt_secret: "integration-test-secret-material-0123456789".to_string(),
        ..AuthConfig::default()
    }
}

struct TestContext {
    pool: SqlitePool,
    authenticator: Authenticator,
    _temp_dir: TempDir,
}

impl TestContext {
    async fn new(config: AuthConfig) -> TestResult<Self> {
        let temp_dir = TempDir::new()?;
        let db_path = temp_dir.path().join("auth.sqlite");
        let db_url = format!("sqlite://{}", db_path.display());

        let options = SqliteConnectOptions::from_str(&db_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        MIGRATOR.run(&pool).await?;

        let authenticator = Authenticator::new(pool.clone(), config);

        Ok(Self {
            pool,
            authenticator,
            _temp_dir: temp_dir,
        })
    }

    async fn new_default() -> TestResult<Self> {
        Self::new(test_auth_config()).await
    }

    fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    async fn register(
        &self,
        email: &str,
        username: &str,
        password: &str,
    ) -> Result<Registration, AuthError> {
        self.authenticator
            .register(NewAccount {
                email: email.to_string(),
                username: username.to_string(),
                display_name: None,
                password: password.to_string(),
            })
            .await
    }
}

#[tokio::test]
async fn register_persists_account_with_hashed_password() -> TestResult {
    let ctx = TestContext::new_default().await?;

    let registration = ctx
        .register("alice@example.com", "alice", "Password123")
        .await?;

    assert_eq!(registration.user.email, "alice@example.com");
    assert!(!registration.user.email_verified);
    assert!(!registration.verification_token.is_empty());

    let stored_hash: String = sqlx::query_scalar("SELECT password_hash FROM users WHERE id = ?")
        .bind(registration.user.id)
        .fetch_one(ctx.pool())
        .await?;
    assert!(
        stored_hash.starts_with("$argon2"),
        "password must be stored as an argon2 hash"
    );
    assert_ne!(stored_hash, "Password123");

    Ok(())
}

#[tokio::test]
async fn register_then_login_succeeds_without_verification() -> TestResult {
    let ctx = TestContext::new_default().await?;
    ctx.register("bob@example.com", "bob", "Password123").await?;

    let issued = ctx
        .authenticator()
        .login("bob@example.com", "Password123")
        .await?;

    assert!(!issued.token.is_empty());
    assert!(issued.expires_at > Utc::now());
    assert_eq!(issued.user.email, "bob@example.com");

    Ok(())
}

#[tokio::test]
async fn register_rejects_duplicate_email_case_insensitively() -> TestResult {
    let ctx = TestContext::new_default().await?;
    ctx.register("carol@example.com", "carol", "Password123")
        .await?;

    let err = ctx
        .register("CAROL@example.com", "carol2", "Password123")
        .await
        .expect_err("expected duplicate email to fail");
    assert!(matches!(err, AuthError::DuplicateEmail));

    let user_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(ctx.pool())
        .await?;
    assert_eq!(user_count, 1, "no additional users should be created");

    Ok(())
}

#[tokio::test]
async fn register_rejects_weak_passwords() -> TestResult {
    let ctx = TestContext::new_default().await?;

    for weak in ["short1A", "nouppercase123", "NOLOWERCASE123", "NoDigitsHere"] {
        let err = ctx
            .register("dave@example.com", "dave", weak)
            .await
            .expect_err("expected weak password to fail");
        assert!(matches!(err, AuthError::Validation(_)));
    }

    Ok(())
}

#[tokio::test]
async fn register_rejects_taken_username() -> TestResult {
    let ctx = TestContext::new_default().await?;
    ctx.register("erin@example.com", "erin", "Password123").await?;

    let err = ctx
        .register("erin2@example.com", "erin", "Password123")
        .await
        .expect_err("expected duplicate username to fail");
    assert!(matches!(err, AuthError::Validation(_)));

    Ok(())
}

#[tokio::test]
async fn login_does_not_reveal_which_part_was_wrong() -> TestResult {
    let ctx = TestContext::new_default().await?;
    ctx.register("frank@example.com", "frank", "Password123")
        .await?;

    let unknown_email = ctx
        .authenticator()
        .login("nobody@example.com", "Password123")
        .await
        .expect_err("unknown email must fail");
    let wrong_password = ctx
        .authenticator()
        .login("frank@example.com", "WrongPassword1")
        .await
        .expect_err("wrong password must fail");

    assert!(matches!(unknown_email, AuthError::InvalidCredentials));
    assert!(matches!(wrong_password, AuthError::InvalidCredentials));
    assert_eq!(unknown_email.to_string(), wrong_password.to_string());

    Ok(())
}

#[tokio::test]
async fn lockout_rejects_correct_password_until_expiry() -> TestResult {
    let ctx = TestContext::new_default().await?;
    let registration = ctx
        .register("grace@example.com", "grace", "Password123")
        .await?;

    for _ in 0..5 {
        let err = ctx
            .authenticator()
            .login("grace@example.com", "WrongPassword1")
            .await
            .expect_err("wrong password must fail");
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    // The sixth attempt carries the right password and still bounces.
    let err = ctx
        .authenticator()
        .login("grace@example.com", "Password123")
        .await
        .expect_err("locked account must reject correct credentials");
    assert!(matches!(err, AuthError::AccountLocked));

    // Age the lock out and the same credentials work again.
    let expired = (Utc::now() - Duration::seconds(5)).to_rfc3339();
    sqlx::query("UPDATE users SET locked_until = ? WHERE id = ?")
        .bind(&expired)
        .bind(registration.user.id)
        .execute(ctx.pool())
        .await?;

    let issued = ctx
        .authenticator()
        .login("grace@example.com", "Password123")
        .await?;
    assert!(!issued.token.is_empty());

    Ok(())
}

#[tokio::test]
async fn failed_attempts_outside_window_do_not_accumulate() -> TestResult {
    let ctx = TestContext::new_default().await?;
    let registration = ctx
        .register("heidi@example.com", "heidi", "Password123")
        .await?;

    for _ in 0..4 {
        ctx.authenticator()
            .login("heidi@example.com", "WrongPassword1")
            .await
            .expect_err("wrong password must fail");
    }

    // Push the previous failures outside the counting window.
    let stale = (Utc::now() - Duration::seconds(2_000)).to_rfc3339();
    sqlx::query("UPDATE users SET last_failed_login_at = ? WHERE id = ?")
        .bind(&stale)
        .bind(registration.user.id)
        .execute(ctx.pool())
        .await?;

    ctx.authenticator()
        .login("heidi@example.com", "WrongPassword1")
        .await
        .expect_err("wrong password must fail");

    let attempts: i64 = sqlx::query_scalar("SELECT failed_login_attempts FROM users WHERE id = ?")
        .bind(registration.user.id)
        .fetch_one(ctx.pool())
        .await?;
    assert_eq!(attempts, 1, "counter must restart after the window");

    let locked_until: Option<String> =
        sqlx::query_scalar("SELECT locked_until FROM users WHERE id = ?")
            .bind(registration.user.id)
            .fetch_one(ctx.pool())
            .await?;
    assert!(locked_until.is_none());

    Ok(())
}

#[tokio::test]
async fn authenticate_resolves_token_to_account() -> TestResult {
    let ctx = TestContext::new_default().await?;
    ctx.register("ivan@example.com", "ivan", "Password123").await?;
    let issued = ctx
        .authenticator()
        .login("ivan@example.com", "Password123")
        .await?;

    let (user, claims) = ctx.authenticator().authenticate(&issued.token).await?;
    assert_eq!(user.email, "ivan@example.com");
    assert_eq!(claims.sub, user.public_id);
    assert_eq!(claims.role, "user");

    let err = ctx
        .authenticator()
        .authenticate("not-even-a-jwt")
        .await
        .expect_err("garbage token must fail");
    assert!(matches!(err, AuthError::Unauthorized));

    Ok(())
}

#[tokio::test]
async fn logout_revokes_the_presented_token() -> TestResult {
    let ctx = TestContext::new_default().await?;
    ctx.register("judy@example.com", "judy", "Password123").await?;
    let issued = ctx
        .authenticator()
        .login("judy@example.com", "Password123")
        .await?;

    ctx.authenticator().logout(&issued.token).await?;

    let err = ctx
        .authenticator()
        .authenticate(&issued.token)
        .await
        .expect_err("revoked token must fail");
    assert!(matches!(err, AuthError::Unauthorized));

    Ok(())
}

#[tokio::test]
async fn refresh_rotates_and_kills_the_old_token() -> TestResult {
    let ctx = TestContext::new_default().await?;
    ctx.register("kent@example.com", "kent", "Password123").await?;
    let issued = ctx
        .authenticator()
        .login("kent@example.com", "Password123")
        .await?;

    let rotated = ctx.authenticator().refresh(&issued.token).await?;
    assert_ne!(rotated.token, issued.token);

    ctx.authenticator().authenticate(&rotated.token).await?;

    let err = ctx
        .authenticator()
        .authenticate(&issued.token)
        .await
        .expect_err("rotated-away token must fail");
    assert!(matches!(err, AuthError::Unauthorized));

    Ok(())
}

#[tokio::test]
async fn password_reset_flow_swaps_the_credential() -> TestResult {
    let ctx = TestContext::new_default().await?;
    ctx.register("lena@example.com", "lena", "Password123").await?;

    let granted = ctx
        .authenticator()
        .request_password_reset("lena@example.com")
        .await?
        .expect("known email must yield a token");

    ctx.authenticator()
        .reset_password(&granted.token, "Betterpass4")
        .await?;

    let old = ctx
        .authenticator()
        .login("lena@example.com", "Password123")
        .await
        .expect_err("old password must stop working");
    assert!(matches!(old, AuthError::InvalidCredentials));

    ctx.authenticator()
        .login("lena@example.com", "Betterpass4")
        .await?;

    Ok(())
}

#[tokio::test]
async fn reset_token_is_single_use() -> TestResult {
    let ctx = TestContext::new_default().await?;
    ctx.register("mike@example.com", "mike", "Password123").await?;

    let granted = ctx
        .authenticator()
        .request_password_reset("mike@example.com")
        .await?
        .expect("known email must yield a token");

    ctx.authenticator()
        .reset_password(&granted.token, "Betterpass4")
        .await?;

    let err = ctx
        .authenticator()
        .reset_password(&granted.token, "Evenbetter5")
        .await
        .expect_err("consumed token must fail");
    assert!(matches!(err, AuthError::InvalidOrExpiredToken));

    Ok(())
}

#[tokio::test]
async fn expired_reset_token_behaves_like_unknown() -> TestResult {
    let ctx = TestContext::new_default().await?;
    let registration = ctx
        .register("nina@example.com", "nina", "Password123")
        .await?;

    let granted = ctx
        .authenticator()
        .request_password_reset("nina@example.com")
        .await?
        .expect("known email must yield a token");

    let expired = (Utc::now() - Duration::seconds(10)).to_rfc3339();
    sqlx::query("UPDATE action_tokens SET expires_at = ? WHERE user_id = ?")
        .bind(&expired)
        .bind(registration.user.id)
        .execute(ctx.pool())
        .await?;

    let expired_err = ctx
        .authenticator()
        .reset_password(&granted.token, "Betterpass4")
        .await
        .expect_err("expired token must fail");
    let unknown_err = ctx
        .authenticator()
        .reset_password("token-that-never-existed", "Betterpass4")
        .await
        .expect_err("unknown token must fail");

    assert!(matches!(expired_err, AuthError::InvalidOrExpiredToken));
    assert!(matches!(unknown_err, AuthError::InvalidOrExpiredToken));
    assert_eq!(expired_err.to_string(), unknown_err.to_string());

    // The credential is untouched either way.
    ctx.authenticator()
        .login("nina@example.com", "Password123")
        .await?;

    Ok(())
}

#[tokio::test]
async fn weak_replacement_password_does_not_burn_the_token() -> TestResult {
    let ctx = TestContext::new_default().await?;
    ctx.register("olga@example.com", "olga", "Password123").await?;

    let granted = ctx
        .authenticator()
        .request_password_reset("olga@example.com")
        .await?
        .expect("known email must yield a token");

    let err = ctx
        .authenticator()
        .reset_password(&granted.token, "weak")
        .await
        .expect_err("weak password must fail");
    assert!(matches!(err, AuthError::Validation(_)));

    // Same token, acceptable password: still works.
    ctx.authenticator()
        .reset_password(&granted.token, "Betterpass4")
        .await?;

    Ok(())
}

#[tokio::test]
async fn reset_request_for_unknown_email_is_silent() -> TestResult {
    let ctx = TestContext::new_default().await?;

    let outcome = ctx
        .authenticator()
        .request_password_reset("ghost@example.com")
        .await?;
    assert!(outcome.is_none());

    let token_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM action_tokens")
        .fetch_one(ctx.pool())
        .await?;
    assert_eq!(token_count, 0);

    Ok(())
}

#[tokio::test]
async fn new_reset_request_replaces_the_previous_token() -> TestResult {
    let ctx = TestContext::new_default().await?;
    ctx.register("pete@example.com", "pete", "Password123").await?;

    let first = ctx
        .authenticator()
        .request_password_reset("pete@example.com")
        .await?
        .expect("known email must yield a token");
    let second = ctx
        .authenticator()
        .request_password_reset("pete@example.com")
        .await?
        .expect("known email must yield a token");

    let err = ctx
        .authenticator()
        .reset_password(&first.token, "Betterpass4")
        .await
        .expect_err("replaced token must fail");
    assert!(matches!(err, AuthError::InvalidOrExpiredToken));

    ctx.authenticator()
        .reset_password(&second.token, "Betterpass4")
        .await?;

    Ok(())
}

#[tokio::test]
async fn reset_invalidates_outstanding_sessions() -> TestResult {
    let ctx = TestContext::new_default().await?;
    ctx.register("quinn@example.com", "quinn", "Password123")
        .await?;

    let issued = ctx
        .authenticator()
        .login("quinn@example.com", "Password123")
        .await?;
    ctx.authenticator().authenticate(&issued.token).await?;

    // The credentials floor has second granularity; make sure the reset
    // lands on a later second than the token's iat.
    tokio::time::sleep(std::time::Duration::from_millis(1_100)).await;

    let granted = ctx
        .authenticator()
        .request_password_reset("quinn@example.com")
        .await?
        .expect("known email must yield a token");
    ctx.authenticator()
        .reset_password(&granted.token, "Betterpass4")
        .await?;

    let err = ctx
        .authenticator()
        .authenticate(&issued.token)
        .await
        .expect_err("pre-reset token must fail");
    assert!(matches!(err, AuthError::Unauthorized));

    // A fresh login works immediately.
    let fresh = ctx
        .authenticator()
        .login("quinn@example.com", "Betterpass4")
        .await?;
    ctx.authenticator().authenticate(&fresh.token).await?;

    Ok(())
}

#[tokio::test]
async fn verification_token_verifies_exactly_once() -> TestResult {
    let ctx = TestContext::new_default().await?;
    let registration = ctx
        .register("rosa@example.com", "rosa", "Password123")
        .await?;

    let user = ctx
        .authenticator()
        .verify_email(&registration.verification_token)
        .await?;
    assert!(user.email_verified);

    let err = ctx
        .authenticator()
        .verify_email(&registration.verification_token)
        .await
        .expect_err("consumed token must fail");
    assert!(matches!(err, AuthError::InvalidOrExpiredToken));

    Ok(())
}

#[tokio::test]
async fn resend_verification_honours_the_cooldown() -> TestResult {
    let ctx = TestContext::new_default().await?;
    let registration = ctx
        .register("saul@example.com", "saul", "Password123")
        .await?;

    // Registration just issued a token, so an immediate resend is too soon.
    let err = ctx
        .authenticator()
        .resend_verification(registration.user.id)
        .await
        .expect_err("resend inside the cooldown must fail");
    assert!(matches!(err, AuthError::RateLimited));

    let status = ctx
        .authenticator()
        .verification_status(registration.user.id)
        .await?;
    assert!(!status.verified);
    assert!(status.pending);
    assert!(status.cooldown_remaining_seconds > 0);

    // Age the previous issue past the cooldown.
    let stale = (Utc::now() - Duration::seconds(120)).to_rfc3339();
    sqlx::query("UPDATE action_tokens SET created_at = ? WHERE user_id = ?")
        .bind(&stale)
        .bind(registration.user.id)
        .execute(ctx.pool())
        .await?;

    let resend = ctx
        .authenticator()
        .resend_verification(registration.user.id)
        .await?;

    // The reissue replaces the original token.
    let old = ctx
        .authenticator()
        .verify_email(&registration.verification_token)
        .await
        .expect_err("replaced token must fail");
    assert!(matches!(old, AuthError::InvalidOrExpiredToken));

    let user = ctx.authenticator().verify_email(&resend.token).await?;
    assert!(user.email_verified);

    let err = ctx
        .authenticator()
        .resend_verification(registration.user.id)
        .await
        .expect_err("verified account must not get another token");
    assert!(matches!(err, AuthError::Validation(_)));

    Ok(())
}

#[tokio::test]
async fn update_password_checks_the_current_one_and_keeps_sessions() -> TestResult {
    let ctx = TestContext::new_default().await?;
    let registration = ctx
        .register("tina@example.com", "tina", "Password123")
        .await?;
    let issued = ctx
        .authenticator()
        .login("tina@example.com", "Password123")
        .await?;

    let err = ctx
        .authenticator()
        .update_password(registration.user.id, "WrongPassword1", "Betterpass4")
        .await
        .expect_err("wrong current password must fail");
    assert!(matches!(err, AuthError::InvalidCredentials));

    ctx.authenticator()
        .update_password(registration.user.id, "Password123", "Betterpass4")
        .await?;

    // Unlike a reset, a self-service change keeps existing sessions alive.
    ctx.authenticator().authenticate(&issued.token).await?;
    ctx.authenticator()
        .login("tina@example.com", "Betterpass4")
        .await?;

    Ok(())
}

#[tokio::test]
async fn delete_account_requires_the_password_and_hides_the_user() -> TestResult {
    let ctx = TestContext::new_default().await?;
    let registration = ctx
        .register("ursa@example.com", "ursa", "Password123")
        .await?;
    let issued = ctx
        .authenticator()
        .login("ursa@example.com", "Password123")
        .await?;

    let err = ctx
        .authenticator()
        .delete_account(registration.user.id, "WrongPassword1")
        .await
        .expect_err("wrong password must fail");
    assert!(matches!(err, AuthError::InvalidCredentials));

    ctx.authenticator()
        .delete_account(registration.user.id, "Password123")
        .await?;

    let login = ctx
        .authenticator()
        .login("ursa@example.com", "Password123")
        .await
        .expect_err("deleted account must not log in");
    assert!(matches!(login, AuthError::InvalidCredentials));

    let auth = ctx
        .authenticator()
        .authenticate(&issued.token)
        .await
        .expect_err("tokens of a deleted account must fail");
    assert!(matches!(auth, AuthError::Unauthorized));

    Ok(())
}

#[tokio::test]
async fn profile_stops_resolving_after_deletion() -> TestResult {
    let ctx = TestContext::new_default().await?;
    let registration = ctx
        .register("vika@example.com", "vika", "Password123")
        .await?;

    let user = ctx.authenticator().profile(registration.user.id).await?;
    assert_eq!(user.email, "vika@example.com");

    ctx.authenticator()
        .delete_account(registration.user.id, "Password123")
        .await?;

    let err = ctx
        .authenticator()
        .profile(registration.user.id)
        .await
        .expect_err("deleted account must not resolve");
    assert!(matches!(err, AuthError::Unauthorized));

    Ok(())
}
