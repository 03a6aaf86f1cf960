//! CLI wiring without a signed-in session.

use obsidian_log_admin::{AdminConfig, App, ConfigChanges, GitHubConfig, Mode};
use obsidian_log_auth::AuthConfig;
use obsidian_log_supabase::SupabaseConfig;
use std::path::Path;

fn config(state_dir: &Path) -> AdminConfig {
    AdminConfig {
        // Nothing listens here; these tests must not reach the network.
        supabase: SupabaseConfig::new("http://127.0.0.1:9", "anon"),
        github: GitHubConfig {
            repo_url: "https://github.com/octocat/blog".to_string(),
            token: None,
        },
        auth: AuthConfig {
            init_settle_ms: 0,
            ..AuthConfig::default()
        },
        state_dir: state_dir.to_path_buf(),
        redirect_to: "http://localhost:3000/admin".to_string(),
        content_dir: None,
        mode: Mode::Development,
    }
}

#[tokio::test]
async fn status_without_session_is_unauthenticated() {
    let dir = tempfile::tempdir().expect("tempdir");
    let app = App::new(config(dir.path())).expect("app");

    let snapshot = app.status().await.expect("status");

    assert_eq!(snapshot.user, None);
    assert!(!snapshot.is_admin);
    assert!(!snapshot.loading);
    assert!(!snapshot.oauth_callback_pending);
}

#[tokio::test]
async fn login_builds_github_authorize_url() {
    let dir = tempfile::tempdir().expect("tempdir");
    let app = App::new(config(dir.path())).expect("app");

    let url = app.login(None).await.expect("login");

    assert!(url.starts_with("http://127.0.0.1:9/auth/v1/authorize?provider=github"));
    assert!(url.contains("redirect_to="));
}

#[tokio::test]
async fn publishing_requires_sign_in() {
    let dir = tempfile::tempdir().expect("tempdir");
    let app = App::new(config(dir.path())).expect("app");

    let result = app.publish_config(ConfigChanges::default()).await;

    let message = result.expect_err("rejected").to_string();
    assert!(message.contains("not signed in"), "{message}");
}

#[test]
fn incomplete_supabase_config_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = config(dir.path());
    config.supabase.anon_key = String::new();

    assert!(App::new(config).is_err());
}
