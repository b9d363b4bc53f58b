//! Integration tests for Mynofi

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use tempfile::TempDir;

    /// Command isolated from the user's config, state and environment
    fn mynofi(home: &TempDir) -> Command {
        let mut cmd = cargo_bin_cmd!("mynofi");
        cmd.env("XDG_CONFIG_HOME", home.path().join("config"))
            .env("XDG_STATE_HOME", home.path().join("state"))
            .env("HOME", home.path())
            .env_remove("MYNOFI_URL")
            .env_remove("MYNOFI_ANON_KEY")
            .env_remove("MYNOFI_CONFIG")
            .env_remove("MYNOFI_PASSWORD")
            .env_remove("MYNOFI_LOG");
        cmd
    }

    #[test]
    fn help_displays() {
        let home = TempDir::new().unwrap();
        mynofi(&home)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("Connection lifecycle client"));
    }

    #[test]
    fn version_displays() {
        let home = TempDir::new().unwrap();
        mynofi(&home)
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("mynofi"));
    }

    #[test]
    fn config_path() {
        let home = TempDir::new().unwrap();
        mynofi(&home)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_path_honors_flag() {
        let home = TempDir::new().unwrap();
        let path = home.path().join("custom.toml");
        mynofi(&home)
            .arg("--config")
            .arg(&path)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("custom.toml"));
    }

    #[test]
    fn config_show() {
        let home = TempDir::new().unwrap();
        mynofi(&home)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[general]"))
            .stdout(predicate::str::contains("[retry]"));
    }

    #[test]
    fn config_set_then_show() {
        let home = TempDir::new().unwrap();
        let path = home.path().join("config.toml");

        mynofi(&home)
            .arg("--config")
            .arg(&path)
            .args(["config", "set", "retry.max_retries", "3"])
            .assert()
            .success();

        mynofi(&home)
            .arg("--config")
            .arg(&path)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("max_retries = 3"));
    }

    #[test]
    fn config_set_keeps_user_comments() {
        let home = TempDir::new().unwrap();
        let path = home.path().join("config.toml");
        std::fs::write(&path, "# pinned by ops\n[retry]\nmax_retries = 2\n").unwrap();

        mynofi(&home)
            .arg("--config")
            .arg(&path)
            .args(["config", "set", "retry.base_delay_ms", "500"])
            .assert()
            .success();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("# pinned by ops"));
        assert!(content.contains("max_retries = 2"));
        assert!(content.contains("base_delay_ms = 500"));
    }

    #[test]
    fn config_set_unknown_key_fails() {
        let home = TempDir::new().unwrap();
        mynofi(&home)
            .args(["config", "set", "vm.name", "x"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unknown config key"));
    }

    #[test]
    fn env_url_shows_in_config() {
        let home = TempDir::new().unwrap();
        mynofi(&home)
            .env("MYNOFI_URL", "https://env.example.co")
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("https://env.example.co"));
    }

    #[test]
    fn health_without_url_fails() {
        let home = TempDir::new().unwrap();
        mynofi(&home)
            .arg("health")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Service URL is not configured"))
            .stderr(predicate::str::contains("mynofi config set service.url"));
    }

    #[test]
    fn status_without_key_fails() {
        let home = TempDir::new().unwrap();
        mynofi(&home)
            .env("MYNOFI_URL", "https://x.example.co")
            .arg("status")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Service API key is not configured"));
    }

    #[test]
    fn login_requires_email() {
        let home = TempDir::new().unwrap();
        mynofi(&home)
            .arg("login")
            .assert()
            .failure()
            .stderr(predicate::str::contains("--email"));
    }

    #[test]
    fn login_without_password_source_fails() {
        let home = TempDir::new().unwrap();
        mynofi(&home)
            .args(["login", "--email", "a@example.com"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("--password-stdin"));
    }

    #[test]
    fn completions_bash() {
        let home = TempDir::new().unwrap();
        mynofi(&home)
            .args(["completions", "bash"])
            .assert()
            .success()
            .stdout(predicate::str::contains("mynofi"));
    }
}
