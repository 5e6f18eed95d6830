//! Tests of the `mcpforge` binary that need no database or network.

use std::path::Path;
use std::process::{Command, Output};

fn mcpforge(config_home: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_mcpforge"))
        .args(args)
        .env("XDG_CONFIG_HOME", config_home)
        .env("RUST_LOG", "off")
        .output()
        .expect("failed to run mcpforge")
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn help_lists_commands() {
    let tmp = tempfile::TempDir::new().unwrap();
    let output = mcpforge(tmp.path(), &["--help"]);
    assert!(output.status.success());
    let text = String::from_utf8_lossy(&output.stdout);
    for command in ["init", "db-init", "generate", "servers", "runs"] {
        assert!(text.contains(command), "missing {command} in:\n{text}");
    }
}

#[test]
fn init_writes_private_config() {
    let tmp = tempfile::TempDir::new().unwrap();
    let output = mcpforge(
        tmp.path(),
        &["init", "--db-url", "postgresql://cfg-host:5432/forge"],
    );
    assert!(output.status.success(), "{}", stderr(&output));

    let path = tmp.path().join("mcpforge").join("config.toml");
    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("postgresql://cfg-host:5432/forge"), "{text}");
    assert!(text.contains("[workflow]"), "{text}");

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}

#[test]
fn init_refuses_to_overwrite_without_force() {
    let tmp = tempfile::TempDir::new().unwrap();
    assert!(mcpforge(tmp.path(), &["init"]).status.success());

    let again = mcpforge(tmp.path(), &["init"]);
    assert!(!again.status.success());
    assert!(stderr(&again).contains("--force"), "{}", stderr(&again));

    let forced = mcpforge(tmp.path(), &["init", "--force"]);
    assert!(forced.status.success(), "{}", stderr(&forced));
}

#[test]
fn generate_requires_an_input() {
    let tmp = tempfile::TempDir::new().unwrap();
    let output = mcpforge(tmp.path(), &["generate"]);
    assert!(!output.status.success());
    let err = stderr(&output);
    assert!(err.contains("--openapi") || err.contains("--description"), "{err}");
}

#[test]
fn generate_rejects_zero_iterations_before_connecting() {
    let tmp = tempfile::TempDir::new().unwrap();
    let output = mcpforge(
        tmp.path(),
        &[
            "generate",
            "--description",
            "weather tools",
            "--max-iterations",
            "0",
        ],
    );
    assert!(!output.status.success());
    assert!(stderr(&output).contains("positive"), "{}", stderr(&output));
}

#[test]
fn unreachable_archive_database_does_not_stop_generate() {
    let tmp = tempfile::TempDir::new().unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_mcpforge"))
        .args([
            "generate",
            "--openapi",
            "https://petstore.test/openapi.json",
            "--no-persist",
        ])
        .env("XDG_CONFIG_HOME", tmp.path())
        .env("RUST_LOG", "off")
        .env("MCPFORGE_DATABASE_URL", "postgresql://127.0.0.1:1/mcpforge")
        .env("ANTHROPIC_API_KEY", "sk-test")
        .env_remove("MCPFORGE_DEPLOY_URL")
        .output()
        .expect("failed to run mcpforge");

    // The command gets past the database and stops at the first missing
    // setting of the workflow itself.
    assert!(!output.status.success());
    let err = stderr(&output);
    assert!(!err.contains("failed to connect to database"), "{err}");
    assert!(err.contains("no deployment platform configured"), "{err}");
}

#[test]
fn malformed_config_file_is_reported() {
    let tmp = tempfile::TempDir::new().unwrap();
    let dir = tmp.path().join("mcpforge");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("config.toml"), "[workflow\nmax_iterations = ").unwrap();

    let output = mcpforge(tmp.path(), &["runs"]);
    assert!(!output.status.success());
    assert!(
        stderr(&output).contains("failed to parse config file"),
        "{}",
        stderr(&output)
    );
}
