//! CLI integration tests for mediaqueue
//!
//! Runs the binary end-to-end with an isolated config directory and no API keys.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const KEY_VARS: &[&str] = &[
    "MEDIAQUEUE_GEMINI_API_KEYS",
    "GEMINI_API_KEY",
    "MEDIAQUEUE_PHOTOROOM_API_KEY",
    "PHOTOROOM_API_KEY",
    "MEDIAQUEUE_SEEDREAM_API_KEY",
    "SEED_DREAM_API_KEY",
    "MEDIAQUEUE_SEEDREAM_BASE_URL",
];

/// Command running inside `dir` with its config stored there too
#[allow(deprecated)]
fn mediaqueue_cmd(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("mediaqueue").unwrap();
    cmd.current_dir(dir.path());
    cmd.env("MEDIAQUEUE_CONFIG_DIR", dir.path().join("config"));
    for var in KEY_VARS {
        cmd.env_remove(var);
    }
    cmd
}

const PNG: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

#[test]
fn test_help_command() {
    let dir = TempDir::new().unwrap();
    mediaqueue_cmd(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("text-to-image"))
        .stdout(predicate::str::contains("remove-bg"));
}

#[test]
fn test_config_list_defaults() {
    let dir = TempDir::new().unwrap();
    mediaqueue_cmd(&dir)
        .args(["config", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("queue.max_concurrent = 1"))
        .stdout(predicate::str::contains("queue.max_attempts = 10"));
}

#[test]
fn test_config_set_then_get() {
    let dir = TempDir::new().unwrap();
    mediaqueue_cmd(&dir)
        .args(["config", "set", "queue.max_concurrent", "3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Set queue.max_concurrent = 3"));

    assert!(dir.path().join("config").join("config.toml").exists());

    mediaqueue_cmd(&dir)
        .args(["config", "get", "queue.max_concurrent"])
        .assert()
        .success()
        .stdout("3\n");

    mediaqueue_cmd(&dir).args(["config", "reset"]).assert().success();

    mediaqueue_cmd(&dir)
        .args(["config", "get", "queue.max_concurrent"])
        .assert()
        .success()
        .stdout("1\n");
}

#[test]
fn test_config_set_rejects_api_key() {
    let dir = TempDir::new().unwrap();
    mediaqueue_cmd(&dir)
        .args(["config", "set", "gemini.api_keys", "secret"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("MEDIAQUEUE_GEMINI_API_KEYS"));
}

#[test]
fn test_config_path_uses_config_dir() {
    let dir = TempDir::new().unwrap();
    mediaqueue_cmd(&dir)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn test_keys_without_credentials() {
    let dir = TempDir::new().unwrap();
    mediaqueue_cmd(&dir)
        .arg("keys")
        .assert()
        .success()
        .stdout(predicate::str::contains("[!!] Gemini: Not configured"))
        .stdout(predicate::str::contains("MEDIAQUEUE_PHOTOROOM_API_KEY"));
}

#[test]
fn test_keys_redacts_values() {
    let dir = TempDir::new().unwrap();
    mediaqueue_cmd(&dir)
        .arg("keys")
        .env("MEDIAQUEUE_GEMINI_API_KEYS", "first-key-1111,second-key-2222")
        .assert()
        .success()
        .stdout(predicate::str::contains("[OK] Gemini: 2 key(s) (***1111, ***2222)"))
        .stdout(predicate::str::contains("first-key").not());
}

#[test]
fn test_text_to_image_fails_without_key() {
    let dir = TempDir::new().unwrap();
    mediaqueue_cmd(&dir)
        .args(["text-to-image", "a red fox"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("Gemini API key is missing."))
        .stderr(predicate::str::contains("1 of 1 job(s) failed"));
}

#[test]
fn test_remove_bg_json_summary_without_key() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("shoe.png"), PNG).unwrap();

    let output = mediaqueue_cmd(&dir)
        .args(["remove-bg", "shoe.png", "--format", "json", "--out", "results"])
        .output()
        .unwrap();
    assert!(!output.status.success());

    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["stats"]["failed"], 1);
    assert_eq!(summary["jobs"][0]["type"], "remove-background");
    assert_eq!(summary["jobs"][0]["status"], "failed");
    assert_eq!(summary["jobs"][0]["error"], "PhotoRoom API key is missing.");
    assert_eq!(summary["jobs"][0]["title"], "Remove Background: shoe.png");
}

#[test]
fn test_video_requires_prompt_or_image() {
    let dir = TempDir::new().unwrap();
    mediaqueue_cmd(&dir)
        .arg("video")
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "generate-video requires a prompt or an input image",
        ));
}

#[test]
fn test_invalid_aspect_ratio_rejected_before_running() {
    let dir = TempDir::new().unwrap();
    mediaqueue_cmd(&dir)
        .args(["video", "--prompt", "waves", "--aspect-ratio", "1:1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unsupported aspect ratio"))
        .stdout(predicate::str::contains("Queued").not());
}

#[test]
fn test_missing_image_file() {
    let dir = TempDir::new().unwrap();
    mediaqueue_cmd(&dir)
        .args(["remove-bg", "missing.png"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load image"));
}

#[test]
fn test_batch_file_runs_every_job() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("cat.png"), PNG).unwrap();
    std::fs::write(
        dir.path().join("jobs.json"),
        r#"[
            {"type": "text-to-image", "payload": {"prompt": "a fox"}},
            {"type": "remove-background", "image_path": "cat.png"}
        ]"#,
    )
    .unwrap();

    let output = mediaqueue_cmd(&dir)
        .args(["batch", "jobs.json", "--format", "json", "--concurrency", "2"])
        .output()
        .unwrap();
    assert!(!output.status.success());

    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["stats"]["failed"], 2);
    assert_eq!(summary["jobs"].as_array().unwrap().len(), 2);
}

#[test]
fn test_empty_batch_rejected() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("jobs.toml"), "jobs = []\n").unwrap();

    mediaqueue_cmd(&dir)
        .args(["batch", "jobs.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("contains no jobs"));
}

#[test]
fn test_zero_concurrency_rejected() {
    let dir = TempDir::new().unwrap();
    mediaqueue_cmd(&dir)
        .args(["text-to-image", "x", "--concurrency", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--concurrency must be at least 1"));
}

#[test]
fn test_zero_count_rejected() {
    let dir = TempDir::new().unwrap();
    mediaqueue_cmd(&dir)
        .args(["text-to-image", "x", "--count", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("must be at least 1"))
        .stdout(predicate::str::contains("Queued").not());
}
