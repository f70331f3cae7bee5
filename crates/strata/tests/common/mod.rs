#![allow(deprecated)] // Command::cargo_bin

use assert_cmd::Command;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

pub const VPC_SUBNET: &str = r#"
project "demo"

resource "vpc" "main" {
    cidr_block "10.0.0.0/16"
    tags env="test"
}

resource "subnet" "a" {
    vpc_id "${vpc.main.id}"
    cidr_block "10.0.1.0/24"
    availability_zone "us-east-1a"
}
"#;

pub struct TestProject {
    pub root: TempDir,
}

impl TestProject {
    /// Empty project with near-instant retries
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join(".strata");
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("settings.yaml"),
            "lock_timeout_secs: 4000000000\nretry:\n  initial_delay_ms: 1\n  max_delay_ms: 5\n",
        )
        .unwrap();
        Self { root }
    }

    pub fn with_config(content: &str) -> Self {
        let project = Self::new();
        project.write_config(content);
        project
    }

    pub fn write_config(&self, content: &str) {
        fs::write(self.root.path().join("strata.kdl"), content).unwrap();
    }

    pub fn path(&self) -> PathBuf {
        self.root.path().to_path_buf()
    }

    pub fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("strata").unwrap();
        cmd.current_dir(self.path())
            .env("NO_COLOR", "1")
            .env_remove("STRATA_CONFIG_PATH")
            .env_remove("STRATA_SIM_FAULTS")
            .env_remove("STRATA_PARALLELISM")
            .env_remove("STRATA_LOCK_TIMEOUT")
            .env_remove("STRATA_LOG");
        cmd
    }

    #[allow(dead_code)]
    pub fn state(&self) -> serde_json::Value {
        let content = fs::read_to_string(self.path().join(".strata/state.json")).unwrap();
        serde_json::from_str(&content).unwrap()
    }

    #[allow(dead_code)]
    pub fn write_lock(&self, id: &str) {
        let lock = serde_json::json!({
            "id": id,
            "holder": "ci@runner (pid 4242)",
            "operation": "apply",
            "acquired_at": "2026-01-01T00:00:00Z",
        });
        fs::write(self.path().join(".strata/lock.json"), lock.to_string()).unwrap();
    }
}
