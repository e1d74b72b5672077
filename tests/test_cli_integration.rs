//! CLI Integration Tests for nexushound
//!
//! These tests execute the binary and verify correct behavior for:
//! - Discovery and analysis output
//! - Loading with and without the override flag
//! - Running plugins with option overrides
//! - Fingerprint verification and trust
//! - Wordlist management

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const DNS_ENUM: &str = r#"
DnsEnum = PluginBase:extend("DnsEnum")
DnsEnum.category = "DNS"
DnsEnum.options = {
    { name = "domain", required = true },
    { name = "retries", kind = "integer", default = 2 },
}

function DnsEnum:run()
    nexus.record_result(nexus.results_dir .. "/" .. self:get_option("domain") .. ".txt")
end
"#;

const SHELL_OUT: &str = r#"
local os = require("os")
Shell = PluginBase:extend("Shell")
function Shell:run() return os.time() end
"#;

/// Temp workspace with a config file pointing everything inside it
struct Workspace {
    dir: TempDir,
    config: PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("plugins")).unwrap();

        let config = root.join("config.json");
        let body = serde_json::json!({
            "plugin_dir": root.join("plugins"),
            "database_path": root.join("registry.db"),
            "wordlist_dir": root.join("wordlists"),
            "results_dir": root.join("results"),
            "external_tool": { "enabled": false }
        });
        fs::write(&config, serde_json::to_string_pretty(&body).unwrap()).unwrap();

        Self { dir, config }
    }

    fn plugin(&self, name: &str, source: &str) -> PathBuf {
        let path = self.dir.path().join("plugins").join(name);
        fs::write(&path, source).unwrap();
        path
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("nexushound").unwrap();
        cmd.arg("--config").arg(&self.config).env_remove("RUST_LOG");
        cmd
    }
}

// ============================================================================
// Basic CLI
// ============================================================================

#[test]
fn test_help() {
    Command::cargo_bin("nexushound")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("discover"))
        .stdout(predicate::str::contains("wordlists"));
}

#[test]
fn test_version() {
    Command::cargo_bin("nexushound")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("0.3.0"));
}

#[test]
fn test_invalid_config_fails() {
    let ws = Workspace::new();
    fs::write(&ws.config, "{ \"extensions\": [] }").unwrap();
    ws.cmd()
        .arg("discover")
        .assert()
        .failure()
        .stderr(predicate::str::contains("extensions"));
}

// ============================================================================
// Discovery and Analysis
// ============================================================================

#[test]
fn test_discover_lists_plugins_only() {
    let ws = Workspace::new();
    ws.plugin("dns_enum.lua", DNS_ENUM);
    ws.plugin("util.lua", "return {}");

    ws.cmd()
        .arg("discover")
        .assert()
        .success()
        .stdout(predicate::str::contains("dns_enum.lua"))
        .stdout(predicate::str::contains("util.lua").not());
}

#[test]
fn test_analyze_safe_file() {
    let ws = Workspace::new();
    let path = ws.plugin("dns_enum.lua", DNS_ENUM);

    ws.cmd()
        .arg("analyze")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("safe"));
}

#[test]
fn test_analyze_dangerous_file() {
    let ws = Workspace::new();
    let path = ws.plugin("shell.lua", SHELL_OUT);

    ws.cmd()
        .arg("analyze")
        .arg(&path)
        .assert()
        .failure()
        .stdout(predicate::str::contains("CRITICAL: Potentially dangerous import detected: os at line 2"))
        .stderr(predicate::str::contains("unsafe"));
}

// ============================================================================
// Loading and Running
// ============================================================================

#[test]
fn test_load_declined_without_yes() {
    let ws = Workspace::new();
    ws.plugin("dns_enum.lua", DNS_ENUM);
    ws.plugin("shell.lua", SHELL_OUT);

    ws.cmd()
        .arg("load")
        .write_stdin("n\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("DnsEnum"))
        .stdout(predicate::str::contains("Shell").not())
        .stderr(predicate::str::contains("[y/N]"));
}

#[test]
fn test_load_with_yes_overrides() {
    let ws = Workspace::new();
    ws.plugin("shell.lua", SHELL_OUT);

    ws.cmd()
        .arg("load")
        .arg("--yes")
        .assert()
        .success()
        .stdout(predicate::str::contains("Shell"));
}

#[test]
fn test_run_requires_option() {
    let ws = Workspace::new();
    ws.plugin("dns_enum.lua", DNS_ENUM);

    ws.cmd()
        .args(["run", "DnsEnum"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("required option 'domain'"));
}

#[test]
fn test_run_with_options_records_result() {
    let ws = Workspace::new();
    ws.plugin("dns_enum.lua", DNS_ENUM);

    ws.cmd()
        .args(["run", "DnsEnum", "--set", "domain=example.com", "--set", "retries=5"])
        .assert()
        .success()
        .stdout(predicate::str::contains("result 1"));

    ws.cmd()
        .arg("results")
        .assert()
        .success()
        .stdout(predicate::str::contains("example.com.txt"))
        .stdout(predicate::str::contains("\"retries\":5"));
}

#[test]
fn test_run_rejects_bad_option_value() {
    let ws = Workspace::new();
    ws.plugin("dns_enum.lua", DNS_ENUM);

    ws.cmd()
        .args(["run", "DnsEnum", "--set", "retries=many"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not an integer"));
}

#[test]
fn test_run_unknown_plugin() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["run", "Ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Plugin not found: Ghost"));
}

// ============================================================================
// Integrity
// ============================================================================

#[test]
fn test_verify_and_trust() {
    let ws = Workspace::new();
    let path = ws.plugin("dns_enum.lua", DNS_ENUM);
    ws.cmd().arg("load").assert().success();

    ws.cmd()
        .args(["verify", "DnsEnum", "--category", "DNS"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("matches"));

    fs::write(&path, format!("{}\n-- edited\n", DNS_ENUM)).unwrap();
    ws.cmd()
        .args(["verify", "DnsEnum", "--category", "DNS"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("differs"));

    ws.cmd()
        .args(["load"])
        .assert()
        .success()
        .stdout(predicate::str::contains("MODIFIED"));

    ws.cmd()
        .args(["trust", "DnsEnum", "--category", "DNS"])
        .arg(&path)
        .assert()
        .success();
    ws.cmd()
        .args(["verify", "DnsEnum", "--category", "DNS"])
        .arg(&path)
        .assert()
        .success();
}

#[test]
fn test_verify_unknown_plugin() {
    let ws = Workspace::new();
    let path = ws.plugin("dns_enum.lua", DNS_ENUM);
    ws.cmd()
        .args(["verify", "DnsEnum"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("not registered"));
}

// ============================================================================
// Wordlists
// ============================================================================

#[test]
fn test_wordlists_add_list_show() {
    let ws = Workspace::new();
    let file = ws.root().join("subs.txt");
    fs::write(&file, "www\n\n  mail  \napi\n").unwrap();

    ws.cmd()
        .args(["wordlists", "add", "subdomains"])
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("1"));

    ws.cmd()
        .args(["wordlists", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("subdomains\t3"));

    ws.cmd()
        .args(["wordlists", "show", "1"])
        .assert()
        .success()
        .stdout(predicate::eq("www\nmail\napi\n"));

    ws.cmd()
        .args(["wordlists", "add", "subdomains"])
        .arg(&file)
        .assert()
        .failure();
}

#[test]
fn test_wordlists_bootstrap() {
    let ws = Workspace::new();
    let dir = ws.root().join("wordlists");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("ports.txt"), "22\n80\n443\n").unwrap();
    fs::write(dir.join("users.txt"), "admin\nroot\n").unwrap();
    fs::write(dir.join("readme.md"), "not a wordlist").unwrap();

    ws.cmd()
        .args(["wordlists", "bootstrap"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2 wordlists added"));

    ws.cmd()
        .args(["wordlists", "bootstrap"])
        .assert()
        .success()
        .stdout(predicate::str::contains("0 wordlists added"));
}
