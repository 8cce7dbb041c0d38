mod common;

use common::{base_cmd, config_path, json_stdout, make_temp_home, write_file};

#[test]
fn env_overrides_config_file() {
    let home = make_temp_home("env");
    write_file(
        &config_path(&home),
        br#"
[thresholds]
disk_fault_mb = 10
disk_warn_mb = 20

[network]
targets = ["pypi.org:443"]
"#,
    );

    let out = base_cmd(&home)
        .env("PYDOCTOR_DISK_WARN_MB", "50")
        .env("PYDOCTOR_NETWORK_TARGETS", "example.org:80, example.net:443")
        .env("PYDOCTOR_PYTHON", "/opt/python/bin/python3")
        .args(["--json", "config", "--show"])
        .output()
        .expect("run pydoctor");
    assert!(out.status.success());

    let v = json_stdout(&out);
    assert_eq!(v["thresholds"]["disk_fault_mb"], 10);
    assert_eq!(v["thresholds"]["disk_warn_mb"], 50);
    assert_eq!(
        v["network"]["targets"],
        serde_json::json!(["example.org:80", "example.net:443"])
    );
    assert_eq!(v["python"]["interpreter"], "/opt/python/bin/python3");
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn network_targets_none_disables_probes() {
    let home = make_temp_home("env");
    let out = base_cmd(&home)
        .env("PYDOCTOR_NETWORK_TARGETS", "none")
        .args(["--json", "config", "--show"])
        .output()
        .expect("run pydoctor");
    assert!(out.status.success());
    let v = json_stdout(&out);
    assert_eq!(v["network"]["targets"], serde_json::json!([]));
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn env_override_is_validated_with_the_file() {
    let home = make_temp_home("env");
    write_file(&config_path(&home), b"[thresholds]\ndisk_warn_mb = 2048\n");
    let out = base_cmd(&home)
        .env("PYDOCTOR_DISK_FAULT_MB", "4096")
        .args(["config", "--show"])
        .output()
        .expect("run pydoctor");
    assert_eq!(out.status.code(), Some(2));
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn bool_env_accepts_common_spellings() {
    let home = make_temp_home("env");
    let out = base_cmd(&home)
        .env("PYDOCTOR_REPORT_WRITE_LOG", "off")
        .env("PYDOCTOR_UI_COLOR", "no")
        .args(["--json", "config", "--show"])
        .output()
        .expect("run pydoctor");
    assert!(out.status.success());
    let v = json_stdout(&out);
    assert_eq!(v["report"]["write_log"], false);
    assert_eq!(v["ui"]["color"], false);
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn duplicate_env_targets_exit_2() {
    let home = make_temp_home("env");
    let out = base_cmd(&home)
        .env("PYDOCTOR_NETWORK_TARGETS", "pypi.org:443,pypi.org:443")
        .args(["config", "--show"])
        .output()
        .expect("run pydoctor");
    assert_eq!(out.status.code(), Some(2));
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn cpu_thresholds_follow_env() {
    let home = make_temp_home("env");
    let out = base_cmd(&home)
        .env("PYDOCTOR_CPU_FAULT_PCT", "99")
        .env("PYDOCTOR_CPU_WARN_PCT", "90")
        .args(["--json", "config", "--show"])
        .output()
        .expect("run pydoctor");
    assert!(out.status.success());
    let v = json_stdout(&out);
    assert_eq!(v["thresholds"]["cpu_fault_pct"], 99);
    assert_eq!(v["thresholds"]["cpu_warn_pct"], 90);
    assert_eq!(v["network"]["tls_host"], "python.org");
    let _ = std::fs::remove_dir_all(&home);
}
