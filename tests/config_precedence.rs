mod common;

use common::{base_cmd, config_path, json_stdout, make_temp_home, run, write_file};

#[test]
fn defaults_apply_without_config_file() {
    let home = make_temp_home("config");
    let out = run(&home, &["--json", "config", "--show"]);
    assert!(out.status.success());
    let v = json_stdout(&out);
    assert_eq!(v["thresholds"]["disk_fault_mb"], 1024);
    assert_eq!(v["thresholds"]["network_timeout_ms"], 3000);
    assert_eq!(v["python"]["min_version"], "3.7");
    assert_eq!(v["python"]["packages"]["wheel"], "0.37.0");
    assert_eq!(v["network"]["dns_host"], "python.org");
    assert!(v.get("config_path").is_none());
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn config_flag_wins_over_env_config_path() {
    let home = make_temp_home("config");
    let from_env = home.join("env.toml");
    let from_flag = home.join("flag.toml");
    write_file(&from_env, b"[thresholds]\nlatency_warn_ms = 111\n");
    write_file(&from_flag, b"[thresholds]\nlatency_warn_ms = 222\n");

    let out = base_cmd(&home)
        .env("PYDOCTOR_CONFIG", &from_env)
        .args(["--json", "--config"])
        .arg(&from_flag)
        .args(["config", "--show"])
        .output()
        .expect("run pydoctor");
    assert!(out.status.success());
    let v = json_stdout(&out);
    assert_eq!(v["thresholds"]["latency_warn_ms"], 222);
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn env_config_path_wins_over_default_location() {
    let home = make_temp_home("config");
    write_file(&config_path(&home), b"[network]\ndns_host = \"default.example\"\n");
    let from_env = home.join("env.toml");
    write_file(&from_env, b"[network]\ndns_host = \"env.example\"\n");

    let out = base_cmd(&home)
        .env("PYDOCTOR_CONFIG", &from_env)
        .args(["--json", "config", "--show"])
        .output()
        .expect("run pydoctor");
    assert!(out.status.success());
    let v = json_stdout(&out);
    assert_eq!(v["network"]["dns_host"], "env.example");
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn config_show_prints_toml_by_default() {
    let home = make_temp_home("config");
    write_file(&config_path(&home), b"[report]\nwrite_log = false\n");
    let out = run(&home, &["config", "--show"]);
    assert!(out.status.success());
    let text = String::from_utf8_lossy(&out.stdout);
    let parsed: toml::Value = toml::from_str(&text).expect("valid toml");
    assert_eq!(parsed["report"]["write_log"].as_bool(), Some(false));
    let _ = std::fs::remove_dir_all(&home);
}
