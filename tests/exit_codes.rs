mod common;

use common::{config_path, make_temp_home, run, write_file};

#[test]
fn completion_unknown_shell_exits_2() {
    let home = make_temp_home("exit");
    let out = run(&home, &["completion", "nope"]);
    assert_eq!(out.status.code(), Some(2));
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn completion_bash_exits_0() {
    let home = make_temp_home("exit");
    let out = run(&home, &["completion", "bash"]);
    assert_eq!(out.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&out.stdout).contains("pydoctor"));
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn unknown_flag_exits_2() {
    let home = make_temp_home("exit");
    let out = run(&home, &["--no-such-flag"]);
    assert_eq!(out.status.code(), Some(2));
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn zero_timeout_exits_2() {
    let home = make_temp_home("exit");
    let out = run(&home, &["--timeout", "0"]);
    assert_eq!(out.status.code(), Some(2));
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn inverted_threshold_bands_exit_2_before_probing() {
    let home = make_temp_home("exit");
    write_file(
        &config_path(&home),
        b"[thresholds]\ndisk_fault_mb = 500\ndisk_warn_mb = 100\n",
    );
    let out = run(&home, &["--no-log"]);
    assert_eq!(out.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("disk_warn_mb"), "stderr={stderr}");
    assert!(!home.join(".config/pydoctor/logs").exists());
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn malformed_toml_exits_2() {
    let home = make_temp_home("exit");
    write_file(&config_path(&home), b"[thresholds\n");
    let out = run(&home, &["config", "--show"]);
    assert_eq!(out.status.code(), Some(2));
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn missing_explicit_config_exits_2() {
    let home = make_temp_home("exit");
    let missing = home.join("nope.toml");
    let out = run(
        &home,
        &["--config", missing.to_str().expect("utf8 path"), "config", "--show"],
    );
    assert_eq!(out.status.code(), Some(2));
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn invalid_env_override_exits_2() {
    let home = make_temp_home("exit");
    let out = common::base_cmd(&home)
        .env("PYDOCTOR_MEM_FAULT_PCT", "lots")
        .args(["config", "--show"])
        .output()
        .expect("run pydoctor");
    assert_eq!(out.status.code(), Some(2));
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn unreadable_config_path_exits_2() {
    let home = make_temp_home("exit");
    let dir = home.join("config-dir");
    std::fs::create_dir_all(&dir).expect("mkdir");
    let out = run(
        &home,
        &["--config", dir.to_str().expect("utf8 path"), "config", "--show"],
    );
    assert_eq!(out.status.code(), Some(2));
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn misspelled_python_key_exits_2() {
    let home = make_temp_home("exit");
    write_file(
        &config_path(&home),
        b"[python]\ninterpeter = \"/opt/py/bin/python3\"\n",
    );
    let out = run(&home, &["config", "--show"]);
    assert_eq!(out.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("interpeter"), "stderr={stderr}");
    let _ = std::fs::remove_dir_all(&home);
}
