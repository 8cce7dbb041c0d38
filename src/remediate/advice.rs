//! Manual follow-up hints for findings the tool could not fix itself.

use std::net::IpAddr;

use crate::core::FinalStatus;
use crate::probes::Probe;

/// A one-line hint for an entry that ended in a fault, or for a slow network
/// target. `None` when there is nothing useful to add.
pub fn advice_for(probe: &Probe, final_status: FinalStatus) -> Option<String> {
    if final_status == FinalStatus::Warning {
        return match probe {
            Probe::Network { target } => Some(format!(
                "対処: {target} への遅延が大きいです。回線品質やプロキシ経由の通信を確認してください"
            )),
            _ => None,
        };
    }
    if !final_status.is_fault() {
        return None;
    }

    let hint = match probe {
        Probe::Interpreter => {
            "Python をインストールするか、python.interpreter / PYDOCTOR_PYTHON でインタプリタを指定してください".to_string()
        }
        Probe::Pip => "`python -m ensurepip --upgrade` を手動で実行してください".to_string(),
        Probe::Package { name, min_version } => {
            format!("`python -m pip install --upgrade \"{name}>={min_version}\"` を手動で実行してください")
        }
        Probe::SitePackages => {
            "site-packages がありません。Python の再インストールか仮想環境の作り直しを検討してください".to_string()
        }
        Probe::ScriptsOnPath => {
            "スクリプトディレクトリをシェル設定の PATH に追加してください".to_string()
        }
        Probe::Environment => "必須の環境変数をシェル設定に追加してください".to_string(),
        Probe::DiskSpace => "不要なファイルを削除してディスクの空き容量を確保してください".to_string(),
        Probe::Memory => "メモリを多く使っているアプリケーションを終了してください".to_string(),
        Probe::Cpu => "CPU 負荷の高いプロセスを確認してください".to_string(),
        Probe::Dns { .. } => {
            "DNS 設定を確認するか、代替の DNS サーバ（例: 8.8.8.8）を試してください".to_string()
        }
        Probe::Tls { host } => format!(
            "{host} との TLS 接続に失敗しました。システム時刻、証明書ストア、証明書を差し替えるプロキシの有無を確認してください"
        ),
        Probe::Network { target } if is_ip_target(target) => {
            format!("{target} に到達できません。物理的なネットワーク接続とルーターを確認してください")
        }
        Probe::Network { target } => format!(
            "{target} に到達できません。ファイアウォールやプロキシ設定で遮断されていないか確認してください"
        ),
    };
    Some(format!("対処: {hint}"))
}

fn is_ip_target(target: &str) -> bool {
    target
        .rsplit_once(':')
        .map(|(host, _)| host.trim_start_matches('[').trim_end_matches(']'))
        .is_some_and(|host| host.parse::<IpAddr>().is_ok())
}
