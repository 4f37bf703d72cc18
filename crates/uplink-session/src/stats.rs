//! 送信統計

use serde::Serialize;

/// プロセス寿命の送信統計と、直近のアップロードの所要時間
///
/// 所要時間は対応するフェーズが完了した時点で更新される。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UplinkStats {
    /// `HTTP/1.1 200 OK` を受信した回数
    pub http_ok: u32,
    /// 前回の成功以降のエラー数（BUSY は含まない）
    pub consecutive_errors: u32,
    /// `submit()` が呼ばれた回数
    pub send_seq: u32,
    /// `submit()` を BUSY で拒否した回数
    pub send_busy: u32,
    /// 接続失敗の回数
    pub conn_fail: u32,
    /// 応答待ちタイムアウトの回数
    pub recv_timeout: u32,
    /// 200 以外のステータス行を受信した回数
    pub http_other: u32,
    /// 接続にかかった時間（ミリ秒）
    pub conn_time_ms: u64,
    /// 送信完了から最後の受信までの時間（ミリ秒）
    pub resp_time_ms: u64,
    /// 切断にかかった時間（ミリ秒）
    pub disc_time_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_json_fields() {
        let stats = UplinkStats {
            http_ok: 3,
            conn_time_ms: 42,
            ..UplinkStats::default()
        };
        let json = serde_json::to_string(&stats).unwrap();
        assert!(json.starts_with(r#"{"http_ok":3,"consecutive_errors":0,"#));
        assert!(json.contains(r#""conn_time_ms":42"#));
    }
}
