//! uplink-session エラー型
//!
//! 状態機械の実行中に起きる失敗（接続失敗・タイムアウトなど）は
//! エラーではなく `UplinkStatus` として数えて返す。
//! ここにあるのはセッションを開始できない場合のエラーだけ。

use alloc::string::String;

use thiserror::Error;
use uplink_transport::ResolveError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// サーバー名を解決できなかった
    #[error("DNS lookup for {host} failed")]
    Resolve {
        host: String,
        #[source]
        source: ResolveError,
    },

    /// 設定値が不正
    #[error("invalid {field}: {reason}")]
    InvalidConfig {
        field: &'static str,
        reason: &'static str,
    },
}
