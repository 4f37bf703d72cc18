//! セッション設定

use alloc::string::String;

use serde::{Deserialize, Serialize};
use uplink_transport::DEFAULT_PORT;

use crate::error::SessionError;
use crate::{MAX_ERRORS, RECEIVE_TIMEOUT_MS};

/// X-Forwarded-For ヘッダーに入れる値
///
/// 過去の版ではローカル IP とコンポーネント ID のどちらを送るかが揺れていたので、
/// 設定で選べるようにしている。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForwardedFor {
    /// トランスポートのローカルアドレス
    #[default]
    LocalAddress,
    /// 送信するコンポーネント ID
    ComponentId,
    /// 固定値
    Fixed(String),
}

/// アップリンクセッションの設定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// フィード API サーバーのホスト名
    pub server_name: String,
    /// API キー（クエリ文字列にそのまま入る）
    pub api_key: String,
    pub port: u16,
    /// 最後の受信からこの時間何も来なければ切断する（ミリ秒）
    pub receive_timeout_ms: u64,
    /// 連続エラーがこの回数に達したらリセット
    pub max_errors: u32,
    pub forwarded_for: ForwardedFor,
    /// 送信せずにログだけ出す
    pub dry_run: bool,
    /// リセット前に待つ時間（ミリ秒）
    pub reset_delay_ms: u32,
}

impl SessionConfig {
    /// 必須項目だけ指定して、残りはデフォルト値で生成する
    pub fn new(server_name: impl Into<String>, api_key: impl Into<String>) -> Self {
        SessionConfig {
            server_name: server_name.into(),
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    /// 設定値を検証する
    ///
    /// # エラー
    /// - サーバー名・API キーが空
    /// - ポート・タイムアウト・エラー上限が 0
    pub fn validate(&self) -> Result<(), SessionError> {
        let invalid = |field, reason| Err(SessionError::InvalidConfig { field, reason });

        if self.server_name.trim().is_empty() {
            return invalid("server_name", "must not be empty");
        }
        if self.api_key.trim().is_empty() {
            return invalid("api_key", "must not be empty");
        }
        if self.port == 0 {
            return invalid("port", "must be non-zero");
        }
        if self.receive_timeout_ms == 0 {
            return invalid("receive_timeout_ms", "must be non-zero");
        }
        if self.max_errors == 0 {
            return invalid("max_errors", "must be at least 1");
        }
        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            server_name: String::new(),
            api_key: String::new(),
            port: DEFAULT_PORT,
            receive_timeout_ms: RECEIVE_TIMEOUT_MS,
            max_errors: MAX_ERRORS,
            forwarded_for: ForwardedFor::default(),
            dry_run: false,
            reset_delay_ms: 0,
        }
    }
}
