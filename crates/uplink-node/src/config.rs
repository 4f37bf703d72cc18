//! ノード設定の読み込み
//!
//! 優先順位（後勝ち）:
//!
//! ```text
//! 既定値 < TOML ファイル (uplink.toml) < 環境変数 (UPLINK_*) < CLI フラグ
//! ```
//!
//! CLI フラグの上書きはバイナリ側で行う。

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use uplink_session::{ForwardedFor, SessionConfig};

use crate::error::NodeError;

/// `--config` 未指定時に読む設定ファイル
pub const DEFAULT_CONFIG_FILE: &str = "uplink.toml";

/// 環境変数のプレフィックス（例: `UPLINK_API_KEY`）
pub const ENV_PREFIX: &str = "UPLINK_";

/// ノード設定（フラットな TOML テーブル）
///
/// ```toml
/// server  = "feed.example.com"
/// api_key = "0a1b2c3d-..."
/// receive_timeout_ms = 8000
/// forwarded_for = "component_id"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// フィード API サーバーのホスト名
    pub server: String,
    pub api_key: String,
    pub port: u16,
    pub receive_timeout_ms: u64,
    pub max_errors: u32,
    pub forwarded_for: ForwardedFor,
    pub dry_run: bool,
    pub reset_delay_ms: u32,
    /// `step()` を呼ぶ間隔（ミリ秒）
    pub step_interval_ms: u64,
    /// TCP 接続のタイムアウト（ミリ秒）
    pub connect_timeout_ms: u64,
    /// `run` で測定値の間に入れる低消費電力スリープ（ミリ秒、0 なら無し）
    pub sleep_between_ms: u32,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let session = SessionConfig::default();
        NodeConfig {
            server: session.server_name,
            api_key: session.api_key,
            port: session.port,
            receive_timeout_ms: session.receive_timeout_ms,
            max_errors: session.max_errors,
            forwarded_for: session.forwarded_for,
            dry_run: session.dry_run,
            reset_delay_ms: session.reset_delay_ms,
            step_interval_ms: 50,
            connect_timeout_ms: 5_000,
            sleep_between_ms: 0,
        }
    }
}

impl NodeConfig {
    /// 既定値・設定ファイル・環境変数を重ねて読み込む
    ///
    /// ファイルが存在しなければ単に読み飛ばす。
    ///
    /// # エラー
    /// - TOML の構文エラー、型の合わない値
    pub fn load(path: Option<&Path>) -> Result<Self, NodeError> {
        let path = path.map_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE), Path::to_path_buf);

        let config: NodeConfig = Figment::new()
            .merge(Serialized::defaults(NodeConfig::default()))
            .merge(Toml::file(&path))
            .merge(Env::prefixed(ENV_PREFIX))
            .extract()?;

        tracing::debug!(path = %path.display(), server = config.server.as_str(), "config loaded");
        Ok(config)
    }

    /// コアのセッション設定を取り出す
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            server_name: self.server.clone(),
            api_key: self.api_key.clone(),
            port: self.port,
            receive_timeout_ms: self.receive_timeout_ms,
            max_errors: self.max_errors,
            forwarded_for: self.forwarded_for.clone(),
            dry_run: self.dry_run,
            reset_delay_ms: self.reset_delay_ms,
        }
    }

    /// 設定値を検証する
    ///
    /// # エラー
    /// - セッション設定の検証エラー（`NodeError::Session`）
    /// - ホスト側の間隔・タイムアウトが 0
    pub fn validate(&self) -> Result<(), NodeError> {
        self.session_config().validate()?;

        if self.step_interval_ms == 0 {
            return Err(NodeError::Validation {
                field: "step_interval_ms".into(),
                reason: "must be non-zero".into(),
            });
        }
        if self.connect_timeout_ms == 0 {
            return Err(NodeError::Validation {
                field: "connect_timeout_ms".into(),
                reason: "must be non-zero".into(),
            });
        }
        Ok(())
    }
}
