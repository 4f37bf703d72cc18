//! # uplink-session
//!
//! テレメトリ送信（アップリンク）のコア状態機械。
//!
//! ## 概要
//!
//! 呼び出し側は制御ループから `step()` を定期的に呼び、
//! 測定値ができたら `submit()` でアップロードを 1 件積む。
//! 同時に処理中にできるアップロードは 1 件だけ。
//!
//! - **接続**: `SENDING` の `step()` で 1 回だけブロッキング接続する
//! - **送信**: `PacketWriter` 経由で PUT リクエストを流し込み、最後に flush
//! - **受信**: ステータス行だけを判定し、残りは相手が閉じるまで読み捨てる
//! - **タイムアウト**: 最後の受信から `receive_timeout_ms` で自分から切断
//! - **エスカレーション**: 連続エラーが上限に達したらデバイスをリセット
//!
//! ## 状態遷移
//!
//! ```text
//! Idle ──submit()──→ Sending ──connect ok──→ AwaitingResponse ──peer close / timeout──→ Closing ──→ Idle
//!                       └──connect failed──→ Idle
//! ```

#![no_std]
extern crate alloc;

pub mod config;
pub mod error;
pub mod session;
pub mod stats;
pub mod status;

pub use config::{ForwardedFor, SessionConfig};
pub use error::SessionError;
pub use session::{Phase, UplinkSession};
pub use stats::UplinkStats;
pub use status::{SubmitOutcome, UplinkStatus};

/// 連続エラーの上限（これに達したらリセット）
pub const MAX_ERRORS: u32 = 5;

/// サーバー応答待ちのタイムアウト（ミリ秒）
pub const RECEIVE_TIMEOUT_MS: u64 = 8000;
