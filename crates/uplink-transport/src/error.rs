//! uplink-transport エラー型

use alloc::string::String;
use core::net::IpAddr;

use thiserror::Error;

/// トランスポート層のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// サーバーが接続を拒否した
    #[error("connection to {addr}:{port} refused")]
    Refused { addr: IpAddr, port: u16 },
    /// 接続がタイムアウトした
    #[error("connection to {addr}:{port} timed out")]
    TimedOut { addr: IpAddr, port: u16 },
    /// その他の接続失敗
    #[error("connection to {addr}:{port} failed: {reason}")]
    Connect {
        addr: IpAddr,
        port: u16,
        reason: String,
    },
    /// 接続先のアドレスがまだ解決されていない
    #[error("server address has not been resolved")]
    Unresolved,
}

/// 名前解決のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// リゾルバが失敗コードを返した
    #[error("lookup of {host} failed (code {code})")]
    Failed { host: String, code: i32 },
    /// 解決はできたがアドレスが 1 つもなかった
    #[error("lookup of {host} returned no address")]
    NoAddress { host: String },
}
