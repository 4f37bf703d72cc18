//! # uplink-proto
//!
//! フィード API のワイヤフォーマット定義。
//!
//! ## リクエスト
//!
//! 1 回のアップロードは PUT リクエスト 1 本で、ボディは持たない。
//! 測定値はクエリ文字列としてコンポーネント ID の直後に区切りなしで連結する。
//! 行区切りは LF のみ（サーバー側がこれを受け付ける前提で、形式はそのまま保つ）。
//!
//! ```text
//! PUT /api/feed?&api_key=<API_KEY>&compId=<COMPONENT_ID><PAYLOAD> HTTP/1.1
//! Host: <SERVER_IP>
//! Connection: close
//! X-Forwarded-For: <FORWARDED_FOR>
//! Content-Type: application/json
//!
//! ```
//!
//! ## レスポンス
//!
//! 解釈するのは最初の行（ステータス行）だけ。
//! `HTTP/1.1 200 OK` と完全一致すれば成功、それ以外はすべて失敗扱い。

#![no_std]
extern crate alloc;

pub mod request;
pub mod status;

use alloc::string::{String, ToString};
use core::net::IpAddr;

pub use request::PutRequest;
pub use status::{StatusLine, StatusScanner};

/// リクエスト行の先頭
pub const REQUEST_PREFIX: &str = "PUT /api/feed?&api_key=";
/// コンポーネント ID のフィールドマーカー
pub const COMPONENT_MARKER: &str = "&compId=";
/// リクエスト行の終わりと Host ヘッダー
pub const HOST_FIELD: &str = " HTTP/1.1\nHost: ";
/// Connection ヘッダーと X-Forwarded-For ヘッダー
pub const FORWARDED_FIELD: &str = "\nConnection: close\nX-Forwarded-For: ";
/// Content-Type ヘッダーと空行
pub const REQUEST_TERMINATOR: &str = "\nContent-Type: application/json\n\n";

/// 成功とみなすステータス行
pub const HTTP_OK_STATUS: &str = "HTTP/1.1 200 OK";

/// IP アドレスをヘッダー用のテキストにする（IPv4 はドット区切り 4 組）
pub fn ip_to_text(addr: IpAddr) -> String {
    addr.to_string()
}
