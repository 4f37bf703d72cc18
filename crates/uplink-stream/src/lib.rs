//! # uplink-stream
//!
//! 固定長バッファ上のパケット組み立てレイヤー
//!
//! HTTP リクエストのテキスト断片を 1 つの固定長バッファに追記していき、
//! バッファが一杯になったらその場でトランスポートへ書き出す。
//!
//! ## 設計の背景
//!
//! 送信側はメモリが数 KB しかないデバイスを想定しているため、
//! リクエスト全体を一度に組み立てることはできない。
//! 代わりに `PACKET_SIZE` バイトのバッファを使い回し、
//! 受信側から見て 1 本の連続したバイトストリームになるように書き出す。
//!
//! ```text
//! append("PUT /api/feed?&api_key=")  ─┐
//! append(api_key)                     ├─ バッファ（満杯で自動 flush）─→ Transport::write
//! append("&compId=") ...              │
//! flush()                            ─┘
//! ```

#![no_std]

pub mod packet;

pub use packet::PacketWriter;

/// 送信バッファのデフォルト容量（バイト、終端子の 1 バイトを含む）
pub const PACKET_SIZE: usize = 300;
