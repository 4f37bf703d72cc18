//! # uplink-transport
//!
//! アップリンク状態機械が依存する外部コラボレータの境界。
//!
//! 状態機械そのものは I/O を一切持たず、以下のトレイト経由でのみ外界に触れる。
//!
//! ```text
//! Transport      - バイトストリーム（TCP）の connect / available / read / write / stop
//! Resolver       - ホスト名 → IP アドレス
//! Clock          - 単調増加するミリ秒カウンタ
//! DeviceControl  - リセット・電源・スリープ・動作表示 LED
//! ```
//!
//! `connect` 以外はすべてノンブロッキングであることが前提。
//! `std` feature を有効にすると `std::net` ベースの実装が使える。

#![no_std]
extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod error;
#[cfg(feature = "std")]
pub mod host;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

use core::net::IpAddr;

pub use error::{ResolveError, TransportError};

/// HTTP の標準ポート
pub const DEFAULT_PORT: u16 = 80;

/// バイトストリーム型のトランスポート（TCP クライアント相当）
///
/// `connect` だけはブロッキングを許容する。それ以外のメソッドは
/// 既に手元にあるデータだけを扱い、呼び出し側の制御ループを止めてはならない。
pub trait Transport {
    /// サーバーへ接続する
    ///
    /// # エラー
    /// - 接続拒否・タイムアウトなど、接続が確立できなかった場合
    fn connect(&mut self, addr: IpAddr, port: u16) -> Result<(), TransportError>;

    /// 接続が生きているか
    ///
    /// 相手が切断していても未読データが残っている間は `true` を返す。
    fn connected(&mut self) -> bool;

    /// 今すぐ読めるバイト数
    fn available(&mut self) -> usize;

    /// 1 バイト読む。読めるデータがなければ `None`
    fn read(&mut self) -> Option<u8>;

    /// バイト列を 1 回の書き込みとして送信する
    ///
    /// 書き込み失敗はトランスポート側の責務で、呼び出し側には伝えない。
    fn write(&mut self, bytes: &[u8]);

    /// 接続を閉じる。未接続なら何もしない
    fn stop(&mut self);

    /// 自分側のアドレス（X-Forwarded-For に使う）
    fn local_addr(&self) -> Option<IpAddr> {
        None
    }
}

/// ホスト名の名前解決
pub trait Resolver {
    /// ホスト名を IP アドレスに解決する
    fn resolve(&mut self, host: &str) -> Result<IpAddr, ResolveError>;
}

/// 単調増加するミリ秒クロック
pub trait Clock {
    /// 現在時刻（ミリ秒）
    fn now_ms(&self) -> u64;
}

/// デバイス制御ケイパビリティ
///
/// ハードウェア依存の操作をコアから切り離すための境界。
/// `reset` 以外はデフォルトで何もしない。
pub trait DeviceControl {
    /// デバイスをリセットする
    ///
    /// 実機では戻らない。テスト用の実装は記録だけして戻ってよい。
    fn reset(&mut self, delay_ms: u32);

    /// トランスポート（NIC / 無線モジュール）の電源を切り替える
    fn set_transport_enabled(&mut self, enabled: bool) {
        let _ = enabled;
    }

    /// 低消費電力スリープ
    fn low_power_sleep(&mut self, duration_ms: u32) {
        let _ = duration_ms;
    }

    /// 接続中を示す動作表示（LED 等）
    fn set_activity(&mut self, on: bool) {
        let _ = on;
    }
}
