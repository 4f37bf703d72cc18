//! パケットライター実装

use tracing::trace;
use uplink_transport::Transport;

use crate::PACKET_SIZE;

/// バッファ末尾に置く終端子のプレースホルダ
///
/// 追記位置の管理にだけ使い、ワイヤには決して出さない。
const TERMINATOR: u8 = 0;

/// 固定長バッファを持つ追記専用ライター
///
/// `append()` ごとに「テキスト + 終端子」を論理的に追記する。
/// 次の `append()` は直前の終端子を上書きするので、連続した追記は
/// 区切りなしで連結される。
///
/// バッファが容量の 1 バイト手前まで埋まると、終端子を置いてその場で
/// `flush()` し、残りのテキストを空になったバッファへ書き続ける。
/// flush 境界をまたいだ値も、受信側では分割なしの書き込みと
/// バイト単位で一致する。
///
/// ## 不変条件
/// - `len <= N`
/// - `len > 0` のとき `buf[len - 1]` は終端子
pub struct PacketWriter<'a, T: Transport + ?Sized, const N: usize = PACKET_SIZE> {
    transport: &'a mut T,
    /// パケット本体
    buf: [u8; N],
    /// 保持しているバイト数（末尾の終端子を含む）。次の書き込み位置でもある
    len: usize,
    /// これまでに `Transport::write` した回数
    flushes: usize,
    /// これまでにワイヤへ出したバイト数
    total_sent: usize,
}

impl<'a, T: Transport + ?Sized, const N: usize> PacketWriter<'a, T, N> {
    const CAPACITY_OK: () = assert!(N >= 2, "packet buffer needs room for one byte and a terminator");

    /// 空のバッファでライターを生成する
    pub fn new(transport: &'a mut T) -> Self {
        let () = Self::CAPACITY_OK;
        PacketWriter {
            transport,
            buf: [0u8; N],
            len: 0,
            flushes: 0,
            total_sent: 0,
        }
    }

    /// テキストを追記する
    ///
    /// バッファが一杯になった時点で自動的に `flush()` する。
    /// 書き込み失敗はトランスポートの責務なので、この関数は失敗しない。
    pub fn append(&mut self, text: &str) {
        self.append_bytes(text.as_bytes());
    }

    /// バイト列を追記する（`append` の本体）
    pub fn append_bytes(&mut self, bytes: &[u8]) {
        // 直前の終端子を上書きする
        if self.len > 0 {
            self.len -= 1;
        }

        for &byte in bytes {
            self.buf[self.len] = byte;
            self.len += 1;

            // 残り 1 バイト: 終端子を置いて送信する
            if self.len >= N - 1 {
                self.buf[self.len] = TERMINATOR;
                self.len += 1;
                self.flush();
            }
        }

        self.buf[self.len] = TERMINATOR;
        self.len += 1;
    }

    /// 保持しているテキストを 1 回の書き込みとして送信し、バッファを空にする
    ///
    /// 空のバッファに対しては何もしない。
    /// 終端子しか残っていない場合はワイヤに出すものがないので書き込みを省く。
    pub fn flush(&mut self) {
        if self.len == 0 {
            return;
        }

        let text = &self.buf[..self.len - 1];
        if !text.is_empty() {
            trace!(len = text.len(), "flushing packet");
            self.transport.write(text);
            self.flushes += 1;
            self.total_sent += text.len();
        }
        self.len = 0;
    }

    /// 終端子を含めてバッファに保持しているバイト数
    pub fn buffered_len(&self) -> usize {
        self.len
    }

    /// バッファ容量
    pub const fn capacity(&self) -> usize {
        N
    }

    /// トランスポートへの書き込み回数（統計用）
    pub fn flush_count(&self) -> usize {
        self.flushes
    }

    /// ワイヤへ出した総バイト数（統計用）
    pub fn total_sent_bytes(&self) -> usize {
        self.total_sent
    }
}
