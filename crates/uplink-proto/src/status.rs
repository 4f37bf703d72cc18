//! ステータス行の判定
//!
//! 受信バイトを 1 つずつ食わせ、最初の行を固定長バッファに集める。
//! CR を見た時点、またはバッファが溢れた時点で 1 度だけ判定を返す。
//! 判定後のバイトは読み捨てる（呼び出し側は相手が閉じるまで吸い出し続ける）。

use crate::HTTP_OK_STATUS;

/// ステータス行バッファの容量
pub const STATUS_CAPACITY: usize = HTTP_OK_STATUS.len();

/// ステータス行の判定結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLine {
    /// `HTTP/1.1 200 OK`
    Ok,
    /// それ以外（途中で切れた行を含む）
    Other,
}

/// 受信ストリームからステータス行を取り出すスキャナ
///
/// `feed()` は呼び出しをまたいで状態を保つので、ステータス行が
/// 複数回の受信に分かれて届いても正しく判定できる。
#[derive(Debug, Clone)]
pub struct StatusScanner {
    buf: [u8; STATUS_CAPACITY],
    len: usize,
    resolved: Option<StatusLine>,
}

impl StatusScanner {
    pub const fn new() -> Self {
        StatusScanner {
            buf: [0u8; STATUS_CAPACITY],
            len: 0,
            resolved: None,
        }
    }

    /// 次のアップロードに備えて初期化する
    pub fn reset(&mut self) {
        self.len = 0;
        self.resolved = None;
    }

    /// 1 バイト食わせる
    ///
    /// # 戻り値
    /// - `Some(line)`: このバイトでステータス行が確定した（アップロードごとに 1 回だけ）
    /// - `None`: まだ確定していない、または確定済みで読み捨てた
    pub fn feed(&mut self, byte: u8) -> Option<StatusLine> {
        if self.resolved.is_some() {
            return None;
        }

        let line = if byte == b'\r' {
            if self.collected() == HTTP_OK_STATUS.as_bytes() {
                StatusLine::Ok
            } else {
                StatusLine::Other
            }
        } else if self.len == STATUS_CAPACITY {
            // 容量を超える行は途中で切れているので成功とはみなさない
            StatusLine::Other
        } else {
            self.buf[self.len] = byte;
            self.len += 1;
            return None;
        };

        self.resolved = Some(line);
        Some(line)
    }

    /// 確定済みの判定
    pub fn resolved(&self) -> Option<StatusLine> {
        self.resolved
    }

    /// これまでに集めたステータス行のテキスト
    pub fn collected(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

impl Default for StatusScanner {
    fn default() -> Self {
        Self::new()
    }
}
