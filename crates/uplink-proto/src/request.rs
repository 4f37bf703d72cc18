//! PUT リクエストの組み立て

use alloc::string::String;

use uplink_stream::PacketWriter;
use uplink_transport::Transport;

use crate::{COMPONENT_MARKER, FORWARDED_FIELD, HOST_FIELD, REQUEST_PREFIX, REQUEST_TERMINATOR};

/// 1 回のアップロードで送るリクエストの各フィールド
///
/// 値はすべて借用で、組み立て時にコピーは発生しない。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PutRequest<'a> {
    pub api_key: &'a str,
    pub component_id: &'a str,
    /// クエリ文字列の続き（例: `&temp=21.5&vcc=3.31`）
    pub payload: &'a str,
    /// Host ヘッダーの値（解決済みサーバーアドレス）
    pub host: &'a str,
    /// X-Forwarded-For ヘッダーの値
    pub forwarded_for: &'a str,
}

impl<'a> PutRequest<'a> {
    /// ワイヤ上の順序どおりに並べた断片
    fn fragments(&self) -> [&'a str; 10] {
        [
            REQUEST_PREFIX,
            self.api_key,
            COMPONENT_MARKER,
            self.component_id,
            self.payload,
            HOST_FIELD,
            self.host,
            FORWARDED_FIELD,
            self.forwarded_for,
            REQUEST_TERMINATOR,
        ]
    }

    /// リクエストをライターへ流し込む
    ///
    /// 最後の `flush()` は呼び出し側の責務（送信完了時刻の記録と揃えるため）。
    pub fn write_to<T, const N: usize>(&self, writer: &mut PacketWriter<'_, T, N>)
    where
        T: Transport + ?Sized,
    {
        for fragment in self.fragments() {
            writer.append(fragment);
        }
    }

    /// ワイヤに出るのと同じテキスト（ログ・テスト用）
    pub fn render(&self) -> String {
        self.fragments().concat()
    }

    /// ワイヤに出るバイト数
    pub fn encoded_len(&self) -> usize {
        self.fragments().iter().map(|fragment| fragment.len()).sum()
    }
}
