//! 状態機械が返すステータスコード

use serde::Serialize;

/// `submit()` の結果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmitOutcome {
    /// 受け付けた（アイドル状態だった）
    Accepted,
    /// 前のアップロードが処理中なので拒否した
    Busy,
}

/// `step()` の結果
///
/// `None` 以外の値は `last_status()` に残る。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UplinkStatus {
    /// 何も起きなかった
    #[default]
    None,
    /// `submit()` を受け付けた
    Accepted,
    /// `submit()` を拒否した
    Busy,
    /// リクエストを送り終えた
    SendComplete,
    /// 接続できなかった
    ConnectFailed,
    /// `HTTP/1.1 200 OK` を受信した
    HttpOk,
    /// それ以外のステータス行を受信した
    HttpOther,
    /// 応答待ちでタイムアウトした
    RecvTimeout,
    /// 相手が接続を閉じた
    Disconnecting,
    /// こちらの切断処理が終わった
    Disconnected,
    /// 連続エラーが上限に達し、リセットを要求した
    TooManyErrors,
}

impl UplinkStatus {
    /// 1 回のアップロードの最終結果を表すか
    ///
    /// 1 アップロードにつき、これらのうちちょうど 1 つが（最大で）返る。
    pub fn is_outcome(self) -> bool {
        matches!(
            self,
            UplinkStatus::ConnectFailed
                | UplinkStatus::HttpOk
                | UplinkStatus::HttpOther
                | UplinkStatus::RecvTimeout
        )
    }

    /// 連続エラーに数えられる結果か
    pub fn is_error(self) -> bool {
        matches!(
            self,
            UplinkStatus::ConnectFailed | UplinkStatus::HttpOther | UplinkStatus::RecvTimeout
        )
    }
}

impl From<SubmitOutcome> for UplinkStatus {
    fn from(outcome: SubmitOutcome) -> Self {
        match outcome {
            SubmitOutcome::Accepted => UplinkStatus::Accepted,
            SubmitOutcome::Busy => UplinkStatus::Busy,
        }
    }
}
