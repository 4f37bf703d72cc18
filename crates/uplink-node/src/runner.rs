//! 測定値の送信ループ
//!
//! 1 件ずつ `submit()` し、アイドルに戻るまで一定間隔で `step()` を回す。
//! 結果はアップロードごとに 1 行の JSON として書き出す。

use std::io::{BufRead, Write};
use std::net::IpAddr;
use std::thread;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};
use uplink_session::{SessionError, SubmitOutcome, UplinkSession, UplinkStats, UplinkStatus};
use uplink_transport::{Clock, DeviceControl, Resolver, Transport};

use crate::config::NodeConfig;
use crate::error::NodeError;

/// 送信する測定値 1 件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reading {
    pub component_id: String,
    /// クエリ文字列の続き（`&name=value` の並び）
    pub payload: String,
}

impl Reading {
    /// 測定値を検証して生成する
    ///
    /// どちらの値もリクエスト行にそのまま入るので、空白は許さない。
    ///
    /// # エラー
    /// - コンポーネント ID が空、または空白・`&` を含む
    /// - ペイロードが `&` で始まらない、または空白を含む
    pub fn new(component_id: impl Into<String>, payload: impl Into<String>) -> Result<Self, NodeError> {
        let component_id = component_id.into();
        let payload = payload.into();

        let invalid = |reason: &str| {
            Err(NodeError::InvalidReading {
                reason: reason.into(),
            })
        };
        if component_id.is_empty() {
            return invalid("component id must not be empty");
        }
        if component_id.contains(|c: char| c.is_whitespace() || c == '&') {
            return invalid("component id must not contain whitespace or '&'");
        }
        if !payload.is_empty() && !payload.starts_with('&') {
            return invalid("payload must start with '&'");
        }
        if payload.contains(char::is_whitespace) {
            return invalid("payload must not contain whitespace");
        }

        Ok(Reading {
            component_id,
            payload,
        })
    }

    /// `<component-id> <payload>` 形式の 1 行を読む
    ///
    /// 空行と `#` で始まるコメント行は `Ok(None)`。
    pub fn parse_line(line: &str) -> Result<Option<Self>, NodeError> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }

        let (component_id, payload) = line
            .split_once(char::is_whitespace)
            .map_or((line, ""), |(id, rest)| (id, rest.trim()));
        Self::new(component_id, payload).map(Some)
    }
}

/// アップロード 1 件の結果（JSON で出力する）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadReport {
    pub seq: u32,
    pub component_id: String,
    /// 最終結果。ドライランなら `ACCEPTED`
    pub status: UplinkStatus,
    pub stats: UplinkStats,
}

/// セッションを所有して制御ループを回す
pub struct Runner<T, C, D> {
    session: UplinkSession<T, C, D>,
    step_interval: Duration,
    sleep_between_ms: u32,
}

impl<T: Transport, C: Clock, D: DeviceControl> Runner<T, C, D> {
    pub fn new(session: UplinkSession<T, C, D>, config: &NodeConfig) -> Self {
        Runner {
            session,
            step_interval: Duration::from_millis(config.step_interval_ms),
            sleep_between_ms: config.sleep_between_ms,
        }
    }

    /// トランスポートの電源を入れ、サーバー名を解決する
    ///
    /// 名前解決に失敗したらデバイスをリセットする（ホストではここで終了する）。
    /// ドライランではネットワークを使わないので警告だけ出して続行する。
    ///
    /// # 戻り値
    /// 解決したアドレス。ドライランで解決に失敗した場合は `None`
    pub fn start<R: Resolver + ?Sized>(&mut self, resolver: &mut R) -> Result<Option<IpAddr>, NodeError> {
        self.session.device_mut().set_transport_enabled(true);

        match self.session.begin(resolver) {
            Ok(addr) => Ok(Some(addr)),
            Err(err @ SessionError::Resolve { .. }) if self.session.config().dry_run => {
                warn!(error = %err, "DNS lookup failed, continuing in dry run");
                Ok(None)
            }
            Err(err @ SessionError::Resolve { .. }) => {
                let delay_ms = self.session.config().reset_delay_ms;
                self.session.device_mut().reset(delay_ms);
                Err(err.into())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// 測定値を 1 件送り、アイドルに戻るまで状態機械を回す
    ///
    /// 連続エラーでリセットを要求した場合は、その時点で打ち切る。
    pub fn upload(&mut self, reading: &Reading) -> UploadReport {
        let outcome = self
            .session
            .submit(reading.component_id.as_str(), reading.payload.as_str());
        let mut status = UplinkStatus::from(outcome);

        if outcome == SubmitOutcome::Accepted {
            while !self.session.is_idle() {
                let step = self.session.step();
                if step.is_outcome() || step == UplinkStatus::TooManyErrors {
                    status = step;
                }
                if step == UplinkStatus::TooManyErrors {
                    break;
                }
                if !self.session.is_idle() {
                    thread::sleep(self.step_interval);
                }
            }
        }

        let stats = self.session.stats().clone();
        info!(
            seq = stats.send_seq,
            component_id = reading.component_id.as_str(),
            status = ?status,
            "upload finished"
        );
        UploadReport {
            seq: stats.send_seq,
            component_id: reading.component_id.clone(),
            status,
            stats,
        }
    }

    /// 入力の各行を測定値として順に送る
    ///
    /// 不正な行は警告を出して読み飛ばす。
    ///
    /// # 戻り値
    /// 送信を試みた件数
    ///
    /// # エラー
    /// - 入力の読み込み、レポートの書き出しに失敗した場合
    pub fn run<B: BufRead, W: Write>(&mut self, input: B, out: &mut W) -> Result<usize, NodeError> {
        let mut uploads = 0;

        for (index, line) in input.lines().enumerate() {
            let line = line?;
            let reading = match Reading::parse_line(&line) {
                Ok(Some(reading)) => reading,
                Ok(None) => continue,
                Err(err) => {
                    warn!(line = index + 1, error = %err, "skipping reading");
                    continue;
                }
            };

            let report = self.upload(&reading);
            write_report(out, &report)?;
            uploads += 1;

            if report.status == UplinkStatus::TooManyErrors {
                warn!("device reset did not take effect, stopping");
                break;
            }
            if self.sleep_between_ms > 0 {
                self.session.device_mut().low_power_sleep(self.sleep_between_ms);
            }
        }

        Ok(uploads)
    }

    pub fn session(&self) -> &UplinkSession<T, C, D> {
        &self.session
    }
}

/// レポートを 1 行の JSON として書き出す
pub fn write_report<W: Write>(out: &mut W, report: &UploadReport) -> Result<(), NodeError> {
    serde_json::to_writer(&mut *out, report)?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use uplink_transport::mock::{ManualClock, MockTransport, RecordingDevice, StaticResolver};

    use super::*;

    type MockRunner = Runner<MockTransport, ManualClock, RecordingDevice>;

    fn node_config() -> NodeConfig {
        NodeConfig {
            server: "feed.example.com".into(),
            api_key: "KEY".into(),
            step_interval_ms: 1,
            ..NodeConfig::default()
        }
    }

    fn runner(config: &NodeConfig) -> (MockRunner, MockTransport, RecordingDevice) {
        let net = MockTransport::new();
        let device = RecordingDevice::new();
        let session = UplinkSession::new(
            config.session_config(),
            net.clone(),
            ManualClock::new(0),
            device.clone(),
        );
        (Runner::new(session, config), net, device)
    }

    #[rstest]
    #[case("node7 &t=21.5", Some(("node7", "&t=21.5")))]
    #[case("  node7\t&t=1&h=2  ", Some(("node7", "&t=1&h=2")))]
    #[case("node7", Some(("node7", "")))]
    #[case("", None)]
    #[case("# comment", None)]
    fn test_parse_line(#[case] line: &str, #[case] expected: Option<(&str, &str)>) {
        let parsed = Reading::parse_line(line).unwrap();
        let parsed = parsed
            .as_ref()
            .map(|r| (r.component_id.as_str(), r.payload.as_str()));
        assert_eq!(parsed, expected);
    }

    #[rstest]
    #[case("node7 t=21.5")]
    #[case("node7 &t=21.5 &h=3")]
    #[case("a&b &t=1")]
    fn test_parse_line_rejects(#[case] line: &str) {
        assert!(matches!(
            Reading::parse_line(line),
            Err(NodeError::InvalidReading { .. })
        ));
    }

    #[test]
    fn test_start_powers_transport_and_resolves() {
        let (mut runner, _, device) = runner(&node_config());
        let addr = runner
            .start(&mut StaticResolver::resolving_to(IpAddr::from([10, 1, 2, 3])))
            .unwrap();

        assert_eq!(addr, Some(IpAddr::from([10, 1, 2, 3])));
        assert_eq!(device.transport_enabled(), [true]);
        assert!(device.resets().is_empty());
    }

    #[test]
    fn test_start_resets_on_dns_failure() {
        let config = NodeConfig {
            reset_delay_ms: 250,
            ..node_config()
        };
        let (mut runner, _, device) = runner(&config);
        let err = runner.start(&mut StaticResolver::failing(-3)).unwrap_err();

        assert!(matches!(err, NodeError::Session(SessionError::Resolve { .. })));
        assert_eq!(device.resets(), [250]);
    }

    #[test]
    fn test_dry_run_tolerates_dns_failure() {
        let config = NodeConfig {
            dry_run: true,
            ..node_config()
        };
        let (mut runner, net, device) = runner(&config);
        assert_eq!(runner.start(&mut StaticResolver::failing(-3)).unwrap(), None);
        assert!(device.resets().is_empty());

        let report = runner.upload(&Reading::new("node7", "&t=1").unwrap());
        assert_eq!(report.status, UplinkStatus::Accepted);
        assert_eq!(report.seq, 1);
        assert!(net.connects().is_empty());
    }

    #[test]
    fn test_upload_reports_connect_failure() {
        let (mut runner, net, _) = runner(&node_config());
        runner
            .start(&mut StaticResolver::resolving_to(IpAddr::from([10, 1, 2, 3])))
            .unwrap();
        net.refuse_connections(true);

        let report = runner.upload(&Reading::new("node7", "&t=1").unwrap());
        assert_eq!(report.status, UplinkStatus::ConnectFailed);
        assert_eq!(report.stats.conn_fail, 1);
        assert!(runner.session().is_idle());
    }

    #[test]
    fn test_run_writes_json_lines_and_stops_after_reset() {
        let config = NodeConfig {
            max_errors: 1,
            sleep_between_ms: 30,
            ..node_config()
        };
        let (mut runner, net, device) = runner(&config);
        runner
            .start(&mut StaticResolver::resolving_to(IpAddr::from([10, 1, 2, 3])))
            .unwrap();
        net.refuse_connections(true);

        let input = "node1 &t=1\nnot valid\n\nnode2 &t=2\nnode3 &t=3\n";
        let mut out = Vec::new();
        let uploads = runner.run(Cursor::new(input), &mut out).unwrap();

        assert_eq!(uploads, 2);
        assert_eq!(device.resets(), [0]);
        assert_eq!(device.sleeps(), [30]);

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with(r#"{"seq":1,"component_id":"node1","status":"CONNECT_FAILED","#));
        assert!(lines[1].contains(r#""status":"TOO_MANY_ERRORS""#));
    }

    #[test]
    fn test_session_config_is_validated_by_start() {
        let config = NodeConfig {
            api_key: String::new(),
            ..node_config()
        };
        let (mut runner, _, device) = runner(&config);
        let err = runner
            .start(&mut StaticResolver::resolving_to(IpAddr::from([10, 1, 2, 3])))
            .unwrap_err();

        assert!(matches!(
            err,
            NodeError::Session(SessionError::InvalidConfig { field: "api_key", .. })
        ));
        assert!(device.resets().is_empty());
    }
}
