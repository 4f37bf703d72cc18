//! アップリンク状態機械
//!
//! 接続のライフサイクル、リクエストの送信、ステータス行の判定、
//! 応答待ちタイムアウト、連続エラーのエスカレーションを担当する。
//! 実際の I/O はすべて注入されたトランスポートが行う。

use alloc::string::String;
use core::net::{IpAddr, Ipv4Addr};

use tracing::{debug, error, info, warn};
use uplink_proto::{ip_to_text, PutRequest, StatusLine, StatusScanner};
use uplink_stream::{PacketWriter, PACKET_SIZE};
use uplink_transport::{Clock, DeviceControl, Resolver, Transport, TransportError};

use crate::config::{ForwardedFor, SessionConfig};
use crate::error::SessionError;
use crate::stats::UplinkStats;
use crate::status::{SubmitOutcome, UplinkStatus};

/// 接続ライフサイクルのフェーズ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// 次の `submit()` 待ち
    Idle,
    /// 次の `step()` で接続して送信する
    Sending,
    /// ステータス行の受信・読み捨て中
    AwaitingResponse,
    /// 次の `step()` で切断する
    Closing,
}

/// 送信待ちのアップロード（`Sending` に入った時点で消費される）
#[derive(Debug)]
struct UplinkRequest {
    component_id: String,
    payload: String,
}

/// 解決済みのサーバーアドレス
#[derive(Debug)]
struct ServerAddress {
    addr: IpAddr,
    /// Host ヘッダー用のテキスト
    text: String,
}

/// 1 回のアップロードの各フェーズの時刻（ミリ秒）
#[derive(Debug, Clone, Copy, Default)]
struct Timestamps {
    connect_start: u64,
    connected: u64,
    request_complete: u64,
    /// 最後に受信した時刻。受信前は送信完了時刻
    last_packet: u64,
    disconnecting: u64,
    disconnected: u64,
}

/// アップリンクセッション
///
/// 呼び出し側が所有し、制御ループから `step()` を呼び続ける。
/// トランスポートは `Sending` から `Closing` までこのセッションが占有し、外には出さない。
///
/// ## 使い方
///
/// ```text
/// session.begin(&mut resolver)?;       // 起動時に 1 回
/// loop {
///     if reading_ready { session.submit("node7", "&t=21.5"); }
///     session.step();                  // ブロックしない
/// }
/// ```
pub struct UplinkSession<T, C, D> {
    config: SessionConfig,
    transport: T,
    clock: C,
    device: D,
    phase: Phase,
    request: Option<UplinkRequest>,
    server: Option<ServerAddress>,
    scanner: StatusScanner,
    times: Timestamps,
    stats: UplinkStats,
    last_status: UplinkStatus,
}

impl<T: Transport, C: Clock, D: DeviceControl> UplinkSession<T, C, D> {
    /// 新しいセッションを生成する（アイドル状態）
    ///
    /// サーバー名の解決は `begin()` で行う。
    pub fn new(config: SessionConfig, transport: T, clock: C, device: D) -> Self {
        UplinkSession {
            config,
            transport,
            clock,
            device,
            phase: Phase::Idle,
            request: None,
            server: None,
            scanner: StatusScanner::new(),
            times: Timestamps::default(),
            stats: UplinkStats::default(),
            last_status: UplinkStatus::None,
        }
    }

    /// 設定を検証し、サーバー名を解決する
    ///
    /// # エラー
    /// - `SessionError::InvalidConfig`: 設定値が不正
    /// - `SessionError::Resolve`: 名前解決に失敗（呼び出し側はリセットするのが普通）
    pub fn begin<R: Resolver + ?Sized>(&mut self, resolver: &mut R) -> Result<IpAddr, SessionError> {
        self.config.validate()?;

        let host = self.config.server_name.as_str();
        match resolver.resolve(host) {
            Ok(addr) => {
                info!(server = host, %addr, "server resolved");
                self.set_server_addr(addr);
                Ok(addr)
            }
            Err(source) => {
                warn!(server = host, error = %source, "DNS lookup failed");
                Err(SessionError::Resolve {
                    host: String::from(host),
                    source,
                })
            }
        }
    }

    /// 接続先アドレスを直接設定する
    pub fn set_server_addr(&mut self, addr: IpAddr) {
        self.server = Some(ServerAddress {
            addr,
            text: ip_to_text(addr),
        });
    }

    /// アップロードを 1 件積む
    ///
    /// アイドル状態なら受け付けて次の `step()` で送信する。
    /// 処理中なら BUSY を返し、処理中のアップロードには触れない。
    /// BUSY は呼び出しタイミングの問題なので連続エラーには数えない。
    pub fn submit(
        &mut self,
        component_id: impl Into<String>,
        payload: impl Into<String>,
    ) -> SubmitOutcome {
        let component_id = component_id.into();
        let payload = payload.into();
        self.stats.send_seq = self.stats.send_seq.wrapping_add(1);

        let outcome = if self.config.dry_run {
            info!(
                seq = self.stats.send_seq,
                component_id = component_id.as_str(),
                payload = payload.as_str(),
                "dry run, reading not sent"
            );
            SubmitOutcome::Accepted
        } else if self.phase == Phase::Idle {
            debug!(seq = self.stats.send_seq, component_id = component_id.as_str(), "upload accepted");
            self.request = Some(UplinkRequest {
                component_id,
                payload,
            });
            self.phase = Phase::Sending;
            SubmitOutcome::Accepted
        } else {
            self.stats.send_busy = self.stats.send_busy.wrapping_add(1);
            warn!(seq = self.stats.send_seq, phase = ?self.phase, "uplink busy, reading rejected");
            SubmitOutcome::Busy
        };

        self.last_status = outcome.into();
        outcome
    }

    /// 状態機械を 1 歩進める
    ///
    /// ブロックするのは `Sending` での接続だけ。
    /// 連続エラーが上限に達していれば、状態機械を動かす前にデバイスをリセットする。
    pub fn step(&mut self) -> UplinkStatus {
        if self.stats.consecutive_errors >= self.config.max_errors {
            error!(
                consecutive_errors = self.stats.consecutive_errors,
                delay_ms = self.config.reset_delay_ms,
                "too many network errors, resetting"
            );
            self.device.reset(self.config.reset_delay_ms);
            self.last_status = UplinkStatus::TooManyErrors;
            return UplinkStatus::TooManyErrors;
        }

        let status = match self.phase {
            Phase::Idle => UplinkStatus::None,
            Phase::Sending => self.step_sending(),
            Phase::AwaitingResponse => self.step_receiving(),
            Phase::Closing => self.step_closing(),
        };

        if status != UplinkStatus::None {
            self.last_status = status;
        }
        status
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_idle(&self) -> bool {
        self.phase == Phase::Idle
    }

    /// 直近の `None` 以外のステータス（`submit()` の結果を含む）
    pub fn last_status(&self) -> UplinkStatus {
        self.last_status
    }

    pub fn stats(&self) -> &UplinkStats {
        &self.stats
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// `begin()` で解決したサーバーアドレス
    pub fn server_addr(&self) -> Option<IpAddr> {
        self.server.as_ref().map(|server| server.addr)
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// スリープや電源制御のためにデバイスを借りる
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    // ===== Private メソッド =====

    fn step_sending(&mut self) -> UplinkStatus {
        let Some(request) = self.request.take() else {
            // submit() を経ずに Sending になることはない
            self.phase = Phase::Idle;
            return UplinkStatus::None;
        };

        match self.transmit(&request) {
            Ok(()) => {
                // 応答待ちタイムアウトの起点
                self.times.last_packet = self.times.request_complete;
                self.scanner.reset();
                self.phase = Phase::AwaitingResponse;
                UplinkStatus::SendComplete
            }
            Err(e) => {
                warn!(error = %e, conn_time_ms = self.stats.conn_time_ms, "connect failed");
                self.stats.conn_fail = self.stats.conn_fail.wrapping_add(1);
                self.stats.consecutive_errors = self.stats.consecutive_errors.saturating_add(1);
                self.phase = Phase::Idle;
                UplinkStatus::ConnectFailed
            }
        }
    }

    /// 接続してリクエストを送り切る
    ///
    /// 接続に失敗した場合はライターに一切触れない。
    fn transmit(&mut self, request: &UplinkRequest) -> Result<(), TransportError> {
        let Some(server) = self.server.as_ref() else {
            return Err(TransportError::Unresolved);
        };
        let port = self.config.port;

        self.times.connect_start = self.clock.now_ms();
        info!(addr = %server.addr, port, "connecting");
        self.device.set_activity(true);

        let connected = self.transport.connect(server.addr, port);
        self.times.connected = self.clock.now_ms();
        self.stats.conn_time_ms = self.times.connected.saturating_sub(self.times.connect_start);
        if let Err(e) = connected {
            self.device.set_activity(false);
            return Err(e);
        }
        debug!(conn_time_ms = self.stats.conn_time_ms, "connected");

        let forwarded_for = self.forwarded_for(request);
        let put = PutRequest {
            api_key: &self.config.api_key,
            component_id: &request.component_id,
            payload: &request.payload,
            host: &server.text,
            forwarded_for: &forwarded_for,
        };

        let mut writer = PacketWriter::<T, PACKET_SIZE>::new(&mut self.transport);
        put.write_to(&mut writer);
        writer.flush();
        let packets = writer.flush_count();

        self.times.request_complete = self.clock.now_ms();
        info!(
            payload_len = request.payload.len(),
            request_len = put.encoded_len(),
            packets,
            "PUT complete"
        );
        Ok(())
    }

    fn forwarded_for(&self, request: &UplinkRequest) -> String {
        match &self.config.forwarded_for {
            ForwardedFor::LocalAddress => {
                let local = self
                    .transport
                    .local_addr()
                    .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
                ip_to_text(local)
            }
            ForwardedFor::ComponentId => request.component_id.clone(),
            ForwardedFor::Fixed(value) => value.clone(),
        }
    }

    fn step_receiving(&mut self) -> UplinkStatus {
        if !self.transport.connected() {
            debug!("server closed the connection");
            self.phase = Phase::Closing;
            return UplinkStatus::Disconnecting;
        }

        let pending = self.transport.available();
        if pending > 0 {
            self.times.last_packet = self.clock.now_ms();
            debug!(len = pending, "received packet");

            let mut status = UplinkStatus::None;
            for _ in 0..pending {
                let Some(byte) = self.transport.read() else {
                    break;
                };
                // ステータス確定後のバイトは feed() が読み捨てる
                if let Some(line) = self.scanner.feed(byte) {
                    status = self.record_status_line(line);
                }
            }
            return status;
        }

        let now = self.clock.now_ms();
        if now.saturating_sub(self.times.last_packet) >= self.config.receive_timeout_ms {
            self.times.last_packet = now;
            warn!(timeout_ms = self.config.receive_timeout_ms, "receive timeout");
            self.transport.stop();
            self.device.set_activity(false);
            self.phase = Phase::Closing;
            self.stats.recv_timeout = self.stats.recv_timeout.wrapping_add(1);
            self.stats.consecutive_errors = self.stats.consecutive_errors.saturating_add(1);
            return UplinkStatus::RecvTimeout;
        }

        UplinkStatus::None
    }

    fn record_status_line(&mut self, line: StatusLine) -> UplinkStatus {
        match line {
            StatusLine::Ok => {
                self.stats.http_ok = self.stats.http_ok.wrapping_add(1);
                self.stats.consecutive_errors = 0;
                info!(http_ok = self.stats.http_ok, "HTTP OK");
                UplinkStatus::HttpOk
            }
            StatusLine::Other => {
                self.stats.http_other = self.stats.http_other.wrapping_add(1);
                self.stats.consecutive_errors = self.stats.consecutive_errors.saturating_add(1);
                warn!(
                    status = %String::from_utf8_lossy(self.scanner.collected()),
                    consecutive_errors = self.stats.consecutive_errors,
                    "unexpected HTTP status"
                );
                UplinkStatus::HttpOther
            }
        }
    }

    fn step_closing(&mut self) -> UplinkStatus {
        self.times.disconnecting = self.clock.now_ms();
        debug!("disconnecting");
        self.transport.stop();
        self.device.set_activity(false);
        self.times.disconnected = self.clock.now_ms();

        self.stats.resp_time_ms = self
            .times
            .last_packet
            .saturating_sub(self.times.request_complete);
        self.stats.disc_time_ms = self
            .times
            .disconnected
            .saturating_sub(self.times.disconnecting);
        info!(
            resp_time_ms = self.stats.resp_time_ms,
            disc_time_ms = self.stats.disc_time_ms,
            "disconnected"
        );

        self.phase = Phase::Idle;
        UplinkStatus::Disconnected
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use uplink_transport::mock::{ManualClock, MockTransport, RecordingDevice, StaticResolver};

    use super::*;

    const SERVER: [u8; 4] = [173, 236, 12, 34];

    type TestSession = UplinkSession<MockTransport, ManualClock, RecordingDevice>;

    fn session_with(config: SessionConfig) -> (TestSession, MockTransport, ManualClock) {
        let net = MockTransport::new();
        net.set_local_addr(IpAddr::from([192, 168, 0, 77]));
        let clock = ManualClock::new(1_000);
        let mut session = UplinkSession::new(config, net.clone(), clock.clone(), RecordingDevice::new());
        session
            .begin(&mut StaticResolver::resolving_to(IpAddr::from(SERVER)))
            .unwrap();
        (session, net, clock)
    }

    fn session() -> (TestSession, MockTransport, ManualClock) {
        session_with(SessionConfig::new("feed.example.com", "KEY"))
    }

    #[test]
    fn test_new_session_is_idle() {
        let (mut session, net, _) = session();
        assert_eq!(session.phase(), Phase::Idle);
        assert_eq!(session.step(), UplinkStatus::None);
        assert_eq!(session.last_status(), UplinkStatus::None);
        assert!(net.connects().is_empty());
    }

    #[test]
    fn test_submit_while_idle_is_accepted() {
        let (mut session, _, _) = session();
        assert_eq!(session.submit("node7", "&t=1"), SubmitOutcome::Accepted);
        assert_eq!(session.phase(), Phase::Sending);
        assert_eq!(session.stats().send_seq, 1);
        assert_eq!(session.last_status(), UplinkStatus::Accepted);
    }

    #[test]
    fn test_submit_while_busy_keeps_in_flight_request() {
        let (mut session, net, _) = session();
        session.submit("first", "&a=1");
        assert_eq!(session.submit("second", "&b=2"), SubmitOutcome::Busy);
        assert_eq!(session.stats().send_busy, 1);
        assert_eq!(session.stats().consecutive_errors, 0);
        assert_eq!(session.last_status(), UplinkStatus::Busy);

        assert_eq!(session.step(), UplinkStatus::SendComplete);
        let wire = String::from_utf8(net.written()).unwrap();
        assert!(wire.contains("&compId=first&a=1 HTTP/1.1"));
        assert!(!wire.contains("second"));
    }

    #[test]
    fn test_send_writes_full_request() {
        let (mut session, net, _) = session();
        session.submit("node7", "&t=21.5");
        assert_eq!(session.step(), UplinkStatus::SendComplete);
        assert_eq!(session.phase(), Phase::AwaitingResponse);

        assert_eq!(net.connects(), [(IpAddr::from(SERVER), 80)]);
        let expected = "PUT /api/feed?&api_key=KEY&compId=node7&t=21.5 HTTP/1.1\n\
                        Host: 173.236.12.34\n\
                        Connection: close\n\
                        X-Forwarded-For: 192.168.0.77\n\
                        Content-Type: application/json\n\n";
        assert_eq!(String::from_utf8(net.written()).unwrap(), expected);
    }

    #[test]
    fn test_forwarded_for_policies() {
        let mut config = SessionConfig::new("feed.example.com", "KEY");
        config.forwarded_for = ForwardedFor::ComponentId;
        let (mut session, net, _) = session_with(config);
        session.submit("node7", "");
        session.step();
        let wire = String::from_utf8(net.written()).unwrap();
        assert!(wire.contains("X-Forwarded-For: node7\n"));

        let mut config = SessionConfig::new("feed.example.com", "KEY");
        config.forwarded_for = ForwardedFor::Fixed("10.9.8.7".into());
        let (mut session, net, _) = session_with(config);
        session.submit("node7", "");
        session.step();
        let wire = String::from_utf8(net.written()).unwrap();
        assert!(wire.contains("X-Forwarded-For: 10.9.8.7\n"));
    }

    #[test]
    fn test_connect_failure_returns_to_idle() {
        let (mut session, net, _) = session();
        net.refuse_connections(true);
        session.submit("node7", "&t=1");

        assert_eq!(session.step(), UplinkStatus::ConnectFailed);
        assert_eq!(session.phase(), Phase::Idle);
        assert_eq!(session.stats().conn_fail, 1);
        assert_eq!(session.stats().consecutive_errors, 1);
        // 接続失敗時はライターに触れない
        assert!(net.writes().is_empty());
        assert_eq!(session.device().activity(), [true, false]);
    }

    #[test]
    fn test_http_ok_resets_consecutive_errors() {
        let (mut session, net, _) = session();
        net.refuse_connections(true);
        session.submit("node7", "&t=1");
        session.step();
        assert_eq!(session.stats().consecutive_errors, 1);

        net.refuse_connections(false);
        session.submit("node7", "&t=1");
        session.step();
        net.push_incoming(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n");
        assert_eq!(session.step(), UplinkStatus::HttpOk);
        assert_eq!(session.stats().http_ok, 1);
        assert_eq!(session.stats().consecutive_errors, 0);
        // 残りのバイトも読み捨て済み
        assert_eq!(net.unread(), 0);
    }

    #[test]
    fn test_non_200_counts_as_error() {
        let (mut session, net, _) = session();
        session.submit("node7", "&t=1");
        session.step();
        net.push_incoming(b"HTTP/1.1 404 Not Found\r\n\r\n");

        assert_eq!(session.step(), UplinkStatus::HttpOther);
        assert_eq!(session.stats().http_other, 1);
        assert_eq!(session.stats().consecutive_errors, 1);
        assert_eq!(session.phase(), Phase::AwaitingResponse);
    }

    #[test]
    fn test_status_line_split_across_steps() {
        let (mut session, net, _) = session();
        session.submit("node7", "&t=1");
        session.step();

        net.push_incoming(b"HTTP/1.1 2");
        assert_eq!(session.step(), UplinkStatus::None);
        net.push_incoming(b"00 OK\r\n");
        assert_eq!(session.step(), UplinkStatus::HttpOk);
        // 確定後の受信は判定しない
        net.push_incoming(b"HTTP/1.1 500 Oops\r\n");
        assert_eq!(session.step(), UplinkStatus::None);
        assert_eq!(session.stats().http_other, 0);
    }

    #[test]
    fn test_receive_timeout_closes_connection() {
        let (mut session, net, clock) = session();
        session.submit("node7", "&t=1");
        session.step();

        clock.advance(7_999);
        assert_eq!(session.step(), UplinkStatus::None);
        clock.advance(1);
        assert_eq!(session.step(), UplinkStatus::RecvTimeout);
        assert!(!net.is_open());
        assert_eq!(session.phase(), Phase::Closing);
        assert_eq!(session.stats().recv_timeout, 1);
        assert_eq!(session.stats().consecutive_errors, 1);

        assert_eq!(session.step(), UplinkStatus::Disconnected);
        assert!(session.is_idle());
        assert_eq!(session.stats().resp_time_ms, 8_000);
    }

    #[test]
    fn test_timeout_restarts_on_received_bytes() {
        let (mut session, net, clock) = session();
        session.submit("node7", "&t=1");
        session.step();

        clock.advance(5_000);
        net.push_incoming(b"HTTP/1.1 ");
        assert_eq!(session.step(), UplinkStatus::None);

        clock.advance(5_000);
        assert_eq!(session.step(), UplinkStatus::None);
        clock.advance(3_000);
        assert_eq!(session.step(), UplinkStatus::RecvTimeout);
    }

    #[test]
    fn test_peer_close_then_disconnect_records_durations() {
        let (mut session, net, clock) = session();
        session.submit("node7", "&t=1");
        session.step();

        clock.advance(120);
        net.push_incoming(b"HTTP/1.1 200 OK\r\n\r\n");
        assert_eq!(session.step(), UplinkStatus::HttpOk);

        net.close_from_peer();
        assert_eq!(session.step(), UplinkStatus::Disconnecting);
        assert_eq!(session.step(), UplinkStatus::Disconnected);
        assert!(session.is_idle());
        assert_eq!(session.last_status(), UplinkStatus::Disconnected);
        assert_eq!(session.stats().resp_time_ms, 120);
        assert_eq!(session.stats().disc_time_ms, 0);
        assert_eq!(net.stop_count(), 1);
        assert_eq!(session.device().activity(), [true, false]);
    }

    #[test]
    fn test_escalation_resets_device_before_state_logic() {
        let mut config = SessionConfig::new("feed.example.com", "KEY");
        config.max_errors = 2;
        config.reset_delay_ms = 1_500;
        let (mut session, net, _) = session_with(config);
        net.refuse_connections(true);

        for _ in 0..2 {
            session.submit("node7", "&t=1");
            assert_eq!(session.step(), UplinkStatus::ConnectFailed);
        }
        assert!(session.device().resets().is_empty());

        session.submit("node7", "&t=1");
        assert_eq!(session.step(), UplinkStatus::TooManyErrors);
        assert_eq!(session.device().resets(), [1_500]);
        // 状態機械は動いていない
        assert_eq!(session.phase(), Phase::Sending);
        assert_eq!(net.connects().len(), 2);
    }

    #[test]
    fn test_dry_run_accepts_without_network() {
        let mut config = SessionConfig::new("feed.example.com", "KEY");
        config.dry_run = true;
        let (mut session, net, _) = session_with(config);

        assert_eq!(session.submit("node7", "&t=1"), SubmitOutcome::Accepted);
        assert_eq!(session.submit("node7", "&t=2"), SubmitOutcome::Accepted);
        assert!(session.is_idle());
        assert_eq!(session.step(), UplinkStatus::None);
        assert_eq!(session.stats().send_seq, 2);
        assert!(net.connects().is_empty());
    }

    #[test]
    fn test_begin_reports_resolver_failure() {
        let mut session = UplinkSession::new(
            SessionConfig::new("feed.example.com", "KEY"),
            MockTransport::new(),
            ManualClock::new(0),
            RecordingDevice::new(),
        );
        let mut resolver = StaticResolver::failing(-2);
        let err = session.begin(&mut resolver).unwrap_err();

        assert!(matches!(err, SessionError::Resolve { ref host, .. } if host == "feed.example.com"));
        assert_eq!(resolver.lookups(), ["feed.example.com"]);
        assert_eq!(session.server_addr(), None);
    }

    #[test]
    fn test_send_without_server_address_is_connect_failure() {
        let net = MockTransport::new();
        let mut session = UplinkSession::new(
            SessionConfig::new("feed.example.com", "KEY"),
            net.clone(),
            ManualClock::new(0),
            RecordingDevice::new(),
        );
        session.submit("node7", "&t=1");
        assert_eq!(session.step(), UplinkStatus::ConnectFailed);
        assert!(net.connects().is_empty());
        assert_eq!(session.stats().consecutive_errors, 1);
    }
}
