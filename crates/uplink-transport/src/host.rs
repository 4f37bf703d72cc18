//! ホスト（std）向けの実装
//!
//! - `TcpTransport`: `std::net::TcpStream` をノンブロッキングで包む
//! - `SystemResolver`: `ToSocketAddrs` による名前解決
//! - `SystemClock`: `Instant` 起点のミリ秒クロック

use alloc::collections::VecDeque;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::net::{IpAddr, SocketAddr};
use core::time::Duration;
use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Instant;

use tracing::{debug, warn};

use crate::{Clock, ResolveError, Resolver, Transport, TransportError};

/// 1 回の poll で読み出すチャンクサイズ
const READ_CHUNK: usize = 512;

/// TCP トランスポート
///
/// 接続後はソケットをノンブロッキングにし、`available()` / `connected()` の
/// たびにカーネルに溜まっているデータを受信キューへ吸い上げる。
pub struct TcpTransport {
    stream: Option<TcpStream>,
    /// 受信済みでまだ `read()` されていないバイト
    rx: VecDeque<u8>,
    /// 相手が FIN を送ってきた（またはソケットエラー）
    eof: bool,
    connect_timeout: Duration,
}

impl TcpTransport {
    /// # 引数
    /// - `connect_timeout`: `connect()` がブロックする最大時間
    pub fn new(connect_timeout: Duration) -> Self {
        TcpTransport {
            stream: None,
            rx: VecDeque::new(),
            eof: false,
            connect_timeout,
        }
    }

    /// ソケットから読めるだけ読んで受信キューに積む
    fn poll(&mut self) {
        if self.eof {
            return;
        }
        let Some(stream) = self.stream.as_mut() else {
            return;
        };

        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match stream.read(&mut chunk) {
                Ok(0) => {
                    self.eof = true;
                    break;
                }
                Ok(n) => self.rx.extend(&chunk[..n]),
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(error = %e, "socket read failed");
                    self.eof = true;
                    break;
                }
            }
        }
    }

    fn write_blocking(stream: &mut TcpStream, bytes: &[u8]) -> io::Result<()> {
        stream.set_nonblocking(false)?;
        let written = stream.write_all(bytes);
        stream.set_nonblocking(true)?;
        written
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl Transport for TcpTransport {
    fn connect(&mut self, addr: IpAddr, port: u16) -> Result<(), TransportError> {
        self.stop();

        let target = SocketAddr::new(addr, port);
        let stream = TcpStream::connect_timeout(&target, self.connect_timeout)
            .and_then(|stream| {
                stream.set_nonblocking(true)?;
                stream.set_nodelay(true)?;
                Ok(stream)
            })
            .map_err(|e| connect_error(addr, port, &e))?;

        self.stream = Some(stream);
        Ok(())
    }

    fn connected(&mut self) -> bool {
        self.poll();
        self.stream.is_some() && (!self.eof || !self.rx.is_empty())
    }

    fn available(&mut self) -> usize {
        self.poll();
        self.rx.len()
    }

    fn read(&mut self) -> Option<u8> {
        if self.rx.is_empty() {
            self.poll();
        }
        self.rx.pop_front()
    }

    fn write(&mut self, bytes: &[u8]) {
        let Some(stream) = self.stream.as_mut() else {
            debug!(len = bytes.len(), "write on closed transport dropped");
            return;
        };
        if let Err(e) = Self::write_blocking(stream, bytes) {
            warn!(error = %e, len = bytes.len(), "socket write failed");
        }
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            // 相手が先に閉じている場合は NotConnected が返るが無視してよい
            let _ = stream.shutdown(Shutdown::Both);
        }
        self.rx.clear();
        self.eof = false;
    }

    fn local_addr(&self) -> Option<IpAddr> {
        let stream = self.stream.as_ref()?;
        stream.local_addr().ok().map(|addr| addr.ip())
    }
}

fn connect_error(addr: IpAddr, port: u16, err: &io::Error) -> TransportError {
    match err.kind() {
        ErrorKind::ConnectionRefused => TransportError::Refused { addr, port },
        ErrorKind::TimedOut | ErrorKind::WouldBlock => TransportError::TimedOut { addr, port },
        _ => TransportError::Connect {
            addr,
            port,
            reason: err.to_string(),
        },
    }
}

/// `ToSocketAddrs` を使うシステムリゾルバ
#[derive(Debug, Default)]
pub struct SystemResolver;

impl Resolver for SystemResolver {
    fn resolve(&mut self, host: &str) -> Result<IpAddr, ResolveError> {
        let all: Vec<SocketAddr> = (host, 0u16)
            .to_socket_addrs()
            .map_err(|e| ResolveError::Failed {
                host: String::from(host),
                code: e.raw_os_error().unwrap_or(-1),
            })?
            .collect();

        // 組み込み側と揃えて IPv4 を優先する
        all.iter()
            .find(|addr| addr.is_ipv4())
            .or_else(|| all.first())
            .map(SocketAddr::ip)
            .ok_or_else(|| ResolveError::NoAddress {
                host: String::from(host),
            })
    }
}

/// プロセス起動時刻を 0 とするミリ秒クロック
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        SystemClock {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}
