//! テスト用のインメモリ実装
//!
//! どれもハンドルを `clone()` すると内部状態を共有する。
//! 状態機械に所有権を渡したあとも、テスト側に残したハンドルから
//! 相手側の振る舞いを操作したり、送信内容を検査したりできる。

use alloc::collections::VecDeque;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};
use core::net::IpAddr;

use crate::{Clock, DeviceControl, ResolveError, Resolver, Transport, TransportError};

#[derive(Debug, Default)]
struct MockState {
    refuse_connect: bool,
    open: bool,
    peer_closed: bool,
    local_addr: Option<IpAddr>,
    rx: VecDeque<u8>,
    writes: Vec<Vec<u8>>,
    connects: Vec<(IpAddr, u16)>,
    stops: usize,
}

/// スクリプト可能なトランスポート
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Rc<RefCell<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以降の `connect()` を失敗させる
    pub fn refuse_connections(&self, refuse: bool) {
        self.state.borrow_mut().refuse_connect = refuse;
    }

    pub fn set_local_addr(&self, addr: IpAddr) {
        self.state.borrow_mut().local_addr = Some(addr);
    }

    /// サーバーからの受信データを積む
    pub fn push_incoming(&self, bytes: &[u8]) {
        self.state.borrow_mut().rx.extend(bytes.iter().copied());
    }

    /// サーバー側から接続を閉じる
    pub fn close_from_peer(&self) {
        self.state.borrow_mut().peer_closed = true;
    }

    /// `write()` された各チャンク
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.state.borrow().writes.clone()
    }

    /// すべての `write()` を連結したバイト列
    pub fn written(&self) -> Vec<u8> {
        self.state.borrow().writes.concat()
    }

    pub fn connects(&self) -> Vec<(IpAddr, u16)> {
        self.state.borrow().connects.clone()
    }

    pub fn stop_count(&self) -> usize {
        self.state.borrow().stops
    }

    pub fn is_open(&self) -> bool {
        self.state.borrow().open
    }

    /// まだ読まれていない受信バイト数
    pub fn unread(&self) -> usize {
        self.state.borrow().rx.len()
    }
}

impl Transport for MockTransport {
    fn connect(&mut self, addr: IpAddr, port: u16) -> Result<(), TransportError> {
        let mut state = self.state.borrow_mut();
        state.connects.push((addr, port));
        if state.refuse_connect {
            return Err(TransportError::Refused { addr, port });
        }
        state.open = true;
        state.peer_closed = false;
        Ok(())
    }

    fn connected(&mut self) -> bool {
        let state = self.state.borrow();
        state.open && (!state.peer_closed || !state.rx.is_empty())
    }

    fn available(&mut self) -> usize {
        let state = self.state.borrow();
        if state.open {
            state.rx.len()
        } else {
            0
        }
    }

    fn read(&mut self) -> Option<u8> {
        let mut state = self.state.borrow_mut();
        if !state.open {
            return None;
        }
        state.rx.pop_front()
    }

    fn write(&mut self, bytes: &[u8]) {
        self.state.borrow_mut().writes.push(bytes.to_vec());
    }

    fn stop(&mut self) {
        let mut state = self.state.borrow_mut();
        state.open = false;
        state.rx.clear();
        state.stops += 1;
    }

    fn local_addr(&self) -> Option<IpAddr> {
        self.state.borrow().local_addr
    }
}

/// 手動で進めるクロック
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<u64>>,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        ManualClock {
            now: Rc::new(Cell::new(start_ms)),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.now.set(self.now.get() + ms);
    }

    pub fn set(&self, ms: u64) {
        self.now.set(ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.get()
    }
}

#[derive(Debug, Default)]
struct DeviceLog {
    resets: Vec<u32>,
    activity: Vec<bool>,
    transport_enabled: Vec<bool>,
    sleeps: Vec<u32>,
}

/// 呼び出しを記録するだけのデバイス制御
///
/// `reset()` は記録して戻る（実機と違ってプロセスは止まらない）。
#[derive(Debug, Clone, Default)]
pub struct RecordingDevice {
    log: Rc<RefCell<DeviceLog>>,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// `reset()` に渡された遅延の履歴
    pub fn resets(&self) -> Vec<u32> {
        self.log.borrow().resets.clone()
    }

    pub fn activity(&self) -> Vec<bool> {
        self.log.borrow().activity.clone()
    }

    pub fn transport_enabled(&self) -> Vec<bool> {
        self.log.borrow().transport_enabled.clone()
    }

    pub fn sleeps(&self) -> Vec<u32> {
        self.log.borrow().sleeps.clone()
    }
}

impl DeviceControl for RecordingDevice {
    fn reset(&mut self, delay_ms: u32) {
        self.log.borrow_mut().resets.push(delay_ms);
    }

    fn set_transport_enabled(&mut self, enabled: bool) {
        self.log.borrow_mut().transport_enabled.push(enabled);
    }

    fn low_power_sleep(&mut self, duration_ms: u32) {
        self.log.borrow_mut().sleeps.push(duration_ms);
    }

    fn set_activity(&mut self, on: bool) {
        self.log.borrow_mut().activity.push(on);
    }
}

/// 固定の結果を返すリゾルバ
#[derive(Debug, Clone)]
pub struct StaticResolver {
    result: Result<IpAddr, i32>,
    lookups: Rc<RefCell<Vec<String>>>,
}

impl StaticResolver {
    pub fn resolving_to(addr: IpAddr) -> Self {
        StaticResolver {
            result: Ok(addr),
            lookups: Rc::default(),
        }
    }

    /// 常に失敗コード `code` を返す
    pub fn failing(code: i32) -> Self {
        StaticResolver {
            result: Err(code),
            lookups: Rc::default(),
        }
    }

    pub fn lookups(&self) -> Vec<String> {
        self.lookups.borrow().clone()
    }
}

impl Resolver for StaticResolver {
    fn resolve(&mut self, host: &str) -> Result<IpAddr, ResolveError> {
        self.lookups.borrow_mut().push(String::from(host));
        self.result.map_err(|code| ResolveError::Failed {
            host: String::from(host),
            code,
        })
    }
}
