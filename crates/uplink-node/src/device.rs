//! ホスト用のデバイス制御
//!
//! 組み込み機のウォッチドッグリセットの代わりに、遅延のあと専用の終了コードで
//! プロセスを終了する。systemd 等のスーパーバイザが再起動する前提。

use std::process;
use std::thread;
use std::time::Duration;

use tracing::{debug, error, trace};
use uplink_transport::DeviceControl;

use crate::error::exit_code;

#[derive(Debug, Default)]
pub struct HostDevice {
    activity: bool,
}

impl HostDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// 動作表示が点灯中か
    pub fn activity(&self) -> bool {
        self.activity
    }
}

impl DeviceControl for HostDevice {
    fn reset(&mut self, delay_ms: u32) {
        error!(delay_ms, code = exit_code::RESET, "device reset requested, exiting");
        thread::sleep(Duration::from_millis(u64::from(delay_ms)));
        process::exit(exit_code::RESET);
    }

    fn set_transport_enabled(&mut self, enabled: bool) {
        // ホストの NIC は OS 管理なので記録だけ
        debug!(enabled, "transport power");
    }

    fn low_power_sleep(&mut self, duration_ms: u32) {
        trace!(duration_ms, "sleeping");
        thread::sleep(Duration::from_millis(u64::from(duration_ms)));
    }

    fn set_activity(&mut self, on: bool) {
        if self.activity != on {
            trace!(on, "activity");
            self.activity = on;
        }
    }
}
