//! # uplink-node
//!
//! ホスト（Linux 等）上でアップリンク状態機械を動かすためのエントリポイント。
//!
//! ```text
//! uplink-node
//!   ├── NodeConfig  - figment で TOML / 環境変数 / CLI を重ねた設定
//!   ├── HostDevice  - リセット = プロセス終了（スーパーバイザが再起動する）
//!   └── Runner      - submit → step ループ → 1 件ごとの JSON レポート
//! ```
//!
//! コアの `UplinkSession` には `uplink-transport` の `std` 実装
//! （`TcpTransport` / `SystemResolver` / `SystemClock`）を注入する。

pub mod config;
pub mod device;
pub mod error;
pub mod runner;

pub use config::NodeConfig;
pub use device::HostDevice;
pub use error::NodeError;
pub use runner::{Reading, Runner, UploadReport};
