//! コマンドライン定義

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use uplink_node::NodeConfig;

#[derive(Debug, Parser)]
#[command(name = "uplink-node", version, about = "Push telemetry readings to a feed API over HTTP PUT")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

/// 全サブコマンド共通のオプション（設定ファイルと環境変数を上書きする）
#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// 設定ファイル（既定: ./uplink.toml）
    #[arg(long, short = 'c', global = true, env = "UPLINK_CONFIG")]
    pub config: Option<PathBuf>,

    /// ログの詳細度（-v: info, -vv: debug, -vvv: trace）
    #[arg(long, short = 'v', global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// フィード API サーバーのホスト名
    #[arg(long, global = true)]
    pub server: Option<String>,

    #[arg(long, global = true)]
    pub api_key: Option<String>,

    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// 送信せずにログだけ出す
    #[arg(long, global = true)]
    pub dry_run: bool,
}

impl GlobalOpts {
    /// 指定されたフラグで設定を上書きする
    pub fn apply(&self, config: &mut NodeConfig) {
        if let Some(server) = &self.server {
            config.server = server.clone();
        }
        if let Some(api_key) = &self.api_key {
            config.api_key = api_key.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if self.dry_run {
            config.dry_run = true;
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// 測定値を 1 件送って結果を表示する
    Send {
        component_id: String,
        /// `&name=value` の並び
        #[arg(default_value = "")]
        payload: String,
    },

    /// 標準入力から `<component-id> <payload>` を 1 行ずつ読んで送り続ける
    Run {
        /// 測定値の間に入れるスリープ（ミリ秒）
        #[arg(long)]
        sleep_between_ms: Option<u32>,
    },
}
