//! # Postbox Mail Worker
//!
//! ジョブキューに投入されたメール配信ジョブを、上限付きのワーカープールで
//! 並行に処理する。
//!
//! 各ジョブは独立して HTML レンダリング → プレーンテキスト変換 → CSS インライン化
//! を行い、SMTP で送信される。結果はジョブごとに 1 行の配信ログとして出力する。
//!
//! ## モジュール構成
//!
//! - [`config`] - 環境変数からの設定読み込み
//! - [`usecase`] - キュー、ディスパッチャ、ワーカー、レンダリング、配信

pub mod config;
pub mod usecase;
