//! # Postbox ドメイン層
//!
//! 非同期メール配信で扱う値と、その不変条件を定義する。
//!
//! ## 設計方針
//!
//! - **不変なジョブ**: [`MailJob`](mail_job::MailJob) はキュー投入後に変更されない。
//!   所有権はプロデューサーから処理を担当する 1 つのワーカーへ移る
//! - **構造化された結果**: 配信の成否は [`DeliveryError`](delivery::DeliveryError)
//!   と [`DeliveryReport`](delivery::DeliveryReport) で表現し、ログ出力は呼び出し側が担う
//! - **外部ライブラリ非依存**: SMTP やテンプレートエンジンの型はここに現れない
//!
//! ## 依存関係の方向
//!
//! ```text
//! mail-worker → infra → domain
//! ```
//!
//! ## モジュール構成
//!
//! - [`mail_job`] - 配信ジョブ
//! - [`preference`] - プロセス共有の設定マップのスナップショット
//! - [`delivery_config`] - 設定マップから導出する SMTP 接続パラメータ
//! - [`message`] - レンダリング結果と送信用メッセージ
//! - [`delivery`] - 配信エラーと配信結果

pub mod delivery;
pub mod delivery_config;
pub mod mail_job;
pub mod message;
pub mod preference;

pub use delivery::{DeliveryError, DeliveryReport, DeliveryStatus, WorkerId};
pub use delivery_config::{SmtpAuthMode, SmtpConnectionParams, SmtpEncryption};
pub use mail_job::{MailJob, MailJobId};
pub use message::{OutboundMessage, RenderedBody};
pub use preference::Preferences;
