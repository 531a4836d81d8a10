//! # Postbox インフラ層
//!
//! 外部システム（SMTP サーバー、共有設定ストア、ログ出力先）との接続を担当する。
//!
//! ## 設計方針
//!
//! ワーカー側からはトレイト越しにのみ利用し、具体的な実装は起動時に注入する。
//! これにより、テストでは [`mock`] の実装に差し替えられる。
//!
//! ## モジュール構成
//!
//! - [`notification`] - メール送信（[`Mailer`] / [`MailConnection`]）
//! - [`preference_store`] - プロセス共有の設定マップ
//! - [`delivery_log`] - 配信結果の出力先
//! - [`mock`] - テスト用実装（`test-utils` feature）

pub mod delivery_log;
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;
pub mod notification;
pub mod preference_store;

pub use delivery_log::{DeliveryLog, TracingDeliveryLog};
pub use notification::{MailConnection, Mailer, NoopMailer, SmtpMailer};
pub use preference_store::{PreferenceSource, PreferenceStore};
