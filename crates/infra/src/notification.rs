//! # 通知送信
//!
//! メール配信バックエンドへの接続と送信を担当するインフラストラクチャモジュール。
//!
//! ## 設計方針
//!
//! - **接続と送信の分離**: [`Mailer::connect`] で接続・認証まで行い、
//!   得られた [`MailConnection`] で 1 通だけ送る。接続エラーと送信エラーを区別できる
//! - **接続は使い捨て**: [`MailConnection::send`] は `self` を消費する。
//!   ジョブごとに接続を開いて閉じ、ジョブ間で状態を共有しない
//! - **2 つの実装**: SMTP（lettre）、Noop（送信しない）。テスト用は [`crate::mock`]

mod noop;
mod smtp;

use async_trait::async_trait;
pub use noop::NoopMailer;
use postbox_domain::{DeliveryError, OutboundMessage, SmtpConnectionParams};
pub use smtp::SmtpMailer;

/// 配信バックエンドへの接続を開くトレイト
///
/// 実装は複数ワーカーから同時に呼ばれる。
#[async_trait]
pub trait Mailer: Send + Sync {
    /// 接続パラメータに従って接続・認証する
    ///
    /// 到達できない、認証が拒否された、ポートが不正といった場合は
    /// [`DeliveryError::Connection`] を返す。
    async fn connect(
        &self,
        params: &SmtpConnectionParams,
    ) -> Result<Box<dyn MailConnection>, DeliveryError>;
}

/// 開いている 1 本の接続
#[async_trait]
pub trait MailConnection: Send {
    /// メッセージを組み立てて送信し、接続を閉じる
    async fn send(self: Box<Self>, message: &OutboundMessage) -> Result<(), DeliveryError>;
}
