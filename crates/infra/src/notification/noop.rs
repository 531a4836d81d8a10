//! Noop メーラー
//!
//! メールを実際に送信せず、ログ出力のみ行う。
//! 配信を無効化した環境で使用する。

use async_trait::async_trait;
use postbox_domain::{DeliveryError, OutboundMessage, SmtpConnectionParams};

use super::{MailConnection, Mailer};

/// Noop メーラー（ログ出力のみ）
#[derive(Debug, Clone, Default)]
pub struct NoopMailer;

#[async_trait]
impl Mailer for NoopMailer {
    async fn connect(
        &self,
        _params: &SmtpConnectionParams,
    ) -> Result<Box<dyn MailConnection>, DeliveryError> {
        Ok(Box::new(NoopConnection))
    }
}

struct NoopConnection;

#[async_trait]
impl MailConnection for NoopConnection {
    async fn send(self: Box<Self>, message: &OutboundMessage) -> Result<(), DeliveryError> {
        tracing::info!(
            to = %message.primary_recipient(),
            subject = %message.subject,
            "Noop: メール送信をスキップ"
        );
        Ok(())
    }
}
