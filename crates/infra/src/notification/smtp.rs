//! SMTP メーラー
//!
//! lettre の `AsyncSmtpConnection` を使用してメールを送信する。
//!
//! 1 ジョブにつき 1 セッション: `connect` で接続・EHLO・認証まで行い、
//! 同じセッションで送信して QUIT する。接続は再利用しない。

use std::{path::Path, time::Duration};

use async_trait::async_trait;
use lettre::{
    Address,
    Message,
    message::{Attachment, Mailbox, MultiPart, SinglePart, header::ContentType},
    transport::smtp::{
        authentication::{Credentials, Mechanism},
        client::AsyncSmtpConnection,
        extension::ClientId,
    },
};
use postbox_domain::{
    DeliveryError,
    OutboundMessage,
    SmtpAuthMode,
    SmtpConnectionParams,
    SmtpEncryption,
};

use super::{MailConnection, Mailer};

/// SMTP メーラー
///
/// 状態を持たないため、複数ワーカーで 1 つのインスタンスを共有できる。
#[derive(Debug, Clone, Default)]
pub struct SmtpMailer;

impl SmtpMailer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn connect(
        &self,
        params: &SmtpConnectionParams,
    ) -> Result<Box<dyn MailConnection>, DeliveryError> {
        if !params.has_valid_port() {
            return Err(DeliveryError::Connection(format!(
                "SMTP ポートが不正です: host={}, port={}",
                params.host, params.port
            )));
        }

        let tls = match params.encryption {
            SmtpEncryption::None => None,
        };
        let client_id = ClientId::default();
        let opened = AsyncSmtpConnection::connect_tokio1(
            (params.host.as_str(), params.port),
            Some(params.connect_timeout),
            &client_id,
            tls,
            None,
        );
        let mut session = match tokio::time::timeout(params.connect_timeout, opened).await {
            Ok(Ok(session)) => session,
            Ok(Err(e)) => return Err(DeliveryError::Connection(e.to_string())),
            Err(_) => {
                return Err(DeliveryError::Connection(format!(
                    "接続がタイムアウトしました: {}:{}",
                    params.host, params.port
                )));
            }
        };

        if params.has_credentials() {
            let credentials = Credentials::new(params.username.clone(), params.password.clone());
            let mechanisms = [mechanism(params.authentication)];
            let authenticated = tokio::time::timeout(
                params.connect_timeout,
                session.auth(&mechanisms, &credentials),
            )
            .await;

            let failure = match authenticated {
                Ok(Ok(_)) => None,
                Ok(Err(e)) => Some(format!("認証に失敗しました ({}): {e}", params.authentication)),
                Err(_) => Some("認証がタイムアウトしました".to_string()),
            };
            if let Some(message) = failure {
                session.abort().await;
                return Err(DeliveryError::Connection(message));
            }
        }

        tracing::debug!(
            host = %params.host,
            port = params.port,
            auth = %params.authentication,
            "SMTP サーバーに接続しました"
        );

        Ok(Box::new(SmtpConnection {
            session,
            send_timeout: params.send_timeout,
        }))
    }
}

/// 認証済みの SMTP セッション
struct SmtpConnection {
    session:      AsyncSmtpConnection,
    send_timeout: Duration,
}

#[async_trait]
impl MailConnection for SmtpConnection {
    async fn send(self: Box<Self>, message: &OutboundMessage) -> Result<(), DeliveryError> {
        let Self {
            mut session,
            send_timeout,
        } = *self;

        let email = match build_message(message).await {
            Ok(email) => email,
            Err(e) => {
                session.abort().await;
                return Err(e);
            }
        };
        let formatted = email.formatted();

        let sent = tokio::time::timeout(send_timeout, session.send(email.envelope(), &formatted)).await;
        let result = match sent {
            Ok(Ok(_response)) => Ok(()),
            Ok(Err(e)) => Err(DeliveryError::Send(e.to_string())),
            Err(_) => Err(DeliveryError::Send("送信がタイムアウトしました".to_string())),
        };

        if result.is_ok() {
            // 送信は完了しているため QUIT の失敗はジョブの結果に含めない
            match tokio::time::timeout(send_timeout, session.quit()).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => tracing::debug!(error = %e, "QUIT に失敗"),
                Err(_) => tracing::debug!("QUIT がタイムアウト"),
            }
        } else {
            session.abort().await;
        }

        result
    }
}

fn mechanism(mode: SmtpAuthMode) -> Mechanism {
    match mode {
        SmtpAuthMode::Plain => Mechanism::Plain,
        SmtpAuthMode::Login => Mechanism::Login,
    }
}

/// 送信用メッセージを lettre の `Message` に変換する
///
/// 本文は HTML とプレーンテキストの multipart/alternative。
/// 添付ファイルがある場合はそれを multipart/mixed で包む。
async fn build_message(message: &OutboundMessage) -> Result<Message, DeliveryError> {
    let from = parse_address(&message.from_address)?;
    let from_name = (!message.from_name.is_empty()).then(|| message.from_name.clone());

    let mut builder = Message::builder()
        .from(Mailbox::new(from_name, from))
        .subject(message.subject.as_str());

    for to in &message.to {
        builder = builder.to(Mailbox::new(None, parse_address(to)?));
    }

    for cc in &message.cc {
        builder = builder.cc(Mailbox::new(None, parse_address(cc)?));
    }

    let alternative =
        MultiPart::alternative_plain_html(message.text_body.clone(), message.html_body.clone());

    let body = if message.attachments.is_empty() {
        alternative
    } else {
        let mut mixed = MultiPart::mixed().multipart(alternative);
        for path in &message.attachments {
            mixed = mixed.singlepart(load_attachment(path).await?);
        }
        mixed
    };

    builder
        .multipart(body)
        .map_err(|e| DeliveryError::Compose(format!("メッセージ構築失敗: {e}")))
}

fn parse_address(raw: &str) -> Result<Address, DeliveryError> {
    raw.parse()
        .map_err(|e| DeliveryError::Compose(format!("アドレス不正 ({raw}): {e}")))
}

async fn load_attachment(path: &Path) -> Result<SinglePart, DeliveryError> {
    let content = tokio::fs::read(path).await.map_err(|e| {
        DeliveryError::Compose(format!("添付ファイルを読み込めません ({}): {e}", path.display()))
    })?;

    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "attachment".to_string());

    let mime = mime_guess::from_path(path).first_or_octet_stream();
    let content_type = ContentType::parse(mime.as_ref()).map_err(|e| {
        DeliveryError::Compose(format!("Content-Type を解釈できません ({mime}): {e}"))
    })?;

    Ok(Attachment::new(filename).body(content, content_type))
}
