//! # テスト用モック
//!
//! ワーカー・ディスパッチャのテストで使用するインメモリ実装。
//! `test-utils` feature を有効にすることで、他クレートからも利用可能。
//!
//! ```toml
//! [dev-dependencies]
//! postbox-infra = { workspace = true, features = ["test-utils"] }
//! ```

use std::{
    collections::HashSet,
    sync::{
        Arc,
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use postbox_domain::{DeliveryError, DeliveryReport, OutboundMessage, SmtpConnectionParams};
use tokio::sync::Notify;

use crate::{
    delivery_log::DeliveryLog,
    notification::{MailConnection, Mailer},
};

// ===== MockMailer =====

/// 送信内容を記録するメーラー
///
/// 同時に開いている接続数の最大値も記録するため、並行度の検証に使える。
#[derive(Clone, Default)]
pub struct MockMailer {
    connect_failure:     Option<String>,
    rejected_recipients: HashSet<String>,
    send_delay:          Duration,
    state:               Arc<MockMailerState>,
}

#[derive(Default)]
struct MockMailerState {
    sent:           Mutex<Vec<OutboundMessage>>,
    connect_params: Mutex<Vec<SmtpConnectionParams>>,
    in_flight:      AtomicUsize,
    max_in_flight:  AtomicUsize,
}

impl MockMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// すべての接続を指定メッセージの接続エラーで失敗させる
    pub fn failing_connect(mut self, message: impl Into<String>) -> Self {
        self.connect_failure = Some(message.into());
        self
    }

    /// 主宛先が一致するメッセージの送信を失敗させる
    pub fn rejecting(mut self, recipient: impl Into<String>) -> Self {
        self.rejected_recipients.insert(recipient.into());
        self
    }

    /// 送信に時間がかかる状況を再現する
    pub fn with_send_delay(mut self, delay: Duration) -> Self {
        self.send_delay = delay;
        self
    }

    /// 送信に成功したメッセージ
    pub fn sent_messages(&self) -> Vec<OutboundMessage> {
        self.state.sent.lock().unwrap().clone()
    }

    /// 接続を試みた際のパラメータ
    pub fn connect_attempts(&self) -> Vec<SmtpConnectionParams> {
        self.state.connect_params.lock().unwrap().clone()
    }

    /// 同時に開いていた接続数の最大値
    pub fn max_in_flight(&self) -> usize {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Mailer for MockMailer {
    async fn connect(
        &self,
        params: &SmtpConnectionParams,
    ) -> Result<Box<dyn MailConnection>, DeliveryError> {
        self.state
            .connect_params
            .lock()
            .unwrap()
            .push(params.clone());

        if let Some(message) = &self.connect_failure {
            return Err(DeliveryError::Connection(message.clone()));
        }

        let current = self.state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_in_flight.fetch_max(current, Ordering::SeqCst);

        Ok(Box::new(MockConnection {
            mailer: self.clone(),
        }))
    }
}

struct MockConnection {
    mailer: MockMailer,
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        self.mailer.state.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl MailConnection for MockConnection {
    async fn send(self: Box<Self>, message: &OutboundMessage) -> Result<(), DeliveryError> {
        if !self.mailer.send_delay.is_zero() {
            tokio::time::sleep(self.mailer.send_delay).await;
        }

        if self
            .mailer
            .rejected_recipients
            .contains(message.primary_recipient())
        {
            return Err(DeliveryError::Send(format!(
                "550 mailbox unavailable: {}",
                message.primary_recipient()
            )));
        }

        self.mailer
            .state
            .sent
            .lock()
            .unwrap()
            .push(message.clone());
        Ok(())
    }
}

// ===== MockDeliveryLog =====

/// 配信結果を記録する配信ログ
#[derive(Clone, Default)]
pub struct MockDeliveryLog {
    reports: Arc<Mutex<Vec<DeliveryReport>>>,
    notify:  Arc<Notify>,
}

impl MockDeliveryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<DeliveryReport> {
        self.reports.lock().unwrap().clone()
    }

    /// 指定件数の配信結果が記録されるまで待つ
    pub async fn wait_for(&self, count: usize) -> Vec<DeliveryReport> {
        loop {
            let notified = self.notify.notified();
            {
                let reports = self.reports.lock().unwrap();
                if reports.len() >= count {
                    return reports.clone();
                }
            }
            notified.await;
        }
    }
}

impl DeliveryLog for MockDeliveryLog {
    fn record(&self, report: &DeliveryReport) {
        self.reports.lock().unwrap().push(report.clone());
        self.notify.notify_waiters();
    }
}
