//! テスト共通フィクスチャ
//!
//! ディスパッチャを起動した状態のハーネスと、ジョブ生成ヘルパー。

// 各テストファイルが独立したクレートとしてコンパイルされるため、
// 使用しない関数に dead_code 警告が出る。モジュール全体で抑制する。
#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use postbox_domain::{MailJob, preference::keys};
use postbox_infra::{
    PreferenceStore,
    mock::{MockDeliveryLog, MockMailer},
};
use postbox_mail_worker::usecase::{
    Dispatcher,
    DispatcherHandle,
    JobQueue,
    MailDelivery,
    RenderPipeline,
    TemplateSource,
    job_queue,
};

pub const TEMPLATE: &str = r#"<html>
<head><style>p { color: #333333; }</style></head>
<body>{{ content | safe }}</body>
</html>"#;

/// 起動済みのディスパッチャとテストダブル
pub struct Harness {
    pub queue:  JobQueue,
    pub handle: DispatcherHandle,
    pub mailer: MockMailer,
    pub log:    MockDeliveryLog,
}

impl Harness {
    /// インラインテンプレートでディスパッチャを起動する
    pub fn start(max_workers: usize, mailer: MockMailer) -> Self {
        Self::start_with(
            max_workers,
            mailer,
            TemplateSource::Inline(TEMPLATE.to_string()),
            local_preferences(),
        )
    }

    pub fn start_with(
        max_workers: usize,
        mailer: MockMailer,
        source: TemplateSource,
        preferences: PreferenceStore,
    ) -> Self {
        let log = MockDeliveryLog::new();
        let delivery = Arc::new(MailDelivery::new(
            RenderPipeline::new(source),
            Arc::new(mailer.clone()),
            Arc::new(preferences),
        ));
        let (queue, receiver) = job_queue();
        let handle = Dispatcher::new(receiver, max_workers, delivery, Arc::new(log.clone()))
            .unwrap()
            .run();

        Self {
            queue,
            handle,
            mailer,
            log,
        }
    }

    /// 全ワーカーが待機状態になるまで待つ
    pub async fn wait_until_idle(&self, workers: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.handle.idle_workers() < workers {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("ワーカーが待機状態になりませんでした");
    }
}

pub fn local_preferences() -> PreferenceStore {
    [
        (keys::SMTP_SERVER, "localhost"),
        (keys::SMTP_PORT, "1025"),
        (keys::SMTP_USER, ""),
        (keys::SMTP_PASSWORD, ""),
    ]
    .into_iter()
    .collect()
}

pub fn job(to: &str) -> MailJob {
    MailJob::new(
        "noreply@example.com",
        to,
        format!("{to} へのお知らせ"),
        format!("<p>{to} 様</p>"),
    )
}

/// `user{n}@example.com` 宛てのジョブを n 件作る
pub fn jobs(count: usize) -> Vec<MailJob> {
    (0..count)
        .map(|n| job(&format!("user{n}@example.com")))
        .collect()
}
