//! # ワーカー
//!
//! プールに受け口を登録してジョブを待ち、受け取ったジョブを 1 件ずつ処理する。
//!
//! ## ライフサイクル
//!
//! ```text
//! 登録 → 待機 → 処理 → 配信ログ出力 → 登録 → ...
//!          │
//!          └─ 停止要求 → 受け口を閉じる → 受け取り済みのジョブがあれば処理 → 終了
//! ```
//!
//! 処理中のジョブは停止要求があっても最後まで実行する。
//! ジョブ処理中のパニックは [`DeliveryError::WorkerFault`] として記録し、
//! ワーカー自体は次のジョブを待ち続ける。

use std::{any::Any, sync::Arc};

use postbox_domain::{DeliveryError, DeliveryReport, MailJob, WorkerId};
use postbox_infra::DeliveryLog;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::{
    delivery::MailDelivery,
    worker_pool::{WorkerInbox, WorkerPool},
};

/// ワーカー
pub struct Worker {
    id:       WorkerId,
    pool:     WorkerPool,
    delivery: Arc<MailDelivery>,
    log:      Arc<dyn DeliveryLog>,
    shutdown: CancellationToken,
}

impl Worker {
    pub fn new(
        id: WorkerId,
        pool: WorkerPool,
        delivery: Arc<MailDelivery>,
        log: Arc<dyn DeliveryLog>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            id,
            pool,
            delivery,
            log,
            shutdown,
        }
    }

    /// 停止要求があるまでジョブを処理し続ける
    pub async fn run(self) {
        tracing::debug!("ワーカー開始");

        while !self.shutdown.is_cancelled() {
            let (inbox, mut slot) = WorkerInbox::new(self.id);
            self.pool.register(inbox).await;

            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => {
                    // 閉じる前に届いていたジョブは処理する。閉じた後の受け渡しは送り手に戻る
                    slot.close();
                    if let Ok(job) = slot.try_recv() {
                        self.process(*job).await;
                    }
                    break;
                }
                received = &mut slot => match received {
                    Ok(job) => self.process(*job).await,
                    Err(_) => {
                        tracing::debug!("受け口が未使用のまま破棄されたため再登録");
                    }
                },
            }
        }

        tracing::debug!("ワーカー終了");
    }

    /// 1 ジョブを処理して配信ログに記録する
    ///
    /// 配信は別タスクで実行し、パニックをワーカーの外へ漏らさない。
    async fn process(&self, job: MailJob) {
        let job = Arc::new(job);
        tracing::debug!(job_id = %job.id(), "ジョブ処理開始");

        let delivery = Arc::clone(&self.delivery);
        let task_job = Arc::clone(&job);
        let result = tokio::spawn(
            async move { delivery.deliver(&task_job).await }.instrument(tracing::Span::current()),
        )
        .await
        .unwrap_or_else(|e| {
            let message = if e.is_panic() {
                panic_message(e.into_panic())
            } else {
                e.to_string()
            };
            Err(DeliveryError::WorkerFault(message))
        });

        let report = DeliveryReport::from_result(&job, self.id, result);
        self.log.record(&report);
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use postbox_domain::{DeliveryStatus, preference::keys};
    use postbox_infra::{
        PreferenceStore,
        mock::{MockDeliveryLog, MockMailer},
    };
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::usecase::render::{PlainTextDeriver, RenderPipeline, TemplateSource};

    struct PanickingDeriver;

    impl PlainTextDeriver for PanickingDeriver {
        fn derive(&self, _html: &str) -> Result<String, DeliveryError> {
            panic!("deriver exploded");
        }
    }

    struct Fixture {
        pool:     WorkerPool,
        mailer:   MockMailer,
        log:      MockDeliveryLog,
        shutdown: CancellationToken,
        handle:   tokio::task::JoinHandle<()>,
    }

    fn spawn_worker(mailer: MockMailer, pipeline: RenderPipeline) -> Fixture {
        let pool = WorkerPool::new(1);
        let log = MockDeliveryLog::new();
        let shutdown = CancellationToken::new();
        let store: PreferenceStore = [(keys::SMTP_SERVER, "localhost"), (keys::SMTP_PORT, "1025")]
            .into_iter()
            .collect();
        let delivery = Arc::new(MailDelivery::new(
            pipeline,
            Arc::new(mailer.clone()),
            Arc::new(store),
        ));
        let worker = Worker::new(
            WorkerId::new(1),
            pool.clone(),
            delivery,
            Arc::new(log.clone()),
            shutdown.clone(),
        );
        let handle = tokio::spawn(worker.run());

        Fixture {
            pool,
            mailer,
            log,
            shutdown,
            handle,
        }
    }

    fn pipeline() -> RenderPipeline {
        RenderPipeline::new(TemplateSource::Inline("{{ content | safe }}".to_string()))
    }

    fn job(to: &str) -> Box<MailJob> {
        Box::new(MailJob::new("from@example.com", to, "件名", "<p>本文</p>"))
    }

    #[tokio::test]
    async fn test_受け取ったジョブを処理して配信ログに記録する() {
        let fixture = spawn_worker(MockMailer::new(), pipeline());

        let inbox = fixture.pool.acquire().await.unwrap();
        assert_eq!(inbox.worker_id(), WorkerId::new(1));
        inbox.deliver(job("a@example.com")).unwrap();

        let reports = fixture.log.wait_for(1).await;
        assert_eq!(reports[0].status, DeliveryStatus::Sent);
        assert_eq!(reports[0].worker_id, WorkerId::new(1));
        assert_eq!(fixture.mailer.sent_messages().len(), 1);

        fixture.shutdown.cancel();
        fixture.handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_処理後に再びプールへ登録する() {
        let fixture = spawn_worker(MockMailer::new(), pipeline());

        for (n, to) in ["a@example.com", "b@example.com"].into_iter().enumerate() {
            fixture.pool.acquire().await.unwrap().deliver(job(to)).unwrap();
            fixture.log.wait_for(n + 1).await;
        }

        let recipients: Vec<String> = fixture
            .mailer
            .sent_messages()
            .into_iter()
            .map(|m| m.primary_recipient().to_string())
            .collect();
        assert_eq!(recipients, vec!["a@example.com", "b@example.com"]);

        fixture.shutdown.cancel();
        fixture.handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_失敗したジョブもfailedとして記録し処理を続ける() {
        let fixture = spawn_worker(MockMailer::new().rejecting("bad@example.com"), pipeline());

        fixture.pool.acquire().await.unwrap().deliver(job("bad@example.com")).unwrap();
        fixture.log.wait_for(1).await;
        fixture.pool.acquire().await.unwrap().deliver(job("good@example.com")).unwrap();
        let reports = fixture.log.wait_for(2).await;

        assert_eq!(reports[0].status, DeliveryStatus::Failed);
        assert!(matches!(reports[0].error, Some(DeliveryError::Send(_))));
        assert_eq!(reports[1].status, DeliveryStatus::Sent);

        fixture.shutdown.cancel();
        fixture.handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_処理中のパニックはworker_faultとして記録しワーカーは継続する() {
        let fixture = spawn_worker(MockMailer::new(), pipeline().with_text_deriver(PanickingDeriver));

        fixture.pool.acquire().await.unwrap().deliver(job("a@example.com")).unwrap();
        let reports = fixture.log.wait_for(1).await;

        assert_eq!(
            reports[0].error,
            Some(DeliveryError::WorkerFault("deriver exploded".to_string()))
        );
        assert!(fixture.pool.acquire().await.is_some());

        fixture.shutdown.cancel();
        fixture.handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_停止要求で待機中のワーカーは終了する() {
        let fixture = spawn_worker(MockMailer::new(), pipeline());

        fixture.shutdown.cancel();

        tokio::time::timeout(Duration::from_secs(1), fixture.handle)
            .await
            .unwrap()
            .unwrap();
        assert!(fixture.log.reports().is_empty());
    }

    #[tokio::test]
    async fn test_停止後の受け口への受け渡しはジョブを返す() {
        let fixture = spawn_worker(MockMailer::new(), pipeline());
        let inbox = fixture.pool.acquire().await.unwrap();

        fixture.shutdown.cancel();
        fixture.handle.await.unwrap();

        let job = job("a@example.com");
        let expected = job.id();
        let returned = inbox.deliver(job).unwrap_err();
        assert_eq!(returned.id(), expected);
    }

    #[tokio::test]
    async fn test_処理中のジョブは停止要求後も完了まで実行する() {
        let fixture = spawn_worker(
            MockMailer::new().with_send_delay(Duration::from_millis(100)),
            pipeline(),
        );

        fixture.pool.acquire().await.unwrap().deliver(job("a@example.com")).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        fixture.shutdown.cancel();
        fixture.handle.await.unwrap();

        let reports = fixture.log.reports();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].is_sent());
    }

    #[test]
    fn test_パニックのペイロードからメッセージを取り出す() {
        assert_eq!(panic_message(Box::new("static")), "static");
        assert_eq!(panic_message(Box::new("owned".to_string())), "owned");
        assert_eq!(panic_message(Box::new(42)), "unknown panic");
    }
}
