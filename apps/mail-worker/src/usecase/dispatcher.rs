//! # ディスパッチャ
//!
//! ジョブキューからジョブを取り出し、待機中のワーカーへ 1 件ずつ割り当てる。
//!
//! ## 設計方針
//!
//! - **受け渡しは別タスク**: ジョブごとに受け渡しタスクを起動し、
//!   ワーカーの空き待ちでキューの取り出しを止めない
//! - **到着順の割り当て**: 受け口は登録順に、受け渡しタスクは起動順に処理される
//! - **取りこぼさない**: キューから取り出したジョブは、処理されるか
//!   [`ShutdownReport::abandoned`] に含まれるかのどちらかになる
//!
//! ## 停止処理
//!
//! ```text
//! shutdown() ─▶ 停止シグナル ─┬─▶ ディスパッチループ: キューを閉じて残りを回収
//!                           ├─▶ 受け渡しタスク: 未割り当てのジョブを返す
//!                           └─▶ ワーカー: 処理中のジョブを完了して終了
//!
//! drain()    ─▶ プロデューサーがすべて破棄され、キューが空になり、
//!               全ジョブの受け渡しが終わるまで待ってから shutdown() と同じ処理
//! ```

use std::sync::Arc;

use postbox_domain::{MailJob, MailJobId, WorkerId};
use postbox_infra::DeliveryLog;
use postbox_shared::{event_log::event, log_business_event};
use thiserror::Error;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::{
    delivery::MailDelivery,
    job_queue::JobReceiver,
    worker::Worker,
    worker_pool::WorkerPool,
};

/// ディスパッチャの構築エラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatcherError {
    #[error("ワーカー数は 1 以上である必要があります")]
    NoWorkers,

    #[error("ジョブキューの送信側がすべて破棄されています")]
    QueueDisconnected,
}

/// ディスパッチャ
pub struct Dispatcher {
    receiver:    JobReceiver,
    max_workers: usize,
    delivery:    Arc<MailDelivery>,
    log:         Arc<dyn DeliveryLog>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("max_workers", &self.max_workers)
            .field("pending", &self.receiver.len())
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// ディスパッチャを構築する
    ///
    /// ワーカー数が 0、またはキューの送信側がすでにすべて破棄されている場合はエラー。
    pub fn new(
        receiver: JobReceiver,
        max_workers: usize,
        delivery: Arc<MailDelivery>,
        log: Arc<dyn DeliveryLog>,
    ) -> Result<Self, DispatcherError> {
        if max_workers == 0 {
            return Err(DispatcherError::NoWorkers);
        }
        if receiver.is_disconnected() {
            return Err(DispatcherError::QueueDisconnected);
        }

        Ok(Self {
            receiver,
            max_workers,
            delivery,
            log,
        })
    }

    /// ワーカーを起動してからディスパッチループを開始する
    ///
    /// `self` を消費するため 2 回目の起動はできない。
    pub fn run(self) -> DispatcherHandle {
        let shutdown = CancellationToken::new();
        let pool = WorkerPool::new(self.max_workers);

        let mut workers = JoinSet::new();
        for n in 1..=self.max_workers {
            let id = WorkerId::new(n);
            let worker = Worker::new(
                id,
                pool.clone(),
                Arc::clone(&self.delivery),
                Arc::clone(&self.log),
                shutdown.clone(),
            );
            workers.spawn(
                worker
                    .run()
                    .instrument(tracing::info_span!("worker", worker.id = %id)),
            );
        }

        let dispatch = tokio::spawn(
            dispatch_loop(self.receiver, pool.clone(), shutdown.clone())
                .instrument(tracing::info_span!("dispatcher")),
        );

        log_business_event!(
            event.category = event::category::DISPATCHER,
            event.action = event::action::DISPATCHER_STARTED,
            event.result = event::result::SUCCESS,
            dispatcher.max_workers = self.max_workers,
            "ディスパッチャ開始"
        );

        DispatcherHandle {
            shutdown,
            dispatch,
            workers,
            pool,
        }
    }
}

/// 受け渡しタスクの結果
#[derive(Debug)]
enum HandOff {
    Delivered {
        job_id:    MailJobId,
        worker_id: WorkerId,
    },
    Abandoned(Box<MailJob>),
}

/// キューからジョブを取り出し、ジョブごとに受け渡しタスクを起動する
///
/// 停止シグナルまたはキューの切断で終了し、割り当てられなかったジョブを返す。
async fn dispatch_loop(
    mut receiver: JobReceiver,
    pool: WorkerPool,
    shutdown: CancellationToken,
) -> Vec<MailJob> {
    let mut hand_offs: JoinSet<HandOff> = JoinSet::new();
    let mut abandoned = Vec::new();

    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => break,
            Some(joined) = hand_offs.join_next() => {
                collect_hand_off(joined, &mut abandoned);
            }
            received = receiver.recv() => match received {
                Some(job) => {
                    hand_offs.spawn(hand_off(Box::new(job), pool.clone(), shutdown.clone()));
                }
                None => break,
            },
        }
    }

    // 停止後の投入は拒否し、キューに残ったジョブは割り当てずに返す
    receiver.close();
    while let Some(job) = receiver.try_recv() {
        abandoned.push(job);
    }

    while let Some(joined) = hand_offs.join_next().await {
        collect_hand_off(joined, &mut abandoned);
    }

    abandoned
}

fn collect_hand_off(
    joined: Result<HandOff, tokio::task::JoinError>,
    abandoned: &mut Vec<MailJob>,
) {
    match joined {
        Ok(HandOff::Delivered { job_id, worker_id }) => {
            tracing::debug!(job_id = %job_id, worker.id = %worker_id, "ジョブを割り当て");
        }
        Ok(HandOff::Abandoned(job)) => abandoned.push(*job),
        Err(e) => {
            tracing::error!(error = %e, "受け渡しタスクが異常終了");
        }
    }
}

/// 待機中のワーカーを 1 つ取り出してジョブを渡す
///
/// 取り出した受け口が閉じていた場合（停止処理中のワーカー）は次の受け口で再試行する。
async fn hand_off(
    mut job: Box<MailJob>,
    pool: WorkerPool,
    shutdown: CancellationToken,
) -> HandOff {
    loop {
        let inbox = tokio::select! {
            biased;

            _ = shutdown.cancelled() => return HandOff::Abandoned(job),
            inbox = pool.acquire() => match inbox {
                Some(inbox) => inbox,
                None => return HandOff::Abandoned(job),
            },
        };

        let worker_id = inbox.worker_id();
        let job_id = job.id();
        match inbox.deliver(job) {
            Ok(()) => return HandOff::Delivered { job_id, worker_id },
            Err(returned) => job = returned,
        }
    }
}

/// 停止処理の結果
#[derive(Debug, Default)]
pub struct ShutdownReport {
    /// 処理されなかったジョブ（キューに残っていたもの、割り当て前だったもの）
    pub abandoned:       Vec<MailJob>,
    /// 停止したワーカー数
    pub workers_stopped: usize,
}

/// 起動中のディスパッチャ
#[derive(Debug)]
pub struct DispatcherHandle {
    shutdown: CancellationToken,
    dispatch: JoinHandle<Vec<MailJob>>,
    workers:  JoinSet<()>,
    pool:     WorkerPool,
}

impl DispatcherHandle {
    /// 現在ジョブを待っているワーカー数
    pub fn idle_workers(&self) -> usize {
        self.pool.idle_count()
    }

    /// 停止シグナルを送り、処理中のジョブの完了とワーカーの終了を待つ
    pub async fn shutdown(self) -> ShutdownReport {
        tracing::info!("ディスパッチャ停止要求");
        self.shutdown.cancel();
        let abandoned = join_dispatch(self.dispatch).await;
        finish(self.workers, abandoned).await
    }

    /// キューに投入済みのジョブをすべてワーカーへ渡してから停止する
    ///
    /// すべての [`JobQueue`](super::job_queue::JobQueue) が破棄されるまで戻らない。
    pub async fn drain(self) -> ShutdownReport {
        self.drain_or_shutdown(std::future::pending()).await
    }

    /// [`drain`](Self::drain) と同じだが、排出中に `interrupt` が完了したら
    /// その時点で [`shutdown`](Self::shutdown) に切り替える
    pub async fn drain_or_shutdown(self, interrupt: impl Future<Output = ()>) -> ShutdownReport {
        tracing::info!("ディスパッチャ排出待ち");
        let mut dispatch = self.dispatch;

        let abandoned = tokio::select! {
            joined = &mut dispatch => joined.unwrap_or_else(|e| {
                tracing::error!(error = %e, "ディスパッチループが異常終了");
                Vec::new()
            }),
            () = interrupt => {
                tracing::info!("排出中に停止要求");
                self.shutdown.cancel();
                join_dispatch(dispatch).await
            }
        };

        self.shutdown.cancel();
        finish(self.workers, abandoned).await
    }
}

async fn join_dispatch(dispatch: JoinHandle<Vec<MailJob>>) -> Vec<MailJob> {
    dispatch.await.unwrap_or_else(|e| {
        tracing::error!(error = %e, "ディスパッチループが異常終了");
        Vec::new()
    })
}

async fn finish(mut workers: JoinSet<()>, abandoned: Vec<MailJob>) -> ShutdownReport {
    let mut workers_stopped = 0;
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(()) => workers_stopped += 1,
            Err(e) => tracing::error!(error = %e, "ワーカーが異常終了"),
        }
    }

    for job in &abandoned {
        tracing::warn!(
            event.category = event::category::NOTIFICATION,
            event.action = event::action::NOTIFICATION_ABANDONED,
            event.entity_type = event::entity_type::MAIL_JOB,
            event.entity_id = %job.id(),
            notification.recipient = %job.to_address(),
            "未処理のジョブを破棄"
        );
    }

    log_business_event!(
        event.category = event::category::DISPATCHER,
        event.action = event::action::DISPATCHER_STOPPED,
        event.result = event::result::SUCCESS,
        dispatcher.workers_stopped = workers_stopped,
        dispatcher.abandoned = abandoned.len(),
        "ディスパッチャ停止"
    );

    ShutdownReport {
        abandoned,
        workers_stopped,
    }
}

#[cfg(test)]
mod tests {
    use postbox_infra::{
        PreferenceStore,
        mock::{MockDeliveryLog, MockMailer},
    };
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::usecase::{
        job_queue::job_queue,
        render::{RenderPipeline, TemplateSource},
    };

    fn delivery() -> Arc<MailDelivery> {
        Arc::new(MailDelivery::new(
            RenderPipeline::new(TemplateSource::Inline("{{ content }}".to_string())),
            Arc::new(MockMailer::new()),
            Arc::new(PreferenceStore::default()),
        ))
    }

    #[test]
    fn test_ワーカー数0では構築できない() {
        let (_queue, receiver) = job_queue();

        let result = Dispatcher::new(receiver, 0, delivery(), Arc::new(MockDeliveryLog::new()));

        assert_eq!(result.unwrap_err(), DispatcherError::NoWorkers);
    }

    #[test]
    fn test_送信側が破棄されたキューでは構築できない() {
        let (queue, receiver) = job_queue();
        drop(queue);

        let result = Dispatcher::new(receiver, 2, delivery(), Arc::new(MockDeliveryLog::new()));

        assert_eq!(result.unwrap_err(), DispatcherError::QueueDisconnected);
    }

    #[tokio::test]
    async fn test_停止シグナル後の受け渡しはジョブを返す() {
        let pool = WorkerPool::new(1);
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let job = Box::new(MailJob::new("from@example.com", "to@example.com", "件名", "本文"));
        let expected = job.id();

        let result = hand_off(job, pool, shutdown).await;

        assert!(matches!(result, HandOff::Abandoned(job) if job.id() == expected));
    }

    #[tokio::test]
    async fn test_閉じた受け口を飛ばして次のワーカーへ渡す() {
        use crate::usecase::worker_pool::WorkerInbox;

        let pool = WorkerPool::new(2);
        let (stale, mut stale_rx) = WorkerInbox::new(WorkerId::new(1));
        stale_rx.close();
        let (live, live_rx) = WorkerInbox::new(WorkerId::new(2));
        pool.register(stale).await;
        pool.register(live).await;
        let job = Box::new(MailJob::new("from@example.com", "to@example.com", "件名", "本文"));
        let expected = job.id();

        let result = hand_off(job, pool, CancellationToken::new()).await;

        assert!(matches!(
            result,
            HandOff::Delivered { job_id, worker_id } if job_id == expected && worker_id == WorkerId::new(2)
        ));
        assert_eq!(live_rx.await.unwrap().id(), expected);
    }
}
