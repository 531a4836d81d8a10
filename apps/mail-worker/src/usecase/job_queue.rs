//! # ジョブキュー
//!
//! 任意のタスクから投入できる非有界の FIFO キュー。
//!
//! 送信側 [`JobQueue`] は複製して複数のプロデューサーで共有できる。
//! 受信側 [`JobReceiver`] はディスパッチャだけが保持する。
//!
//! ## 順序
//!
//! 投入順に取り出される。ただし複数ワーカーで並行処理するため、
//! 配信の完了順は保証しない。

use postbox_domain::{MailJob, MailJobId};
use thiserror::Error;
use tokio::sync::mpsc;

/// ジョブ投入エラー
#[derive(Debug, Error)]
pub enum EnqueueError {
    /// ディスパッチャが停止済みでキューが閉じている。ジョブは呼び出し元に返す
    #[error("ジョブキューは閉じています")]
    Closed(Box<MailJob>),
}

impl EnqueueError {
    /// 投入できなかったジョブを取り戻す
    pub fn into_job(self) -> MailJob {
        match self {
            Self::Closed(job) => *job,
        }
    }
}

/// ジョブキューを作成する
pub fn job_queue() -> (JobQueue, JobReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (JobQueue { tx }, JobReceiver { rx })
}

/// ジョブキューの送信側
#[derive(Debug, Clone)]
pub struct JobQueue {
    tx: mpsc::UnboundedSender<MailJob>,
}

impl JobQueue {
    /// ジョブを末尾に追加する
    ///
    /// 待機せずに戻る。受信側が閉じている場合のみ失敗する。
    pub fn enqueue(&self, job: MailJob) -> Result<MailJobId, EnqueueError> {
        let id = job.id();
        self.tx
            .send(job)
            .map_err(|mpsc::error::SendError(job)| EnqueueError::Closed(Box::new(job)))?;
        tracing::debug!(job_id = %id, "ジョブを投入");
        Ok(id)
    }

    /// 受信側が閉じているかどうか
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// ジョブキューの受信側
#[derive(Debug)]
pub struct JobReceiver {
    rx: mpsc::UnboundedReceiver<MailJob>,
}

impl JobReceiver {
    pub(crate) async fn recv(&mut self) -> Option<MailJob> {
        self.rx.recv().await
    }

    pub(crate) fn try_recv(&mut self) -> Option<MailJob> {
        self.rx.try_recv().ok()
    }

    /// 以降の投入を拒否する。投入済みのジョブは取り出せる
    pub(crate) fn close(&mut self) {
        self.rx.close();
    }

    /// 送信側がすべて破棄され、残りのジョブもない
    pub fn is_disconnected(&self) -> bool {
        self.rx.is_closed() && self.rx.is_empty()
    }

    /// 取り出し待ちのジョブ数
    pub(crate) fn len(&self) -> usize {
        self.rx.len()
    }
}
