//! # ワーカープール
//!
//! 待機中ワーカーの受け口（[`WorkerInbox`]）を到着順に保持する。
//!
//! ワーカーは 1 ジョブごとに新しい受け口を登録し、ディスパッチャは
//! 最も長く待っている受け口を取り出してジョブを 1 件だけ渡す。
//! プールの容量はワーカー数と同じで、登録が溢れることはない。
//!
//! ```text
//! Worker ──register(inbox)──▶ [inbox, inbox, ...] ──acquire()──▶ Dispatcher
//!    ▲                                                              │
//!    └──────────────────── oneshot (Box<MailJob>) ◀─────────────────┘
//! ```

use std::sync::Arc;

use postbox_domain::{MailJob, WorkerId};
use tokio::sync::{Mutex, mpsc, oneshot};

/// 待機中ワーカー 1 回分の受け口
///
/// ジョブを 1 件渡すと消費される。
#[derive(Debug)]
pub struct WorkerInbox {
    worker_id: WorkerId,
    slot:      oneshot::Sender<Box<MailJob>>,
}

impl WorkerInbox {
    /// 受け口と、ワーカー側で待つ受信口を作る
    pub fn new(worker_id: WorkerId) -> (Self, oneshot::Receiver<Box<MailJob>>) {
        let (slot, rx) = oneshot::channel();
        (Self { worker_id, slot }, rx)
    }

    pub fn worker_id(&self) -> WorkerId {
        self.worker_id
    }

    /// ジョブを渡す
    ///
    /// ワーカーが受信口を閉じていた場合（停止処理中）はジョブを返す。
    pub fn deliver(self, job: Box<MailJob>) -> Result<(), Box<MailJob>> {
        self.slot.send(job)
    }
}

/// 待機中ワーカーのプール
///
/// `Clone` はハンドルの複製で、同じプールを共有する。
#[derive(Debug, Clone)]
pub struct WorkerPool {
    tx: mpsc::Sender<WorkerInbox>,
    rx: Arc<Mutex<mpsc::Receiver<WorkerInbox>>>,
}

impl WorkerPool {
    /// ワーカー数を容量としてプールを作る
    ///
    /// `capacity` は 1 以上であること。
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
        }
    }

    /// 待機中としてプールに加わる
    pub async fn register(&self, inbox: WorkerInbox) {
        if self.tx.send(inbox).await.is_err() {
            tracing::debug!("ワーカープールは閉じています");
        }
    }

    /// 最も長く待っているワーカーの受け口を取り出す
    ///
    /// 待機中のワーカーがいなければ登録されるまで待つ。
    /// 取り出し待ちが複数ある場合も到着順に処理される。
    pub async fn acquire(&self) -> Option<WorkerInbox> {
        let mut rx = self.rx.lock().await;
        rx.recv().await
    }

    /// 現在プールで待機している受け口の数
    ///
    /// 停止処理中のワーカーが残した受け口も含む。
    pub fn idle_count(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}
