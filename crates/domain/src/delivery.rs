//! # 配信結果
//!
//! ジョブ処理で発生するエラーの分類と、1 ジョブにつき 1 件出力される配信結果。
//!
//! ## エラーの扱い
//!
//! | 種別 | 扱い |
//! |------|------|
//! | `Template` | ジョブ失敗。送信しない |
//! | `TextDerivation` | 回復可能。空のテキスト本文で続行 |
//! | `Inlining` | 回復可能。インライン化前の HTML で続行 |
//! | `Connection` | ジョブ失敗。送信しない |
//! | `Compose` | ジョブ失敗。送信しない |
//! | `Send` | ジョブ失敗 |
//! | `WorkerFault` | ジョブ失敗（処理中のパニック） |
//!
//! いずれもワーカー内で完結し、ディスパッチャや他のワーカーには伝播しない。
//! 自動リトライはどの層でも行わない。

use chrono::{DateTime, Utc};
use strum::IntoStaticStr;
use thiserror::Error;

use crate::mail_job::{MailJob, MailJobId};

/// ワーカー番号（1 始まり）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
#[display("worker-{_0}")]
pub struct WorkerId(usize);

impl WorkerId {
    pub fn new(value: usize) -> Self {
        Self(value)
    }

    pub fn as_usize(&self) -> usize {
        self.0
    }
}

/// 配信エラー
#[derive(Debug, Clone, PartialEq, Eq, Error, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum DeliveryError {
    /// テンプレートが存在しない、または構文・展開エラー
    #[error("テンプレートのレンダリングに失敗: {0}")]
    Template(String),

    /// HTML からプレーンテキストへの変換に失敗
    #[error("プレーンテキストへの変換に失敗: {0}")]
    TextDerivation(String),

    /// CSS のインライン化に失敗
    #[error("CSS のインライン化に失敗: {0}")]
    Inlining(String),

    /// 配信バックエンドへの接続・認証に失敗
    #[error("SMTP サーバーへの接続に失敗: {0}")]
    Connection(String),

    /// メッセージの組み立てに失敗（不正なアドレス、読めない添付ファイル）
    #[error("メッセージの組み立てに失敗: {0}")]
    Compose(String),

    /// 送信中にトランスポートまたはプロトコルのエラー
    #[error("メール送信に失敗: {0}")]
    Send(String),

    /// ジョブ処理中にワーカー内部で異常が発生
    #[error("ワーカー内部エラー: {0}")]
    WorkerFault(String),
}

impl DeliveryError {
    /// ログ出力用の種別名（`template`, `connection` など）
    pub fn kind(&self) -> &'static str {
        self.into()
    }
}

/// 配信ステータス
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum DeliveryStatus {
    Sent,
    Failed,
}

/// 配信結果
///
/// ワーカーが 1 ジョブの処理を終えるたびに 1 件作られ、配信ログに渡される。
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryReport {
    pub job_id:      MailJobId,
    pub worker_id:   WorkerId,
    pub recipient:   String,
    pub subject:     String,
    pub status:      DeliveryStatus,
    pub error:       Option<DeliveryError>,
    pub enqueued_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl DeliveryReport {
    /// 処理結果から配信結果を作る
    pub fn from_result(
        job: &MailJob,
        worker_id: WorkerId,
        result: Result<(), DeliveryError>,
    ) -> Self {
        let (status, error) = match result {
            Ok(()) => (DeliveryStatus::Sent, None),
            Err(e) => (DeliveryStatus::Failed, Some(e)),
        };

        Self {
            job_id: job.id(),
            worker_id,
            recipient: job.to_address().to_string(),
            subject: job.subject().to_string(),
            status,
            error,
            enqueued_at: job.enqueued_at(),
            finished_at: Utc::now(),
        }
    }

    pub fn is_sent(&self) -> bool {
        self.status == DeliveryStatus::Sent
    }

    /// キュー投入から処理完了までの経過ミリ秒
    pub fn elapsed_ms(&self) -> i64 {
        (self.finished_at - self.enqueued_at).num_milliseconds()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(DeliveryError::Template("missing".into()), "template")]
    #[case(DeliveryError::TextDerivation("width".into()), "text_derivation")]
    #[case(DeliveryError::Inlining("css".into()), "inlining")]
    #[case(DeliveryError::Connection("refused".into()), "connection")]
    #[case(DeliveryError::Compose("address".into()), "compose")]
    #[case(DeliveryError::Send("550".into()), "send")]
    #[case(DeliveryError::WorkerFault("panic".into()), "worker_fault")]
    fn test_エラー種別名(#[case] error: DeliveryError, #[case] kind: &str) {
        assert_eq!(error.kind(), kind);
    }

    #[test]
    fn test_成功結果からsentの配信結果を作る() {
        let job = MailJob::new("from@example.com", "to@example.com", "件名", "本文");

        let report = DeliveryReport::from_result(&job, WorkerId::new(1), Ok(()));

        assert_eq!(report.job_id, job.id());
        assert_eq!(report.enqueued_at, job.enqueued_at());
        assert!(report.elapsed_ms() >= 0);
        assert_eq!(report.status, DeliveryStatus::Sent);
        assert_eq!(report.recipient, "to@example.com");
        assert!(report.error.is_none());
        assert!(report.is_sent());
    }

    #[test]
    fn test_失敗結果からfailedの配信結果を作る() {
        let job = MailJob::new("from@example.com", "to@example.com", "件名", "本文");
        let error = DeliveryError::Connection("refused".into());

        let report = DeliveryReport::from_result(&job, WorkerId::new(2), Err(error.clone()));

        assert_eq!(report.status, DeliveryStatus::Failed);
        assert_eq!(report.error, Some(error));
        assert_eq!(report.worker_id.to_string(), "worker-2");
    }
}
