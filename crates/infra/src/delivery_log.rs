//! # 配信ログ
//!
//! 1 ジョブの処理結果につき 1 行を外部のログ出力先へ記録する。
//! 成功は info、失敗は warn レベル。
//!
//! 本番では [`TracingDeliveryLog`] が構造化ビジネスイベントとして出力する。
//! テストでは [`crate::mock::MockDeliveryLog`] で記録内容を検証する。

use postbox_domain::{DeliveryError, DeliveryReport, DeliveryStatus};
use postbox_shared::{
    event_log::{error, event},
    log_business_event,
    log_business_failure,
};

/// 配信結果の出力先
pub trait DeliveryLog: Send + Sync {
    fn record(&self, report: &DeliveryReport);
}

/// tracing へ 1 行のビジネスイベントとして出力する配信ログ
#[derive(Debug, Clone, Default)]
pub struct TracingDeliveryLog;

impl DeliveryLog for TracingDeliveryLog {
    fn record(&self, report: &DeliveryReport) {
        match (&report.status, &report.error) {
            (DeliveryStatus::Sent, _) => {
                log_business_event!(
                    event.category = event::category::NOTIFICATION,
                    event.action = event::action::NOTIFICATION_SENT,
                    event.entity_type = event::entity_type::MAIL_JOB,
                    event.entity_id = %report.job_id,
                    event.result = event::result::SUCCESS,
                    worker.id = %report.worker_id,
                    notification.recipient = %report.recipient,
                    notification.elapsed_ms = report.elapsed_ms(),
                    "メール送信成功"
                );
            }
            (DeliveryStatus::Failed, failure) => {
                let kind = failure.as_ref().map(|e| e.kind()).unwrap_or("unknown");
                let category = failure
                    .as_ref()
                    .map(error_category)
                    .unwrap_or(error::category::INTERNAL);
                let message = failure.as_ref().map(ToString::to_string).unwrap_or_default();
                log_business_failure!(
                    event.category = event::category::NOTIFICATION,
                    event.action = event::action::NOTIFICATION_FAILED,
                    event.entity_type = event::entity_type::MAIL_JOB,
                    event.entity_id = %report.job_id,
                    event.result = event::result::FAILURE,
                    worker.id = %report.worker_id,
                    notification.recipient = %report.recipient,
                    notification.elapsed_ms = report.elapsed_ms(),
                    error.category = category,
                    error.kind = kind,
                    error.message = %message,
                    "メール送信失敗"
                );
            }
        }
    }
}

fn error_category(e: &DeliveryError) -> &'static str {
    match e {
        DeliveryError::Template(_)
        | DeliveryError::TextDerivation(_)
        | DeliveryError::Inlining(_)
        | DeliveryError::Compose(_) => error::category::RENDERING,
        DeliveryError::Connection(_) | DeliveryError::Send(_) => error::category::EXTERNAL_SERVICE,
        DeliveryError::WorkerFault(_) => error::category::INTERNAL,
    }
}
