//! # メール配信
//!
//! 1 ジョブ分のレンダリング → 接続 → 組み立て → 送信を行う。
//!
//! ## 設計方針
//!
//! - **構造化された結果**: 成否は `Result<(), DeliveryError>` で返し、ログ出力はワーカーに任せる
//! - **設定は毎回読み直す**: ジョブ開始時に設定マップのスナップショットを取り、
//!   テンプレート変数と接続パラメータの両方に使う
//! - **依存性注入**: メーラーと設定ストアはトレイトで受け取る

use std::sync::Arc;

use postbox_domain::{DeliveryError, MailJob, OutboundMessage, SmtpConnectionParams};
use postbox_infra::{Mailer, PreferenceSource};

use super::render::RenderPipeline;

/// メール配信
///
/// 状態を持たず、すべてのワーカーで 1 つのインスタンスを共有する。
pub struct MailDelivery {
    pipeline:    RenderPipeline,
    mailer:      Arc<dyn Mailer>,
    preferences: Arc<dyn PreferenceSource>,
}

impl MailDelivery {
    pub fn new(
        pipeline: RenderPipeline,
        mailer: Arc<dyn Mailer>,
        preferences: Arc<dyn PreferenceSource>,
    ) -> Self {
        Self {
            pipeline,
            mailer,
            preferences,
        }
    }

    /// ジョブを 1 回配信する
    ///
    /// テンプレートエラーの場合は接続を試みない。接続エラーの場合は送信しない。
    /// リトライは行わない。
    #[tracing::instrument(skip_all, level = "debug", fields(job_id = %job.id()))]
    pub async fn deliver(&self, job: &MailJob) -> Result<(), DeliveryError> {
        let preferences = self.preferences.snapshot();

        let body = self.pipeline.render(job, &preferences).await?;

        let params = SmtpConnectionParams::from_preferences(&preferences);
        let connection = self.mailer.connect(&params).await?;

        let message = OutboundMessage::compose(job, body);
        connection.send(&message).await
    }
}
