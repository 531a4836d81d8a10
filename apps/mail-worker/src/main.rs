//! # Mail Worker
//!
//! 標準入力から 1 行 1 件の JSON でメール配信ジョブを受け取り、
//! ワーカープールで並行に配信する。
//!
//! ```text
//! stdin (JSON Lines) → JobQueue → Dispatcher → Worker × N → SMTP
//! ```
//!
//! ## 停止
//!
//! - 標準入力が閉じた場合: 投入済みのジョブをすべてワーカーへ渡してから停止する
//! - Ctrl-C: 処理中のジョブの完了を待って停止する。未割り当てのジョブは破棄してログに残す。
//!   標準入力が閉じた後の排出待ちの最中でも同様
//!
//! ## 環境変数
//!
//! | 変数名 | 必須 | 説明 |
//! |--------|------|------|
//! | `MAIL_WORKER_COUNT` | No | 同時に処理するジョブ数（デフォルト: `4`） |
//! | `MAIL_BACKEND` | No | `smtp` または `noop`（デフォルト: `smtp`） |
//! | `MAIL_TEMPLATE_DIR` | No | テンプレートディレクトリ（デフォルト: `./templates`） |
//! | `MAIL_DEFAULT_TEMPLATE` | No | 既定のテンプレート名（デフォルト: `mail.html`） |
//! | `SMTP_SERVER` | No | SMTP ホスト（デフォルト: `localhost`） |
//! | `SMTP_PORT` | No | SMTP ポート（デフォルト: `1025`） |
//! | `SMTP_USER` | No | SMTP ユーザー名 |
//! | `SMTP_PASSWORD` | No | SMTP パスワード |
//! | `LOG_FORMAT` | No | `json` または `pretty`（デフォルト: `pretty`） |
//!
//! ## 起動方法
//!
//! ```bash
//! # ローカルの Mailpit などに送信
//! cat jobs.jsonl | cargo run -p postbox-mail-worker
//!
//! # 送信せずに動作確認
//! MAIL_BACKEND=noop cat jobs.jsonl | cargo run -p postbox-mail-worker
//! ```

use std::sync::Arc;

use postbox_domain::MailJob;
use postbox_infra::{Mailer, NoopMailer, PreferenceStore, SmtpMailer, TracingDeliveryLog};
use postbox_mail_worker::{
    config::{MailBackend, MailWorkerConfig},
    usecase::{
        Dispatcher,
        JobQueue,
        MailDelivery,
        RenderPipeline,
        ShutdownReport,
        TemplateSource,
        job_queue,
    },
};
use postbox_shared::{TracingConfig, observability};
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env ファイルを読み込む（存在する場合）
    dotenvy::dotenv().ok();

    observability::init_tracing(&TracingConfig::from_env("mail-worker"));

    let config = MailWorkerConfig::from_env()?;
    tracing::info!(?config, "Mail Worker を起動します");

    let preferences = PreferenceStore::new(config.initial_preferences());
    let mailer: Arc<dyn Mailer> = match config.backend {
        MailBackend::Smtp => Arc::new(SmtpMailer::new()),
        MailBackend::Noop => Arc::new(NoopMailer),
    };
    let pipeline = RenderPipeline::new(TemplateSource::directory(
        &config.template_dir,
        &config.default_template,
    ));
    let delivery = Arc::new(MailDelivery::new(pipeline, mailer, Arc::new(preferences)));

    let (queue, receiver) = job_queue();
    let dispatcher = Dispatcher::new(
        receiver,
        config.max_workers,
        delivery,
        Arc::new(TracingDeliveryLog),
    )?;
    let handle = dispatcher.run();

    let producer = tokio::spawn(read_jobs(queue));

    let report = tokio::select! {
        result = producer => {
            if let Err(e) = result {
                tracing::error!(error = %e, "ジョブ読み込みタスクが異常終了");
            }
            tracing::info!("標準入力が閉じられました。投入済みのジョブを処理して停止します");
            handle.drain_or_shutdown(shutdown_signal()).await
        }
        () = shutdown_signal() => handle.shutdown().await,
    };

    log_report(&report);
    Ok(())
}

/// 標準入力から JSON Lines のジョブを読み込んでキューに投入する
///
/// 解析できない行は警告を出して読み飛ばす。
async fn read_jobs(queue: JobQueue) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut line_no = 0usize;

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::error!(error = %e, "標準入力の読み込みに失敗");
                break;
            }
        };
        line_no += 1;

        if line.trim().is_empty() {
            continue;
        }

        let job = match serde_json::from_str::<MailJob>(&line) {
            Ok(job) => job,
            Err(e) => {
                tracing::warn!(line = line_no, error = %e, "ジョブを解析できないため読み飛ばします");
                continue;
            }
        };

        if let Err(e) = queue.enqueue(job) {
            let job = e.into_job();
            tracing::warn!(job_id = %job.id(), "ディスパッチャが停止済みのため投入できません");
            break;
        }
    }
}

/// Ctrl-C を待つ
///
/// シグナルハンドラを登録できない場合は完了しない。
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("停止シグナルを受信しました"),
        Err(e) => {
            tracing::error!(error = %e, "シグナルハンドラを登録できません");
            std::future::pending::<()>().await;
        }
    }
}

fn log_report(report: &ShutdownReport) {
    tracing::info!(
        workers_stopped = report.workers_stopped,
        abandoned = report.abandoned.len(),
        "Mail Worker を停止しました"
    );
}
