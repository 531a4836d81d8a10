//! # Mail Worker 設定
//!
//! 環境変数からメールワーカーの設定を読み込む。
//!
//! SMTP 関連の値は起動時の設定マップの初期値としてのみ使う。
//! 起動後は設定ストアの値がジョブごとに読み直される。

use std::{collections::HashMap, env, path::PathBuf};

use postbox_domain::preference::keys;
use thiserror::Error;

const DEFAULT_MAX_WORKERS: usize = 4;
const DEFAULT_TEMPLATE_DIR: &str = "./templates";
const DEFAULT_TEMPLATE: &str = "mail.html";
const DEFAULT_SMTP_SERVER: &str = "localhost";
const DEFAULT_SMTP_PORT: &str = "1025";

/// 設定読み込みエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("MAIL_WORKER_COUNT は 1 以上の整数である必要があります: {0:?}")]
    InvalidWorkerCount(String),

    #[error("MAIL_BACKEND は smtp または noop である必要があります: {0:?}")]
    UnknownBackend(String),
}

/// 配信バックエンド
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MailBackend {
    /// SMTP で送信する
    #[default]
    Smtp,
    /// 送信せずログ出力のみ
    Noop,
}

impl MailBackend {
    fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "smtp" => Ok(Self::Smtp),
            "noop" => Ok(Self::Noop),
            _ => Err(ConfigError::UnknownBackend(raw.to_string())),
        }
    }
}

/// メールワーカーの設定
#[derive(Clone)]
pub struct MailWorkerConfig {
    /// 同時に処理するジョブ数の上限
    pub max_workers:      usize,
    pub backend:          MailBackend,
    /// テンプレートを探すディレクトリ
    pub template_dir:     PathBuf,
    /// ジョブでテンプレート名が指定されていない場合のテンプレート
    pub default_template: String,
    pub smtp_server:      String,
    pub smtp_port:        String,
    pub smtp_user:        String,
    pub smtp_password:    String,
}

impl std::fmt::Debug for MailWorkerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailWorkerConfig")
            .field("max_workers", &self.max_workers)
            .field("backend", &self.backend)
            .field("template_dir", &self.template_dir)
            .field("default_template", &self.default_template)
            .field("smtp_server", &self.smtp_server)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_user", &self.smtp_user)
            .field("smtp_password", &"[REDACTED]")
            .finish()
    }
}

impl MailWorkerConfig {
    /// 環境変数から設定を読み込む
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// 任意の読み取り関数から設定を読み込む
    ///
    /// テスト間で環境変数が競合しないよう、読み取り元を差し替えられるようにしている。
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let max_workers = match lookup("MAIL_WORKER_COUNT") {
            None => DEFAULT_MAX_WORKERS,
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => return Err(ConfigError::InvalidWorkerCount(raw)),
            },
        };

        let backend = match lookup("MAIL_BACKEND") {
            None => MailBackend::default(),
            Some(raw) => MailBackend::parse(&raw)?,
        };

        Ok(Self {
            max_workers,
            backend,
            template_dir: PathBuf::from(or("MAIL_TEMPLATE_DIR", DEFAULT_TEMPLATE_DIR)),
            default_template: or("MAIL_DEFAULT_TEMPLATE", DEFAULT_TEMPLATE),
            smtp_server: or("SMTP_SERVER", DEFAULT_SMTP_SERVER),
            smtp_port: or("SMTP_PORT", DEFAULT_SMTP_PORT),
            smtp_user: or("SMTP_USER", ""),
            smtp_password: or("SMTP_PASSWORD", ""),
        })
    }

    /// 設定ストアの初期値
    pub fn initial_preferences(&self) -> HashMap<String, String> {
        [
            (keys::SMTP_SERVER, &self.smtp_server),
            (keys::SMTP_PORT, &self.smtp_port),
            (keys::SMTP_USER, &self.smtp_user),
            (keys::SMTP_PASSWORD, &self.smtp_password),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
    }
}
