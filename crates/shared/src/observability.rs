//! # トレーシング初期化
//!
//! メールワーカーの tracing subscriber を組み立てる。
//!
//! | 変数名 | 説明 |
//! |--------|------|
//! | `LOG_FORMAT` | `json`（集約基盤向け）または `pretty`（開発向け、既定） |
//! | `RUST_LOG` | フィルタ。未設定なら [`TracingConfig::default_filter`] |
//!
//! JSON では現在のスパン（`worker.id` など）を、pretty ではスレッド名を併記する。

/// ログ出力形式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

impl LogFormat {
    /// 大文字小文字と前後の空白を無視して解釈する。不明な値は `None`
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "pretty" => Some(Self::Pretty),
            _ => None,
        }
    }
}

/// トレーシング初期化設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingConfig {
    /// 起動ログに出力するサービス名
    pub service_name:   String,
    pub log_format:     LogFormat,
    /// `RUST_LOG` 未設定時のフィルタ
    pub default_filter: String,
}

impl TracingConfig {
    pub fn new(service_name: impl Into<String>, log_format: LogFormat) -> Self {
        Self {
            service_name: service_name.into(),
            log_format,
            default_filter: "info,postbox=debug".to_string(),
        }
    }

    /// 環境変数 `LOG_FORMAT` から出力形式を決める
    pub fn from_env(service_name: impl Into<String>) -> Self {
        Self::from_lookup(service_name, |key| std::env::var(key).ok())
    }

    /// 任意の読み取り関数から出力形式を決める
    ///
    /// 不明な値は pretty として扱い、subscriber がまだないため stderr に警告する。
    pub fn from_lookup(
        service_name: impl Into<String>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let log_format = match lookup("LOG_FORMAT") {
            None => LogFormat::default(),
            Some(raw) => LogFormat::parse(&raw).unwrap_or_else(|| {
                eprintln!("WARNING: LOG_FORMAT={raw:?} は不明な値です。pretty で出力します");
                LogFormat::Pretty
            }),
        };
        Self::new(service_name, log_format)
    }

    pub fn with_default_filter(mut self, filter: impl Into<String>) -> Self {
        self.default_filter = filter.into();
        self
    }
}

/// グローバル subscriber を登録する
///
/// プロセスで 1 回だけ呼ぶこと。
#[cfg(feature = "observability")]
pub fn init_tracing(config: &TracingConfig) {
    use tracing_subscriber::{EnvFilter, Layer as _, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    let output = match config.log_format {
        LogFormat::Json => fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(false)
            .boxed(),
        LogFormat::Pretty => fmt::layer().with_thread_names(true).boxed(),
    };

    tracing_subscriber::registry().with(filter).with(output).init();

    tracing::info!(
        service = %config.service_name,
        log_format = ?config.log_format,
        "トレーシングを初期化しました"
    );
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_ログ形式の文字列を解釈する() {
        assert_eq!(LogFormat::parse("json"), Some(LogFormat::Json));
        assert_eq!(LogFormat::parse(" JSON "), Some(LogFormat::Json));
        assert_eq!(LogFormat::parse("pretty"), Some(LogFormat::Pretty));
        assert_eq!(LogFormat::parse("yaml"), None);
    }

    #[test]
    fn test_未設定ならprettyで既定フィルタを使う() {
        let config = TracingConfig::from_lookup("mail-worker", |_| None);

        assert_eq!(config.service_name, "mail-worker");
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(config.default_filter, "info,postbox=debug");
    }

    #[test]
    fn test_不明なログ形式はprettyにフォールバックする() {
        let config = TracingConfig::from_lookup("mail-worker", |_| Some("xml".to_string()));

        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_既定フィルタを差し替えられる() {
        let config = TracingConfig::new("mail-worker", LogFormat::Json).with_default_filter("warn");

        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.default_filter, "warn");
    }
}
