//! # レンダリングパイプライン
//!
//! ジョブの内容からメール本文を生成する。
//!
//! ```text
//! MailJob + Preferences ─(tera)→ HTML ─┬─(html2text)→ プレーンテキスト
//!                                      └─(css-inline)→ インライン化 HTML
//! ```
//!
//! ## 失敗時の扱い
//!
//! - **HTML 生成**: テンプレートの欠落・構文エラーはジョブ失敗（送信しない）
//! - **テキスト変換**: 失敗しても空のテキスト本文で続行する
//! - **CSS インライン化**: 失敗してもインライン化前の HTML で続行する
//!
//! テキスト変換とインライン化はトレイトで差し替えられる。

use std::{
    error::Error as _,
    path::{Path, PathBuf},
    sync::Arc,
};

use postbox_domain::{DeliveryError, MailJob, Preferences, RenderedBody};
use tera::{Context, Tera};

/// プレーンテキスト変換の既定の折り返し幅
const TEXT_WIDTH: usize = 100;

/// テンプレートの取得元
#[derive(Debug, Clone)]
pub enum TemplateSource {
    /// ディレクトリ内のテンプレートファイル
    ///
    /// ジョブごとに読み直すため、ファイルの更新は再起動なしで反映される。
    /// ジョブがテンプレート名を指定しなければ `default_name` を使う。
    Directory { dir: PathBuf, default_name: String },
    /// 文字列で与えるテンプレート（全ジョブ共通）
    Inline(String),
}

impl TemplateSource {
    pub fn directory(dir: impl Into<PathBuf>, default_name: impl Into<String>) -> Self {
        Self::Directory {
            dir:          dir.into(),
            default_name: default_name.into(),
        }
    }

    async fn load(&self, job: &MailJob) -> Result<String, DeliveryError> {
        match self {
            Self::Inline(source) => Ok(source.clone()),
            Self::Directory { dir, default_name } => {
                let name = job.template().unwrap_or(default_name);
                let path = resolve_template_path(dir, name)?;
                tokio::fs::read_to_string(&path).await.map_err(|e| {
                    DeliveryError::Template(format!(
                        "テンプレートを読み込めません ({}): {e}",
                        path.display()
                    ))
                })
            }
        }
    }
}

/// テンプレート名をディレクトリ内のパスに解決する
///
/// ジョブ由来の名前でディレクトリ外を参照できないよう、単一のファイル名のみ受け付ける。
fn resolve_template_path(dir: &Path, name: &str) -> Result<PathBuf, DeliveryError> {
    let is_plain_file_name =
        !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\']);

    if !is_plain_file_name {
        return Err(DeliveryError::Template(format!(
            "テンプレート名が不正です: {name:?}"
        )));
    }

    Ok(dir.join(name))
}

/// HTML からプレーンテキストの代替本文を導出する
pub trait PlainTextDeriver: Send + Sync {
    fn derive(&self, html: &str) -> Result<String, DeliveryError>;
}

/// html2text による変換（表はレイアウトを保って描画する）
#[derive(Debug, Clone)]
pub struct Html2TextDeriver {
    width: usize,
}

impl Html2TextDeriver {
    pub fn new(width: usize) -> Self {
        Self { width }
    }
}

impl Default for Html2TextDeriver {
    fn default() -> Self {
        Self::new(TEXT_WIDTH)
    }
}

impl PlainTextDeriver for Html2TextDeriver {
    fn derive(&self, html: &str) -> Result<String, DeliveryError> {
        html2text::from_read(html.as_bytes(), self.width)
            .map_err(|e| DeliveryError::TextDerivation(e.to_string()))
    }
}

/// `<style>` のルールを各要素の `style` 属性へ移す
pub trait StyleInliner: Send + Sync {
    fn inline(&self, html: &str) -> Result<String, DeliveryError>;
}

/// css-inline によるインライン化
#[derive(Debug, Clone, Default)]
pub struct CssInliner;

impl StyleInliner for CssInliner {
    fn inline(&self, html: &str) -> Result<String, DeliveryError> {
        css_inline::inline(html).map_err(|e| DeliveryError::Inlining(e.to_string()))
    }
}

/// レンダリングパイプライン
///
/// 状態を持たず、同じジョブを何度渡しても同じ結果を独立に返す。
#[derive(Clone)]
pub struct RenderPipeline {
    source:       TemplateSource,
    text_deriver: Arc<dyn PlainTextDeriver>,
    inliner:      Arc<dyn StyleInliner>,
}

impl RenderPipeline {
    /// html2text と css-inline を使うパイプラインを作成する
    pub fn new(source: TemplateSource) -> Self {
        Self {
            source,
            text_deriver: Arc::new(Html2TextDeriver::default()),
            inliner: Arc::new(CssInliner),
        }
    }

    pub fn with_text_deriver(mut self, deriver: impl PlainTextDeriver + 'static) -> Self {
        self.text_deriver = Arc::new(deriver);
        self
    }

    pub fn with_inliner(mut self, inliner: impl StyleInliner + 'static) -> Self {
        self.inliner = Arc::new(inliner);
        self
    }

    /// ジョブから HTML 本文とプレーンテキスト本文を生成する
    ///
    /// 失敗として返るのは [`DeliveryError::Template`] のみ。
    pub async fn render(
        &self,
        job: &MailJob,
        preferences: &Preferences,
    ) -> Result<RenderedBody, DeliveryError> {
        let html = self.render_html(job, preferences).await?;

        let text = self.text_deriver.derive(&html).unwrap_or_else(|e| {
            tracing::warn!(
                job_id = %job.id(),
                error.kind = e.kind(),
                error = %e,
                "プレーンテキスト変換に失敗したため、空のテキスト本文で続行します"
            );
            String::new()
        });

        let html = match self.inliner.inline(&html) {
            Ok(inlined) => inlined,
            Err(e) => {
                tracing::warn!(
                    job_id = %job.id(),
                    error.kind = e.kind(),
                    error = %e,
                    "CSS インライン化に失敗したため、インライン化前の HTML で続行します"
                );
                html
            }
        };

        Ok(RenderedBody { html, text })
    }

    async fn render_html(
        &self,
        job: &MailJob,
        preferences: &Preferences,
    ) -> Result<String, DeliveryError> {
        let source = self.source.load(job).await?;
        let context = build_context(job, preferences);

        Tera::one_off(&source, &context, true)
            .map_err(|e| DeliveryError::Template(describe_tera_error(&e)))
    }
}

/// テンプレートに渡す変数を組み立てる
///
/// `content` は HTML 断片なので、テンプレート側で `| safe` を付けて展開する。
fn build_context(job: &MailJob, preferences: &Preferences) -> Context {
    let mut context = Context::new();
    context.insert("content", job.content());
    context.insert("from", job.from_address());
    context.insert("from_name", job.from_name());
    context.insert("subject", job.subject());
    context.insert("preference_map", preferences);
    context.insert("string_map", job.string_map());
    context.insert("int_map", job.int_map());
    context.insert("float_map", job.float_map());
    context.insert("row_sets", job.row_sets());
    context
}

/// tera のエラーは最上位のメッセージが汎用的なので、原因の連鎖をつなげて返す
fn describe_tera_error(error: &tera::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
