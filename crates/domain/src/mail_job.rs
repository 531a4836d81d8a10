//! # 配信ジョブ
//!
//! 1 通のメールをレンダリングして送信するための作業単位。
//!
//! ジョブはプロデューサー（Web ハンドラ等）が組み立て、キューに投入した時点で
//! 読み取り専用になる。公開フィールドを持たず、構築は `with_*` メソッドで行う。
//!
//! ## 置換マップ
//!
//! テンプレートには本文のほか、用途別の置換マップが渡される:
//!
//! | フィールド | 型 | テンプレート変数 |
//! |-----------|----|-----------------|
//! | `string_map` | 文字列 → 文字列 | `string_map` |
//! | `int_map` | 文字列 → 整数 | `int_map` |
//! | `float_map` | 文字列 → 浮動小数 | `float_map` |
//! | `row_sets` | 文字列 → 任意の構造化データ | `row_sets` |

use std::{collections::HashMap, path::PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 配信ジョブ ID（UUID v7）
///
/// ログの相関に使う。JSON で投入されたジョブに ID がなければ受信時に採番する。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display)]
#[serde(transparent)]
pub struct MailJobId(Uuid);

impl MailJobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for MailJobId {
    fn default() -> Self {
        Self::new()
    }
}

/// 配信ジョブ
///
/// キュー投入後は変更されない。処理を担当するワーカーに所有権ごと渡され、
/// 配信の成否に関わらず処理完了時に破棄される。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MailJob {
    #[serde(default)]
    id:            MailJobId,
    from_address:  String,
    #[serde(default)]
    from_name:     String,
    to_address:    String,
    #[serde(default)]
    additional_to: Vec<String>,
    #[serde(default)]
    cc:            Vec<String>,
    subject:       String,
    /// HTML 断片。テンプレートにはエスケープせずに埋め込まれる
    content:       String,
    /// テンプレート名。未指定ならワーカーの既定テンプレートを使う
    #[serde(default)]
    template:      Option<String>,
    #[serde(default)]
    string_map:    HashMap<String, String>,
    #[serde(default)]
    int_map:       HashMap<String, i64>,
    #[serde(default)]
    float_map:     HashMap<String, f64>,
    #[serde(default)]
    row_sets:      HashMap<String, serde_json::Value>,
    #[serde(default)]
    attachments:   Vec<PathBuf>,
    #[serde(default = "Utc::now")]
    enqueued_at:   DateTime<Utc>,
}

impl MailJob {
    /// 必須項目からジョブを作成する
    pub fn new(
        from_address: impl Into<String>,
        to_address: impl Into<String>,
        subject: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: MailJobId::new(),
            from_address: from_address.into(),
            from_name: String::new(),
            to_address: to_address.into(),
            additional_to: Vec::new(),
            cc: Vec::new(),
            subject: subject.into(),
            content: content.into(),
            template: None,
            string_map: HashMap::new(),
            int_map: HashMap::new(),
            float_map: HashMap::new(),
            row_sets: HashMap::new(),
            attachments: Vec::new(),
            enqueued_at: Utc::now(),
        }
    }

    pub fn with_from_name(mut self, name: impl Into<String>) -> Self {
        self.from_name = name.into();
        self
    }

    /// 宛先を追加する（主宛先と同じ To ヘッダに並ぶ）
    pub fn with_additional_to(mut self, address: impl Into<String>) -> Self {
        self.additional_to.push(address.into());
        self
    }

    pub fn with_cc(mut self, address: impl Into<String>) -> Self {
        self.cc.push(address.into());
        self
    }

    pub fn with_template(mut self, name: impl Into<String>) -> Self {
        self.template = Some(name.into());
        self
    }

    pub fn with_string(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.string_map.insert(key.into(), value.into());
        self
    }

    pub fn with_int(mut self, key: impl Into<String>, value: i64) -> Self {
        self.int_map.insert(key.into(), value);
        self
    }

    pub fn with_float(mut self, key: impl Into<String>, value: f64) -> Self {
        self.float_map.insert(key.into(), value);
        self
    }

    pub fn with_row_set(mut self, key: impl Into<String>, rows: serde_json::Value) -> Self {
        self.row_sets.insert(key.into(), rows);
        self
    }

    /// 添付ファイルを追加する
    ///
    /// パスの解決は呼び出し側の責務。読み込みは送信直前に行われる。
    pub fn with_attachment(mut self, path: impl Into<PathBuf>) -> Self {
        self.attachments.push(path.into());
        self
    }

    // Getter メソッド

    pub fn id(&self) -> MailJobId {
        self.id
    }

    pub fn from_address(&self) -> &str {
        &self.from_address
    }

    pub fn from_name(&self) -> &str {
        &self.from_name
    }

    pub fn to_address(&self) -> &str {
        &self.to_address
    }

    pub fn additional_to(&self) -> &[String] {
        &self.additional_to
    }

    pub fn cc(&self) -> &[String] {
        &self.cc
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn template(&self) -> Option<&str> {
        self.template.as_deref()
    }

    pub fn string_map(&self) -> &HashMap<String, String> {
        &self.string_map
    }

    pub fn int_map(&self) -> &HashMap<String, i64> {
        &self.int_map
    }

    pub fn float_map(&self) -> &HashMap<String, f64> {
        &self.float_map
    }

    pub fn row_sets(&self) -> &HashMap<String, serde_json::Value> {
        &self.row_sets
    }

    pub fn attachments(&self) -> &[PathBuf] {
        &self.attachments
    }

    pub fn enqueued_at(&self) -> DateTime<Utc> {
        self.enqueued_at
    }
}
