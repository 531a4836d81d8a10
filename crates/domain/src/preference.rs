//! # 設定マップ
//!
//! アプリケーション全体で共有される設定値（キー → 文字列）のスナップショット。
//!
//! 共有ストア本体はインフラ層が持ち、ワーカーはジョブごとに最新の
//! スナップショットを取得する。スナップショットは値として扱うため、
//! 送信中に他スレッドが設定を更新しても影響を受けない。

use std::collections::HashMap;

use serde::Serialize;

/// 既知の設定キー
pub mod keys {
    pub const SMTP_SERVER: &str = "smtp_server";
    pub const SMTP_PORT: &str = "smtp_port";
    pub const SMTP_USER: &str = "smtp_user";
    pub const SMTP_PASSWORD: &str = "smtp_password";
}

/// 設定マップのスナップショット
///
/// テンプレートには `preference_map` としてそのまま渡される。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Preferences(HashMap<String, String>);

impl Preferences {
    pub fn new(values: HashMap<String, String>) -> Self {
        Self(values)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// 値を取得する。未設定なら空文字列
    pub fn get_or_empty(&self, key: &str) -> &str {
        self.get(key).unwrap_or_default()
    }

    pub fn as_map(&self) -> &HashMap<String, String> {
        &self.0
    }
}

impl<K, V> FromIterator<(K, V)> for Preferences
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}
