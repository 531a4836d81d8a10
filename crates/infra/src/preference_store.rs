//! # 設定ストア
//!
//! プロセス全体で共有される設定マップ。
//!
//! ワーカーはジョブごとに [`PreferenceSource::snapshot`] で最新値を読み取る。
//! 更新は管理画面などの外部協調者が行い、読み取りと並行して安全に実行できる。

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use postbox_domain::Preferences;

/// 設定マップの読み取り口
pub trait PreferenceSource: Send + Sync {
    /// 現在の設定値のスナップショットを返す
    fn snapshot(&self) -> Preferences;
}

/// `RwLock` で保護されたインメモリの設定ストア
///
/// `Clone` はハンドルの複製で、同じマップを共有する。
#[derive(Debug, Clone, Default)]
pub struct PreferenceStore {
    values: Arc<RwLock<HashMap<String, String>>>,
}

impl PreferenceStore {
    pub fn new(values: HashMap<String, String>) -> Self {
        Self {
            values: Arc::new(RwLock::new(values)),
        }
    }

    /// 値を設定する。次に開始されるジョブから反映される
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        // 書き込み中のパニックで毒化しても、マップ自体は整合しているので使い続ける
        let mut values = self
            .values
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.values
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .cloned()
    }
}

impl PreferenceSource for PreferenceStore {
    fn snapshot(&self) -> Preferences {
        let values = self
            .values
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Preferences::new(values.clone())
    }
}

impl<K, V> FromIterator<(K, V)> for PreferenceStore
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::new(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}
