//! # 配信イベントログ
//!
//! 配信結果やディスパッチャの起動・停止を、集計しやすい 1 行の構造化ログとして出力する。
//!
//! ```bash
//! # 失敗した配信だけを抜き出す
//! jq 'select(.["event.action"] == "notification.failed")'
//! ```
//!
//! フィールド名はドット区切り（`event.action`, `error.kind`）。
//! 値は下の定数を使い、文字列リテラルを散らさない。

/// `event.kind = "business_event"` を付けて info レベルで出力する
///
/// `event.category` / `event.action` / `event.result` を必ず指定する。
#[macro_export]
macro_rules! log_business_event {
    ($($field:tt)*) => {
        ::tracing::info!(event.kind = "business_event", $($field)*)
    };
}

/// [`log_business_event!`] の warn レベル版
///
/// `event.result = failure` のイベントに使い、`error.category` / `error.kind` を併記する。
#[macro_export]
macro_rules! log_business_failure {
    ($($field:tt)*) => {
        ::tracing::warn!(event.kind = "business_event", $($field)*)
    };
}

pub mod event {
    /// イベントカテゴリ
    pub mod category {
        pub const NOTIFICATION: &str = "notification";
        pub const DISPATCHER: &str = "dispatcher";
    }

    /// イベントアクション
    pub mod action {
        // 通知
        pub const NOTIFICATION_SENT: &str = "notification.sent";
        pub const NOTIFICATION_FAILED: &str = "notification.failed";
        pub const NOTIFICATION_ABANDONED: &str = "notification.abandoned";

        // ディスパッチャ
        pub const DISPATCHER_STARTED: &str = "dispatcher.started";
        pub const DISPATCHER_STOPPED: &str = "dispatcher.stopped";
    }

    /// エンティティ種別
    pub mod entity_type {
        pub const MAIL_JOB: &str = "mail_job";
    }

    /// イベント結果
    pub mod result {
        pub const SUCCESS: &str = "success";
        pub const FAILURE: &str = "failure";
    }
}

/// エラーコンテキストフィールドの定数
pub mod error {
    /// エラーカテゴリ
    pub mod category {
        /// メール本文の生成（テンプレート、テキスト変換、CSS インライン化）
        pub const RENDERING: &str = "rendering";
        /// 配信バックエンドとの通信
        pub const EXTERNAL_SERVICE: &str = "external_service";
        /// ワーカー内部の異常
        pub const INTERNAL: &str = "internal";
    }
}
