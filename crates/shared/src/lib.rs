//! # Postbox 共有ユーティリティ
//!
//! メールワーカーとインフラ層の双方から使われる横断的なユーティリティ。
//!
//! ## 設計方針
//!
//! - ビジネスロジックを含まない純粋なユーティリティのみを配置
//! - トレーシング初期化は `observability` feature の背後に置き、
//!   ライブラリ利用側に `tracing-subscriber` を強制しない

pub mod event_log;
pub mod observability;

pub use observability::{LogFormat, TracingConfig};
