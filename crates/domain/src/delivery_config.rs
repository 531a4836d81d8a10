//! # SMTP 接続パラメータ
//!
//! 設定マップから SMTP 接続に必要なパラメータを組み立てる。
//!
//! ## 導出ルール
//!
//! | 項目 | 値 |
//! |------|----|
//! | ホスト | `smtp_server` |
//! | ポート | `smtp_port` を数値として解釈。数値でなければ `0`（不正） |
//! | 認証方式 | ホストが `localhost` なら `Plain`、それ以外は `Login` |
//! | 暗号化 | なし（固定） |
//! | 接続の再利用 | しない（ジョブごとに接続・切断） |
//! | タイムアウト | 接続・送信とも 10 秒 |
//!
//! ポート `0` はここではエラーにせず、接続段階で接続エラーとして扱う。

use std::{fmt, time::Duration};

use crate::preference::{Preferences, keys};

/// 弱い認証方式を選ぶループバックホスト名
pub const LOOPBACK_HOST: &str = "localhost";

/// 接続・送信タイムアウトの既定値
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// SMTP 認証方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum SmtpAuthMode {
    /// AUTH PLAIN（ローカルの開発用サーバー向け）
    Plain,
    /// AUTH LOGIN
    Login,
}

/// SMTP 通信の暗号化方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum SmtpEncryption {
    None,
}

/// SMTP 接続パラメータ
///
/// `Debug` 出力ではパスワードを伏せる。
#[derive(Clone, PartialEq, Eq)]
pub struct SmtpConnectionParams {
    pub host:            String,
    pub port:            u16,
    pub username:        String,
    pub password:        String,
    pub authentication:  SmtpAuthMode,
    pub encryption:      SmtpEncryption,
    pub connect_timeout: Duration,
    pub send_timeout:    Duration,
}

impl SmtpConnectionParams {
    /// 設定マップのスナップショットから接続パラメータを組み立てる
    pub fn from_preferences(preferences: &Preferences) -> Self {
        let host = preferences.get_or_empty(keys::SMTP_SERVER).to_string();
        let authentication = if host == LOOPBACK_HOST {
            SmtpAuthMode::Plain
        } else {
            SmtpAuthMode::Login
        };

        Self {
            port: parse_port(preferences.get_or_empty(keys::SMTP_PORT)),
            username: preferences.get_or_empty(keys::SMTP_USER).to_string(),
            password: preferences.get_or_empty(keys::SMTP_PASSWORD).to_string(),
            host,
            authentication,
            encryption: SmtpEncryption::None,
            connect_timeout: DEFAULT_TIMEOUT,
            send_timeout: DEFAULT_TIMEOUT,
        }
    }

    /// 接続に使えるポートかどうか
    pub fn has_valid_port(&self) -> bool {
        self.port != 0
    }

    /// 認証情報が設定されているかどうか
    pub fn has_credentials(&self) -> bool {
        !self.username.is_empty()
    }
}

impl fmt::Debug for SmtpConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpConnectionParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("authentication", &self.authentication)
            .field("encryption", &self.encryption)
            .field("connect_timeout", &self.connect_timeout)
            .field("send_timeout", &self.send_timeout)
            .finish()
    }
}

fn parse_port(raw: &str) -> u16 {
    raw.trim().parse().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    fn prefs(host: &str, port: &str) -> Preferences {
        [
            (keys::SMTP_SERVER, host),
            (keys::SMTP_PORT, port),
            (keys::SMTP_USER, "mailer"),
            (keys::SMTP_PASSWORD, "secret"),
        ]
        .into_iter()
        .collect()
    }

    #[rstest]
    #[case::ループバック("localhost", SmtpAuthMode::Plain)]
    #[case::外部ホスト("smtp.example.com", SmtpAuthMode::Login)]
    #[case::ループバックのip表記("127.0.0.1", SmtpAuthMode::Login)]
    #[case::大文字は別名扱い("LOCALHOST", SmtpAuthMode::Login)]
    fn test_ホスト名から認証方式を選ぶ(#[case] host: &str, #[case] expected: SmtpAuthMode) {
        let params = SmtpConnectionParams::from_preferences(&prefs(host, "25"));

        assert_eq!(params.authentication, expected);
    }

    #[rstest]
    #[case("1025", 1025)]
    #[case(" 587 ", 587)]
    #[case("invalid", 0)]
    #[case("", 0)]
    #[case("70000", 0)]
    #[case("-25", 0)]
    fn test_ポート文字列を解釈する(#[case] raw: &str, #[case] expected: u16) {
        let params = SmtpConnectionParams::from_preferences(&prefs("smtp.example.com", raw));

        assert_eq!(params.port, expected);
        assert_eq!(params.has_valid_port(), expected != 0);
    }

    #[test]
    fn test_固定項目は暗号化なしかつ10秒タイムアウト() {
        let params = SmtpConnectionParams::from_preferences(&prefs("localhost", "1025"));

        assert_eq!(params.encryption, SmtpEncryption::None);
        assert_eq!(params.connect_timeout, Duration::from_secs(10));
        assert_eq!(params.send_timeout, Duration::from_secs(10));
        assert_eq!(params.username, "mailer");
        assert_eq!(params.password, "secret");
    }

    #[test]
    fn test_設定が空でもパニックしない() {
        let params = SmtpConnectionParams::from_preferences(&Preferences::default());

        assert_eq!(params.host, "");
        assert_eq!(params.port, 0);
        assert_eq!(params.authentication, SmtpAuthMode::Login);
        assert!(!params.has_credentials());
    }

    #[test]
    fn test_debug出力にパスワードが含まれない() {
        let params = SmtpConnectionParams::from_preferences(&prefs("localhost", "1025"));

        let output = format!("{params:?}");

        assert!(!output.contains("secret"));
        assert!(output.contains("[REDACTED]"));
    }
}
