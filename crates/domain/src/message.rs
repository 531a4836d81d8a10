//! # メッセージ
//!
//! レンダリング結果（[`RenderedBody`]）と、それをジョブのヘッダ情報と
//! 組み合わせた送信用メッセージ（[`OutboundMessage`]）。

use std::path::PathBuf;

use crate::mail_job::MailJob;

/// レンダリングパイプラインの出力
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedBody {
    /// HTML 本文（CSS インライン化済み。失敗時はインライン化前の HTML）
    pub html: String,
    /// プレーンテキストの代替本文（変換失敗時は空文字列）
    pub text: String,
}

/// 送信用メッセージ
///
/// 宛先・件名・本文・添付をまとめたもの。メーラーはこの値だけを見て送信する。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub from_address: String,
    pub from_name:    String,
    /// 主宛先が先頭、追加宛先がそれに続く
    pub to:           Vec<String>,
    pub cc:           Vec<String>,
    pub subject:      String,
    pub html_body:    String,
    pub text_body:    String,
    pub attachments:  Vec<PathBuf>,
}

impl OutboundMessage {
    /// ジョブとレンダリング結果から送信用メッセージを組み立てる
    pub fn compose(job: &MailJob, body: RenderedBody) -> Self {
        let to = std::iter::once(job.to_address())
            .chain(job.additional_to().iter().map(String::as_str))
            .map(str::to_string)
            .collect();

        Self {
            from_address: job.from_address().to_string(),
            from_name: job.from_name().to_string(),
            to,
            cc: job.cc().to_vec(),
            subject: job.subject().to_string(),
            html_body: body.html,
            text_body: body.text,
            attachments: job.attachments().to_vec(),
        }
    }

    /// 主宛先
    pub fn primary_recipient(&self) -> &str {
        self.to.first().map(String::as_str).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_composeで主宛先が先頭に並ぶ() {
        let job = MailJob::new("from@example.com", "to@example.com", "件名", "<p>本文</p>")
            .with_from_name("Monitor")
            .with_additional_to("extra@example.com")
            .with_cc("cc@example.com")
            .with_attachment("/var/reports/daily.pdf");
        let body = RenderedBody {
            html: "<p style=\"color: red\">本文</p>".to_string(),
            text: "本文".to_string(),
        };

        let message = OutboundMessage::compose(&job, body);

        assert_eq!(message.to, vec!["to@example.com", "extra@example.com"]);
        assert_eq!(message.primary_recipient(), "to@example.com");
        assert_eq!(message.cc, vec!["cc@example.com"]);
        assert_eq!(message.from_name, "Monitor");
        assert_eq!(message.subject, "件名");
        assert_eq!(message.html_body, "<p style=\"color: red\">本文</p>");
        assert_eq!(message.text_body, "本文");
        assert_eq!(message.attachments, vec![PathBuf::from("/var/reports/daily.pdf")]);
    }
}
