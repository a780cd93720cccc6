//! Outbound mail. Delivery is fire-and-forget: a dispatcher never reports
//! failure to the request that queued the message.

use serde::Serialize;
use serde_json::Value;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Mail {
    pub data: Value,
    pub subject: String,
    pub template: String,
    pub to: String,
}

pub trait MailDispatcher: Send + Sync {
    fn send(&self, mail: Mail);
}

/// Records outgoing mail in the log instead of delivering it
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

impl MailDispatcher for LogMailer {
    fn send(&self, mail: Mail) {
        info!(
            to = %mail.to,
            subject = %mail.subject,
            template = %mail.template,
            "Mail dispatched"
        );
    }
}

/// Activation mail sent on registration
pub fn activation_mail(to: &str, name: &str, code: &str) -> Mail {
    Mail {
        data: serde_json::json!({ "name": name, "activation_code": code }),
        subject: "Activate your account".to_string(),
        template: "activation-mail".to_string(),
        to: to.to_string(),
    }
}

/// Sent to the asker when someone else answers their question
pub fn question_reply_mail(to: &str, name: &str, lesson_title: &str) -> Mail {
    Mail {
        data: serde_json::json!({ "name": name, "title": lesson_title }),
        subject: "New reply to your question".to_string(),
        template: "question-reply".to_string(),
        to: to.to_string(),
    }
}
