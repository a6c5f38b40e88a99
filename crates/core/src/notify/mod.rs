//! Run-summary notifications.
//!
//! Slack is the only channel. Delivery failures are returned to the caller,
//! which logs them; they never change the outcome of the run itself.

pub mod slack;

use tracing::info;

use crate::config::{NotificationConfig, NotifyOn};
use crate::errors::NotificationError;
use crate::models::RunSummary;

/// Posts run summaries to the configured channel according to `notify_on`.
pub struct Notifier {
    slack: Option<slack::SlackNotifier>,
    notify_on: NotifyOn,
}

impl Notifier {
    /// Create a notifier from the notification configuration. The webhook URL
    /// must already be resolved from its environment variable.
    pub fn new(config: &NotificationConfig) -> Self {
        let slack = config.slack_webhook_url.as_ref().map(|url| {
            info!("Slack notifications enabled");
            slack::SlackNotifier::new(url.clone())
        });

        Self {
            slack,
            notify_on: config.notify_on,
        }
    }

    /// Return whether any notification channel is configured.
    pub fn is_configured(&self) -> bool {
        self.slack.is_some()
    }

    /// Whether a run with this summary should be announced.
    pub fn should_notify(&self, summary: &RunSummary) -> bool {
        match self.notify_on {
            NotifyOn::Always => true,
            NotifyOn::Problems => !summary.report.is_clean(),
            NotifyOn::Never => false,
        }
    }

    /// Post the summary of a completed run, if the policy asks for it.
    ///
    /// Returns `Ok(false)` when nothing was sent.
    pub async fn notify_run(&self, summary: &RunSummary) -> Result<bool, NotificationError> {
        let Some(ref slack) = self.slack else {
            return Ok(false);
        };
        if !self.should_notify(summary) {
            return Ok(false);
        }

        info!(run_id = %summary.run_id, "sending run summary notification");
        slack.send_message(&format_summary_slack(summary)).await?;
        Ok(true)
    }

    /// Post a notice that a run aborted.
    pub async fn notify_failure(&self, error: &str) -> Result<bool, NotificationError> {
        let Some(ref slack) = self.slack else {
            return Ok(false);
        };
        if self.notify_on == NotifyOn::Never {
            return Ok(false);
        }

        info!("sending run failure notification");
        slack
            .send_message(&format!(":x: *FeatureSync run failed*\n```{}```", error))
            .await?;
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// Formatting helpers
// ---------------------------------------------------------------------------

/// Names listed per bucket before the rest is summarized as a count.
const MAX_LISTED: usize = 10;

fn format_summary_slack(summary: &RunSummary) -> String {
    let report = &summary.report;
    let icon = if report.is_clean() {
        ":white_check_mark:"
    } else {
        ":warning:"
    };

    let mut msg = format!(
        "{} *FeatureSync run complete*\n\
         - Sent: {}\n\
         - Unmatched: {}\n\
         - Errors: {}\n\
         - Ambiguous: {}",
        icon,
        report.sent.len(),
        report.failures.len(),
        report.errors.len(),
        report.ambiguous.len(),
    );

    for (label, names) in [
        ("Unmatched", &report.failures),
        ("Errors", &report.errors),
        ("Ambiguous", &report.ambiguous),
    ] {
        if !names.is_empty() {
            msg.push_str(&format!("\n\n*{}:* {}", label, list_names(names)));
        }
    }

    msg.push_str(&format!("\n\n_run {}_", summary.run_id));
    msg
}

fn list_names(names: &[String]) -> String {
    let mut listed = names
        .iter()
        .take(MAX_LISTED)
        .map(|n| format!("`{}`", n))
        .collect::<Vec<_>>()
        .join(", ");
    if names.len() > MAX_LISTED {
        listed.push_str(&format!(" and {} more", names.len() - MAX_LISTED));
    }
    listed
}
