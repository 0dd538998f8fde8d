//! Desktop notifications through the freedesktop `Notify` D-Bus method.
//!
//! Passing the previous handle as `replaces_id` updates the notification in
//! place, so repeated score changes show up as one toast rather than a stack.

use anyhow::{bail, Context, Result};
use log::debug;
use std::process::Command;

/// A notification to create (`replaces_id == 0`) or update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub app_name: String,
    pub replaces_id: u32,
    pub icon: String,
    pub summary: String,
    pub body: String,
    pub timeout_ms: i32,
}

pub trait Notifier {
    /// Show `notification`, returning the handle the server assigned.
    fn notify(&self, notification: &Notification) -> Result<u32>;
}

impl<N: Notifier + ?Sized> Notifier for Box<N> {
    fn notify(&self, notification: &Notification) -> Result<u32> {
        (**self).notify(notification)
    }
}

/// Sends notifications with `gdbus call`.
#[derive(Debug, Clone, Default)]
pub struct DesktopNotifier;

impl Notifier for DesktopNotifier {
    fn notify(&self, notification: &Notification) -> Result<u32> {
        let replaces_id = notification.replaces_id.to_string();
        let timeout = notification.timeout_ms.to_string();
        let output = Command::new("gdbus")
            .args([
                "call",
                "--session",
                "--dest",
                "org.freedesktop.Notifications",
                "--object-path",
                "/org/freedesktop/Notifications",
                "--method",
                "org.freedesktop.Notifications.Notify",
                notification.app_name.as_str(),
                replaces_id.as_str(),
                notification.icon.as_str(),
                notification.summary.as_str(),
                notification.body.as_str(),
                "[]",
                "{}",
                timeout.as_str(),
            ])
            .output()
            .context("Failed to execute gdbus")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("gdbus Notify failed ({}): {}", output.status, stderr.trim());
        }

        let handle = parse_notify_reply(&String::from_utf8_lossy(&output.stdout))?;
        debug!("Notification {} -> {handle}", notification.replaces_id);
        Ok(handle)
    }
}

/// Keeps notifications off while still going through the same code path.
#[derive(Debug, Clone, Default)]
pub struct SilentNotifier;

impl Notifier for SilentNotifier {
    fn notify(&self, notification: &Notification) -> Result<u32> {
        debug!("Notifications disabled: {}", notification.summary);
        Ok(notification.replaces_id)
    }
}

/// Extract the handle from a gdbus reply such as `(uint32 42,)`.
pub fn parse_notify_reply(reply: &str) -> Result<u32> {
    let handle = reply
        .trim()
        .trim_start_matches('(')
        .trim_end_matches(')')
        .trim_end_matches(',')
        .trim_start_matches("uint32")
        .trim();

    handle
        .parse()
        .with_context(|| format!("Unexpected Notify reply: {}", reply.trim()))
}
