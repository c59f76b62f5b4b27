//! One-shot HTTP commands. Their output streams back over the push channel;
//! the HTTP response only acknowledges the request.

use reqwest::Client;
use shared::domain::ItemId;
use tracing::{debug, info};
use url::Url;

use crate::error::CommandError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    DownloadForce,
    /// Targets every item when no ids are given.
    Update,
    /// Targets every item when no ids are given.
    Send,
    Freeze,
    FreezeOn,
    FreezeOff,
    Remove,
    RemoveWithFile,
    Convert,
    Diff,
    Inspect,
    Folder,
    Backup,
}

impl Command {
    /// API path for this command given whether ids were supplied.
    pub fn endpoint(self, has_ids: bool) -> &'static str {
        match (self, has_ids) {
            (Command::DownloadForce, _) => "/api/download_force",
            (Command::Update, false) => "/api/update",
            (Command::Update, true) => "/api/update_select",
            (Command::Send, false) => "/api/send",
            (Command::Send, true) => "/api/send_select",
            (Command::Freeze, _) => "/api/freeze",
            (Command::FreezeOn, _) => "/api/freeze_on",
            (Command::FreezeOff, _) => "/api/freeze_off",
            (Command::Remove, _) => "/api/remove",
            (Command::RemoveWithFile, _) => "/api/remove_with_file",
            (Command::Convert, _) => "/api/convert",
            (Command::Diff, _) => "/api/diff",
            (Command::Inspect, _) => "/api/inspect",
            (Command::Folder, _) => "/api/folder",
            (Command::Backup, _) => "/api/backup",
        }
    }

    pub fn requires_selection(self) -> bool {
        !matches!(self, Command::Update | Command::Send)
    }

    pub fn is_destructive(self) -> bool {
        matches!(self, Command::Remove | Command::RemoveWithFile)
    }
}

#[derive(Debug, Clone)]
pub struct CommandClient {
    http: Client,
    base: Url,
}

impl CommandClient {
    pub fn new(base: Url) -> Self {
        Self::with_client(Client::new(), base)
    }

    pub fn with_client(http: Client, base: Url) -> Self {
        Self { http, base }
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Posts `command` for `ids`. Returns `false` without a request when the
    /// command needs a selection and none was given.
    pub async fn dispatch(&self, command: Command, ids: &[ItemId]) -> Result<bool, CommandError> {
        if ids.is_empty() && command.requires_selection() {
            debug!(?command, "command skipped: nothing selected");
            return Ok(false);
        }
        let form: Vec<(&str, String)> = ids.iter().map(|id| ("ids[]", id.to_string())).collect();
        self.post(command.endpoint(!ids.is_empty()), &form).await?;
        info!(?command, count = ids.len(), "command requested");
        Ok(true)
    }

    /// Queues a download of a new item by URL or code. A blank target is a no-op.
    pub async fn download(&self, target: &str) -> Result<bool, CommandError> {
        let target = target.trim();
        if target.is_empty() {
            return Ok(false);
        }
        self.post("/api/download", &[("target", target)]).await?;
        info!(target, "download requested");
        Ok(true)
    }

    pub async fn clear_history(&self) -> Result<(), CommandError> {
        self.post("/api/clear_history", &[] as &[(&str, &str)]).await?;
        info!("console history clear requested");
        Ok(())
    }

    async fn post<F: serde::Serialize + ?Sized>(&self, path: &str, form: &F) -> Result<(), CommandError> {
        let url = self.base.join(path)?;
        self.http
            .post(url)
            .form(form)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/commands_tests.rs"]
mod tests;
