//! Interactive session: one updater, one cold start, commands from stdin.
//!
//! Each `otactl` invocation is a fresh process, so lifecycle-sensitive
//! commands (anything that switches bundles) only make sense inside a
//! session, after the startup health check has run.

use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use ota_core::{CandidateOutcome, DownloadRequest, Updater};
use ota_types::{BundleId, DelayCondition};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::output::{self, OutputFormat};

/// A parsed session line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    Download {
        url: String,
        version: Option<String>,
        checksum: Option<String>,
    },
    Set {
        id: BundleId,
        name: Option<String>,
    },
    Delete(BundleId),
    Reset {
        to_auto_update: bool,
    },
    Ready,
    Delay(DelayCondition),
    CancelDelay,
    Next(BundleId),
    Offer {
        version: String,
        id: BundleId,
    },
    Background,
    List,
    Current,
    DeviceId,
    Quit,
}

impl FromStr for SessionCommand {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self> {
        let mut words = line.split_whitespace();
        let command = words.next().ok_or_else(|| anyhow!("empty command"))?;
        let args: Vec<&str> = words.collect();
        let arg = |i: usize, name: &str| -> Result<String> {
            args.get(i)
                .map(|s| s.to_string())
                .ok_or_else(|| anyhow!("{}: missing <{}>", command, name))
        };
        let opt = |i: usize| args.get(i).map(|s| s.to_string());

        let parsed = match command {
            "download" => Self::Download {
                url: arg(0, "url")?,
                version: opt(1),
                checksum: opt(2),
            },
            "set" => Self::Set {
                id: BundleId::new(arg(0, "id")?),
                name: opt(1),
            },
            "delete" => Self::Delete(BundleId::new(arg(0, "id")?)),
            "reset" => Self::Reset {
                to_auto_update: matches!(args.first(), Some(&"auto")),
            },
            "ready" => Self::Ready,
            "delay" => Self::Delay(parse_condition(&args)?),
            "cancel-delay" => Self::CancelDelay,
            "next" => Self::Next(BundleId::new(arg(0, "id")?)),
            "offer" => Self::Offer {
                version: arg(0, "version")?,
                id: BundleId::new(arg(1, "id")?),
            },
            "background" => Self::Background,
            "list" => Self::List,
            "current" => Self::Current,
            "device-id" => Self::DeviceId,
            "quit" | "exit" => Self::Quit,
            other => bail!("unknown command: {}", other),
        };
        Ok(parsed)
    }
}

fn parse_condition(args: &[&str]) -> Result<DelayCondition> {
    match args {
        [] | ["background"] => Ok(DelayCondition::Background),
        ["kill"] => Ok(DelayCondition::Kill),
        ["date", at] => {
            let at: DateTime<Utc> = at
                .parse()
                .with_context(|| format!("invalid RFC 3339 date: {}", at))?;
            Ok(DelayCondition::Date(at))
        }
        other => bail!("delay: unknown condition {:?}", other),
    }
}

/// Run commands until `quit` or end of input.
pub async fn run(updater: &Updater, format: OutputFormat) -> Result<()> {
    let report = updater.startup()?;
    if let Some(outcome) = &report.rolled_back {
        output::print_success(&format!(
            "rolled back {} -> {}",
            outcome.abandoned.id, outcome.restored.id
        ));
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let command = match line.parse::<SessionCommand>() {
            Ok(command) => command,
            Err(e) => {
                output::print_error(&e.to_string());
                continue;
            }
        };
        if command == SessionCommand::Quit {
            break;
        }
        if let Err(e) = execute(updater, command, format).await {
            output::print_error(&format!("{:#}", e));
        }
    }
    Ok(())
}

async fn execute(updater: &Updater, command: SessionCommand, format: OutputFormat) -> Result<()> {
    match command {
        SessionCommand::Download {
            url,
            version,
            checksum,
        } => {
            let request = DownloadRequest {
                url,
                version,
                checksum,
            };
            output::print_single(&updater.download(request).await?, format)
        }
        SessionCommand::Set { id, name } => {
            output::print_single(&updater.set(&id, name.as_deref())?, format)
        }
        SessionCommand::Delete(id) => {
            updater.delete(&id)?;
            output::print_success(&format!("deleted {}", id));
            Ok(())
        }
        SessionCommand::Reset { to_auto_update } => {
            output::print_single(&updater.reset(to_auto_update)?, format)
        }
        SessionCommand::Ready => output::print_single(&updater.notify_app_ready()?, format),
        SessionCommand::Delay(condition) => {
            updater.delay_update(condition)?;
            output::print_success("update delayed");
            Ok(())
        }
        SessionCommand::CancelDelay => match updater.cancel_delay()? {
            Some(applied) => output::print_single(&applied, format),
            None => {
                output::print_success("delay cancelled");
                Ok(())
            }
        },
        SessionCommand::Next(id) => output::print_single(&updater.next(&id)?, format),
        SessionCommand::Offer { version, id } => {
            match updater.offer_candidate(&version, &id)? {
                CandidateOutcome::Ignored => output::print_success("ignored: same version"),
                CandidateOutcome::MajorHeld => {
                    output::print_success("major update held until explicit set")
                }
                CandidateOutcome::Deferred(info) => {
                    output::print_success(&format!("deferred {}", info.version))
                }
                CandidateOutcome::Activated(info) => {
                    output::print_success(&format!("activated {}", info.version))
                }
            }
            Ok(())
        }
        SessionCommand::Background => match updater.on_background()? {
            Some(applied) => output::print_single(&applied, format),
            None => {
                output::print_success("nothing to apply");
                Ok(())
            }
        },
        SessionCommand::List => output::print_versions(&updater.list(), format),
        SessionCommand::Current => output::print_single(&updater.current()?, format),
        SessionCommand::DeviceId => output::print_single(
            &serde_json::json!({ "id": updater.get_id()? }),
            format,
        ),
        SessionCommand::Quit => Ok(()),
    }
}
