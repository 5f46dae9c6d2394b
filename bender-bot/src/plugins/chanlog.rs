//! Channel logger.
//!
//! Appends every message seen in a configured channel to
//! `<logroot>/<YYYY>/<MM>/<channel>.log`, so logs rotate monthly. The first
//! line written on a new day is preceded by a date change marker.
//!
//! ```toml
//! [config]
//! channels = ["#bender"]
//! logroot = "logs"
//! ```

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use chrono::{Local, NaiveDate, NaiveDateTime};
use parking_lot::Mutex;

use super::{EventContext, Export, Plugin, Reply};

#[derive(Default)]
pub struct ChanlogPlugin {
    state: Arc<Mutex<ChanlogState>>,
}

#[derive(Default)]
struct ChanlogState {
    logroot: PathBuf,
    /// Lowercased channel name -> date of the last line written.
    channels: HashMap<String, Option<NaiveDate>>,
}

impl Plugin for ChanlogPlugin {
    fn lookup(&self, symbol: &str) -> Option<Export> {
        match symbol {
            "Chanlog" => {
                let state = self.state.clone();
                Some(Export::matcher(move |message: &str, ctx: &EventContext| {
                    let now = Local::now().naive_local();
                    if let Err(e) = state.lock().log(now, message, ctx) {
                        tracing::warn!(channel = %ctx.channel, error = %e, "Failed to write channel log");
                    }
                    Reply::none()
                }))
            }
            _ => None,
        }
    }

    fn matchers(&self) -> Option<Vec<String>> {
        Some(vec!["Chanlog".to_string()])
    }

    fn configurable(&self) -> bool {
        true
    }

    fn configure(&self, config: &toml::Table) -> anyhow::Result<()> {
        let Some(channels) = config.get("channels") else {
            return Ok(());
        };
        let Some(channels) = channels.as_array() else {
            bail!("channels must be a list of channel names");
        };
        let mut names = Vec::with_capacity(channels.len());
        for channel in channels {
            let Some(name) = channel.as_str() else {
                bail!("channels must be a list of channel names, found {}", channel.type_str());
            };
            names.push(name.to_lowercase());
        }

        let logroot = match config.get("logroot") {
            Some(value) => match value.as_str() {
                Some(root) => PathBuf::from(root),
                None => bail!("expected string logroot, got {}", value.type_str()),
            },
            None => std::env::current_dir().context("error determining bot root")?,
        };

        let mut state = self.state.lock();
        state.logroot = logroot;
        state.channels = names.into_iter().map(|name| (name, None)).collect();
        tracing::info!(channels = state.channels.len(), logroot = %state.logroot.display(), "Channel logging configured");
        Ok(())
    }
}

impl ChanlogState {
    fn log(&mut self, at: NaiveDateTime, message: &str, ctx: &EventContext) -> std::io::Result<()> {
        let channel = ctx.channel.to_lowercase();
        let Some(last_date) = self.channels.get_mut(&channel) else {
            return Ok(());
        };
        let today = at.date();
        let time = at.format("%H:%M:%S");

        let mut lines = String::new();
        if last_date.is_some_and(|date| date != today) {
            lines.push_str(&format!("{time}  *****  Date changed to {}\n", at.format("%b %d %Y")));
        }
        if ctx.action {
            lines.push_str(&format!("{time} *** {} {message}\n", ctx.nick));
        } else {
            lines.push_str(&format!("{time} < {}> {message}\n", ctx.nick));
        }

        let path = log_path(&self.logroot, today, &channel);
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(lines.as_bytes())?;
        *last_date = Some(today);
        Ok(())
    }
}

fn log_path(logroot: &Path, date: NaiveDate, channel: &str) -> PathBuf {
    logroot
        .join(date.format("%Y").to_string())
        .join(date.format("%m").to_string())
        .join(format!("{channel}.log"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, s)
            .unwrap()
    }

    fn ctx(nick: &str, channel: &str, action: bool) -> EventContext {
        EventContext {
            nick: nick.to_string(),
            channel: channel.to_string(),
            message: String::new(),
            action,
            ..Default::default()
        }
    }

    fn configured(root: &Path) -> ChanlogPlugin {
        let plugin = ChanlogPlugin::default();
        let config: toml::Table = toml::from_str(&format!(
            "channels = [\"#Bender\"]\nlogroot = {:?}\n",
            root.display().to_string()
        ))
        .unwrap();
        plugin.configure(&config).unwrap();
        plugin
    }

    #[test]
    fn writes_messages_and_actions() {
        let dir = tempfile::tempdir().unwrap();
        let plugin = configured(dir.path());
        let mut state = plugin.state.lock();
        state
            .log(at(2024, 3, 9, 12, 0, 1), "hello", &ctx("fry", "#bender", false))
            .unwrap();
        state
            .log(at(2024, 3, 9, 12, 0, 2), "waves", &ctx("leela", "#bender", true))
            .unwrap();

        let content = std::fs::read_to_string(dir.path().join("2024/03/#bender.log")).unwrap();
        assert_eq!(content, "12:00:01 < fry> hello\n12:00:02 *** leela waves\n");
    }

    #[test]
    fn marks_date_changes_and_rotates_monthly() {
        let dir = tempfile::tempdir().unwrap();
        let plugin = configured(dir.path());
        let mut state = plugin.state.lock();
        let c = ctx("fry", "#bender", false);
        state.log(at(2024, 3, 31, 23, 59, 0), "late", &c).unwrap();
        state.log(at(2024, 4, 1, 0, 0, 5), "early", &c).unwrap();

        let april = std::fs::read_to_string(dir.path().join("2024/04/#bender.log")).unwrap();
        assert_eq!(
            april,
            "00:00:05  *****  Date changed to Apr 01 2024\n00:00:05 < fry> early\n"
        );
        let march = std::fs::read_to_string(dir.path().join("2024/03/#bender.log")).unwrap();
        assert_eq!(march, "23:59:00 < fry> late\n");
    }

    #[test]
    fn channel_case_shares_one_file() {
        let dir = tempfile::tempdir().unwrap();
        let plugin = configured(dir.path());
        let mut state = plugin.state.lock();
        state
            .log(at(2024, 3, 9, 12, 0, 1), "hi", &ctx("fry", "#Bender", false))
            .unwrap();
        state
            .log(at(2024, 3, 9, 12, 0, 2), "hey", &ctx("leela", "#BENDER", false))
            .unwrap();

        let month = dir.path().join("2024/03");
        let files: Vec<_> = std::fs::read_dir(&month)
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(files, vec![std::ffi::OsString::from("#bender.log")]);
        let content = std::fs::read_to_string(month.join("#bender.log")).unwrap();
        assert_eq!(content, "12:00:01 < fry> hi
12:00:02 < leela> hey
");
    }

    #[test]
    fn ignores_unconfigured_channels() {
        let dir = tempfile::tempdir().unwrap();
        let plugin = configured(dir.path());
        plugin
            .state
            .lock()
            .log(at(2024, 1, 1, 0, 0, 0), "psst", &ctx("fry", "#other", false))
            .unwrap();
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[test]
    fn rejects_malformed_config() {
        let plugin = ChanlogPlugin::default();
        let bad: toml::Table = toml::from_str("channels = [1, 2]").unwrap();
        assert!(plugin.configure(&bad).is_err());
        let bad: toml::Table = toml::from_str("channels = [\"#a\"]\nlogroot = 5").unwrap();
        assert!(plugin.configure(&bad).is_err());
        let empty = toml::Table::new();
        assert!(plugin.configure(&empty).is_ok());
    }

    #[test]
    fn matcher_never_replies() {
        let dir = tempfile::tempdir().unwrap();
        let plugin = configured(dir.path());
        let Some(Export::Matcher(matcher)) = plugin.lookup("Chanlog") else {
            panic!("Chanlog should be a matcher");
        };
        assert!(matcher("hi", &ctx("fry", "#bender", false)).is_empty());
    }
}
