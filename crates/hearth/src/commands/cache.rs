//! Cache command handlers.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tabled::Tabled;

use hearth_core::{CacheEntryInfo, CacheRecord};

use crate::cli::{CacheArgs, CacheCommand, GlobalOpts};
use crate::config::{self, Config};
use crate::error::CliError;
use crate::output;

use super::util;

// ── Views ───────────────────────────────────────────────────────────

/// Serialized shape of one listed record.
#[derive(Debug, Serialize)]
struct EntryView {
    key: String,
    stored_at: Option<DateTime<Utc>>,
    age_secs: u64,
    expired: bool,
    size_bytes: usize,
}

impl From<CacheEntryInfo> for EntryView {
    fn from(e: CacheEntryInfo) -> Self {
        Self {
            key: e.key,
            stored_at: e.stored_at,
            age_secs: e.age.as_secs(),
            expired: e.expired,
            size_bytes: e.size_bytes,
        }
    }
}

#[derive(Tabled)]
struct EntryRow {
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Stored")]
    stored: String,
    #[tabled(rename = "Age")]
    age: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Size")]
    size: String,
}

fn entry_row(e: &EntryView, color: bool) -> EntryRow {
    EntryRow {
        key: e.key.clone(),
        stored: e.stored_at.map_or_else(
            || "-".into(),
            |t| t.format("%Y-%m-%d %H:%M:%S").to_string(),
        ),
        age: util::format_age(std::time::Duration::from_secs(e.age_secs)),
        status: output::freshness(e.expired, color),
        size: format!("{} B", e.size_bytes),
    }
}

#[derive(Debug, Serialize)]
struct RecordView {
    key: String,
    stored_at: Option<DateTime<Utc>>,
    data: Value,
}

impl RecordView {
    fn new(key: String, record: CacheRecord) -> Self {
        Self {
            key,
            stored_at: record.stored_at(),
            data: record.data,
        }
    }
}

fn record_detail(r: &RecordView) -> String {
    let stored = r.stored_at.map_or_else(|| "-".into(), |t| t.to_rfc3339());
    let age = r
        .stored_at
        .and_then(|t| (Utc::now() - t).to_std().ok())
        .map_or_else(|| "-".into(), util::format_age);
    let data = serde_json::to_string_pretty(&r.data).unwrap_or_default();
    format!(
        "Key:     {}\nStored:  {stored}\nAge:     {age}\n\n{data}",
        r.key
    )
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: CacheArgs, cfg: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    let cache = config::open_cache(cfg)?;
    let format = config::output_format(global, cfg);

    match args.command {
        CacheCommand::List { expired } => {
            let entries: Vec<EntryView> = cache
                .entries()
                .into_iter()
                .filter(|e| !expired || e.expired)
                .map(EntryView::from)
                .collect();
            let color = output::should_color(global.color);
            let out = output::render_list(
                format,
                &entries,
                |e| entry_row(e, color),
                |e| e.key.clone(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        CacheCommand::Show { key } => {
            let record = cache.load_record(&key).ok_or_else(|| CliError::NotFound {
                resource_type: "cache record".into(),
                identifier: key.clone(),
                list_command: "cache list".into(),
            })?;
            let view = RecordView::new(key, record);
            let out = output::render_single(format, &view, record_detail, |r| {
                serde_json::to_string(&r.data).unwrap_or_default()
            })?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        CacheCommand::Purge { all } => {
            let removed = if all {
                if !util::confirm(
                    "cache purge --all",
                    &format!("Remove every record under {}?", cfg.cache_dir().display()),
                    global.yes,
                )? {
                    return Ok(());
                }
                cache.clear()
            } else {
                cache.purge_expired()
            };
            tracing::info!(removed, all, "cache purged");
            if !global.quiet {
                eprintln!("Removed {removed} record(s)");
            }
            Ok(())
        }
    }
}
