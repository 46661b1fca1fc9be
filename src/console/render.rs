//! Plain-text rendering for the console views

use crate::files::Listing;
use crate::keyring::{CipherSpec, KeyInfo};
use crate::session::{Event, RunningStatus, Severity, StatusEntry};
use chrono::{DateTime, Local, TimeZone, Utc};
use colored::Colorize;
use tabled::settings::Style;
use tabled::{Table, Tabled};

/// A directory listing with the volume's space footer.
pub fn listing(path: &str, listing: &Listing) {
    println!("\n{}", path.bold().cyan());

    #[derive(Tabled)]
    struct InodeRow {
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Size")]
        size: String,
        #[tabled(rename = "Modified")]
        mtime: String,
        #[tabled(rename = "Key")]
        key: String,
    }

    let rows: Vec<InodeRow> = listing
        .inodes
        .iter()
        .map(|inode| InodeRow {
            name: if inode.dir {
                format!("{}/", inode.name)
            } else {
                inode.name.clone()
            },
            size: if inode.dir {
                "-".to_string()
            } else {
                format_size(inode.size)
            },
            mtime: format_epoch(inode.mtime),
            key: match &inode.key {
                Some(key) if inode.private => format!("{} (private)", key.identifier),
                Some(key) => key.identifier.clone(),
                None => String::new(),
            },
        })
        .collect();

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    println!(
        "{} free of {}",
        format_size(listing.free_space),
        format_size(listing.total_space)
    );
}

pub fn ciphers(ciphers: &[CipherSpec]) {
    #[derive(Tabled)]
    struct CipherRow {
        #[tabled(rename = "Cipher")]
        name: String,
        #[tabled(rename = "Key Format")]
        key_format: String,
        #[tabled(rename = "Capabilities")]
        caps: String,
        #[tabled(rename = "Info")]
        info: String,
    }

    let rows: Vec<CipherRow> = ciphers
        .iter()
        .map(|c| {
            let mut caps = Vec::new();
            if c.enc {
                caps.push("enc");
            }
            if c.dec {
                caps.push("dec");
            }
            if c.sig {
                caps.push("sig");
            }
            if c.otp {
                caps.push("otp");
            }
            if c.msg {
                caps.push("msg");
            }
            CipherRow {
                name: c.name.clone(),
                key_format: c.key_format.clone(),
                caps: caps.join(","),
                info: c.info.clone(),
            }
        })
        .collect();

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}

pub fn keys(keys: &[KeyInfo]) {
    #[derive(Tabled)]
    struct KeyRow {
        #[tabled(rename = "Identifier")]
        identifier: String,
        #[tabled(rename = "Cipher")]
        cipher: String,
        #[tabled(rename = "Type")]
        kind: String,
        #[tabled(rename = "Path")]
        path: String,
    }

    let rows: Vec<KeyRow> = keys
        .iter()
        .map(|k| KeyRow {
            identifier: k.identifier.clone(),
            cipher: k.cipher.clone(),
            kind: if k.private { "private" } else { "public" }.to_string(),
            path: k.path.clone(),
        })
        .collect();

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}

/// One-line appliance health summary.
pub fn status(status: &RunningStatus) {
    println!(
        "uptime {}  load {:.2} {:.2} {:.2}  free ram {}",
        format_duration(status.uptime),
        status.load_1,
        status.load_5,
        status.load_15,
        format_size(status.freeram)
    );
}

/// A pushed status-feed entry, colored by syslog severity code.
pub fn status_entry(feed: &str, entry: &StatusEntry) {
    let line = format!("[{feed}] {} {}", format_epoch(entry.epoch), entry.msg);
    // 0..=3 are emergency..error, 4 is warning
    if entry.code <= 3 {
        println!("{}", line.red());
    } else if entry.code == 4 {
        println!("{}", line.yellow());
    } else {
        println!("{line}");
    }
}

/// The session log, oldest first.
pub fn events(events: &[Event]) {
    for event in events {
        let line = format!(
            "{} {:8} {}",
            format_epoch(event.timestamp),
            event.severity,
            event.msg
        );
        match event.severity {
            Severity::Critical => println!("{}", line.red()),
            Severity::Error => println!("{}", line.yellow()),
            _ => println!("{line}"),
        }
    }
}

/// Fenced error block standing in for the blocking dialog.
pub fn dialog_open(messages: &[String]) {
    println!("{}", "================ ERROR ================".bold().red());
    for msg in messages {
        println!("  {msg}");
    }
    println!("{}", "=======================================".bold().red());
    println!("(press Enter to dismiss)");
}

pub fn dialog_append(message: &str) {
    println!("{}  {}", "ERROR:".bold().red(), message);
}

pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

pub fn format_epoch(epoch: i64) -> String {
    match Utc.timestamp_opt(epoch, 0) {
        chrono::LocalResult::Single(time) => {
            let local: DateTime<Local> = time.with_timezone(&Local);
            local.format("%Y-%m-%d %H:%M:%S").to_string()
        }
        _ => format!("@{epoch}"),
    }
}

fn format_duration(secs: i64) -> String {
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3600;
    let minutes = (secs % 3600) / 60;
    if days > 0 {
        format!("{days}d {hours}h {minutes}m")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}
