use std::os::unix::fs::MetadataExt;
use std::path::Path;

use chrono::{DateTime, Local, TimeZone};

use super::Command;
use crate::host::VirtualHost;
use crate::sandbox::fs::format_mode;

/// `ls` — a faithful-enough subset of GNU `ls`: only `-a/--all`,
/// `-d/--directory`, and `-l` change behavior; every other flag is parsed
/// and ignored, per spec §4.3.
pub struct Ls;

struct Flags {
    all: bool,
    directory: bool,
    long: bool,
}

fn parse(params: &[String]) -> (Flags, Vec<String>) {
    let mut flags = Flags {
        all: false,
        directory: false,
        long: false,
    };
    let mut paths = Vec::new();

    for p in params {
        if let Some(rest) = p.strip_prefix("--") {
            match rest {
                "all" => flags.all = true,
                "directory" => flags.directory = true,
                _ => {}
            }
        } else if let Some(rest) = p.strip_prefix('-') {
            if rest.is_empty() {
                paths.push(p.clone());
                continue;
            }
            for ch in rest.chars() {
                match ch {
                    'a' => flags.all = true,
                    'd' => flags.directory = true,
                    'l' => flags.long = true,
                    _ => {}
                }
            }
        } else {
            paths.push(p.clone());
        }
    }
    (flags, paths)
}

struct Entry {
    name: String,
    host_path: std::path::PathBuf,
}

fn mtime_display(meta: &std::fs::Metadata) -> String {
    let dt: DateTime<Local> = Local
        .timestamp_opt(meta.mtime(), 0)
        .single()
        .unwrap_or_else(Local::now);
    dt.format("%b %e %H:%M").to_string()
}

fn long_line(name: &str, host_path: &Path) -> String {
    match std::fs::metadata(host_path) {
        Ok(meta) => format!(
            "{} {} ftp ftp {} {} {}",
            format_mode(meta.mode(), meta.is_dir()),
            meta.nlink(),
            meta.size(),
            mtime_display(&meta),
            name,
        ),
        Err(_) => name.to_string(),
    }
}

impl Command for Ls {
    fn run(&self, host: &mut VirtualHost, params: &[String]) -> String {
        let (flags, raw_paths) = parse(params);
        let raw_paths = if raw_paths.is_empty() {
            vec![host.working_path.clone()]
        } else {
            raw_paths
        };

        let mut blocks: Vec<String> = Vec::new();

        for raw in &raw_paths {
            let (virt_path, host_path) = host.fs.normalize_or_root(&host.working_path, raw);

            if !host_path.exists() {
                blocks.push(format!("ls: cannot access {}: No such file or directory", raw));
                continue;
            }

            let is_dir = host_path.is_dir() && !flags.directory;

            if !is_dir {
                let basis = if flags.directory { virt_path.as_str() } else { raw.as_str() };
                let name = Path::new(basis)
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| ".".to_string());
                let line = if flags.long {
                    long_line(&name, &host_path)
                } else {
                    name
                };
                blocks.push(line);
                continue;
            }

            let mut entries: Vec<Entry> = host
                .fs
                .listdir(&virt_path)
                .unwrap_or_default()
                .into_iter()
                .filter(|n| flags.all || !n.starts_with('.'))
                .map(|n| {
                    let host_path = host_path.join(&n);
                    Entry { name: n, host_path }
                })
                .collect();

            if flags.all {
                let parent = host_path.parent().unwrap_or(&host_path).to_path_buf();
                let mut synthetic = vec![
                    Entry { name: ".".to_string(), host_path: host_path.clone() },
                    Entry { name: "..".to_string(), host_path: parent },
                ];
                synthetic.extend(entries);
                entries = synthetic;
            }

            let mut lines: Vec<String> = Vec::new();
            let mut total_blocks: u64 = 0;
            for e in &entries {
                if let Ok(meta) = std::fs::metadata(&e.host_path) {
                    total_blocks += meta.blocks();
                }
                lines.push(if flags.long {
                    long_line(&e.name, &e.host_path)
                } else {
                    e.name.clone()
                });
            }

            let mut block = String::new();
            if raw_paths.len() > 1 {
                block.push_str(raw);
                block.push_str(":\n");
            }
            if flags.long {
                block.push_str(&format!("total {}\n", total_blocks / 2));
            }
            block.push_str(&lines.join("\n"));
            blocks.push(block);
        }

        blocks.join("\n\n")
    }
}
