#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! CLI for browsing an IMAP mailbox as a filesystem

use clap::{Parser, Subcommand};
use imapfs::{Flag, ImapConfig, ImapFs, Info, Namespace};
use std::io::{Read, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "imapfs-cli")]
#[command(about = "Browse an IMAP mailbox as a filesystem")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Command {
    /// List a directory
    Ls {
        /// Directory to list
        #[arg(default_value = "/")]
        path: String,

        /// Show type, size, date and subject
        #[arg(short, long)]
        long: bool,

        /// First entry to show
        #[arg(long)]
        start: Option<usize>,

        /// Entry after the last one to show
        #[arg(long)]
        end: Option<usize>,
    },

    /// Show the descriptor of a file or directory
    Info {
        path: String,
    },

    /// Print the raw bytes of a message
    Cat {
        path: String,
    },

    /// Store a new message (from a file, or stdin)
    Put {
        /// Destination, e.g. /INBOX/1.eml
        path: String,

        /// Read the message from this file instead of stdin
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Create a directory
    Mkdir {
        path: String,

        /// Succeed if the directory already exists
        #[arg(long)]
        recreate: bool,
    },

    /// Remove a message
    Rm {
        path: String,
    },

    /// Remove an empty directory
    Rmdir {
        path: String,
    },

    /// Copy a message into another directory
    Cp {
        src: String,
        dst: String,

        #[arg(long)]
        overwrite: bool,
    },

    /// Add flags to a message (e.g. '\Seen' '$Important')
    Flag {
        path: String,

        #[arg(required = true)]
        flags: Vec<String>,
    },

    /// Show filesystem capabilities and session details
    Meta,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = ImapConfig::from_env()?;
    let fs = ImapFs::connect(config)?;

    let result = run(&fs, &args);
    fs.close();
    result
}

fn run(fs: &ImapFs, args: &Args) -> anyhow::Result<()> {
    match &args.command {
        Command::Ls {
            path,
            long,
            start,
            end,
        } => cmd_ls(fs, args, path, *long, *start, *end),
        Command::Info { path } => cmd_info(fs, path),
        Command::Cat { path } => {
            let content = fs.getbytes(path)?;
            std::io::stdout().write_all(&content)?;
            Ok(())
        }
        Command::Put { path, file } => {
            let content = match file {
                Some(file) => std::fs::read(file)?,
                None => {
                    let mut content = Vec::new();
                    std::io::stdin().read_to_end(&mut content)?;
                    content
                }
            };
            fs.writebytes(path, &content)?;
            report(args, "stored", path);
            Ok(())
        }
        Command::Mkdir { path, recreate } => {
            fs.makedir(path, *recreate)?;
            report(args, "created", path);
            Ok(())
        }
        Command::Rm { path } => {
            fs.remove(path)?;
            report(args, "removed", path);
            Ok(())
        }
        Command::Rmdir { path } => {
            fs.removedir(path)?;
            report(args, "removed", path);
            Ok(())
        }
        Command::Cp {
            src,
            dst,
            overwrite,
        } => {
            fs.copy(src, dst, *overwrite)?;
            report(args, "copied", dst);
            Ok(())
        }
        Command::Flag { path, flags } => {
            let flags: Vec<Flag> = flags.iter().map(|f| Flag::from(f.as_str())).collect();
            fs.setinfo(path, &flags)?;
            report(args, "flagged", path);
            Ok(())
        }
        Command::Meta => cmd_meta(fs, args),
    }
}

fn cmd_ls(
    fs: &ImapFs,
    args: &Args,
    path: &str,
    long: bool,
    start: Option<usize>,
    end: Option<usize>,
) -> anyhow::Result<()> {
    if !long && !args.json && start.is_none() && end.is_none() {
        let mut names = fs.listdir(path)?;
        names.sort();
        for name in names {
            println!("{name}");
        }
        return Ok(());
    }

    let page = (start.is_some() || end.is_some())
        .then(|| (start.unwrap_or(0), end.unwrap_or(usize::MAX)));
    let namespaces = [Namespace::Basic, Namespace::Details, Namespace::Mail];
    let mut entries: Vec<Info> = fs.scandir(path, Some(&namespaces), page)?.collect();
    entries.sort_by(|a, b| a.name().cmp(b.name()));

    if args.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        print_info_table(&entries);
    }
    Ok(())
}

fn cmd_info(fs: &ImapFs, path: &str) -> anyhow::Result<()> {
    let info = fs.getinfo(path)?;
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}

fn cmd_meta(fs: &ImapFs, args: &Args) -> anyhow::Result<()> {
    let meta = fs.getmeta("standard");
    if args.json {
        let value = serde_json::json!({
            "url": fs.imap_url(),
            "welcome": fs.welcome(),
            "delimiter": fs.delimiter(),
            "namespace_root": fs.namespace_root(),
            "standard": meta,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("URL:       {}", fs.imap_url());
        println!("Welcome:   {}", fs.welcome().unwrap_or_default());
        println!("Delimiter: {:?}", fs.delimiter());
        println!("Namespace: {:?}", fs.namespace_root());
        if let Some(meta) = meta {
            println!("Unicode:   {}", meta.unicode_paths);
        }
    }
    Ok(())
}

fn report(args: &Args, action: &str, path: &str) {
    if args.json {
        println!("{}", serde_json::json!({ "action": action, "path": path }));
    } else {
        println!("{action} {path}");
    }
}

fn print_info_table(entries: &[Info]) {
    if entries.is_empty() {
        println!("Empty directory.");
        return;
    }

    let header = format!("{:<4} {:<10} {:<17} {:<24} {}", "Type", "Size", "Date", "Name", "Subject");
    println!("{header}");
    println!("{}", "-".repeat(100));

    for info in entries {
        println!(
            "{:<4} {:<10} {:<17} {:<24} {}",
            if info.is_dir() { "dir" } else { "msg" },
            info.size().map_or_else(String::new, |s| s.to_string()),
            info.modified()
                .map_or_else(String::new, |d| d.format("%Y-%m-%d %H:%M").to_string()),
            truncate(info.name(), 24),
            truncate(info.subject().unwrap_or_default(), 40),
        );
    }

    println!("\n{} entr(y/ies)", entries.len());
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{truncated}...")
    }
}
