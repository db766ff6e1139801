//! Cache command - inspect or clear the compile cache

use crate::cache::{format_bytes, CacheEntry, DirCacheService, EntryMeta, EntryState};
use crate::cli::args::{CacheAction, CacheArgs, OutputFormat};
use crate::config::Config;
use crate::error::{ClientError, ClientResult};
use crate::fingerprint::Fingerprint;
use console::style;
use std::io::{self, Write};
use tracing::debug;

/// Execute the cache command
pub async fn execute(args: CacheArgs, config: &Config) -> ClientResult<()> {
    let root = config.cache.root();

    if let CacheAction::Path = args.action {
        println!("{}", root.display());
        return Ok(());
    }

    let service = DirCacheService::open(&root).await?;
    debug!("Using compile cache at {}", service.root().display());

    match args.action {
        CacheAction::List { format } => list_entries(&service, format).await,
        CacheAction::Info { digest } => show_entry(&service, &digest).await,
        CacheAction::Clear { yes } => clear_entries(&service, yes).await,
        CacheAction::Path => Ok(()),
    }
}

/// List all cache entries
async fn list_entries(service: &DirCacheService, format: OutputFormat) -> ClientResult<()> {
    let entries = service.list().await?;

    match format {
        OutputFormat::Json => print_entries_json(&entries)?,
        _ if entries.is_empty() => println!("No cache entries found."),
        OutputFormat::Table => print_entries_table(&entries),
        OutputFormat::Plain => print_entries_plain(&entries),
    }

    Ok(())
}

fn state_display(state: EntryState) -> String {
    match state {
        EntryState::Complete => style("complete").green().to_string(),
        EntryState::Building => style("building").yellow().to_string(),
    }
}

fn short(digest: &str) -> &str {
    &digest[..digest.len().min(12)]
}

fn print_entries_table(entries: &[(CacheEntry, EntryMeta)]) {
    println!(
        "{:<14} {:<10} {:<10} {:<10} {:<20}",
        "DIGEST", "STATE", "SIZE", "BACKEND", "CREATED"
    );
    println!("{}", "-".repeat(66));

    for (entry, meta) in entries {
        let size = meta
            .size_bytes
            .map(format_bytes)
            .unwrap_or_else(|| "-".to_string());
        let backend = meta.backend.as_deref().unwrap_or("-");
        let created = meta.created_at.format("%Y-%m-%d %H:%M").to_string();

        println!(
            "{:<14} {:<10} {:<10} {:<10} {:<20}",
            short(&entry.digest),
            state_display(entry.state),
            size,
            backend,
            created
        );
    }

    let total: u64 = entries.iter().filter_map(|(_, m)| m.size_bytes).sum();
    println!();
    println!(
        "Total: {} entr{} ({})",
        entries.len(),
        if entries.len() == 1 { "y" } else { "ies" },
        format_bytes(total)
    );
}

fn print_entries_json(entries: &[(CacheEntry, EntryMeta)]) -> ClientResult<()> {
    #[derive(serde::Serialize)]
    struct EntryJson<'a> {
        dir: String,
        #[serde(flatten)]
        meta: &'a EntryMeta,
    }

    let json: Vec<EntryJson<'_>> = entries
        .iter()
        .map(|(entry, meta)| EntryJson {
            dir: entry.dir.display().to_string(),
            meta,
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

fn print_entries_plain(entries: &[(CacheEntry, EntryMeta)]) {
    for (entry, _) in entries {
        println!("{}", entry.digest);
    }
}

/// Show one complete entry and the key it was stored under
async fn show_entry(service: &DirCacheService, prefix: &str) -> ClientResult<()> {
    let mut matches = service.find(prefix).await?;

    let (entry, meta) = match matches.len() {
        0 => return Err(ClientError::CacheEntryNotFound(prefix.to_string())),
        1 => matches.remove(0),
        n => {
            return Err(ClientError::CacheEntryNotFound(format!(
                "{prefix} is ambiguous ({n} entries match)"
            )))
        }
    };

    println!("{}", style(&entry.digest).bold());
    println!("  Path:     {}", entry.dir.display());
    println!("  State:    {}", state_display(entry.state));
    println!("  Created:  {}", meta.created_at.to_rfc3339());
    if let Some(size) = meta.size_bytes {
        println!("  Size:     {}", format_bytes(size));
    }
    if let Some(backend) = &meta.backend {
        println!("  Backend:  {}", backend);
    }

    let key_path = entry.key_path();
    match tokio::fs::read_to_string(&key_path).await {
        Ok(content) => {
            let key: Fingerprint = serde_json::from_str(&content)
                .map_err(|e| ClientError::cache_io(&key_path, e))?;
            println!("  Graph:    {} bytes", key.graph.len());
            println!("  Model states: {:?}", key.model_states);
            println!("  Aliases:  {:?}", key.alias);
        }
        Err(e) => println!("  Key:      {} ({})", style("unreadable").red(), e),
    }

    Ok(())
}

/// Clear all entries
async fn clear_entries(service: &DirCacheService, skip_confirm: bool) -> ClientResult<()> {
    let entries = service.list().await?;

    if entries.is_empty() {
        println!("No cache entries to clear.");
        return Ok(());
    }

    if !skip_confirm {
        print!("Remove {} cache entries? [y/N] ", entries.len());
        let _ = io::stdout().flush();

        let mut input = String::new();
        if io::stdin().read_line(&mut input).is_err() {
            println!("Failed to read input, aborting.");
            return Ok(());
        }

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Aborted.");
            return Ok(());
        }
    }

    let removed = service.clear().await?;
    println!("{} cleared {} cache entries", style("✓").green(), removed);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_digest_truncates() {
        assert_eq!(short("0123456789abcdef"), "0123456789ab");
        assert_eq!(short("abc"), "abc");
    }

    #[test]
    fn entry_state_display() {
        assert!(state_display(EntryState::Complete).contains("complete"));
        assert!(state_display(EntryState::Building).contains("building"));
    }
}
