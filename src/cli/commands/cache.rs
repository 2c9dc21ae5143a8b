//! Cache command - inspect and maintain the build cache

use crate::cache::registry::now;
use crate::cache::{ArtifactStore, CacheEntry, CacheKey, ReclaimPolicy, ReclaimReport, Registry};
use crate::cli::args::{CacheAction, CacheArgs, OutputFormat, ScriptSource};
use crate::config::Config;
use crate::error::{ScripError, ScripResult};
use crate::ui::{self, UiContext};
use chrono::Duration;
use console::style;
use tracing::debug;

/// Execute the cache command
pub async fn execute(args: CacheArgs, config: &Config) -> ScripResult<()> {
    let (registry, store) = super::open_cache(config).await?;

    match args.action {
        CacheAction::List { format } => list_entries(&registry, &store, format),
        CacheAction::Info(source) => show_info(&registry, &store, &source, config).await,
        CacheAction::Gc { days, dry_run } => gc(&registry, &store, config, days, dry_run),
        CacheAction::Unlock { key } => unlock(&registry, &key),
        CacheAction::Verify => verify(&registry, &store),
        CacheAction::Clear { yes } => clear(&registry, &store, yes).await,
    }
}

/// List every registry entry
fn list_entries(
    registry: &Registry,
    store: &ArtifactStore,
    format: OutputFormat,
) -> ScripResult<()> {
    let entries = registry.list()?;

    match format {
        OutputFormat::Table => print_table(&entries, store),
        OutputFormat::Json => print_json(&entries, store)?,
        OutputFormat::Plain => {
            for entry in &entries {
                println!("{}", entry.key);
            }
        }
    }

    Ok(())
}

fn artifact_label(store: &ArtifactStore, key: &CacheKey) -> String {
    store
        .state(key)
        .map(|state| state.to_string())
        .unwrap_or_else(|_| "invalid".to_string())
}

fn lease_label(entry: &CacheEntry) -> String {
    match (entry.writer_held, entry.reader_count) {
        (true, _) => style("writing").yellow().to_string(),
        (false, 0) => style("free").dim().to_string(),
        (false, n) => style(format!("{} reader(s)", n)).green().to_string(),
    }
}

fn print_table(entries: &[CacheEntry], store: &ArtifactStore) {
    if entries.is_empty() {
        println!("No cached programs.");
        return;
    }

    let now = now();
    println!(
        "{:<14} {:<10} {:<10} {:<12}",
        "KEY", "ARTIFACT", "LAST USED", "LEASE"
    );
    println!("{}", "-".repeat(50));

    for entry in entries {
        println!(
            "{:<14} {:<10} {:<10} {}",
            entry.key.short(),
            artifact_label(store, &entry.key),
            format_age(entry.age(now)),
            lease_label(entry)
        );
    }

    println!();
    println!("Total: {} program(s)", entries.len());
}

fn print_json(entries: &[CacheEntry], store: &ArtifactStore) -> ScripResult<()> {
    #[derive(serde::Serialize)]
    struct EntryJson {
        key: String,
        last_access: String,
        reader_count: u32,
        writer_held: bool,
        artifact: String,
    }

    let json: Vec<EntryJson> = entries
        .iter()
        .map(|e| EntryJson {
            key: e.key.to_string(),
            last_access: e.last_access.to_rfc3339(),
            reader_count: e.reader_count,
            writer_held: e.writer_held,
            artifact: artifact_label(store, &e.key),
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

/// Show where a script's program lives and what state it is in
async fn show_info(
    registry: &Registry,
    store: &ArtifactStore,
    source: &ScriptSource,
    config: &Config,
) -> ScripResult<()> {
    let ctx = UiContext::detect();
    let (script, program) = super::load_program(source, config).await?;
    let key = program.key();

    ui::section(&ctx, script.name());
    ui::key_value(&ctx, "Key", key.as_str());
    ui::key_value(&ctx, "Directory", &store.dir(key).display().to_string());
    ui::key_value(&ctx, "Artifact", &artifact_label(store, key));

    match registry.get(key)? {
        Some(entry) => {
            ui::key_value(&ctx, "Last used", &format_age(entry.age(now())));
            ui::key_value(&ctx, "Lease", &lease_label(&entry));
        }
        None => ui::key_value(&ctx, "Registry", "not cached"),
    }

    Ok(())
}

/// Reclaim programs unused for longer than the window
fn gc(
    registry: &Registry,
    store: &ArtifactStore,
    config: &Config,
    days_override: Option<u32>,
    dry_run: bool,
) -> ScripResult<()> {
    let ctx = UiContext::detect();
    let gc_days = days_override.unwrap_or(config.cache.gc_days);

    let Some(policy) = ReclaimPolicy::from_days(gc_days) else {
        println!("Cache GC is disabled (gc_days = 0)");
        return Ok(());
    };

    let candidates = policy.candidates(registry)?;
    if candidates.is_empty() {
        println!("No programs unused for more than {} days.", gc_days);
        return Ok(());
    }

    let now = now();
    println!(
        "Found {} program(s) unused for more than {} days:",
        candidates.len(),
        gc_days
    );
    for entry in &candidates {
        println!(
            "  {} {} (last used {})",
            style("•").red(),
            entry.key.short(),
            format_age(entry.age(now))
        );
    }

    if dry_run {
        println!();
        println!("Dry run - no programs removed.");
        return Ok(());
    }

    println!();
    let report = policy.reclaim(registry, store)?;
    print_report(&ctx, &report);
    Ok(())
}

/// Reset a lease left behind by a crashed process
fn unlock(registry: &Registry, raw_key: &str) -> ScripResult<()> {
    let ctx = UiContext::detect();
    let key = resolve_key(registry, raw_key)?;

    if registry.force_unlock(&key, now())? == 0 {
        ui::step_warn(&ctx, &format!("No cache entry for {}", key));
    } else {
        ui::step_ok(&ctx, &format!("Unlocked {}", key.short()));
    }
    Ok(())
}

/// Accept a full key or an unambiguous prefix as shown by `cache list`
fn resolve_key(registry: &Registry, raw: &str) -> ScripResult<CacheKey> {
    let key = CacheKey::parse(raw)?;
    if raw.len() == CacheKey::LEN {
        return Ok(key);
    }

    let matches: Vec<CacheKey> = registry
        .list()?
        .into_iter()
        .map(|entry| entry.key)
        .filter(|k| k.as_str().starts_with(raw))
        .collect();

    match matches.as_slice() {
        [only] => Ok(only.clone()),
        [] => Ok(key),
        _ => Err(ScripError::InvalidKey(format!(
            "{} matches {} entries",
            raw,
            matches.len()
        ))),
    }
}

/// Report artifact directories without a registry row
fn verify(registry: &Registry, store: &ArtifactStore) -> ScripResult<()> {
    let ctx = UiContext::detect();
    let violations = store.verify(registry)?;

    if violations.is_empty() {
        ui::step_ok(&ctx, "Cache is consistent");
        return Ok(());
    }

    for violation in &violations {
        ui::step_warn(&ctx, &violation.to_string());
    }
    Err(ScripError::User(format!(
        "{} integrity violation(s) found",
        violations.len()
    )))
}

/// Remove every program that is not in use
async fn clear(registry: &Registry, store: &ArtifactStore, yes: bool) -> ScripResult<()> {
    let ctx = UiContext::detect().with_auto_yes(yes);
    let entries = registry.list()?;

    if entries.is_empty() {
        println!("No cached programs to clear.");
        return Ok(());
    }

    println!(
        "This will remove {} cached program(s) from {}",
        entries.len(),
        store.root().display()
    );

    if !ui::confirm(&ctx, "Are you sure?", false).await? {
        println!("Aborted.");
        return Ok(());
    }

    debug!("Clearing {} entries", entries.len());
    let report = ReclaimPolicy::everything().reclaim(registry, store)?;
    print_report(&ctx, &report);
    Ok(())
}

fn print_report(ctx: &UiContext, report: &ReclaimReport) {
    ui::step_ok(ctx, &format!("Removed {} program(s)", report.removed.len()));
    if !report.busy.is_empty() {
        ui::step_warn_hint(
            ctx,
            &format!("{} program(s) in use were skipped", report.busy.len()),
            "Run again once they finish",
        );
    }
    if !report.refreshed.is_empty() {
        ui::step_info(
            ctx,
            &format!("{} program(s) were used meanwhile and kept", report.refreshed.len()),
        );
    }
}

/// Compact human age, e.g. `3d ago`
fn format_age(age: Duration) -> String {
    if age.num_days() > 0 {
        format!("{}d ago", age.num_days())
    } else if age.num_hours() > 0 {
        format!("{}h ago", age.num_hours())
    } else if age.num_minutes() > 0 {
        format!("{}m ago", age.num_minutes())
    } else {
        "just now".to_string()
    }
}
