use std::sync::Arc;

use futures::TryStreamExt;
use serde_json::json;
use stateshift_migrate::{
    BulkMigrator, CancellationToken, CompoundTag, MigrationProxy, RecordState,
};
use stateshift_store::{entries, Backend};
use tracing::warn;

use crate::config::CliConfig;

type Result = std::result::Result<(), Box<dyn std::error::Error>>;

/// Command-line overrides for the `[migrator]` section.
pub struct MigrateOverrides {
    pub concurrency: Option<usize>,
    pub page_size: Option<usize>,
    pub record_types: Vec<String>,
}

/// `stateshift migrate`: run one bulk migration pass.
///
/// Ctrl-C stops the pass after the copies already in flight; the partial
/// statistics are still printed.
pub async fn migrate(config: &CliConfig, overrides: MigrateOverrides, json: bool) -> Result {
    let registry = config.registry()?;
    let mut settings = config.migrator.clone();
    if let Some(concurrency) = overrides.concurrency {
        settings.concurrency = concurrency;
    }
    if let Some(page_size) = overrides.page_size {
        settings.page_size = page_size;
    }
    if !overrides.record_types.is_empty() {
        settings.record_types = Some(overrides.record_types);
    }
    let migrator = BulkMigrator::from_config(&registry, &config.migration, settings)?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing copies in flight");
            on_interrupt.cancel();
        }
    });

    let outcome = migrator.migrate_all(&cancel).await;
    let statistics = match &outcome {
        Ok(statistics) => *statistics,
        Err(e) => e.statistics(),
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "source": config.migration.source,
                "destination": config.migration.destination,
                "cancelled": cancel.is_cancelled(),
                "statistics": statistics,
            }))?
        );
    } else {
        println!(
            "Migration: {} -> {}",
            config.migration.source, config.migration.destination
        );
        println!("  Migrated: {:>10}", format_num(statistics.migrated));
        println!("  Skipped:  {:>10}", format_num(statistics.skipped));
        println!("  Failed:   {:>10}", format_num(statistics.failed));
        if cancel.is_cancelled() {
            println!("  (interrupted; run again to continue)");
        }
    }

    outcome?;
    Ok(())
}

/// `stateshift status`: count records per type in every backend.
pub async fn status(config: &CliConfig, json: bool) -> Result {
    let registry = config.registry()?;
    let mut report = Vec::new();

    for name in config.backends.keys() {
        let Some(backend) = registry.get(name) else {
            continue;
        };
        let role = if *name == config.migration.source {
            "source"
        } else if *name == config.migration.destination {
            "destination"
        } else {
            "-"
        };
        let mut counts = Vec::new();
        for record_type in backend.record_types().await? {
            let count = count_entries(&backend, &record_type, config.migrator.page_size).await?;
            counts.push((record_type, count));
        }
        report.push((name.as_str(), role, counts));
    }

    if json {
        let value: Vec<_> = report
            .iter()
            .map(|(name, role, counts)| {
                let types: serde_json::Map<_, _> = counts
                    .iter()
                    .map(|(record_type, count)| (record_type.clone(), json!(count)))
                    .collect();
                json!({ "backend": name, "role": role, "record_types": types })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    for (name, role, counts) in &report {
        println!("Backend: {name} ({role})");
        if counts.is_empty() {
            println!("  (empty)");
            println!();
            continue;
        }
        println!("  {:<24} {:>10}", "Record type", "Records");
        println!("  {}", "-".repeat(35));
        for (record_type, count) in counts {
            println!("  {:<24} {:>10}", truncate(record_type, 24), format_num(*count));
        }
        let total: u64 = counts.iter().map(|(_, count)| count).sum();
        println!("  {}", "-".repeat(35));
        println!("  {:<24} {:>10}", "Total", format_num(total));
        println!();
    }

    Ok(())
}

/// `stateshift get <type> <key>`: read a record through the proxy.
pub async fn get(config: &CliConfig, record_type: &str, key: &str) -> Result {
    let proxy = proxy(config)?;
    let mut state = RecordState::default();
    proxy.read(record_type, key, &mut state).await?;

    if !state.exists {
        eprintln!("Record '{record_type}/{key}' not found");
        return Ok(());
    }

    let served_by = match state.compound_tag()? {
        CompoundTag::Source(_) => config.migration.source.as_str(),
        CompoundTag::Destination(_) => config.migration.destination.as_str(),
        CompoundTag::Neither => "-",
    };
    println!("Record: {record_type}/{key}");
    println!("Served by: {served_by}");
    println!("Tag: {}", state.tag.as_deref().unwrap_or("-"));
    println!("Size: {} bytes", state.record.len());
    match std::str::from_utf8(&state.record) {
        Ok(text) => println!("Data: {text}"),
        Err(_) => println!("Data: (binary)"),
    }

    Ok(())
}

/// `stateshift clear <type> <key>`: remove a record from both backends.
pub async fn clear(config: &CliConfig, record_type: &str, key: &str) -> Result {
    let proxy = proxy(config)?;
    let mut state = RecordState::default();
    proxy.read(record_type, key, &mut state).await?;
    let existed = state.exists;

    proxy.clear(record_type, key, &mut state).await?;

    if existed {
        println!("Cleared {record_type}/{key}");
    } else {
        eprintln!("Record '{record_type}/{key}' not found");
    }
    Ok(())
}

fn proxy(config: &CliConfig) -> std::result::Result<MigrationProxy, Box<dyn std::error::Error>> {
    let registry = config.registry()?;
    Ok(MigrationProxy::from_config(&registry, &config.migration)?)
}

async fn count_entries(
    backend: &Arc<dyn Backend>,
    record_type: &str,
    page_size: usize,
) -> std::result::Result<u64, stateshift_store::StoreError> {
    entries(Arc::clone(backend), record_type, page_size)
        .try_fold(0u64, |count, _| async move { Ok(count + 1) })
        .await
}

fn format_num(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::new();
    for (i, ch) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(ch);
    }
    result.chars().rev().collect()
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}
