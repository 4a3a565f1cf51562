use crate::config::RulesSeedFile;
use anyhow::Result;
use devmon_alert::cache::RuleCache;
use devmon_storage::store::SqliteStore;
use std::path::Path;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedSummary {
    pub devices: u32,
    pub created: u32,
    pub skipped: u32,
}

pub fn read_seed_file(seed_path: &Path) -> Result<RulesSeedFile> {
    let content = std::fs::read_to_string(seed_path).map_err(|e| {
        anyhow::anyhow!("Failed to read seed file '{}': {}", seed_path.display(), e)
    })?;
    let seed: RulesSeedFile = serde_json::from_str(&content).map_err(|e| {
        anyhow::anyhow!("Failed to parse seed file '{}': {}", seed_path.display(), e)
    })?;
    Ok(seed)
}

/// Upserts the seed's devices, then adds each rule that does not exist yet.
pub fn apply_seed(store: &SqliteStore, cache: &RuleCache, seed: RulesSeedFile) -> Result<SeedSummary> {
    let mut summary = SeedSummary::default();

    for device in &seed.devices {
        store.upsert_device(device)?;
        summary.devices += 1;
    }
    if summary.devices > 0 {
        cache.reload();
    }

    for rule in seed.rules {
        let device_id = rule.device_id;
        let params = rule.params.clone();
        if cache.add(rule) {
            tracing::info!(device_id, params = %params, "Notification rule created");
            summary.created += 1;
        } else {
            tracing::warn!(device_id, params = %params, "Notification rule already exists, skipping");
            summary.skipped += 1;
        }
    }

    Ok(summary)
}
