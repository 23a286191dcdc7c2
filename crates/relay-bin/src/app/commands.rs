//! One-shot commands that operate on the stores directly.

use relay_config_and_utils::{Config, Paths};
use relay_ledger::RelayStore;
use relay_outbox::RetrySweeper;

/// Print entry counts of the three stores.
pub fn print_status(paths: &Paths) -> Result<(), Box<dyn std::error::Error>> {
    let status = RelayStore::open(paths)?.status()?;

    println!("Data directory: {}", paths.data_dir().display());
    println!("  incoming archive: {}", status.incoming);
    println!("  outbound queue:   {}", status.outbound);
    println!("  ledger:           {}", status.ledger);
    Ok(())
}

/// Run one sweep pass and print what it did.
pub async fn sweep_now(config: &Config, paths: &Paths) -> Result<(), Box<dyn std::error::Error>> {
    let store = RelayStore::open(paths)?;
    let sweeper = RetrySweeper::new(store, config.sweep_interval(), config.stale_after());
    let report = sweeper.sweep().await?;

    println!("Sweep complete");
    println!("  scanned:        {}", report.scanned);
    println!("  retained:       {}", report.retained);
    println!("  requeued:       {}", report.requeued);
    println!("  already queued: {}", report.already_queued);
    println!("  pruned:         {}", report.pruned);
    Ok(())
}
