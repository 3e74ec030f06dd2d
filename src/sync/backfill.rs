use tracing::{debug, info};

use crate::indexer::ChainClient;
use crate::metrics::Metrics;
use crate::models::errors::SyncError;
use crate::storage::HeaderRepository;

/// Fills every gap in `[starting_block, head]` for the local node and returns the
/// number of headers written.
///
/// The first failed fetch aborts the pass. Already written headers stay, and a re-run
/// only fetches what is still missing.
pub async fn populate_missing_headers(
    chain: &dyn ChainClient,
    repository: &dyn HeaderRepository,
    starting_block: u64,
    metrics: Option<&Metrics>,
) -> Result<usize, SyncError> {
    let (head, _) = chain.latest_header().await?;
    if starting_block > head {
        debug!("Backfill start {} is ahead of head {}", starting_block, head);
        return Ok(0);
    }

    let missing = repository
        .missing_block_numbers(starting_block, head, chain.node().fingerprint())
        .await?;
    if missing.is_empty() {
        return Ok(0);
    }

    info!(
        "Backfilling {} missing headers between {} and {}",
        missing.len(),
        starting_block,
        head
    );

    let mut populated = 0;
    for block_number in missing {
        let header = chain.header_by_number(block_number).await?;
        repository.create_or_update_header(&header).await?;
        populated += 1;

        if let Some(metrics) = metrics {
            metrics
                .headers_populated
                .add(1, &metrics.labels("populate_missing_headers"));
        }
    }

    info!("Populated {} headers", populated);
    Ok(populated)
}
