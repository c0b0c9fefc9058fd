//! Catalog loading, run once before the pipeline starts.

use super::Catalog;
use crate::config::ParsePolicy;
use crate::error::StartupError;
use crate::io::CatalogSource;
use crate::pipeline::Metrics;
use std::sync::Arc;

/// Load every row from `source` into a shared [`Catalog`].
///
/// Under [`ParsePolicy::Strict`] the first malformed row fails startup. Under
/// [`ParsePolicy::Skip`] malformed rows are logged, counted and dropped.
pub fn load_catalog(
    source: &mut dyn CatalogSource,
    policy: ParsePolicy,
    metrics: &Metrics,
) -> Result<Arc<Catalog>, StartupError> {
    let rows = source.load_all()?;
    let total_rows = rows.len();

    let mut entries = Vec::with_capacity(total_rows);
    for row in rows {
        match row {
            Ok(entry) => entries.push(entry),
            Err(e) => match policy {
                ParsePolicy::Strict => return Err(StartupError::CatalogRow(e)),
                ParsePolicy::Skip => {
                    tracing::warn!("Skipping malformed catalog row: {}", e);
                    metrics.add_parse_error();
                }
            },
        }
    }

    let valid_rows = entries.len();
    let catalog = Catalog::from_entries(entries);

    if catalog.len() < valid_rows {
        tracing::debug!("{} duplicate part numbers replaced by later rows", valid_rows - catalog.len());
    }
    tracing::info!("Loaded {} catalog entries from {} rows", catalog.len(), total_rows);

    Ok(Arc::new(catalog))
}
