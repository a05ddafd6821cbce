//! Single consumer that batches derived rows into the storage driver.

use std::collections::BTreeMap;
use std::sync::mpsc::Receiver;

use log::debug;
use osmstage_core::OutputRow;

use crate::storage::{StorageDriver, StorageError};

/// Rows written per physical table.
pub(crate) type RowCounts = BTreeMap<String, u64>;

/// Drain `rows` into `schema`, flushing every `batch_size` rows.
///
/// Returns once every sender is dropped. A failed flush stops the writer;
/// senders then observe a closed channel.
pub(crate) fn drain<D: StorageDriver + ?Sized>(
    driver: &D,
    schema: &str,
    batch_size: usize,
    rows: Receiver<Vec<OutputRow>>,
) -> Result<RowCounts, StorageError> {
    let batch_size = batch_size.max(1);
    let mut counts = RowCounts::new();
    let mut pending = Vec::with_capacity(batch_size);
    for batch in rows {
        pending.extend(batch);
        if pending.len() >= batch_size {
            flush(driver, schema, &mut pending, &mut counts)?;
        }
    }
    flush(driver, schema, &mut pending, &mut counts)?;
    Ok(counts)
}

fn flush<D: StorageDriver + ?Sized>(
    driver: &D,
    schema: &str,
    pending: &mut Vec<OutputRow>,
    counts: &mut RowCounts,
) -> Result<(), StorageError> {
    if pending.is_empty() {
        return Ok(());
    }
    driver.write_rows(schema, pending)?;
    for row in pending.iter() {
        *counts.entry(row.physical_table()).or_default() += 1;
    }
    debug!("Flushed {} rows into {schema}", pending.len());
    pending.clear();
    Ok(())
}
