//! Rolling archive of metering records, bounded by count and
//! (optionally) serialized byte size.

use billing_adapter_shared::types::ArchiveEntry;

pub const DEFAULT_RETENTION_PERIOD: usize = 6;
pub const DEFAULT_BYTES_LIMIT: usize = 0;

/// Append `entry`, then trim from the front until `archive` satisfies
/// both `max_length` and `max_bytes`. `max_bytes <= 1` disables the
/// byte check entirely: an empty JSON array alone serializes to two
/// bytes, so a limit of `1` would otherwise trim forever.
pub fn append_metering_records(
    mut archive: Vec<ArchiveEntry>,
    entry: ArchiveEntry,
    max_length: usize,
    max_bytes: usize,
) -> Vec<ArchiveEntry> {
    archive.push(entry);

    while archive.len() > max_length.max(1) {
        archive.remove(0);
    }

    if max_bytes > 1 {
        while serialized_size(&archive) > max_bytes && !archive.is_empty() {
            archive.remove(0);
        }
    }

    archive
}

fn serialized_size(archive: &[ArchiveEntry]) -> usize {
    serde_json::to_vec(archive).map(|bytes| bytes.len()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn entry(tag: &str) -> ArchiveEntry {
        ArchiveEntry {
            billing_time: tag.to_string(),
            billing_status: HashMap::new(),
            billed_usage: HashMap::new(),
            usage_records: Vec::new(),
        }
    }

    #[test]
    fn drops_oldest_beyond_max_length() {
        let archive = vec![entry("a"), entry("b")];
        let archive = append_metering_records(archive, entry("c"), 2, 0);
        assert_eq!(archive.len(), 2);
        assert_eq!(archive[0].billing_time, "b");
        assert_eq!(archive[1].billing_time, "c");
    }

    #[test]
    fn max_bytes_of_one_disables_byte_trimming() {
        let archive = vec![entry("a")];
        let archive = append_metering_records(archive, entry("b"), 100, 1);
        assert_eq!(archive.len(), 2);
    }

    #[test]
    fn trims_until_under_byte_budget() {
        let archive = vec![entry("a"), entry("b"), entry("c")];
        let size_of_two = serialized_size(&archive[1..]);
        let archive = append_metering_records(archive, entry("d"), 10, size_of_two);
        // Whatever remains must fit the budget.
        assert!(serialized_size(&archive) <= size_of_two);
        assert_eq!(archive.last().unwrap().billing_time, "d");
    }
}
