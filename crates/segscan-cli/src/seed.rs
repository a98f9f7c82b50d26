use segscan::{AttributeValue, Item, MemoryStore, memory::keyed_item};

use crate::config::CliConfig;

/// Partition key attribute of the seeded table.
pub const KEY_ATTRIBUTE: &str = "id";

/// Builds the in-memory table the binary scans.
pub fn seeded_store(config: &CliConfig) -> MemoryStore {
    let mut store = MemoryStore::new(config.scan.table(), KEY_ATTRIBUTE)
        .with_items((0..config.seed_items).map(synthetic_item));

    if let Some(delay) = config.page_delay {
        store = store.with_page_delay(delay);
    }
    if let Some(segment) = config.fail_segment {
        store = store.fail_segment(segment, 1);
    }
    store
}

fn synthetic_item(n: usize) -> Item {
    let mut item = keyed_item(KEY_ATTRIBUTE, format!("item-{n:08}"));
    item.insert("seq".to_owned(), AttributeValue::from(n as u64));
    item.insert("active".to_owned(), AttributeValue::Bool(n % 3 != 0));
    item.insert(
        "tags".to_owned(),
        AttributeValue::Ss(vec![format!("bucket-{}", n % 16)]),
    );
    item
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_items_have_unique_keys() {
        let a = synthetic_item(7);
        let b = synthetic_item(8);
        assert_eq!(a[KEY_ATTRIBUTE].as_s(), Some("item-00000007"));
        assert_ne!(a[KEY_ATTRIBUTE], b[KEY_ATTRIBUTE]);
        assert_eq!(a["seq"].as_n(), Some("7"));
    }
}
