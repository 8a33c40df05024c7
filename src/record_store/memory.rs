use crate::record_store::{canonicalize, RecordStore, TxtRecord};
use std::collections::HashMap;

#[derive(Default, Debug, Clone)]
pub struct InMemoryRecordStore {
    records: HashMap<String, TxtRecord>,
}

impl RecordStore for InMemoryRecordStore {
    fn lookup(&self, fqdn: &str) -> Option<TxtRecord> {
        self.records.get(&canonicalize(fqdn)).cloned()
    }

    fn add_value(&mut self, fqdn: &str, owner_hostname: &str, value: String) {
        let fqdn = canonicalize(fqdn);
        self.records
            .entry(fqdn.clone())
            .or_insert_with(|| TxtRecord {
                fqdn,
                owner_hostname: owner_hostname.to_string(),
                values: Vec::with_capacity(1),
            })
            .values
            .push(value);
    }

    fn remove_value(&mut self, fqdn: &str, value: &str) -> bool {
        let fqdn = canonicalize(fqdn);
        let Some(record) = self.records.get_mut(&fqdn) else {
            return false;
        };
        let Some(pos) = record.values.iter().position(|v| v == value) else {
            return false;
        };
        record.values.remove(pos);
        if record.values.is_empty() {
            self.records.remove(&fqdn);
        }
        true
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}
