use std::collections::BTreeMap;

pub const MANAGED_BY: &str = "clusterscan-operator";
pub const SCAN_LABEL: &str = "scans.mydomain.com/scan";

/// Labels put on every object materialized for a scan
pub fn scan_labels(scan_name: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert("app.kubernetes.io/managed-by".to_string(), MANAGED_BY.to_string());
    labels.insert("app.kubernetes.io/component".to_string(), "scan".to_string());
    labels.insert(SCAN_LABEL.to_string(), scan_name.to_string());
    labels
}
