pub mod cluster_scan;

// Re-export types
pub use cluster_scan::{ClusterScan, ClusterScanSpec, ClusterScanStatus, ScanMode};
