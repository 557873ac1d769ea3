pub mod labels;
pub mod workload;

pub use workload::{owning_scan, ChildKind, ChildWorkload, ScanOwner, WorkloadTemplate};
