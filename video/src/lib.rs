//! The video-output half of the core: a flywheel-synchronised CRT model
//! that converts per-cycle signal spans into `Scan` records for a
//! renderer, plus the observational display metrics hosts use for pacing.

pub mod crt;
pub mod metrics;
pub mod scan_target;

pub use crt::{Crt, CrtConfig};
pub use metrics::DisplayMetrics;
pub use scan_target::{ColourSpace, DataType, EndPoint, Modals, Scan, ScanTarget, TargetEvent};
