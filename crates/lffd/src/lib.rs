//! Receptive-field target assignment for multi-head face detectors.
//!
//! LFFD-style detectors have no anchor boxes in the usual sense. Each detection head instead
//! treats the receptive field of every feature map cell as its anchor, and is responsible for
//! faces in a fixed size range. This crate computes the training targets of such heads:
//!
//! - [`anchor`] reconstructs the receptive-field grid of a feature map,
//! - [`matcher`] assigns ground-truth faces to cells, gated by face size,
//! - [`head`] and [`target`] turn the assignment into dense per-batch target arrays,
//! - [`arch`] contains the head layouts of the published detector variants,
//! - [`widerface`] reads ground-truth faces from WIDER FACE annotation files.
//!
//! The network itself, the loss, and post-processing are left to the training framework.
//!
//! # Coordinates
//!
//! All boxes are `(x_min, y_min, x_max, y_max)` in input-image pixels, X pointing right and Y
//! pointing down. Feature map cells are addressed as `(row, col)`.
//!
//! # Environment Variables
//!
//! * `RUST_LOG`: log filter picked up by [`init_logger!`].
//! * `LFFD_ARCH`: architecture configuration used by the bundled examples. Defaults to
//!   `320_20L_5S`; see [`arch::list_configs`] for the allowed values.

use log::LevelFilter;

pub mod anchor;
pub mod arch;
pub mod head;
pub mod matcher;
pub mod rect;
pub mod target;
pub mod widerface;

pub use anchor::{AnchorCache, RfAnchors};
pub use arch::{ArchConfig, HeadConfig, Lffd};
pub use head::DetectionHead;
pub use matcher::{Assignment, Cell, Matcher};
pub use rect::{FaceBox, ScaleRange};
pub use target::HeadTargets;

/// macro-use only, not part of public API.
#[doc(hidden)]
pub fn init_logger(calling_crate: &'static str) {
    let log_level = if cfg!(debug_assertions) {
        LevelFilter::Trace
    } else {
        LevelFilter::Debug
    };
    env_logger::Builder::new()
        .filter(Some(calling_crate), log_level)
        .filter(Some(env!("CARGO_PKG_NAME")), log_level)
        .parse_default_env()
        .try_init()
        .ok();
}

/// Initializes logging to *stderr*.
///
/// If `cfg!(debug_assertions)` is enabled, the calling crate and this library will log at *trace*
/// level. Otherwise, they will log at *debug* level. `RUST_LOG` overrides both.
///
/// If a global logger is already registered, this macro will do nothing.
#[macro_export]
macro_rules! init_logger {
    () => {
        $crate::init_logger(env!("CARGO_CRATE_NAME"))
    };
}
