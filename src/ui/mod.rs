//! Terminal output for the berth CLI
//!
//! Uses `cliclack` for styled step output in interactive terminals, with a
//! plain fallback for CI and piped output.
//!
//! # Example
//!
//! ```rust,ignore
//! use berth::ui::{self, UiContext};
//!
//! let ctx = UiContext::detect();
//! ui::step_ok_detail(&ctx, "Volume ready", volume.handle());
//! ui::step_warn_hint(&ctx, "Volume abc not found", "Run: berth volume list");
//! ```

mod context;
mod output;

pub use context::UiContext;
pub use output::{intro, key_value, remark, step_info, step_ok_detail, step_warn_hint};
