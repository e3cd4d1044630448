//! Board description files.
//!
//! A board file fixes the family and profile of a design plus the simulator knobs, so a run can
//! be repeated without retyping the flags. Command line flags win over the file.
//!
//! ```hjson
//! {
//!   family: stm32wb
//!   profile: hse
//!   usb: true
//!   delay: 5
//!   stuck: ["RCC.CR.PLLRDY"]
//! }
//! ```

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Board {
    pub family: Option<String>,
    pub profile: Option<String>,
    pub usb: Option<bool>,
    pub rng: Option<bool>,
    /// Bus accesses between an enabling write and the ready flag.
    pub delay: Option<u32>,
    /// Bound for every readiness poll; unbounded when absent.
    pub max_polls: Option<u32>,
    pub systick_priority: Option<u8>,
    /// Fields frozen at their reset value, as `BLOCK.REG.FIELD`.
    pub stuck: Vec<String>,
}

impl Board {
    pub fn parse(text: &str) -> Result<Self> {
        serde_hjson::from_str(text).context("invalid board file")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("in {}", path.display()))
    }
}
