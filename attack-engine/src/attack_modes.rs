//! Attack mode implementations for intruder attacks
//!
//! A mode decides which injection points receive the current payload.
//! Every mode takes a single payload list and yields one request per payload.

use crate::parser::{InjectionPoint, PayloadPositionParser};
use serde::{Deserialize, Serialize};

/// Attack mode enumeration
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AttackMode {
    /// Only the first injection point, iterate through all payloads
    #[default]
    Sniper,
    /// Every injection point, same payload in all of them
    BatteringRam,
}

/// Attack mode executor trait
pub trait AttackModeExecutor: Send + Sync {
    /// Substitute one payload into the template
    ///
    /// `points` must come from `PayloadPositionParser::parse` on `template`.
    fn render(&self, template: &str, points: &[InjectionPoint], payload: &str) -> String;
}

/// Sniper mode: first position only
pub struct SniperMode;

impl AttackModeExecutor for SniperMode {
    fn render(&self, template: &str, points: &[InjectionPoint], payload: &str) -> String {
        let first = points.len().min(1);
        PayloadPositionParser::inject(template, &points[..first], payload)
    }
}

/// Battering Ram mode: same payload in every position
pub struct BatteringRamMode;

impl AttackModeExecutor for BatteringRamMode {
    fn render(&self, template: &str, points: &[InjectionPoint], payload: &str) -> String {
        PayloadPositionParser::inject(template, points, payload)
    }
}

/// Factory for creating attack mode executors
pub struct AttackModeFactory;

impl AttackModeFactory {
    /// Create an attack mode executor
    pub fn create(mode: AttackMode) -> Box<dyn AttackModeExecutor> {
        match mode {
            AttackMode::Sniper => Box::new(SniperMode),
            AttackMode::BatteringRam => Box::new(BatteringRamMode),
        }
    }
}
