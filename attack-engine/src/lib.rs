//! Attack Engine - Core infrastructure for Repeater and Intruder modules
//!
//! This crate provides the dispatch contract shared by both tools, the
//! reqwest-backed outbound client, the single-shot Repeater and the Intruder
//! payload sweep with its injection-point parser and attack modes.

pub mod types;
pub mod traits;
pub mod error;
pub mod client;
pub mod repeater;
pub mod parser;
pub mod attack_modes;
pub mod execution;


pub use types::{
    HttpRequestData, HttpResponseData, AttackResult as AttackResultData, AttackStatus,
    AttackResponse, AttackProgress, AttackState, IntruderConfig
};

pub use traits::{RequestDispatcher, AttackStatistics};

pub use error::{AttackError, AttackResult, DispatchError};

pub use client::ReqwestDispatcher;

pub use repeater::{Repeater, RepeaterError};

pub use parser::{InjectionPoint, PayloadPositionParser, MARKER};

pub use attack_modes::{
    AttackMode, AttackModeExecutor, SniperMode, BatteringRamMode, AttackModeFactory
};

pub use execution::IntruderEngine;
