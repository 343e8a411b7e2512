//! Testing utilities for researchflow pipelines.
//!
//! This module provides:
//! - `ScriptedAgent`, a programmable collaborator
//! - fixtures for gateways, items and common stages

pub mod fixtures;
mod mocks;

pub use mocks::{ScriptStep, ScriptedAgent};
