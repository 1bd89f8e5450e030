//! Prompt module for LLM-based operations.
//!
//! This module provides modular prompt templates for various LLM tasks.

pub mod related_work;

pub use related_work::*;
