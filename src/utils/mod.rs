// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 shipline contributors

//! Utility modules
//!
//! Common utilities for the shipline CLI.

pub mod colors;

pub use colors::*;
