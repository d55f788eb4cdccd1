// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

pub mod formatter;

pub use formatter::{format_results, format_results_with_width, wrap_text, DEFAULT_WRAP_WIDTH, NO_RESULTS};
