// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Device directory API: HTTP client and device listing.

pub mod client;
pub mod directory;
