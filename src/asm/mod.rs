//! Appropriate PendSV assembly for the target architecture/ABI.
//!
//! Which module gets compiled is decided by the `arm_abi`/`arm_architecture`
//! cfgs `build.rs` emits via `arm-targets`.

// Copyright (c) 2025 Ferrous Systems
// SPDX-License-Identifier: GPL-3.0-or-later

#[cfg(all(
    arm_abi = "eabi",
    any(arm_architecture = "v6-m", arm_architecture = "v8-m.base")
))]
mod eabi_v6;

#[cfg(all(
    arm_abi = "eabi",
    not(any(arm_architecture = "v6-m", arm_architecture = "v8-m.base"))
))]
mod eabi;

#[cfg(arm_abi = "eabihf")]
mod eabihf;

// End of File
