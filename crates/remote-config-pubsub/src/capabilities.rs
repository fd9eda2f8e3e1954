// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Capability bitmask advertised to the agent for the ASM products.
//!
//! The agent expects the mask as the minimal big-endian byte string of the
//! integer value, base64-encoded:
//!
//! ```text
//! value  binary       bytes        base64
//! 2      10           [0x02]       "Ag=="
//! 6      110          [0x06]       "Bg=="
//! 256    100000000    [0x01,0x00]  "AQA="
//! ```

use base64::Engine;

/// Bit 0 is reserved.
pub const ASM_ACTIVATION: u64 = 1 << 1;
pub const ASM_IP_BLOCKING: u64 = 1 << 2;
pub const ASM_DD_RULES: u64 = 1 << 3;
pub const ASM_EXCLUSIONS: u64 = 1 << 4;
pub const ASM_REQUEST_BLOCKING: u64 = 1 << 5;
pub const ASM_RESPONSE_BLOCKING: u64 = 1 << 6;
pub const ASM_USER_BLOCKING: u64 = 1 << 7;
pub const ASM_CUSTOM_RULES: u64 = 1 << 8;

/// Everything enabled once the security processor is running.
pub const ASM_BLOCKING_STACK: u64 = ASM_IP_BLOCKING
    | ASM_DD_RULES
    | ASM_EXCLUSIONS
    | ASM_REQUEST_BLOCKING
    | ASM_RESPONSE_BLOCKING
    | ASM_USER_BLOCKING
    | ASM_CUSTOM_RULES;

/// Composed capability bitmask.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppSecCapabilities(u64);

impl AppSecCapabilities {
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Builds the mask advertised by a tracer.
    ///
    /// * `remote_config_enabled` - when `false` nothing is advertised.
    /// * `activation_allowed` - remote activation is only offered when the
    ///   user did not pin ASM on or off explicitly.
    /// * `processor_running` - the security processor is active and can apply
    ///   blocking data and rules.
    pub fn compose(
        remote_config_enabled: bool,
        activation_allowed: bool,
        processor_running: bool,
    ) -> Self {
        if !remote_config_enabled {
            return Self::default();
        }
        let mut bits = 0;
        if activation_allowed {
            bits |= ASM_ACTIVATION;
        }
        if processor_running {
            bits |= ASM_BLOCKING_STACK;
        }
        Self(bits)
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    pub const fn contains(self, capability: u64) -> bool {
        self.0 & capability == capability
    }

    /// Minimal big-endian encoding; empty when no bit is set.
    pub fn to_bytes(self) -> Vec<u8> {
        let bytes = self.0.to_be_bytes();
        let skip = (self.0.leading_zeros() / 8) as usize;
        bytes[skip..].to_vec()
    }

    pub fn to_base64(self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.to_bytes())
    }
}
