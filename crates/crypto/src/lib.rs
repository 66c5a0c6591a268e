//! # Device Policy Trust Store
//!
//! The device's signed on-disk identity -- shared secret, trust anchors, RSA
//! key pair, and connected-device secrets -- plus the JWT client-assertion
//! builder used to authenticate against the policy server (C1).
//!
//! ## Security
//!
//! - 100% Rust implementation (RustCrypto primitives, no C/C++)
//! - Secure memory handling with zeroize
//! - Container signed with an HMAC; load hard-fails on mismatch

pub mod error;
pub mod telemetry;
pub mod trust_store;

pub use error::{Result, TrustStoreError};
pub use telemetry::TrustStoreTelemetry;
pub use trust_store::{AssertionAlgorithm, SignatureHash, TrustStore};
