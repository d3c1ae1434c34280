//! Trust policy configuration and helpers.

pub mod config;

pub use config::{
    load_default_trust_config, load_trust_config, ConfigError, PublicKeyBase64, SignerId,
    TrustConfig, TrustMode,
};
