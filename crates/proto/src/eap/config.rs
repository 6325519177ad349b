//! EAP session configuration
//!
//! Maps each EAP method code to its method-specific configuration. The
//! whole tree derives `serde` so session parameters round-trip through a
//! flat key→value representation (`identity`, per-method tables, recursive
//! `inner` config for TTLS).
//!
//! Building a TTLS configuration whose inner session itself contains TTLS
//! is rejected: the tunnel must not nest.

use super::message::EapMethodType;
use crate::eap::{EapError, Result};
use carrick_platform::SimAppType;
use serde::{Deserialize, Serialize};

/// EAP-SIM configuration (RFC 4186)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EapSimConfig {
    /// Subscription ID selecting the SIM
    pub sub_id: i32,
    /// UICC application to run the challenge against
    pub app_type: SimAppType,
}

/// EAP-AKA configuration (RFC 4187)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EapAkaConfig {
    /// Subscription ID selecting the SIM
    pub sub_id: i32,
    /// UICC application to run the challenge against
    pub app_type: SimAppType,
}

/// EAP-AKA' configuration (RFC 5448)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EapAkaPrimeConfig {
    /// Subscription ID selecting the SIM
    pub sub_id: i32,
    /// UICC application to run the challenge against
    pub app_type: SimAppType,
    /// Expected access network name (AT_KDF_INPUT)
    pub network_name: String,
    /// Accept a server network name different from the configured one
    pub allow_mismatched_network_names: bool,
}

/// EAP-MSCHAPv2 configuration (RFC 2759)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EapMsChapV2Config {
    /// Account name
    pub username: String,
    /// Account password
    pub password: String,
}

/// EAP-TTLS configuration (RFC 5281)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EapTtlsConfig {
    /// Optional pinned trust anchor (DER) for the TLS handshake
    pub trusted_ca: Option<Vec<u8>>,
    /// Inner EAP session run through the tunnel (must not contain TTLS)
    pub inner: Box<EapSessionConfig>,
}

/// Configuration for one EAP session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EapSessionConfig {
    /// Identity for EAP-Identity responses (defaults to empty)
    pub identity: Vec<u8>,

    /// EAP-SIM configuration, when enabled
    pub sim: Option<EapSimConfig>,

    /// EAP-AKA configuration, when enabled
    pub aka: Option<EapAkaConfig>,

    /// EAP-AKA' configuration, when enabled
    pub aka_prime: Option<EapAkaPrimeConfig>,

    /// EAP-MSCHAPv2 configuration, when enabled
    pub mschapv2: Option<EapMsChapV2Config>,

    /// EAP-TTLS configuration, when enabled
    pub ttls: Option<EapTtlsConfig>,
}

impl EapSessionConfig {
    /// Create builder
    pub fn builder() -> EapSessionConfigBuilder {
        EapSessionConfigBuilder::default()
    }

    /// Method types this session is configured for, in Nak preference
    /// order
    pub fn supported_methods(&self) -> Vec<EapMethodType> {
        let mut methods = Vec::new();
        if self.aka_prime.is_some() {
            methods.push(EapMethodType::AkaPrime);
        }
        if self.aka.is_some() {
            methods.push(EapMethodType::Aka);
        }
        if self.sim.is_some() {
            methods.push(EapMethodType::Sim);
        }
        if self.ttls.is_some() {
            methods.push(EapMethodType::Ttls);
        }
        if self.mschapv2.is_some() {
            methods.push(EapMethodType::MsChapV2);
        }
        methods
    }

    /// Whether the given method is configured
    pub fn supports(&self, method: EapMethodType) -> bool {
        self.supported_methods().contains(&method)
    }

    /// TTLS configuration accessor
    pub fn ttls_config(&self) -> Option<&EapTtlsConfig> {
        self.ttls.as_ref()
    }
}

/// Builder for EapSessionConfig
#[derive(Debug, Default)]
pub struct EapSessionConfigBuilder {
    identity: Vec<u8>,
    sim: Option<EapSimConfig>,
    aka: Option<EapAkaConfig>,
    aka_prime: Option<EapAkaPrimeConfig>,
    mschapv2: Option<EapMsChapV2Config>,
    ttls: Option<EapTtlsConfig>,
}

impl EapSessionConfigBuilder {
    /// Set the EAP identity
    pub fn with_identity(mut self, identity: Vec<u8>) -> Self {
        self.identity = identity;
        self
    }

    /// Enable EAP-SIM
    pub fn with_sim(mut self, sub_id: i32, app_type: SimAppType) -> Self {
        self.sim = Some(EapSimConfig { sub_id, app_type });
        self
    }

    /// Enable EAP-AKA
    pub fn with_aka(mut self, sub_id: i32, app_type: SimAppType) -> Self {
        self.aka = Some(EapAkaConfig { sub_id, app_type });
        self
    }

    /// Enable EAP-AKA'
    pub fn with_aka_prime(
        mut self,
        sub_id: i32,
        app_type: SimAppType,
        network_name: impl Into<String>,
        allow_mismatched_network_names: bool,
    ) -> Self {
        self.aka_prime = Some(EapAkaPrimeConfig {
            sub_id,
            app_type,
            network_name: network_name.into(),
            allow_mismatched_network_names,
        });
        self
    }

    /// Enable EAP-MSCHAPv2
    pub fn with_mschapv2(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.mschapv2 = Some(EapMsChapV2Config {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    /// Enable EAP-TTLS with the given inner session configuration
    pub fn with_ttls(mut self, trusted_ca: Option<Vec<u8>>, inner: EapSessionConfig) -> Self {
        self.ttls = Some(EapTtlsConfig {
            trusted_ca,
            inner: Box::new(inner),
        });
        self
    }

    /// Validate and build
    ///
    /// At least one method must be enabled, and a TTLS inner session must
    /// not itself contain TTLS.
    pub fn build(self) -> Result<EapSessionConfig> {
        let config = EapSessionConfig {
            identity: self.identity,
            sim: self.sim,
            aka: self.aka,
            aka_prime: self.aka_prime,
            mschapv2: self.mschapv2,
            ttls: self.ttls,
        };

        if config.supported_methods().is_empty() {
            return Err(EapError::Config(
                "At least one EAP method must be configured".into(),
            ));
        }

        if let Some(ttls) = &config.ttls {
            if ttls.inner.ttls.is_some() {
                return Err(EapError::Config(
                    "EAP-TTLS cannot tunnel another EAP-TTLS session".into(),
                ));
            }
            if ttls.inner.supported_methods().is_empty() {
                return Err(EapError::Config(
                    "EAP-TTLS inner session has no methods configured".into(),
                ));
            }
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inner() -> EapSessionConfig {
        EapSessionConfig::builder()
            .with_identity(b"inner@example".to_vec())
            .with_mschapv2("user", "secret")
            .build()
            .unwrap()
    }

    #[test]
    fn test_identity_defaults_to_empty() {
        let config = EapSessionConfig::builder()
            .with_sim(1, SimAppType::Usim)
            .build()
            .unwrap();
        assert!(config.identity.is_empty());
    }

    #[test]
    fn test_requires_at_least_one_method() {
        assert!(EapSessionConfig::builder().build().is_err());
    }

    #[test]
    fn test_supported_methods_order() {
        let config = EapSessionConfig::builder()
            .with_sim(1, SimAppType::Sim)
            .with_aka(1, SimAppType::Usim)
            .with_aka_prime(1, SimAppType::Usim, "WLAN", false)
            .build()
            .unwrap();

        assert_eq!(
            config.supported_methods(),
            vec![
                EapMethodType::AkaPrime,
                EapMethodType::Aka,
                EapMethodType::Sim
            ]
        );
        assert!(config.supports(EapMethodType::Sim));
        assert!(!config.supports(EapMethodType::Ttls));
    }

    #[test]
    fn test_ttls_accepts_non_ttls_inner() {
        let config = EapSessionConfig::builder()
            .with_identity(b"outer@example".to_vec())
            .with_ttls(None, inner())
            .build()
            .unwrap();
        assert!(config.ttls_config().is_some());
    }

    #[test]
    fn test_nested_ttls_rejected() {
        let middle = EapSessionConfig::builder()
            .with_identity(b"middle@example".to_vec())
            .with_ttls(None, inner())
            .build()
            .unwrap();

        let result = EapSessionConfig::builder()
            .with_identity(b"outer@example".to_vec())
            .with_ttls(None, middle)
            .build();

        assert!(matches!(result, Err(EapError::Config(_))));
    }

    #[test]
    fn test_ttls_inner_requires_method() {
        let empty_inner = EapSessionConfig {
            identity: Vec::new(),
            sim: None,
            aka: None,
            aka_prime: None,
            mschapv2: None,
            ttls: None,
        };
        let result = EapSessionConfig::builder()
            .with_ttls(None, empty_inner)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_serde_roundtrip() {
        let config = EapSessionConfig::builder()
            .with_identity(b"0123456789@example".to_vec())
            .with_aka_prime(7, SimAppType::Usim, "WLAN", true)
            .with_ttls(Some(vec![0x30, 0x82]), inner())
            .build()
            .unwrap();

        let json = serde_json::to_string(&config).unwrap();
        let restored: EapSessionConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, config);

        // The persisted form is a key->value bag with the documented keys
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(value.get("identity").is_some());
        assert!(value.get("aka_prime").is_some());
        assert_eq!(
            value["aka_prime"]["network_name"],
            serde_json::Value::String("WLAN".into())
        );
        assert!(value["ttls"]["inner"].get("mschapv2").is_some());
    }
}
