//! Defines the configuration of a fabric
//!
//! Configurations are plain serde types; loading them from files or the
//! command line is left to the embedding application

use std::{str::FromStr, sync::Arc};

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use crate::{
    algebra::{Modulus, ModulusKind},
    error::MpcError,
    fabric::{EvaluationStrategy, MacCheckPolicy, DEFAULT_MAX_BATCH_SIZE},
    network::PartyId,
};

/// The modulus a computation runs over
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ModulusConfig {
    /// A prime field, given as a decimal string
    Prime {
        /// The prime, in decimal
        value: String,
    },
    /// The ring of integers modulo `2^bits`
    PowerOfTwo {
        /// The width of the ring
        bits: u32,
    },
}

impl ModulusConfig {
    /// Validate the configuration and build the modulus
    pub fn build(&self) -> Result<Arc<Modulus>, MpcError> {
        let modulus = match self {
            ModulusConfig::Prime { value } => {
                let value = BigUint::from_str(value).map_err(|e| {
                    MpcError::ConfigurationError(format!("invalid prime {value:?}: {e}"))
                })?;
                Modulus::prime(value)?
            },
            ModulusConfig::PowerOfTwo { bits } => Modulus::power_of_two(*bits)?,
        };

        Ok(Arc::new(modulus))
    }
}

impl From<&Modulus> for ModulusConfig {
    fn from(modulus: &Modulus) -> Self {
        match modulus.kind() {
            ModulusKind::Prime => ModulusConfig::Prime { value: modulus.value().to_string() },
            ModulusKind::PowerOfTwo(bits) => ModulusConfig::PowerOfTwo { bits },
        }
    }
}

/// How the fabric evaluates a computation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// How the protocols of a batch are scheduled
    pub strategy: EvaluationStrategy,
    /// The maximum number of protocols in a batch
    pub max_batch_size: usize,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self { strategy: EvaluationStrategy::default(), max_batch_size: DEFAULT_MAX_BATCH_SIZE }
    }
}

/// The configuration of one party's fabric
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FabricConfig {
    /// The local party, numbered from 1
    pub party_id: PartyId,
    /// The number of parties
    pub num_parties: usize,
    /// The modulus the computation runs over
    pub modulus: ModulusConfig,
    /// How computations are evaluated
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    /// When opened values are authenticated
    #[serde(default)]
    pub mac_check: MacCheckPolicy,
}

impl FabricConfig {
    /// A configuration with the default evaluation and MAC check settings
    pub fn new(party_id: PartyId, num_parties: usize, modulus: &Modulus) -> Self {
        Self {
            party_id,
            num_parties,
            modulus: modulus.into(),
            evaluation: EvaluationConfig::default(),
            mac_check: MacCheckPolicy::default(),
        }
    }

    /// Parse and validate a configuration from JSON
    pub fn from_json(json: &str) -> Result<Self, MpcError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| MpcError::ConfigurationError(format!("malformed config: {e}")))?;
        config.validate()?;

        Ok(config)
    }

    /// Check the configuration for consistency
    pub fn validate(&self) -> Result<(), MpcError> {
        if self.num_parties < 2 {
            return Err(MpcError::ConfigurationError(format!(
                "a computation needs at least 2 parties, got {}",
                self.num_parties
            )));
        }

        if self.party_id == 0 || self.party_id as usize > self.num_parties {
            return Err(MpcError::ConfigurationError(format!(
                "party id {} outside of 1..={}",
                self.party_id, self.num_parties
            )));
        }

        if self.evaluation.max_batch_size == 0 {
            return Err(MpcError::ConfigurationError("max batch size must be non-zero".into()));
        }

        self.modulus.build().map(|_| ())
    }
}
