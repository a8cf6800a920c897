//! Operator registry: identity, key custody, block signing and
//! verification, quorum tracking.
//!
//! One registry instance holds the full operator table for a node,
//! including the node's own signing identity. Private key material lives
//! only here: it never appears in exports, records, or any public API;
//! the only way to use it is through [`OperatorRegistry::sign`] and
//! [`OperatorRegistry::sign_block`].
//!
//! The registry is single-writer by design; co-locate it with the chain
//! manager (or guard both with one lock) so registration never races
//! block signing.

use std::collections::HashMap;

use ed25519_dalek::SigningKey;
use serde::{Deserialize, Serialize};

use crate::consensus::error::{BlockVerifyError, RegistryError};
use crate::crypto;
use crate::now_ms;
use crate::types::{Hash256, Header, OperatorKey, SECRET_KEY_LEN, Signature};

/// Lifecycle event sink.
pub mod events;

pub use events::RegistryObserver;

/// Registry configuration.
#[derive(Clone, Copy, Debug)]
pub struct RegistryConfig {
    /// Quorum threshold: the registry reports quorum once this many
    /// operators (self included) are registered.
    pub min_operators: usize,
    /// Hard cap on the operator table.
    pub max_operators: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            min_operators: 1,
            max_operators: 32,
        }
    }
}

/// Public record of a registered operator.
#[derive(Clone, Debug)]
pub struct OperatorRecord {
    /// Operator identity.
    pub public_key: OperatorKey,
    /// Human-readable name.
    pub name: String,
    /// Relative weight, at least 1. Reserved for weighted quorum rules.
    pub weight: u32,
    /// Whether this record is the node's own identity.
    pub is_self: bool,
    /// Registration time in milliseconds.
    pub registered_at: u64,
    /// Number of blocks this operator has signed here.
    pub blocks_proposed: u64,
    /// Time of the most recent signed block, if any.
    pub last_block_at: Option<u64>,
}

/// Registry activity counters.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RegistryStats {
    pub operators_registered: u64,
    pub operators_removed: u64,
    pub blocks_validated: u64,
    pub signatures_verified: u64,
    pub signatures_failed: u64,
}

/// Inputs for [`OperatorRegistry::initialize_self`].
///
/// Supplying a private key implies the public half; supplying only a
/// public key produces a verify-only identity that cannot sign.
/// Supplying neither generates a fresh keypair.
#[derive(Clone, Default)]
pub struct SelfOperatorSpec {
    pub public_key: Option<OperatorKey>,
    pub private_key: Option<[u8; SECRET_KEY_LEN]>,
    pub name: Option<String>,
    pub weight: Option<u32>,
}

/// Inputs for [`OperatorRegistry::register_operator`].
#[derive(Clone, Default)]
pub struct OperatorSpec {
    pub public_key: Option<OperatorKey>,
    pub name: Option<String>,
    pub weight: Option<u32>,
}

/// Whether a registration created or refreshed an entry.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RegisterOutcome {
    Added,
    Updated,
}

/// Header plus authentication material produced by `sign_block`.
#[derive(Clone, Debug)]
pub struct SignedHeader {
    /// Header with `operator` set to the self key's hex form.
    pub header: Header,
    /// Self operator's name, carried alongside blocks for display.
    pub operator_name: Option<String>,
    /// Detached signature over the header's signing message.
    pub signature: Signature,
}

/// Exportable operator entry. Never carries key material beyond the
/// public key.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OperatorExport {
    pub public_key: String,
    pub name: String,
    pub weight: u32,
    pub registered_at: u64,
}

/// Result of a bulk operator import.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct OperatorImportOutcome {
    pub imported: usize,
    pub skipped: usize,
}

/// Operator table plus the node's signing identity.
pub struct OperatorRegistry {
    config: RegistryConfig,
    operators: HashMap<OperatorKey, OperatorRecord>,
    self_key: Option<OperatorKey>,
    signing_key: Option<SigningKey>,
    observer: Option<Box<dyn RegistryObserver + Send>>,
    stats: RegistryStats,
}

impl OperatorRegistry {
    /// Creates an empty registry.
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            operators: HashMap::new(),
            self_key: None,
            signing_key: None,
            observer: None,
            stats: RegistryStats::default(),
        }
    }

    /// Attaches the single lifecycle observer.
    pub fn set_observer(&mut self, observer: Box<dyn RegistryObserver + Send>) {
        self.observer = Some(observer);
    }

    /// Establishes the node's own operator identity.
    ///
    /// Idempotent only on identical inputs: calling again with the same
    /// key, name, and weight returns the existing record; any
    /// divergence fails with [`RegistryError::AlreadyInitialized`].
    pub fn initialize_self(
        &mut self,
        spec: SelfOperatorSpec,
    ) -> Result<OperatorRecord, RegistryError> {
        let weight = spec.weight.unwrap_or(1).max(1);
        let name = spec.name.clone().unwrap_or_else(|| "self".to_string());

        if let Some(existing_key) = self.self_key {
            let requested = match (&spec.public_key, &spec.private_key) {
                (_, Some(sk)) => Some(crypto::public_key_of(sk)),
                (Some(pk), None) => Some(*pk),
                (None, None) => None,
            };
            let existing = self
                .operators
                .get(&existing_key)
                .expect("self record must exist while self_key is set");
            if requested == Some(existing_key)
                && name == existing.name
                && weight == existing.weight
            {
                return Ok(existing.clone());
            }
            return Err(RegistryError::AlreadyInitialized);
        }

        let (public_key, signing_key) = match (spec.public_key, spec.private_key) {
            (maybe_pk, Some(sk)) => {
                let derived = crypto::public_key_of(&sk);
                if let Some(pk) = maybe_pk {
                    if pk != derived {
                        return Err(RegistryError::KeyMismatch);
                    }
                }
                (derived, Some(SigningKey::from_bytes(&sk)))
            }
            (Some(pk), None) => (pk, None),
            (None, None) => {
                let (pk, sk) = crypto::keygen_ed25519();
                (pk, Some(SigningKey::from_bytes(&sk)))
            }
        };

        if self.operators.len() >= self.config.max_operators
            && !self.operators.contains_key(&public_key)
        {
            return Err(RegistryError::CapacityExceeded {
                max: self.config.max_operators,
            });
        }

        let record = OperatorRecord {
            public_key,
            name,
            weight,
            is_self: true,
            registered_at: now_ms(),
            blocks_proposed: 0,
            last_block_at: None,
        };
        self.operators.insert(public_key, record.clone());
        self.self_key = Some(public_key);
        self.signing_key = signing_key;
        self.stats.operators_registered += 1;

        if let Some(observer) = &self.observer {
            observer.on_self_initialized(&record);
        }
        Ok(record)
    }

    /// Signs arbitrary bytes with the self identity.
    pub fn sign(&self, msg: &[u8]) -> Result<Signature, RegistryError> {
        let key = self.signing_key.as_ref().ok_or(RegistryError::NotInitialized)?;
        Ok(crypto::sign_ed25519(&key.to_bytes(), msg))
    }

    /// Registers a peer operator or refreshes an existing entry.
    ///
    /// Capacity only applies to new keys; updating a registered operator
    /// always succeeds.
    pub fn register_operator(
        &mut self,
        spec: OperatorSpec,
    ) -> Result<RegisterOutcome, RegistryError> {
        let public_key = spec.public_key.ok_or(RegistryError::MissingKey)?;
        let weight = spec.weight.unwrap_or(1).max(1);

        if let Some(existing) = self.operators.get_mut(&public_key) {
            if let Some(name) = spec.name {
                existing.name = name;
            }
            existing.weight = weight;
            let updated = existing.clone();
            if let Some(observer) = &self.observer {
                observer.on_operator_registered(&updated);
            }
            return Ok(RegisterOutcome::Updated);
        }

        if self.operators.len() >= self.config.max_operators {
            return Err(RegistryError::CapacityExceeded {
                max: self.config.max_operators,
            });
        }

        let record = OperatorRecord {
            public_key,
            name: spec
                .name
                .unwrap_or_else(|| format!("operator-{}", &public_key.to_hex()[..8])),
            weight,
            is_self: false,
            registered_at: now_ms(),
            blocks_proposed: 0,
            last_block_at: None,
        };
        self.operators.insert(public_key, record.clone());
        self.stats.operators_registered += 1;

        if let Some(observer) = &self.observer {
            observer.on_operator_registered(&record);
        }
        Ok(RegisterOutcome::Added)
    }

    /// Removes an operator. Returns `false` for unknown keys; the self
    /// operator can never be removed.
    pub fn remove_operator(&mut self, public_key: &OperatorKey) -> Result<bool, RegistryError> {
        if Some(*public_key) == self.self_key {
            return Err(RegistryError::CannotRemoveSelf);
        }
        let removed = self.operators.remove(public_key).is_some();
        if removed {
            self.stats.operators_removed += 1;
            if let Some(observer) = &self.observer {
                observer.on_operator_removed(public_key);
            }
        }
        Ok(removed)
    }

    /// Verifies a detached signature attributed to a registered
    /// operator. Returns `false` for unregistered keys and for any
    /// malformed input; never panics.
    pub fn verify_signature(
        &mut self,
        msg: &[u8],
        signature: &Signature,
        public_key: &OperatorKey,
    ) -> bool {
        if !self.operators.contains_key(public_key) {
            self.stats.signatures_failed += 1;
            return false;
        }
        let ok = crypto::verify_ed25519(public_key.as_bytes(), msg, signature.as_bytes());
        if ok {
            self.stats.signatures_verified += 1;
        } else {
            self.stats.signatures_failed += 1;
        }
        ok
    }

    /// Builds and signs a block header from its consensus fields.
    ///
    /// The returned header carries the self key's hex form as
    /// `operator`; the signature covers the canonical payload with that
    /// key appended. Also bumps the self record's proposal counters.
    pub fn sign_block(
        &mut self,
        slot: u64,
        prev_hash: Hash256,
        judgments_root: Hash256,
        timestamp: u64,
    ) -> Result<SignedHeader, RegistryError> {
        let self_key = self.self_key.ok_or(RegistryError::NotInitialized)?;
        let signing_key = self.signing_key.as_ref().ok_or(RegistryError::NotInitialized)?;

        let header = Header {
            slot,
            prev_hash,
            judgments_root,
            timestamp,
            operator: self_key.to_hex(),
        };
        let message = header.signing_message(&self_key);
        let signature = crypto::sign_ed25519(&signing_key.to_bytes(), &message);

        let operator_name = self.operators.get_mut(&self_key).map(|record| {
            record.blocks_proposed += 1;
            record.last_block_at = Some(now_ms());
            record.name.clone()
        });

        Ok(SignedHeader {
            header,
            operator_name,
            signature,
        })
    }

    /// Verifies a block's operator identity and signature.
    pub fn verify_block(&mut self, block: &crate::types::Block) -> Result<(), BlockVerifyError> {
        self.stats.blocks_validated += 1;

        if block.header.operator.is_empty() {
            return Err(BlockVerifyError::NoOperator);
        }
        let Some(signature) = &block.signature else {
            return Err(BlockVerifyError::NoSignature);
        };
        let Some(key) = OperatorKey::from_hex(&block.header.operator) else {
            return Err(BlockVerifyError::UnknownOperator);
        };
        if !self.operators.contains_key(&key) {
            return Err(BlockVerifyError::UnknownOperator);
        }

        let message = block.header.signing_message(&key);
        let ok = crypto::verify_ed25519(key.as_bytes(), &message, signature.as_bytes());
        if ok {
            self.stats.signatures_verified += 1;
            Ok(())
        } else {
            self.stats.signatures_failed += 1;
            Err(BlockVerifyError::BadSignature)
        }
    }

    /// True once at least `min_operators` operators are registered.
    pub fn has_quorum(&self) -> bool {
        self.operators.len() >= self.config.min_operators
    }

    /// Number of registered operators, self included.
    pub fn operator_count(&self) -> usize {
        self.operators.len()
    }

    /// The node's own key, once initialized.
    pub fn self_key(&self) -> Option<OperatorKey> {
        self.self_key
    }

    /// Looks up a registered operator.
    pub fn operator(&self, public_key: &OperatorKey) -> Option<&OperatorRecord> {
        self.operators.get(public_key)
    }

    /// Snapshot of the activity counters.
    pub fn stats(&self) -> RegistryStats {
        self.stats
    }

    /// Exports the operator table. Private keys are never part of the
    /// export, by construction.
    pub fn export_operators(&self) -> Vec<OperatorExport> {
        let mut out: Vec<OperatorExport> = self
            .operators
            .values()
            .map(|record| OperatorExport {
                public_key: record.public_key.to_hex(),
                name: record.name.clone(),
                weight: record.weight,
                registered_at: record.registered_at,
            })
            .collect();
        out.sort_by(|a, b| a.public_key.cmp(&b.public_key));
        out
    }

    /// Imports operator entries, skipping malformed keys, already
    /// registered keys, and anything past capacity.
    pub fn import_operators(&mut self, entries: &[OperatorExport]) -> OperatorImportOutcome {
        let mut outcome = OperatorImportOutcome::default();
        for entry in entries {
            let Some(public_key) = OperatorKey::from_hex(&entry.public_key) else {
                outcome.skipped += 1;
                continue;
            };
            if self.operators.contains_key(&public_key)
                || self.operators.len() >= self.config.max_operators
            {
                outcome.skipped += 1;
                continue;
            }

            let record = OperatorRecord {
                public_key,
                name: entry.name.clone(),
                weight: entry.weight.max(1),
                is_self: false,
                registered_at: entry.registered_at,
                blocks_proposed: 0,
                last_block_at: None,
            };
            self.operators.insert(public_key, record.clone());
            self.stats.operators_registered += 1;
            if let Some(observer) = &self.observer {
                observer.on_operator_registered(&record);
            }
            outcome.imported += 1;
        }
        outcome
    }
}

impl Default for OperatorRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn initialized_registry() -> OperatorRegistry {
        let mut registry = OperatorRegistry::default();
        registry
            .initialize_self(SelfOperatorSpec {
                name: Some("node-a".to_string()),
                ..SelfOperatorSpec::default()
            })
            .expect("self init should succeed");
        registry
    }

    fn peer_spec(key: OperatorKey, name: &str) -> OperatorSpec {
        OperatorSpec {
            public_key: Some(key),
            name: Some(name.to_string()),
            weight: Some(1),
        }
    }

    #[test]
    fn initialize_self_registers_and_signs() {
        let registry = initialized_registry();
        let self_key = registry.self_key().expect("self key set");
        let record = registry.operator(&self_key).expect("self record");
        assert!(record.is_self);
        assert_eq!(record.name, "node-a");

        let sig = registry.sign(b"payload").expect("self can sign");
        assert!(crypto::verify_ed25519(self_key.as_bytes(), b"payload", sig.as_bytes()));
    }

    #[test]
    fn initialize_self_is_idempotent_only_on_identical_inputs() {
        let (pk, sk) = crypto::keygen_ed25519();
        let mut registry = OperatorRegistry::default();
        let spec = SelfOperatorSpec {
            public_key: Some(pk),
            private_key: Some(sk),
            name: Some("node-a".to_string()),
            weight: Some(2),
        };
        registry.initialize_self(spec.clone()).expect("first init");

        // Same inputs: no-op success.
        let record = registry.initialize_self(spec).expect("repeat with identical inputs");
        assert_eq!(record.public_key, pk);

        // Different weight: refused.
        let err = registry
            .initialize_self(SelfOperatorSpec {
                public_key: Some(pk),
                private_key: Some(sk),
                name: Some("node-a".to_string()),
                weight: Some(3),
            })
            .unwrap_err();
        assert_eq!(err, RegistryError::AlreadyInitialized);
    }

    #[test]
    fn mismatched_keypair_is_refused() {
        let (_, sk) = crypto::keygen_ed25519();
        let (other_pk, _) = crypto::keygen_ed25519();
        let mut registry = OperatorRegistry::default();
        let err = registry
            .initialize_self(SelfOperatorSpec {
                public_key: Some(other_pk),
                private_key: Some(sk),
                ..SelfOperatorSpec::default()
            })
            .unwrap_err();
        assert_eq!(err, RegistryError::KeyMismatch);
    }

    #[test]
    fn sign_without_identity_fails() {
        let registry = OperatorRegistry::default();
        assert_eq!(registry.sign(b"x").unwrap_err(), RegistryError::NotInitialized);
    }

    #[test]
    fn register_requires_a_key() {
        let mut registry = initialized_registry();
        let err = registry
            .register_operator(OperatorSpec::default())
            .unwrap_err();
        assert_eq!(err, RegistryError::MissingKey);
    }

    #[test]
    fn capacity_only_applies_to_new_keys() {
        let mut registry = OperatorRegistry::new(RegistryConfig {
            min_operators: 1,
            max_operators: 2,
        });
        registry
            .initialize_self(SelfOperatorSpec::default())
            .expect("self init");

        let (peer, _) = crypto::keygen_ed25519();
        assert_eq!(
            registry.register_operator(peer_spec(peer, "peer-1")).expect("fits"),
            RegisterOutcome::Added
        );

        // Table is now full; a new key is refused...
        let (late, _) = crypto::keygen_ed25519();
        let err = registry.register_operator(peer_spec(late, "late")).unwrap_err();
        assert_eq!(err, RegistryError::CapacityExceeded { max: 2 });

        // ...but updating a registered key still succeeds.
        assert_eq!(
            registry
                .register_operator(peer_spec(peer, "peer-1-renamed"))
                .expect("update fits"),
            RegisterOutcome::Updated
        );
        let record = registry.operator(&peer).expect("peer record");
        assert_eq!(record.name, "peer-1-renamed");
    }

    #[test]
    fn self_cannot_be_removed_and_unknown_returns_false() {
        let mut registry = initialized_registry();
        let self_key = registry.self_key().expect("self key");

        assert_eq!(
            registry.remove_operator(&self_key).unwrap_err(),
            RegistryError::CannotRemoveSelf
        );

        let (unknown, _) = crypto::keygen_ed25519();
        assert!(!registry.remove_operator(&unknown).expect("unknown is not an error"));

        let (peer, _) = crypto::keygen_ed25519();
        registry.register_operator(peer_spec(peer, "peer")).expect("register");
        assert!(registry.remove_operator(&peer).expect("peer removal"));
        assert_eq!(registry.operator_count(), 1);
    }

    #[test]
    fn verify_signature_requires_registration() {
        let mut registry = initialized_registry();

        // A valid signature from an unregistered key is still refused.
        let (stranger_pk, stranger_sk) = crypto::keygen_ed25519();
        let sig = crypto::sign_ed25519(&stranger_sk, b"msg");
        assert!(!registry.verify_signature(b"msg", &sig, &stranger_pk));

        let self_key = registry.self_key().expect("self key");
        let own = registry.sign(b"msg").expect("sign");
        assert!(registry.verify_signature(b"msg", &own, &self_key));

        let stats = registry.stats();
        assert_eq!(stats.signatures_verified, 1);
        assert_eq!(stats.signatures_failed, 1);
    }

    #[test]
    fn sign_block_then_verify_block_roundtrips() {
        let mut registry = initialized_registry();
        let signed = registry
            .sign_block(1, Hash256::compute(b"prev"), Hash256::compute(b"root"), 1_000)
            .expect("sign block");

        let block = crate::types::Block {
            hash: signed.header.compute_hash(),
            header: signed.header,
            operator_name: signed.operator_name,
            judgments: Vec::new(),
            signature: Some(signed.signature),
        };
        assert!(registry.verify_block(&block).is_ok());

        let self_key = registry.self_key().expect("self key");
        let record = registry.operator(&self_key).expect("self record");
        assert_eq!(record.blocks_proposed, 1);
        assert!(record.last_block_at.is_some());
    }

    #[test]
    fn verify_block_reports_ordered_reasons() {
        let mut registry = initialized_registry();
        let signed = registry
            .sign_block(1, Hash256::compute(b"prev"), Hash256::compute(b"root"), 1_000)
            .expect("sign block");
        let block = crate::types::Block {
            hash: signed.header.compute_hash(),
            header: signed.header,
            operator_name: None,
            judgments: Vec::new(),
            signature: Some(signed.signature),
        };

        // No operator.
        let mut no_operator = block.clone();
        no_operator.header.operator = String::new();
        assert_eq!(
            registry.verify_block(&no_operator).unwrap_err(),
            BlockVerifyError::NoOperator
        );

        // No signature.
        let mut no_signature = block.clone();
        no_signature.signature = None;
        assert_eq!(
            registry.verify_block(&no_signature).unwrap_err(),
            BlockVerifyError::NoSignature
        );

        // Unknown operator: signed by someone we never registered.
        let (stranger_pk, stranger_sk) = crypto::keygen_ed25519();
        let mut foreign = block.clone();
        foreign.header.operator = stranger_pk.to_hex();
        let message = foreign.header.signing_message(&stranger_pk);
        foreign.signature = Some(crypto::sign_ed25519(&stranger_sk, &message));
        assert_eq!(
            registry.verify_block(&foreign).unwrap_err(),
            BlockVerifyError::UnknownOperator
        );

        // Bad signature: registered operator, corrupted bytes.
        let mut tampered = block.clone();
        let mut bytes = tampered.signature.clone().expect("sig").0;
        bytes[0] ^= 0xff;
        tampered.signature = Some(Signature(bytes));
        assert_eq!(
            registry.verify_block(&tampered).unwrap_err(),
            BlockVerifyError::BadSignature
        );
    }

    #[test]
    fn quorum_tracks_operator_count() {
        let mut registry = OperatorRegistry::new(RegistryConfig {
            min_operators: 2,
            max_operators: 8,
        });
        registry
            .initialize_self(SelfOperatorSpec::default())
            .expect("self init");
        assert!(!registry.has_quorum());

        let (peer, _) = crypto::keygen_ed25519();
        registry.register_operator(peer_spec(peer, "peer")).expect("register");
        assert!(registry.has_quorum());
    }

    #[test]
    fn export_import_roundtrip_without_private_keys() {
        let mut registry = initialized_registry();
        let (peer, _) = crypto::keygen_ed25519();
        registry.register_operator(peer_spec(peer, "peer")).expect("register");

        let exported = registry.export_operators();
        assert_eq!(exported.len(), 2);
        let as_json = serde_json::to_string(&exported).expect("serialize export");
        assert!(!as_json.contains("private"));

        // Import into a second registry: self key of the source is just
        // a peer here; the source's peer is new; re-import skips.
        let mut other = initialized_registry();
        let outcome = other.import_operators(&exported);
        assert_eq!(outcome.imported, 2);
        assert_eq!(outcome.skipped, 0);

        let again = other.import_operators(&exported);
        assert_eq!(again.imported, 0);
        assert_eq!(again.skipped, 2);
    }

    #[test]
    fn observer_sees_lifecycle_events() {
        #[derive(Default)]
        struct Recorder {
            events: Arc<Mutex<Vec<String>>>,
        }
        impl RegistryObserver for Recorder {
            fn on_self_initialized(&self, record: &OperatorRecord) {
                self.events.lock().unwrap().push(format!("self:{}", record.name));
            }
            fn on_operator_registered(&self, record: &OperatorRecord) {
                self.events.lock().unwrap().push(format!("registered:{}", record.name));
            }
            fn on_operator_removed(&self, _key: &OperatorKey) {
                self.events.lock().unwrap().push("removed".to_string());
            }
        }

        let events = Arc::new(Mutex::new(Vec::new()));
        let mut registry = OperatorRegistry::default();
        registry.set_observer(Box::new(Recorder { events: events.clone() }));

        registry
            .initialize_self(SelfOperatorSpec {
                name: Some("node-a".to_string()),
                ..SelfOperatorSpec::default()
            })
            .expect("self init");
        let (peer, _) = crypto::keygen_ed25519();
        registry.register_operator(peer_spec(peer, "peer")).expect("register");
        registry.remove_operator(&peer).expect("remove");

        let seen = events.lock().unwrap().clone();
        assert_eq!(seen, vec!["self:node-a", "registered:peer", "removed"]);
    }
}
