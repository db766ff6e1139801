//! Structural fingerprints for content-addressed compile caching
//!
//! A fingerprint combines the canonical graph text, the positions of
//! model-state parameters and the alias map. Same structure and metadata =
//! same fingerprint, regardless of which objects built the graph.

use crate::error::ClientResult;
use crate::instance::{CompileInstance, Computation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Length of the abbreviated digest used in logs and CLI output
const SHORT_DIGEST_LEN: usize = 12;

/// Cache key of one compile instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint {
    /// Canonical serialized graph
    pub graph: String,
    /// Model-state parameter positions in declaration order
    pub model_states: Vec<usize>,
    /// Parameter position to output position
    pub alias: BTreeMap<usize, usize>,
}

impl Fingerprint {
    /// Fingerprint a compile instance
    pub fn of(instance: &CompileInstance) -> ClientResult<Self> {
        Self::of_computation(instance.computation.as_ref())
    }

    /// Fingerprint a computation through its capability interface
    pub fn of_computation(computation: &dyn Computation) -> ClientResult<Self> {
        let graph = computation.canonical_text()?;

        let model_states = (0..computation.param_count())
            .filter(|&index| computation.is_model_state(index))
            .collect();

        Ok(Self {
            graph,
            model_states,
            alias: computation.alias().clone(),
        })
    }

    /// SHA256 of the fingerprint, hex encoded
    ///
    /// Each component is length-prefixed so that no two distinct
    /// fingerprints feed the hasher the same byte stream.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();

        hasher.update((self.graph.len() as u64).to_le_bytes());
        hasher.update(self.graph.as_bytes());

        hasher.update((self.model_states.len() as u64).to_le_bytes());
        for index in &self.model_states {
            hasher.update((*index as u64).to_le_bytes());
        }

        hasher.update((self.alias.len() as u64).to_le_bytes());
        for (param, output) in &self.alias {
            hasher.update((*param as u64).to_le_bytes());
            hasher.update((*output as u64).to_le_bytes());
        }

        hex::encode(hasher.finalize())
    }

    /// First 12 hex chars of the digest
    pub fn short_digest(&self) -> String {
        let mut digest = self.digest();
        digest.truncate(SHORT_DIGEST_LEN);
        digest
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} model states, {} aliases)",
            self.short_digest(),
            self.model_states.len(),
            self.alias.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use crate::instance::LoweredComputation;
    use crate::ir::{Expr, Function, Operand, TensorType, VarId};

    /// Four-parameter update step; returns the computation and param ids
    fn update_step(op: &str) -> (Function, Vec<VarId>) {
        let mut func = Function::new();
        let ids = ["x", "w", "b", "m"]
            .iter()
            .map(|name| func.param(*name, TensorType::new("float32", [16])))
            .collect();
        let prod = func.push(op, vec![Operand::Param(0), Operand::Param(1)]);
        let sum = func.push("add", vec![prod, Operand::Param(2)]);
        let momentum = func.push("add", vec![Operand::Param(3), sum]);
        func.output(sum);
        func.output(momentum);
        (func, ids)
    }

    fn lowered(op: &str, states: &[usize], alias: &[(usize, usize)]) -> LoweredComputation {
        let (func, ids) = update_step(op);
        let mut comp = LoweredComputation::new(Expr::Function(func));
        for &index in states {
            comp = comp.with_model_state(ids[index]);
        }
        for &(param, output) in alias {
            comp = comp.with_alias(param, output);
        }
        comp
    }

    fn fingerprint(comp: LoweredComputation) -> Fingerprint {
        Fingerprint::of(&CompileInstance::lowered(comp, "CPU:0")).unwrap()
    }

    #[test]
    fn structurally_equal_instances_match() {
        let a = fingerprint(lowered("mul", &[1, 3], &[(3, 1)]));
        let b = fingerprint(lowered("mul", &[1, 3], &[(3, 1)]));

        assert_eq!(a, b);
        assert_eq!(a.digest(), b.digest());
    }

    #[test]
    fn graph_difference_changes_key() {
        let a = fingerprint(lowered("mul", &[1], &[]));
        let b = fingerprint(lowered("div", &[1], &[]));

        assert_ne!(a, b);
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn model_states_follow_declaration_order() {
        let fp = fingerprint(lowered("mul", &[3, 1], &[]));
        assert_eq!(fp.model_states, vec![1, 3]);
    }

    fn scaled(factor: f64) -> Fingerprint {
        let mut func = Function::new();
        func.param("x", TensorType::new("float32", [4]));
        let out = func.push("mul", vec![Operand::Param(0), Operand::Scalar(factor)]);
        func.output(out);
        fingerprint(LoweredComputation::new(Expr::Function(func)))
    }

    #[test]
    fn non_finite_scalars_change_key() {
        let digests = [
            scaled(f64::INFINITY).digest(),
            scaled(f64::NEG_INFINITY).digest(),
            scaled(f64::NAN).digest(),
            scaled(0.0).digest(),
        ];

        for (i, a) in digests.iter().enumerate() {
            for b in &digests[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert_eq!(scaled(f64::INFINITY).digest(), digests[0]);
    }

    #[test]
    fn metadata_difference_changes_key() {
        let base = fingerprint(lowered("mul", &[1], &[]));
        let more_state = fingerprint(lowered("mul", &[1, 2], &[]));
        let aliased = fingerprint(lowered("mul", &[1], &[(3, 1)]));

        assert_ne!(base.digest(), more_state.digest());
        assert_ne!(base.digest(), aliased.digest());
        assert_ne!(more_state.digest(), aliased.digest());
    }

    #[test]
    fn alias_insertion_order_is_irrelevant() {
        let a = fingerprint(lowered("mul", &[], &[(0, 1), (3, 0)]));
        let b = fingerprint(lowered("mul", &[], &[(3, 0), (0, 1)]));
        assert_eq!(a, b);
    }

    #[test]
    fn metadata_survives_serialization() {
        let fp = fingerprint(lowered("mul", &[1, 3], &[(0, 2)]));

        let json = serde_json::to_string(&fp).unwrap();
        let restored: Fingerprint = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.model_states, vec![1, 3]);
        assert_eq!(restored.alias.get(&0), Some(&2));
        assert_eq!(restored, fp);
    }

    #[test]
    fn unlowered_computation_is_malformed() {
        let comp = LoweredComputation::new(Expr::Global("main".to_string()));
        let err = Fingerprint::of(&CompileInstance::lowered(comp, "CPU:0")).unwrap_err();
        assert!(matches!(err, ClientError::MalformedInstance(_)));
    }

    #[test]
    fn short_digest_length() {
        let fp = fingerprint(lowered("mul", &[], &[]));
        assert_eq!(fp.digest().len(), 64);
        assert_eq!(fp.short_digest().len(), 12);
        assert!(fp.digest().starts_with(&fp.short_digest()));
    }
}
