//! Lowered IR carried by compile instances
//!
//! A deliberately small function-level IR: typed parameters, a straight-line
//! body of operator nodes, and outputs. Its canonical JSON form is the graph
//! text that fingerprints are built from.

use crate::error::{ClientError, ClientResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_VAR_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a parameter variable
///
/// Ids are unique per process and never part of the canonical text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VarId(u64);

impl VarId {
    fn fresh() -> Self {
        Self(NEXT_VAR_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Tensor element type and shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorType {
    pub dtype: String,
    pub shape: Vec<i64>,
}

impl TensorType {
    pub fn new(dtype: impl Into<String>, shape: impl Into<Vec<i64>>) -> Self {
        Self {
            dtype: dtype.into(),
            shape: shape.into(),
        }
    }
}

/// Function parameter
#[derive(Debug, Clone)]
pub struct Var {
    pub id: VarId,
    pub name: String,
    pub ty: TensorType,
}

/// Value consumed by a node or returned by a function
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operand {
    /// Parameter by position
    Param(usize),
    /// Result of an earlier node by position
    Node(usize),
    /// Scalar literal
    #[serde(with = "scalar")]
    Scalar(f64),
}

/// Lossless scalar encoding
///
/// JSON has no non-finite numbers; those are written as their bit pattern
/// (`"f64:7ff0000000000000"`) so infinities and NaN payloads stay distinct.
mod scalar {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    const PREFIX: &str = "f64:";

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else {
            serializer.serialize_str(&format!("{PREFIX}{:016x}", value.to_bits()))
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Number(f64),
            Bits(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Number(value) => Ok(value),
            Repr::Bits(text) => text
                .strip_prefix(PREFIX)
                .and_then(|bits| u64::from_str_radix(bits, 16).ok())
                .map(f64::from_bits)
                .ok_or_else(|| D::Error::custom(format!("invalid scalar literal {text:?}"))),
        }
    }
}

/// Operator application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub op: String,
    pub operands: Vec<Operand>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: BTreeMap<String, serde_json::Value>,
}

/// A lowered function
#[derive(Debug, Clone, Default)]
pub struct Function {
    pub params: Vec<Var>,
    pub body: Vec<Node>,
    pub outputs: Vec<Operand>,
}

impl Function {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a parameter, returning its identity
    pub fn param(&mut self, name: impl Into<String>, ty: TensorType) -> VarId {
        let id = VarId::fresh();
        self.params.push(Var {
            id,
            name: name.into(),
            ty,
        });
        id
    }

    /// Operand referring to the parameter at `index`
    pub fn param_operand(&self, index: usize) -> Operand {
        Operand::Param(index)
    }

    /// Append a node and return its result operand
    pub fn push(&mut self, op: impl Into<String>, operands: Vec<Operand>) -> Operand {
        self.push_with_attrs(op, operands, BTreeMap::new())
    }

    pub fn push_with_attrs(
        &mut self,
        op: impl Into<String>,
        operands: Vec<Operand>,
        attrs: BTreeMap<String, serde_json::Value>,
    ) -> Operand {
        self.body.push(Node {
            op: op.into(),
            operands,
            attrs,
        });
        Operand::Node(self.body.len() - 1)
    }

    pub fn output(&mut self, operand: Operand) {
        self.outputs.push(operand);
    }

    /// Check that every operand refers to a declared parameter or an
    /// earlier node
    pub fn validate(&self) -> ClientResult<()> {
        let check = |operand: &Operand, nodes_before: usize| match *operand {
            Operand::Param(i) if i >= self.params.len() => Err(ClientError::MalformedInstance(
                format!("operand refers to parameter {i} of {}", self.params.len()),
            )),
            Operand::Node(i) if i >= nodes_before => Err(ClientError::MalformedInstance(
                format!("operand refers to node {i} before it is defined"),
            )),
            _ => Ok(()),
        };

        for (index, node) in self.body.iter().enumerate() {
            for operand in &node.operands {
                check(operand, index)?;
            }
        }
        for operand in &self.outputs {
            check(operand, self.body.len())?;
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct CanonicalParam<'a> {
    name: &'a str,
    ty: &'a TensorType,
}

#[derive(Serialize)]
struct CanonicalFunction<'a> {
    params: Vec<CanonicalParam<'a>>,
    body: &'a [Node],
    outputs: &'a [Operand],
}

/// Top-level IR expression handed over by the lowering pass
#[derive(Debug, Clone)]
pub enum Expr {
    /// A lowered function, the only form that can be compiled
    Function(Function),
    /// Reference to a global that has not been lowered yet
    Global(String),
}

impl Expr {
    pub fn as_function(&self) -> ClientResult<&Function> {
        match self {
            Self::Function(func) => Ok(func),
            Self::Global(name) => Err(ClientError::MalformedInstance(format!(
                "expected a lowered function, found global reference @{name}"
            ))),
        }
    }

    /// Canonical JSON text of the function
    ///
    /// Deterministic for structurally equal functions: variable identities
    /// are omitted and attribute maps are ordered.
    pub fn canonical_json(&self) -> ClientResult<String> {
        let func = self.as_function()?;
        func.validate()?;
        let canonical = CanonicalFunction {
            params: func
                .params
                .iter()
                .map(|p| CanonicalParam {
                    name: &p.name,
                    ty: &p.ty,
                })
                .collect(),
            body: &func.body,
            outputs: &func.outputs,
        };
        Ok(serde_json::to_string(&canonical)?)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Function(func) => write!(
                f,
                "fn({} params, {} nodes, {} outputs)",
                func.params.len(),
                func.body.len(),
                func.outputs.len()
            ),
            Self::Global(name) => write!(f, "@{name}"),
        }
    }
}
