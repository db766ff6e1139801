//! Compile instances and the computation capability seen by the cache

use crate::error::ClientResult;
use crate::ir::{Expr, VarId};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// What the cache layer needs from an unlowered computation
///
/// Backends implement this for their own graph types so the fingerprinter
/// never has to know about them.
pub trait Computation: Send + Sync + fmt::Debug {
    /// Canonical serialized form of the graph
    ///
    /// Fails with `MalformedInstance` when the graph is not a lowered
    /// function.
    fn canonical_text(&self) -> ClientResult<String>;

    /// Number of declared parameters
    fn param_count(&self) -> usize;

    /// Whether the parameter at `index` holds model state
    fn is_model_state(&self, index: usize) -> bool;

    /// Parameter position to output position aliasing
    fn alias(&self) -> &BTreeMap<usize, usize>;
}

/// Lowered IR plus its model-state and alias metadata
#[derive(Debug, Clone)]
pub struct LoweredComputation {
    expr: Expr,
    model_states: HashSet<VarId>,
    alias: BTreeMap<usize, usize>,
}

impl LoweredComputation {
    pub fn new(expr: Expr) -> Self {
        Self {
            expr,
            model_states: HashSet::new(),
            alias: BTreeMap::new(),
        }
    }

    /// Flag a parameter as model state
    pub fn with_model_state(mut self, var: VarId) -> Self {
        self.model_states.insert(var);
        self
    }

    /// Declare that output `output` overwrites parameter `param`
    pub fn with_alias(mut self, param: usize, output: usize) -> Self {
        self.alias.insert(param, output);
        self
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }
}

impl Computation for LoweredComputation {
    fn canonical_text(&self) -> ClientResult<String> {
        self.expr.canonical_json()
    }

    fn param_count(&self) -> usize {
        match &self.expr {
            Expr::Function(func) => func.params.len(),
            Expr::Global(_) => 0,
        }
    }

    fn is_model_state(&self, index: usize) -> bool {
        match &self.expr {
            Expr::Function(func) => func
                .params
                .get(index)
                .is_some_and(|var| self.model_states.contains(&var.id)),
            Expr::Global(_) => false,
        }
    }

    fn alias(&self) -> &BTreeMap<usize, usize> {
        &self.alias
    }
}

/// One computation submitted for compilation
#[derive(Debug, Clone)]
pub struct CompileInstance {
    pub computation: Arc<dyn Computation>,
    /// Device the computation is compiled for
    pub compilation_device: String,
    /// Devices the compiled artifact will run on
    pub devices: Vec<String>,
}

impl CompileInstance {
    pub fn new(computation: Arc<dyn Computation>, compilation_device: impl Into<String>) -> Self {
        let compilation_device = compilation_device.into();
        Self {
            computation,
            devices: vec![compilation_device.clone()],
            compilation_device,
        }
    }

    /// Convenience constructor for an in-crate lowered computation
    pub fn lowered(computation: LoweredComputation, compilation_device: impl Into<String>) -> Self {
        Self::new(Arc::new(computation), compilation_device)
    }
}
