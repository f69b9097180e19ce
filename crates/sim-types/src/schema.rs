//! Path: crates/sim-types/src/schema.rs
//! Contract schema extraction result: what a deployed class's constructor
//! and externally-visible methods look like, as reflected by the contract
//! host (`ContractHost::schema_of`, `sim-engine`).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single named parameter's declared type, as the host's reflection
/// reports it (a free-form type name string — the Sim does not interpret
/// or validate these, only threads them through to the wire schema).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub type_name: String,
}

/// Parameters split into positional (pre-default) and named (post-default),
/// matching the runtime's reflection boundary at `ContractHost::schema_of`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamList {
    pub positional: Vec<Param>,
    pub named: Vec<Param>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodSchema {
    pub positional: Vec<Param>,
    pub named: Vec<Param>,
    pub return_type: String,
    pub readonly: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractSchema {
    pub constructor: ParamList,
    pub methods: BTreeMap<String, MethodSchema>,
}
