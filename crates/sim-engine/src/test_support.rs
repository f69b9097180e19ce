//! Path: crates/sim-engine/src/test_support.rs
//! An in-crate test-double `ContractHost`, gated behind the `test-util`
//! feature so downstream crates (sim-consensus, sim-rpc, sim-node) can reuse
//! it as a dev-dependency instead of hand-rolling their own fixture runtime.
//! Implements a handful of trivial contract classes sufficient to exercise
//! deploy/call/snapshot/cross-contract orchestration without a real contract
//! language.

use std::collections::BTreeMap;

use sim_types::{CalldataValue, ContractSchema, MethodSchema, Param, ParamList};

use crate::error::HostError;
use crate::host::{ContractHost, HostServices, NondetRequest, NondetResponse};

/// The classes this test double understands, selected by the raw bytes of
/// the "code" passed to `deploy` (interpreted as a UTF-8 class name, trimmed).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TestClass {
    /// `increment()`, `get()` — persists its count on the instance itself.
    Counter,
    /// `echo(value)` returns `value` unchanged.
    Echo,
    /// `deploy_child(code, calldata)` issues a `DeployContract` nondet call.
    Deployer,
    /// `call_child(address, calldata)` issues a `CallContract` nondet call.
    Caller,
    /// `post_child(address, calldata)` issues a `PostMessage` nondet call.
    Poster,
    /// `fail(message)` always rolls back with `message`.
    Reverter,
    /// `roll()` issues a `RunNondet` whose validator-closure always returns
    /// `false` — every validator disagrees, regardless of vote count.
    Disagreer,
}

#[derive(Clone, Debug)]
pub struct TestInstance {
    pub class: TestClass,
    pub counter: i64,
}

/// A `ContractHost` with no external dependencies, for engine- and
/// consensus-level tests.
#[derive(Clone, Debug, Default)]
pub struct TestHost;

fn param(name: &str, type_name: &str) -> Param {
    Param {
        name: name.to_string(),
        type_name: type_name.to_string(),
    }
}

fn method(positional: Vec<Param>, return_type: &str, readonly: bool) -> MethodSchema {
    MethodSchema {
        positional,
        named: Vec::new(),
        return_type: return_type.to_string(),
        readonly,
    }
}

impl ContractHost for TestHost {
    type Class = TestClass;
    type Instance = TestInstance;

    fn load_class(&self, _content_hash: [u8; 32], bytes: &[u8]) -> Result<Self::Class, HostError> {
        let name = std::str::from_utf8(bytes).unwrap_or("").trim();
        match name {
            "counter" => Ok(TestClass::Counter),
            "echo" => Ok(TestClass::Echo),
            "deployer" => Ok(TestClass::Deployer),
            "caller" => Ok(TestClass::Caller),
            "poster" => Ok(TestClass::Poster),
            "reverter" => Ok(TestClass::Reverter),
            "disagreer" => Ok(TestClass::Disagreer),
            other => Err(HostError::Exception(format!("unknown test contract class {other:?}"))),
        }
    }

    fn schema_of(&self, class: &Self::Class) -> ContractSchema {
        let mut methods = BTreeMap::new();
        match class {
            TestClass::Counter => {
                methods.insert("increment".to_string(), method(vec![], "int", false));
                methods.insert("get".to_string(), method(vec![], "int", true));
            }
            TestClass::Echo => {
                methods.insert(
                    "echo".to_string(),
                    method(vec![param("value", "any")], "any", true),
                );
            }
            TestClass::Deployer => {
                methods.insert(
                    "deploy_child".to_string(),
                    method(vec![param("code", "bytes"), param("calldata", "bytes")], "address", false),
                );
            }
            TestClass::Caller => {
                methods.insert(
                    "call_child".to_string(),
                    method(
                        vec![param("address", "address"), param("calldata", "bytes")],
                        "bytes",
                        false,
                    ),
                );
            }
            TestClass::Poster => {
                methods.insert(
                    "post_child".to_string(),
                    method(
                        vec![param("address", "address"), param("calldata", "bytes")],
                        "null",
                        false,
                    ),
                );
            }
            TestClass::Reverter => {
                methods.insert(
                    "fail".to_string(),
                    method(vec![param("message", "str")], "null", false),
                );
            }
            TestClass::Disagreer => {
                methods.insert("roll".to_string(), method(vec![], "int", false));
            }
        }
        ContractSchema {
            constructor: ParamList {
                positional: vec![param("start", "int")],
                named: Vec::new(),
            },
            methods,
        }
    }

    fn construct(
        &self,
        class: &Self::Class,
        positional: &[CalldataValue],
        _named: &BTreeMap<String, CalldataValue>,
        _services: &mut dyn HostServices,
    ) -> Result<Self::Instance, HostError> {
        let start = match positional.first() {
            Some(CalldataValue::Int(n)) => *n as i64,
            _ => 0,
        };
        Ok(TestInstance {
            class: *class,
            counter: start,
        })
    }

    fn invoke(
        &self,
        instance: &mut Self::Instance,
        method: &str,
        positional: &[CalldataValue],
        _named: &BTreeMap<String, CalldataValue>,
        services: &mut dyn HostServices,
    ) -> Result<CalldataValue, HostError> {
        match (instance.class, method) {
            (TestClass::Counter, "increment") => {
                instance.counter += 1;
                Ok(CalldataValue::Int(instance.counter as i128))
            }
            (TestClass::Counter, "get") => Ok(CalldataValue::Int(instance.counter as i128)),
            (TestClass::Echo, "echo") => Ok(positional.first().cloned().unwrap_or(CalldataValue::Null)),
            (TestClass::Deployer, "deploy_child") => {
                let (Some(CalldataValue::Bytes(code)), Some(CalldataValue::Bytes(calldata))) =
                    (positional.first(), positional.get(1))
                else {
                    return Err(HostError::Exception("deploy_child requires (code: bytes, calldata: bytes)".into()));
                };
                match services.nondet_call(NondetRequest::DeployContract {
                    code: code.clone(),
                    calldata: calldata.clone(),
                }) {
                    NondetResponse::Deployed { address } => Ok(CalldataValue::Address(address)),
                    NondetResponse::Failed(msg) => Err(HostError::Exception(msg)),
                    _ => Err(HostError::Exception("unexpected nondet response for deploy".into())),
                }
            }
            (TestClass::Caller, "call_child") => {
                let (Some(CalldataValue::Address(address)), Some(CalldataValue::Bytes(calldata))) =
                    (positional.first(), positional.get(1))
                else {
                    return Err(HostError::Exception("call_child requires (address, calldata: bytes)".into()));
                };
                match services.nondet_call(NondetRequest::CallContract {
                    address: *address,
                    calldata: calldata.clone(),
                }) {
                    NondetResponse::CallResult(bytes) => Ok(CalldataValue::Bytes(bytes)),
                    _ => Err(HostError::Exception("unexpected nondet response for call".into())),
                }
            }
            (TestClass::Poster, "post_child") => {
                let (Some(CalldataValue::Address(address)), Some(CalldataValue::Bytes(calldata))) =
                    (positional.first(), positional.get(1))
                else {
                    return Err(HostError::Exception("post_child requires (address, calldata: bytes)".into()));
                };
                match services.nondet_call(NondetRequest::PostMessage {
                    address: *address,
                    calldata: calldata.clone(),
                }) {
                    NondetResponse::Posted => Ok(CalldataValue::Null),
                    _ => Err(HostError::Exception("unexpected nondet response for post".into())),
                }
            }
            (TestClass::Disagreer, "roll") => {
                match services.nondet_call(NondetRequest::RunNondet {
                    result: CalldataValue::Int(1),
                    validate: Box::new(|_| false),
                }) {
                    NondetResponse::Value(v) => Ok(v),
                    _ => Err(HostError::Exception("unexpected nondet response for roll".into())),
                }
            }
            (TestClass::Reverter, "fail") => {
                let message = positional
                    .first()
                    .and_then(CalldataValue::as_str)
                    .unwrap_or("rolled back")
                    .to_string();
                Err(HostError::Rollback(message))
            }
            (_, other) => Err(HostError::UnknownMethod(other.to_string())),
        }
    }
}
