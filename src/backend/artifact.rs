//! Compilation payloads stored and served by the backend.
//!
//! Successful compilations become an EthPM v3 manifest; everything else is a
//! `{"status": "failed", ...}` document.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::backend::compiler::{CompileInput, CompilerOutput};

pub const MANIFEST_VERSION: &str = "ethpm/3";

/// Contract name for a source path: the file name up to its first dot.
pub fn contract_name(source_id: &str) -> String {
    let file = source_id.rsplit('/').next().unwrap_or(source_id);
    let stem = file.split('.').next().unwrap_or(file);
    if stem.is_empty() {
        "Contract".to_string()
    } else {
        stem.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub manifest: String,
    pub name: Option<String>,
    pub version: Option<String>,
    pub meta: Option<Value>,
    pub sources: BTreeMap<String, SourceEntry>,
    pub contract_types: BTreeMap<String, ContractType>,
    pub compilers: Option<Value>,
    pub deployments: Option<Value>,
    pub build_dependencies: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceEntry {
    pub content: String,
    pub urls: Vec<String>,
    pub checksum: Option<Value>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub license: Option<String>,
    pub references: Option<Value>,
    pub imports: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractType {
    pub contract_name: String,
    pub source_id: String,
    pub deployment_bytecode: Bytecode,
    pub runtime_bytecode: Bytecode,
    pub abi: Value,
    #[serde(rename = "sourcemap")]
    pub source_map: Value,
    pub method_identifiers: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bytecode {
    pub bytecode: String,
    pub link_references: Option<Value>,
    pub link_dependencies: Option<Value>,
}

impl Bytecode {
    fn unlinked(bytecode: String) -> Self {
        Self {
            bytecode,
            link_references: None,
            link_dependencies: None,
        }
    }
}

impl Artifact {
    /// Assemble the manifest for a compiled source.
    pub fn build(input: &CompileInput, output: CompilerOutput) -> Self {
        let name = contract_name(&input.source_id);

        let source = SourceEntry {
            content: input.content.clone(),
            urls: Vec::new(),
            checksum: None,
            kind: None,
            license: None,
            references: None,
            imports: None,
        };

        let contract = ContractType {
            contract_name: name.clone(),
            source_id: input.source_id.clone(),
            deployment_bytecode: Bytecode::unlinked(output.bytecode),
            runtime_bytecode: Bytecode::unlinked(output.bytecode_runtime),
            abi: output.abi,
            source_map: output.source_map,
            method_identifiers: output.method_identifiers,
        };

        Self {
            manifest: MANIFEST_VERSION.to_string(),
            name: None,
            version: None,
            meta: None,
            sources: BTreeMap::from([(input.source_id.clone(), source)]),
            contract_types: BTreeMap::from([(name, contract)]),
            compilers: None,
            deployments: None,
            build_dependencies: None,
        }
    }
}

/// Source position of a compiler diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Location {
    pub line: Option<u64>,
    pub column: Option<u64>,
}

/// Failed compilation or rejected request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub status: String,
    pub message: String,
    #[serde(flatten)]
    pub location: Option<Location>,
}

impl Failure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: "failed".to_string(),
            message: message.into(),
            location: None,
        }
    }

    /// Compiler diagnostic; `line`/`column` are always present, possibly null.
    pub fn diagnostic(message: impl Into<String>, line: Option<u64>, column: Option<u64>) -> Self {
        Self {
            location: Some(Location { line, column }),
            ..Self::new(message)
        }
    }
}

/// Data kept for a compilation id.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CompilationData {
    Artifact(Box<Artifact>),
    Failure(Failure),
}
