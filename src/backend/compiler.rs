//! Vyper compiler integration.
//!
//! The compiler is an external program speaking the standard JSON interface:
//! the input document goes in on stdin, the output document comes back on
//! stdout. [`Compiler`] is the seam handlers depend on, so tests can swap in
//! a fake.

use std::process::Stdio;
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::config::CompilerConfig;

/// Output formats requested from the compiler.
pub const OUTPUT_SELECTION: [&str; 5] = [
    "abi",
    "evm.bytecode.object",
    "evm.deployedBytecode.object",
    "evm.deployedBytecode.sourceMap",
    "evm.methodIdentifiers",
];

/// A single source file to compile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileInput {
    /// Path the client used for the file, e.g. `contracts/Token.vy`.
    pub source_id: String,
    pub content: String,
}

/// What a successful compilation yields.
#[derive(Debug, Clone, PartialEq)]
pub struct CompilerOutput {
    pub abi: Value,
    pub bytecode: String,
    pub bytecode_runtime: String,
    pub source_map: Value,
    pub method_identifiers: Value,
}

/// Compiler failure.
#[derive(Debug, thiserror::Error)]
pub enum CompilerError {
    /// The source is wrong; reported back to the client.
    #[error("{message}")]
    Diagnostic {
        message: String,
        line: Option<u64>,
        column: Option<u64>,
    },

    #[error("failed to run compiler: {0}")]
    Spawn(std::io::Error),

    #[error("compiler timed out after {0:?}")]
    Timeout(Duration),

    #[error("compiler exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("unexpected compiler output: {0}")]
    Output(String),
}

/// Something that turns Vyper source into bytecode.
pub trait Compiler: Send + Sync + 'static {
    /// Compiler version string for the banner.
    fn version(&self) -> BoxFuture<'_, Result<String, CompilerError>>;

    /// Compile one source file.
    fn compile(&self, input: CompileInput) -> BoxFuture<'_, Result<CompilerOutput, CompilerError>>;
}

/// Build the standard JSON input document for one source.
pub fn standard_json_input(input: &CompileInput) -> Value {
    json!({
        "language": "Vyper",
        "sources": {
            input.source_id.clone(): { "content": input.content }
        },
        "settings": {
            "outputSelection": { "*": OUTPUT_SELECTION }
        }
    })
}

fn str_at<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value.pointer(pointer).and_then(Value::as_str)
}

/// Interpret a standard JSON output document.
///
/// Warnings are ignored; the first other entry in `errors` wins.
pub fn parse_standard_json_output(
    source_id: &str,
    output: &Value,
) -> Result<CompilerOutput, CompilerError> {
    let first_error = output
        .get("errors")
        .and_then(Value::as_array)
        .and_then(|errors| {
            errors
                .iter()
                .find(|e| e.get("severity").and_then(Value::as_str) != Some("warning"))
        });

    if let Some(error) = first_error {
        let message = str_at(error, "/formattedMessage")
            .or_else(|| str_at(error, "/message"))
            .unwrap_or("compilation failed")
            .to_string();
        return Err(CompilerError::Diagnostic {
            message,
            line: error.pointer("/sourceLocation/lineno").and_then(Value::as_u64),
            column: error
                .pointer("/sourceLocation/col_offset")
                .and_then(Value::as_u64),
        });
    }

    let contract = output
        .get("contracts")
        .and_then(|contracts| contracts.get(source_id))
        .and_then(Value::as_object)
        .and_then(|by_name| by_name.values().next())
        .ok_or_else(|| {
            CompilerError::Output(format!("no contract emitted for '{}'", source_id))
        })?;

    Ok(CompilerOutput {
        abi: contract.get("abi").cloned().unwrap_or_else(|| json!([])),
        bytecode: str_at(contract, "/evm/bytecode/object")
            .unwrap_or_default()
            .to_string(),
        bytecode_runtime: str_at(contract, "/evm/deployedBytecode/object")
            .unwrap_or_default()
            .to_string(),
        source_map: contract
            .pointer("/evm/deployedBytecode/sourceMap")
            .cloned()
            .unwrap_or_else(|| json!("")),
        method_identifiers: contract
            .pointer("/evm/methodIdentifiers")
            .cloned()
            .unwrap_or_else(|| json!({})),
    })
}

/// Runs the Vyper command-line tools.
#[derive(Debug, Clone)]
pub struct VyperCli {
    program: String,
    version_program: String,
    timeout: Duration,
}

impl VyperCli {
    pub fn from_config(config: &CompilerConfig) -> Self {
        Self {
            program: config.program.clone(),
            version_program: config.version_program.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    async fn query_version(&self) -> Result<String, CompilerError> {
        let output = tokio::time::timeout(
            self.timeout,
            Command::new(&self.version_program)
                .arg("--version")
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| CompilerError::Timeout(self.timeout))?
        .map_err(CompilerError::Spawn)?;

        if !output.status.success() {
            return Err(CompilerError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn run(&self, input: CompileInput) -> Result<CompilerOutput, CompilerError> {
        let payload = serde_json::to_vec(&standard_json_input(&input))
            .map_err(|e| CompilerError::Output(e.to_string()))?;

        let mut child = Command::new(&self.program)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(CompilerError::Spawn)?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| CompilerError::Output("compiler stdin unavailable".into()))?;

        let feed = async move {
            let result = stdin.write_all(&payload).await;
            drop(stdin);
            result
        };

        // Dropping the child on timeout kills it.
        let (fed, output) = tokio::time::timeout(self.timeout, async {
            tokio::join!(feed, child.wait_with_output())
        })
        .await
        .map_err(|_| CompilerError::Timeout(self.timeout))?;

        let output = output.map_err(CompilerError::Spawn)?;
        if let Err(e) = fed {
            tracing::debug!(error = %e, "Compiler closed stdin early");
        }

        match serde_json::from_slice::<Value>(&output.stdout) {
            Ok(document) => parse_standard_json_output(&input.source_id, &document),
            Err(_) if !output.status.success() => Err(CompilerError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }),
            Err(e) => Err(CompilerError::Output(e.to_string())),
        }
    }
}

impl Compiler for VyperCli {
    fn version(&self) -> BoxFuture<'_, Result<String, CompilerError>> {
        Box::pin(self.query_version())
    }

    fn compile(&self, input: CompileInput) -> BoxFuture<'_, Result<CompilerOutput, CompilerError>> {
        Box::pin(self.run(input))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> CompileInput {
        CompileInput {
            source_id: "contracts/Counter.vy".into(),
            content: "count: public(uint256)\n".into(),
        }
    }

    #[test]
    fn input_document_requests_expected_outputs() {
        let doc = standard_json_input(&input());
        assert_eq!(doc["language"], "Vyper");
        assert_eq!(
            doc["sources"]["contracts/Counter.vy"]["content"],
            "count: public(uint256)\n"
        );
        let selection = doc["settings"]["outputSelection"]["*"].as_array().unwrap();
        assert_eq!(selection.len(), OUTPUT_SELECTION.len());
        assert!(selection.contains(&json!("evm.methodIdentifiers")));
    }

    #[test]
    fn parses_successful_output() {
        let doc = json!({
            "compiler": "vyper-0.4.0",
            "contracts": {
                "contracts/Counter.vy": {
                    "Counter": {
                        "abi": [{"name": "count", "type": "function"}],
                        "evm": {
                            "bytecode": {"object": "0x6100"},
                            "deployedBytecode": {"object": "0x5f35", "sourceMap": "0:1:0"},
                            "methodIdentifiers": {"count()": "0x06661abd"}
                        }
                    }
                }
            },
            "errors": [{"severity": "warning", "message": "unused"}]
        });

        let out = parse_standard_json_output("contracts/Counter.vy", &doc).unwrap();
        assert_eq!(out.bytecode, "0x6100");
        assert_eq!(out.bytecode_runtime, "0x5f35");
        assert_eq!(out.source_map, json!("0:1:0"));
        assert_eq!(out.method_identifiers["count()"], "0x06661abd");
        assert_eq!(out.abi[0]["name"], "count");
    }

    #[test]
    fn missing_fields_get_empty_defaults() {
        let doc = json!({"contracts": {"A.vy": {"A": {}}}});
        let out = parse_standard_json_output("A.vy", &doc).unwrap();
        assert_eq!(out.abi, json!([]));
        assert_eq!(out.bytecode, "");
        assert_eq!(out.source_map, json!(""));
        assert_eq!(out.method_identifiers, json!({}));
    }

    #[test]
    fn first_error_becomes_diagnostic() {
        let doc = json!({
            "errors": [
                {"severity": "warning", "message": "ignored"},
                {
                    "type": "StructureException",
                    "severity": "error",
                    "message": "Invalid top-level statement",
                    "formattedMessage": "StructureException: Invalid top-level statement\n  line 3:4",
                    "sourceLocation": {"file": "A.vy", "lineno": 3, "col_offset": 4}
                },
                {"severity": "error", "message": "second"}
            ]
        });

        match parse_standard_json_output("A.vy", &doc) {
            Err(CompilerError::Diagnostic { message, line, column }) => {
                assert!(message.starts_with("StructureException"));
                assert_eq!(line, Some(3));
                assert_eq!(column, Some(4));
            }
            other => panic!("expected diagnostic, got {:?}", other),
        }
    }

    #[test]
    fn diagnostic_without_location() {
        let doc = json!({"errors": [{"severity": "error", "message": "boom"}]});
        match parse_standard_json_output("A.vy", &doc) {
            Err(CompilerError::Diagnostic { message, line, column }) => {
                assert_eq!(message, "boom");
                assert_eq!(line, None);
                assert_eq!(column, None);
            }
            other => panic!("expected diagnostic, got {:?}", other),
        }
    }

    #[test]
    fn missing_contract_is_output_error() {
        let doc = json!({"contracts": {}});
        assert!(matches!(
            parse_standard_json_output("A.vy", &doc),
            Err(CompilerError::Output(_))
        ));
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let cli = VyperCli::from_config(&CompilerConfig {
            program: "definitely-not-a-vyper-binary".into(),
            version_program: "definitely-not-a-vyper-binary".into(),
            ..CompilerConfig::default()
        });
        assert!(matches!(cli.compile(input()).await, Err(CompilerError::Spawn(_))));
        assert!(matches!(cli.version().await, Err(CompilerError::Spawn(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stdin_reaches_program_and_stdout_is_parsed() {
        // `cat` echoes the input document, which has no contracts section.
        let cli = VyperCli::from_config(&CompilerConfig {
            program: "cat".into(),
            ..CompilerConfig::default()
        });
        match cli.compile(input()).await {
            Err(CompilerError::Output(message)) => {
                assert!(message.contains("contracts/Counter.vy"));
            }
            other => panic!("expected output error, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn version_is_trimmed_stdout() {
        let cli = VyperCli::from_config(&CompilerConfig {
            version_program: "echo".into(),
            ..CompilerConfig::default()
        });
        assert_eq!(cli.version().await.unwrap(), "--version");
    }
}
