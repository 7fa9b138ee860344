//! Language handlers: turning a source snippet into an in-container command.
//!
//! Each handler writes the base64-encoded source into a per-execution temp
//! directory inside the container, compiles where the language needs it, runs
//! the program, and removes the directory again. Steps are joined with `&&`
//! so the script's exit code is the first failing step's.

use std::fmt;
use std::sync::OnceLock;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Prefix for per-execution temp directories inside the container.
const TEMP_DIR_PREFIX: &str = "/tmp/exec";

/// Supported execution languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    Java,
    Cpp,
}

impl Language {
    /// Detects the language from a file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "py" => Some(Language::Python),
            "java" => Some(Language::Java),
            "cpp" | "cc" | "cxx" => Some(Language::Cpp),
            _ => None,
        }
    }

    /// Default base image for containers running this language.
    pub fn default_image(&self) -> &'static str {
        match self {
            Language::Python => "python:3.12-slim",
            Language::Java => "eclipse-temurin:17-jdk-jammy",
            Language::Cpp => "debian:bullseye-slim",
        }
    }

    /// Builds the shell script that runs `source` inside a container.
    ///
    /// `execution_id` keys the temp directory so concurrent executions in the
    /// same container cannot collide.
    pub fn build_exec_script(&self, source: &str, execution_id: &str) -> Result<String> {
        let dir = format!("{}_{}", TEMP_DIR_PREFIX, execution_id);
        let encoded = BASE64.encode(source);

        let commands = match self {
            Language::Python => {
                let file = format!("{}/{}.py", dir, execution_id);
                vec![
                    format!("mkdir -p {}", dir),
                    format!("echo {} | base64 -d > {}", encoded, file),
                    format!("python3 {}", file),
                    format!("rm -rf {}", dir),
                ]
            }
            Language::Java => {
                let class_name = extract_java_class_name(source)?;
                vec![
                    format!("mkdir -p {}", dir),
                    format!("echo {} | base64 -d > {}/{}.java", encoded, dir, class_name),
                    format!("javac {}/{}.java", dir, class_name),
                    format!("cd {} && java {}", dir, class_name),
                    format!("rm -rf {}", dir),
                ]
            }
            Language::Cpp => {
                vec![
                    format!("mkdir -p {}", dir),
                    format!("echo {} | base64 -d > {}/program.cpp", encoded, dir),
                    format!("g++ {}/program.cpp -o {}/program", dir, dir),
                    format!("cd {} && ./program", dir),
                    format!("rm -rf {}", dir),
                ]
            }
        };

        Ok(commands.join(" && "))
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Language::Python => "python",
            Language::Java => "java",
            Language::Cpp => "cpp",
        };
        f.write_str(s)
    }
}

/// Extracts the public class name from Java source.
///
/// The source file must be named after its public class or javac rejects it.
fn extract_java_class_name(source: &str) -> Result<String> {
    static CLASS_RE: OnceLock<Regex> = OnceLock::new();
    let re = CLASS_RE.get_or_init(|| {
        Regex::new(r"public\s+class\s+(\w+)").expect("class name regex is valid")
    });

    re.captures(source)
        .map(|caps| caps[1].to_string())
        .ok_or_else(|| Error::InvalidSource("no public class found in Java source".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_detected_from_extension() {
        assert_eq!(Language::from_extension("py"), Some(Language::Python));
        assert_eq!(Language::from_extension("java"), Some(Language::Java));
        assert_eq!(Language::from_extension("cpp"), Some(Language::Cpp));
        assert_eq!(Language::from_extension("cc"), Some(Language::Cpp));
        assert_eq!(Language::from_extension("rb"), None);
    }

    #[test]
    fn language_serializes_to_lowercase() {
        assert_eq!(serde_json::to_string(&Language::Python).unwrap(), "\"python\"");
        assert_eq!(serde_json::to_string(&Language::Cpp).unwrap(), "\"cpp\"");
    }

    #[test]
    fn python_script_writes_decodes_runs_and_cleans_up() {
        let script = Language::Python
            .build_exec_script("print('hi')", "run-1")
            .unwrap();

        assert!(script.starts_with("mkdir -p /tmp/exec_run-1"));
        assert!(script.contains("| base64 -d > /tmp/exec_run-1/run-1.py"));
        assert!(script.contains("python3 /tmp/exec_run-1/run-1.py"));
        assert!(script.ends_with("rm -rf /tmp/exec_run-1"));
        assert_eq!(script.matches(" && ").count(), 3);
    }

    #[test]
    fn python_source_is_base64_encoded() {
        let script = Language::Python
            .build_exec_script("print('hi')", "run-1")
            .unwrap();

        let encoded = BASE64.encode("print('hi')");
        assert!(script.contains(&encoded));
        // The raw source with its quotes must not appear in the shell script.
        assert!(!script.contains("print('hi')"));
    }

    #[test]
    fn java_script_uses_public_class_name() {
        let source = "public class Main {\n    public static void main(String[] args) {}\n}";
        let script = Language::Java.build_exec_script(source, "run-2").unwrap();

        assert!(script.contains("/tmp/exec_run-2/Main.java"));
        assert!(script.contains("javac /tmp/exec_run-2/Main.java"));
        assert!(script.contains("cd /tmp/exec_run-2 && java Main"));
    }

    #[test]
    fn java_without_public_class_is_invalid_source() {
        let err = Language::Java
            .build_exec_script("class Hidden {}", "run-3")
            .unwrap_err();

        assert!(matches!(err, Error::InvalidSource(_)));
    }

    #[test]
    fn cpp_script_compiles_then_runs() {
        let source = "#include <iostream>\nint main() { return 0; }";
        let script = Language::Cpp.build_exec_script(source, "run-4").unwrap();

        assert!(script.contains("g++ /tmp/exec_run-4/program.cpp -o /tmp/exec_run-4/program"));
        assert!(script.contains("cd /tmp/exec_run-4 && ./program"));
    }

    #[test]
    fn each_language_maps_to_an_image() {
        assert!(Language::Python.default_image().starts_with("python:"));
        assert!(Language::Java.default_image().contains("temurin"));
        assert!(!Language::Cpp.default_image().is_empty());
    }
}
