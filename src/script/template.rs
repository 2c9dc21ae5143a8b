//! Wrapping user code into a complete Go program

use crate::cache::CacheKey;
use crate::script::Script;
use std::fmt::Write;

/// Marks the first line of user code in the generated file
pub const START_MARKER: &str = "// ---- START USER CODE ----";

/// Marks the line after the last line of user code
pub const END_MARKER: &str = "// ---- END USER CODE ----";

/// Imports every program gets
const BUILTIN_IMPORTS: &[&str] = &["fmt", "os"];

const PRELUDE: &str = r#")

// P prints its arguments to stdout, separated by spaces.
func P(a ...interface{}) (int, error) {
	return fmt.Println(a...)
}

// E prints its arguments to stderr, separated by spaces.
func E(a ...interface{}) (int, error) {
	return fmt.Fprintln(os.Stderr, a...)
}

func main() {
	if err := run(); err != nil {
		fmt.Fprintln(os.Stderr, err)
		os.Exit(1)
	}
}

func run() (err error) {
"#;

/// Generated `main.go` for a script, with its cache key
#[derive(Debug, Clone)]
pub struct Program {
    source: String,
    key: CacheKey,
    line_offset: usize,
}

impl Program {
    /// Wrap a script with the given import hints
    pub fn new(script: &Script, imports: &[String]) -> Self {
        let source = render(script.body(), imports);
        let key = CacheKey::derive(source.as_bytes());
        Self {
            source,
            key,
            line_offset: script.line_offset(),
        }
    }

    /// Contents of `main.go`
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Lines stripped from the script before its body (shebang)
    pub fn line_offset(&self) -> usize {
        self.line_offset
    }
}

/// Render the Go source for a script body
pub fn render(body: &str, imports: &[String]) -> String {
    let mut out = String::from("package main\n\nimport (\n");

    let mut requested: Vec<&str> = BUILTIN_IMPORTS.to_vec();
    requested.extend(imports.iter().map(|s| s.trim()));

    let mut seen: Vec<&str> = Vec::new();
    for import in requested {
        if import.is_empty() || seen.contains(&import) {
            continue;
        }
        seen.push(import);
        // Go import paths cannot contain spaces; "name path" declares an alias
        match import.split_once(char::is_whitespace) {
            Some((alias, path)) => {
                let _ = writeln!(out, "\t{} \"{}\"", alias, path.trim());
            }
            None => {
                let _ = writeln!(out, "\t\"{}\"", import);
            }
        }
    }

    out.push_str(PRELUDE);
    out.push('\t');
    out.push_str(START_MARKER);
    out.push('\n');
    out.push_str(body);
    if !body.ends_with('\n') {
        out.push('\n');
    }
    out.push('\t');
    out.push_str(END_MARKER);
    out.push_str("\n\treturn\n}\n");
    out
}
