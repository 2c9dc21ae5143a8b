//! Mapping Go compiler errors back to the user's script
//!
//! The compiler reports positions in the generated `main.go`. Errors that
//! fall inside the user code markers are shown against the user's own line:
//!
//! ```text
//! x := undefinedThing
//!      |
//!      \- undefined: undefinedThing (line 3)
//! ```

use crate::script::template::{END_MARKER, START_MARKER};

/// Line indices of the start and end markers in generated source
pub fn user_code_range(lines: &[&str]) -> Option<(usize, usize)> {
    let start = lines.iter().position(|l| l.contains(START_MARKER))?;
    let end = lines.iter().rposition(|l| l.contains(END_MARKER))?;
    (start < end).then_some((start, end))
}

/// Render one compiler error line, if it points into user code.
///
/// `line_offset` is added to the reported line number to account for a
/// stripped shebang.
pub fn render_error(source: &str, error: &str, line_offset: usize) -> Option<String> {
    let mut parts = error.splitn(4, ':');
    let file = parts.next()?;
    let line_no: usize = parts.next()?.trim().parse().ok()?;
    let col: usize = parts.next()?.trim().parse().ok()?;
    let message = parts.next()?.trim();
    if !file.trim().ends_with("main.go") {
        return None;
    }

    let lines: Vec<&str> = source.lines().collect();
    let (start, end) = user_code_range(&lines)?;
    let index = line_no.checked_sub(1)?;
    if index <= start || index >= end {
        return None;
    }

    let code = lines[index];
    let indent = caret_indent(code, col);
    Some(format!(
        "{code}\n{indent}|\n{indent}\\- {message} (line {})",
        index - start + line_offset
    ))
}

/// Render every user-code error in compiler output; `None` if none map
pub fn render_all(source: &str, stderr: &str, line_offset: usize) -> Option<String> {
    let rendered: Vec<String> = stderr
        .lines()
        .filter_map(|line| render_error(source, line, line_offset))
        .collect();
    (!rendered.is_empty()).then(|| rendered.join("\n"))
}

/// Whitespace that lines a marker up under 1-based byte column `col`,
/// keeping tabs so the caret aligns in a terminal
fn caret_indent(code: &str, col: usize) -> String {
    let width = col.saturating_sub(1).min(code.len());
    code.as_bytes()[..width]
        .iter()
        .filter(|b| (**b & 0xC0) != 0x80)
        .map(|b| if *b == b'\t' { '\t' } else { ' ' })
        .collect()
}
