use crate::{
    error::{Error, Result},
    provider::RewriteInput,
};
use serde::Serialize;
use std::path::Path;
use tera::{Context, Tera};

const USER_TEMPLATE: &str = "user";
const MIN_FENCE: usize = 3;

/// System message sent ahead of every chunk.
pub const SYSTEM_PROMPT: &str = "You are an expert software engineer. You remove bloat from code \
    (dead code, redundant comments, unused branches, needless verbosity) without changing its \
    behavior, and you answer with code only.";

#[derive(Serialize)]
struct PromptContext<'a> {
    code: &'a str,
    fence: String,
    language: &'a str,
    chunk_index: usize,
    total_chunks: usize,
    file_name: &'a str,
}

/// Renders the user prompt for each chunk.
pub struct PromptBuilder {
    tera: Tera,
}

impl PromptBuilder {
    /// Creates a builder using the built-in template or the given Tera file.
    ///
    /// # Errors
    ///
    /// Returns an error if the template cannot be read or parsed.
    pub fn new(custom_template: Option<&Path>) -> Result<Self> {
        let mut tera = Tera::default();

        match custom_template {
            Some(path) => tera
                .add_template_file(path, Some(USER_TEMPLATE))
                .map_err(|e| Error::template(path.display().to_string(), e))?,
            None => tera
                .add_raw_template(USER_TEMPLATE, include_str!("../templates/debloat.tera"))
                .map_err(|e| Error::template("debloat", e))?,
        }

        Ok(Self { tera })
    }

    /// Renders the user prompt for one chunk.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering fails, e.g. on an undefined variable in
    /// a custom template.
    pub fn render(&self, input: &RewriteInput<'_>) -> Result<String> {
        let context = PromptContext {
            code: input.code.trim_end_matches('\n'),
            fence: fence_for(input.code),
            language: input.language,
            chunk_index: input.index + 1,
            total_chunks: input.total_chunks,
            file_name: input.file_name,
        };

        let context = Context::from_serialize(&context)?;
        self.tera
            .render(USER_TEMPLATE, &context)
            .map_err(|e| Error::template(USER_TEMPLATE, e))
    }
}

/// Shortest fence that no backtick run inside `code` can close.
fn fence_for(code: &str) -> String {
    let mut longest = 0;
    let mut run = 0;
    for b in code.bytes() {
        if b == b'`' {
            run += 1;
            longest = longest.max(run);
        } else {
            run = 0;
        }
    }
    "`".repeat(longest.max(MIN_FENCE - 1) + 1)
}

/// Pulls the code out of a model answer.
///
/// Takes the body of the first fenced block. The opening fence is a line
/// starting with three or more backticks; the block ends at a line holding
/// only a backtick run at least as long, so fences inside the code (doc
/// tests, Markdown in docstrings) are kept. Without a fence the whole answer
/// is used. Returns `None` when nothing but whitespace is left.
#[must_use]
pub fn extract_code(response: &str) -> Option<String> {
    let body = fenced_body(response).unwrap_or(response);

    // Leading spaces belong to the first line's indentation
    let code = body.trim_start_matches(['\n', '\r']).trim_end();
    if code.is_empty() {
        None
    } else {
        Some(code.to_string())
    }
}

fn fenced_body(response: &str) -> Option<&str> {
    let mut offset = 0;
    let mut opening = None;
    for line in response.split_inclusive('\n') {
        offset += line.len();
        let trimmed = line.trim_start();
        let run = backtick_run(trimmed);
        // An info string may not contain backticks
        if run >= MIN_FENCE && !trimmed[run..].contains('`') {
            opening = Some(run);
            break;
        }
    }

    let run = opening?;
    let rest = &response[offset..];
    let mut end = 0;
    for line in rest.split_inclusive('\n') {
        let trimmed = line.trim();
        if backtick_run(trimmed) >= run && trimmed.bytes().all(|b| b == b'`') {
            return Some(&rest[..end]);
        }
        end += line.len();
    }

    Some(rest)
}

fn backtick_run(line: &str) -> usize {
    line.bytes().take_while(|&b| b == b'`').count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    fn input(code: &str, index: usize, total_chunks: usize) -> RewriteInput<'_> {
        RewriteInput {
            code,
            index,
            total_chunks,
            language: "python",
            file_name: "app.py",
        }
    }

    #[test]
    fn test_render_builtin_single_chunk() {
        let builder = PromptBuilder::new(None).unwrap();
        let prompt = builder.render(&input("print(1)\n", 0, 1)).unwrap();

        assert!(prompt.contains("python code"));
        assert!(prompt.contains("```python\nprint(1)\n```"));
        assert!(!prompt.contains("part 1 of"));
    }

    #[test]
    fn test_render_builtin_multi_chunk() {
        let builder = PromptBuilder::new(None).unwrap();
        let prompt = builder.render(&input("x = 1\n", 1, 3)).unwrap();

        assert!(prompt.contains("part 2 of 3"));
        assert!(prompt.contains("`app.py`"));
    }

    #[test]
    fn test_render_custom_template() {
        let temp = assert_fs::TempDir::new().unwrap();
        let template = temp.child("prompt.tera");
        template
            .write_str("Shrink {{ file_name }} [{{ chunk_index }}/{{ total_chunks }}]:\n{{ code }}")
            .unwrap();

        let builder = PromptBuilder::new(Some(template.path())).unwrap();
        let prompt = builder.render(&input("a = 1\n", 0, 2)).unwrap();

        assert_eq!(prompt, "Shrink app.py [1/2]:\na = 1");
    }

    #[test]
    fn test_render_custom_template_undefined_variable() {
        let temp = assert_fs::TempDir::new().unwrap();
        let template = temp.child("prompt.tera");
        template.write_str("{{ nope }}").unwrap();

        let builder = PromptBuilder::new(Some(template.path())).unwrap();
        assert!(builder.render(&input("a = 1\n", 0, 1)).is_err());
    }

    #[test]
    fn test_render_doc_test_chunk_gets_longer_fence() {
        let builder = PromptBuilder::new(None).unwrap();
        let code = "/// ```\n/// assert_eq!(add(1), 2);\n/// ```\npub fn add(x: i32) -> i32 {\n    x + 1\n}\n";
        let input = RewriteInput {
            code,
            index: 0,
            total_chunks: 1,
            language: "rust",
            file_name: "lib.rs",
        };

        let prompt = builder.render(&input).unwrap();

        assert!(prompt.contains("opened and closed with ````."));
        assert!(prompt.contains("````rust\n/// ```\n"));
        assert!(prompt.trim_end().ends_with("    x + 1\n}\n````"));
    }

    #[test]
    fn test_fence_for() {
        assert_eq!(fence_for("x = 1"), "```");
        assert_eq!(fence_for("let s = `a`;"), "```");
        assert_eq!(fence_for("/// ```"), "````");
        assert_eq!(fence_for("`````"), "``````");
    }

    #[test]
    fn test_extract_keeps_doc_test_fences() {
        let response = "```rust\n/// Adds one.\n///\n/// ```\n/// assert_eq!(add(1), 2);\n/// ```\npub fn add(x: i32) -> i32 {\n    x + 1\n}\n```";

        assert_eq!(
            extract_code(response).as_deref(),
            Some("/// Adds one.\n///\n/// ```\n/// assert_eq!(add(1), 2);\n/// ```\npub fn add(x: i32) -> i32 {\n    x + 1\n}")
        );
    }

    #[test]
    fn test_extract_longer_fence_keeps_bare_inner_fence() {
        let response = "````python\ndef f():\n    \"\"\"\n    ```\n    f()\n    ```\n    \"\"\"\n````\ntrailing";

        assert_eq!(
            extract_code(response).as_deref(),
            Some("def f():\n    \"\"\"\n    ```\n    f()\n    ```\n    \"\"\"")
        );
    }

    #[test]
    fn test_extract_fenced_with_language() {
        let response = "Here you go:\n```python\ndef f():\n    return 1\n```\nDone.";
        assert_eq!(
            extract_code(response).as_deref(),
            Some("def f():\n    return 1")
        );
    }

    #[test]
    fn test_extract_fenced_without_language() {
        let response = "```\n    indented()\n```";
        assert_eq!(extract_code(response).as_deref(), Some("    indented()"));
    }

    #[test]
    fn test_extract_unclosed_fence() {
        let response = "```rust\nfn main() {}\n";
        assert_eq!(extract_code(response).as_deref(), Some("fn main() {}"));
    }

    #[test]
    fn test_extract_plain_response() {
        assert_eq!(extract_code("\nx = 1\n\n").as_deref(), Some("x = 1"));
    }

    #[test]
    fn test_extract_empty() {
        assert_eq!(extract_code(""), None);
        assert_eq!(extract_code("```python\n\n```"), None);
    }
}
