//! Offline Java-to-Python approximation.
//!
//! This is an ordered list of textual substitutions followed by a pass that
//! turns brace blocks into indentation. It does not parse Java and will
//! happily rewrite text inside string literals; it exists so a conversion can
//! still produce something useful when the conversion service is unreachable.

use std::sync::LazyLock;

use regex::Regex;

use crate::model::ConversionOptions;

const INDENT: &str = "    ";

struct Rule {
    pattern: Regex,
    replacement: &'static str,
}

fn rule(pattern: &str, replacement: &'static str) -> Rule {
    Rule {
        pattern: Regex::new(pattern).expect("substitution patterns are static and valid"),
        replacement,
    }
}

static BLOCK_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)/\*+(.*?)\*/").expect("static pattern"));
static LINE_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"//[ \t]?(.*)").expect("static pattern"));

static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        rule(
            r"(?:public\s+)?static\s+void\s+main\s*\([^)]*\)",
            r#"if __name__ == "__main__""#,
        ),
        rule(
            r"(?:(?:public|private|protected)\s+)?class\s+(\w+)\s+extends\s+(\w+)",
            "class ${1}(${2})",
        ),
        rule(r"(?:(?:public|private|protected)\s+)?class\s+(\w+)", "class ${1}"),
        rule(r"System\.out\.print(?:ln)?\(", "print("),
        rule(
            r"for\s*\(\s*int\s+(\w+)\s*=\s*([^;]+?)\s*;\s*\w+\s*<\s*([^;]+?)\s*;\s*\w+\+\+\s*\)",
            "for ${1} in range(${2}, ${3})",
        ),
        rule(r"(\w+)\+\+", "${1} += 1"),
        rule(
            r"\b(?:int|long|short|byte|String|boolean|double|float|char|var)\s+(\w+)\s*=",
            "${1} =",
        ),
        rule(r"\belse\s+if\b", "elif"),
        rule(r"\b(if|elif|while)\s*\((.*)\)\s*\{", "${1} ${2} {"),
        rule(r"&&", "and"),
        rule(r"\|\|", "or"),
        rule(r"!([^=])", "not ${1}"),
        rule(r"\btrue\b", "True"),
        rule(r"\bfalse\b", "False"),
        rule(r"\bnull\b", "None"),
        rule(r"(?m);[ \t]*$", ""),
    ]
});

/// Produce a best-effort Python rendering of Java source text.
///
/// # Panics
///
/// Panics only if one of the built-in patterns fails to compile.
#[must_use]
pub fn approximate(source: &str, options: &ConversionOptions) -> String {
    let mut text = if options.preserve_comments {
        let text = BLOCK_COMMENT.replace_all(source, |caps: &regex::Captures<'_>| {
            format!("\"\"\"{}\"\"\"", caps[1].trim())
        });
        LINE_COMMENT.replace_all(&text, "# ${1}").into_owned()
    } else {
        let text = BLOCK_COMMENT.replace_all(source, "");
        LINE_COMMENT.replace_all(&text, "").into_owned()
    };

    for rule in RULES.iter() {
        text = rule
            .pattern
            .replace_all(&text, rule.replacement)
            .into_owned();
    }

    reindent(&text)
}

/// Turn `{ ... }` blocks into colon-terminated, indented blocks.
fn reindent(text: &str) -> String {
    let mut depth = 0usize;
    let mut out = Vec::new();

    for line in text.lines() {
        let mut trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix('}') {
            depth = depth.saturating_sub(1);
            trimmed = rest.trim_start();
            if trimmed.is_empty() {
                continue;
            }
        }

        if trimmed.is_empty() {
            out.push(String::new());
        } else if let Some(head) = trimmed.strip_suffix('{') {
            out.push(format!("{}{}:", INDENT.repeat(depth), head.trim_end()));
            depth += 1;
        } else {
            out.push(format!("{}{}", INDENT.repeat(depth), trimmed));
        }
    }

    out.join("\n")
}
