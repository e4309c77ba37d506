use anyhow::Context;
use std::collections::HashSet;
use std::path::Path;

/// Accepts commas or whitespace as separators; `#` starts a comment in files.
pub fn parse_symbol_list(raw: &str) -> Vec<String> {
    raw.lines()
        .map(|line| line.split('#').next().unwrap_or(""))
        .flat_map(|line| line.split(|c: char| c == ',' || c.is_whitespace()))
        .map(|s| s.trim().to_ascii_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

pub fn collect_symbols(inline: Option<&str>, file: Option<&Path>) -> anyhow::Result<Vec<String>> {
    let mut out = Vec::new();
    if let Some(raw) = inline {
        out.extend(parse_symbol_list(raw));
    }
    if let Some(path) = file {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read symbols file {}", path.display()))?;
        out.extend(parse_symbol_list(&text));
    }

    let mut seen = HashSet::new();
    out.retain(|s| seen.insert(s.clone()));

    anyhow::ensure!(!out.is_empty(), "no symbols given (use --symbols or --symbols-file)");
    Ok(out)
}
