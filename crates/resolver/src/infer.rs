//! Best-effort dependency inference from contract source.
//!
//! Only local references (`.name` or `.name.trait`) in `use-trait`,
//! `impl-trait` and `contract-call?` forms are recognized. Fully qualified
//! principals point at other deployers and are ignored.

use std::collections::BTreeSet;

use orbit_protocol::ArtifactId;

/// Returns the local contract names referenced by `source`.
pub fn referenced_contracts(source: &str) -> BTreeSet<ArtifactId> {
    let mut found = BTreeSet::new();
    let code = strip_comments(source);

    // (form, index of the contract token after the keyword)
    for (form, position) in [("(use-trait", 1), ("(impl-trait", 0), ("(contract-call?", 0)] {
        let mut rest = code.as_str();
        while let Some(at) = rest.find(form) {
            rest = &rest[at + form.len()..];
            // Keyword must end here (not `(use-traits`).
            if !rest.starts_with(char::is_whitespace) {
                continue;
            }
            let token = rest
                .split(|c: char| c.is_whitespace() || c == '(' || c == ')')
                .filter(|t| !t.is_empty())
                .nth(position);
            if let Some(name) = token.and_then(local_contract_name) {
                found.insert(name.to_string());
            }
        }
    }
    found
}

/// `.token` and `.trait-lib.sip010` yield `token` / `trait-lib`.
fn local_contract_name(token: &str) -> Option<&str> {
    let name = token.strip_prefix('.')?.split('.').next()?;
    (!name.is_empty()).then_some(name)
}

fn strip_comments(source: &str) -> String {
    source
        .lines()
        .map(|line| line.split(";;").next().unwrap_or(""))
        .collect::<Vec<_>>()
        .join("\n")
}
