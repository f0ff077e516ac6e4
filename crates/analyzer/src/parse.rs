//! Line-oriented recognizer for the package clause and import declarations
//! of one directory's worth of source files.

use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::{MAIN_PACKAGE, PackageInfo, PackageOutcome, is_test_file};

pub(crate) fn analyze_dir(files: &[PathBuf]) -> PackageOutcome {
    let mut info = PackageInfo::default();
    let mut declared_name: Option<String> = None;

    for path in files {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => return PackageOutcome::ParseError(format!("{}: {e}", path.display())),
        };
        let is_test = path
            .file_stem()
            .map(|s| is_test_file(&s.to_string_lossy()))
            .unwrap_or(false);

        let (name, imports) = match parse_file(&content) {
            Some(parsed) => parsed,
            None => {
                return PackageOutcome::ParseError(format!(
                    "{}: missing package clause",
                    path.display()
                ));
            },
        };

        match &declared_name {
            None => declared_name = Some(name.clone()),
            Some(existing) if *existing != name => {
                return PackageOutcome::ParseError(format!(
                    "{}: package {name} does not match {existing}",
                    path.display()
                ));
            },
            Some(_) => {},
        }

        if is_test {
            info.test_imports.extend(imports);
        } else {
            info.imports.extend(imports);
        }
    }

    let Some(name) = declared_name else {
        return PackageOutcome::NoSource;
    };
    info.is_main = name == MAIN_PACKAGE;
    info.name = name;
    PackageOutcome::Ok(info)
}

/// Extracts `(package name, import paths)` from one file's contents.
///
/// Returns `None` if no `package` clause was found.
fn parse_file(content: &str) -> Option<(String, BTreeSet<String>)> {
    let mut name = None;
    let mut imports = BTreeSet::new();
    let mut in_import_block = false;

    for raw_line in content.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with("//") {
            continue;
        }

        if in_import_block {
            if line == ")" {
                in_import_block = false;
                continue;
            }
            if let Some(path) = quoted(line) {
                imports.insert(path.to_string());
            }
            continue;
        }

        if let Some(rest) = line.strip_prefix("package ") {
            name.get_or_insert_with(|| rest.trim().to_string());
            continue;
        }

        if let Some(rest) = line.strip_prefix("import ") {
            let rest = rest.trim();
            if rest == "(" {
                in_import_block = true;
            } else if let Some(path) = quoted(rest) {
                imports.insert(path.to_string());
            }
        }
    }

    name.map(|n| (n, imports))
}

fn quoted(s: &str) -> Option<&str> {
    let s = s.strip_prefix('"')?;
    s.strip_suffix('"')
}
