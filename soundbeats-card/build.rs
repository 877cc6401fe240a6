use fluent_syntax::parser::parse;
use std::collections::{HashMap, HashSet};
use std::fs;

fn extract_message_ids(content: &str) -> HashSet<String> {
    let mut ids = HashSet::new();
    if let Ok(ast) = parse(content) {
        for entry in ast.body {
            if let fluent_syntax::ast::Entry::Message(message) = entry {
                ids.insert(message.id.name.to_string());
            }
        }
    }
    ids
}

fn main() {
    let l10n_dir = "i18n";
    println!("cargo:rerun-if-changed={l10n_dir}");
    let mut file_message_map: HashMap<String, HashSet<String>> = HashMap::new();

    // One directory per language, each holding this crate's .ftl file
    for entry in fs::read_dir(l10n_dir).expect("Could not read directory") {
        let path = entry.expect("Could not read directory entry").path();
        if !path.is_dir() {
            continue;
        }
        for file_entry in fs::read_dir(&path).expect("Could not read subdirectory") {
            let file_path = file_entry.expect("Could not read file entry").path();
            if file_path.extension().and_then(|ext| ext.to_str()) == Some("ftl") {
                println!("cargo:rerun-if-changed={}", file_path.display());
                let content = fs::read_to_string(&file_path).expect("Could not read file");
                file_message_map.insert(
                    file_path.display().to_string(),
                    extract_message_ids(&content),
                );
            }
        }
    }

    let all_keys: HashSet<_> = file_message_map
        .values()
        .flat_map(|set| set.iter().cloned())
        .collect();

    let msg_type = if cfg!(debug_assertions) {
        "warning"
    } else {
        "error"
    };

    for (file, ids) in &file_message_map {
        let mut missing: Vec<_> = all_keys.difference(ids).cloned().collect();
        if !missing.is_empty() {
            missing.sort();
            println!(
                "cargo:{}=Missing keys in {}: {}",
                msg_type,
                file,
                missing.join(", ")
            );
        }
    }
}
