//! Minimal reader/editor for the `~/.aws/credentials` INI layout.
//!
//! Only the lines of the edited section change; other profiles, comments and
//! ordering survive a rewrite.

use std::collections::HashMap;

#[derive(Debug, Default)]
struct Block {
    name: Option<String>,
    header: Option<String>,
    lines: Vec<String>,
}

fn section_name(line: &str) -> Option<String> {
    let trimmed = line.trim();
    trimmed
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .map(|name| name.trim().to_string())
}

fn key_value(line: &str) -> Option<(String, String)> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
        return None;
    }
    let (key, value) = trimmed.split_once('=')?;
    Some((key.trim().to_string(), value.trim().to_string()))
}

fn parse(content: &str) -> Vec<Block> {
    let mut blocks = vec![Block::default()];
    for line in content.lines() {
        if let Some(name) = section_name(line) {
            blocks.push(Block {
                name: Some(name),
                header: Some(line.to_string()),
                lines: Vec::new(),
            });
        } else if let Some(block) = blocks.last_mut() {
            block.lines.push(line.to_string());
        }
    }
    blocks
}

fn render(blocks: &[Block]) -> String {
    let mut out = Vec::new();
    for block in blocks {
        if let Some(header) = &block.header {
            out.push(header.clone());
        }
        out.extend(block.lines.iter().cloned());
    }
    while out.last().is_some_and(|line| line.trim().is_empty()) {
        out.pop();
    }
    if out.is_empty() {
        return String::new();
    }
    let mut text = out.join("\n");
    text.push('\n');
    text
}

pub fn read_section(content: &str, section: &str) -> HashMap<String, String> {
    parse(content)
        .into_iter()
        .filter(|block| block.name.as_deref() == Some(section))
        .flat_map(|block| block.lines.into_iter().filter_map(|line| key_value(&line)))
        .collect()
}

pub fn upsert_section(content: &str, section: &str, values: &[(&str, &str)]) -> String {
    let mut blocks = parse(content);
    let index = match blocks
        .iter()
        .position(|block| block.name.as_deref() == Some(section))
    {
        Some(index) => index,
        None => {
            if let Some(last) = blocks.last_mut() {
                if last.lines.last().is_some_and(|line| !line.trim().is_empty()) {
                    last.lines.push(String::new());
                }
            }
            blocks.push(Block {
                name: Some(section.to_string()),
                header: Some(format!("[{section}]")),
                lines: Vec::new(),
            });
            blocks.len() - 1
        }
    };

    let block = &mut blocks[index];
    let mut missing: Vec<&(&str, &str)> = Vec::new();
    for pair in values {
        let (key, value) = pair;
        let existing = block
            .lines
            .iter()
            .position(|line| key_value(line).is_some_and(|(k, _)| k == *key));
        match existing {
            Some(position) => block.lines[position] = format!("{key} = {value}"),
            None => missing.push(pair),
        }
    }

    if !missing.is_empty() {
        // insert after the last key line so trailing blank lines stay between sections
        let insert_at = block
            .lines
            .iter()
            .rposition(|line| key_value(line).is_some())
            .map(|position| position + 1)
            .unwrap_or(0);
        for (offset, (key, value)) in missing.into_iter().enumerate() {
            block
                .lines
                .insert(insert_at + offset, format!("{key} = {value}"));
        }
    }

    render(&blocks)
}

pub fn remove_keys(content: &str, section: &str, keys: &[&str]) -> String {
    let mut blocks = parse(content);
    for block in blocks
        .iter_mut()
        .filter(|block| block.name.as_deref() == Some(section))
    {
        block.lines.retain(|line| {
            key_value(line).map_or(true, |(key, _)| !keys.contains(&key.as_str()))
        });
    }
    blocks.retain(|block| {
        block.name.as_deref() != Some(section) || block.lines.iter().any(|line| key_value(line).is_some())
    });
    render(&blocks)
}

pub fn has_entries(content: &str) -> bool {
    content.lines().any(|line| key_value(line).is_some())
}
