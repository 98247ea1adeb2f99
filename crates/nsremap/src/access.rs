//! Access-control side files remapped alongside the classes.
//!
//! Access wideners (`*.accesswidener`, `*.aw`) name their namespace in the
//! header and use internal names; access transformers (`accesstransformer.cfg`,
//! `*_at.cfg`) use dotted class names and carry no namespace.

use cow_utils::CowUtils;
use log::warn;

use crate::{
    classfile::file_name,
    engine::ResourceRemapper,
    error::EngineError,
    mapping::SymbolResolver,
};

/// Split off a trailing `#` comment, keeping the `#`
fn split_comment(line: &str) -> (&str, Option<&str>) {
    match line.find('#') {
        Some(start) => (&line[..start], Some(&line[start..])),
        None => (line, None),
    }
}

fn rebuild(tokens: &[String], separator: &str, comment: Option<&str>) -> String {
    let mut line = tokens.join(separator);
    if let Some(comment) = comment {
        line.push_str(separator);
        line.push_str(comment);
    }
    line
}

#[derive(Debug, Clone, Default)]
pub struct AccessWidenerRemapper {
    /// Pass files written for another namespace through unchanged
    ignore_namespace_mismatch: bool,
}

impl AccessWidenerRemapper {
    pub fn new(ignore_namespace_mismatch: bool) -> Self {
        Self {
            ignore_namespace_mismatch,
        }
    }

    fn remap_entry(
        tokens: &[&str],
        resolver: &SymbolResolver<'_>,
    ) -> Result<Vec<String>, String> {
        let access = tokens[0].strip_prefix("transitive-").unwrap_or(tokens[0]);
        if !matches!(access, "accessible" | "extendable" | "mutable") {
            return Err(format!("unknown access `{}`", tokens[0]));
        }
        let remapped = match tokens[1..] {
            ["class", class] => vec![
                tokens[0].to_owned(),
                "class".to_owned(),
                resolver.map_class(class),
            ],
            ["method", owner, name, desc] => vec![
                tokens[0].to_owned(),
                "method".to_owned(),
                resolver.map_class(owner),
                resolver.map_method_name(owner, name, desc),
                resolver.map_desc(desc),
            ],
            ["field", owner, name, desc] => vec![
                tokens[0].to_owned(),
                "field".to_owned(),
                resolver.map_class(owner),
                resolver.map_field_name(owner, name, desc),
                resolver.map_desc(desc),
            ],
            _ => return Err(format!("malformed entry `{}`", tokens.join(" "))),
        };
        Ok(remapped)
    }
}

impl ResourceRemapper for AccessWidenerRemapper {
    fn can_transform(&self, path: &str) -> bool {
        let name = file_name(path);
        name.ends_with(".accesswidener") || name.ends_with(".aw")
    }

    fn transform(
        &self,
        path: &str,
        text: &str,
        resolver: &SymbolResolver<'_>,
    ) -> Result<String, EngineError> {
        let error = |message: String| EngineError::AccessWidener {
            path: path.to_owned(),
            message,
        };
        let source = resolver.table().from_namespace();
        let target = resolver.table().to_namespace();

        let mut out: Vec<String> = Vec::new();
        let mut header_seen = false;
        for (index, line) in text.lines().enumerate() {
            let (content, comment) = split_comment(line);
            let tokens: Vec<&str> = content.split_whitespace().collect();
            if tokens.is_empty() {
                out.push(line.to_owned());
                continue;
            }

            if !header_seen {
                header_seen = true;
                let [magic, version, namespace] = tokens[..] else {
                    return Err(error(format!("invalid header `{line}`")));
                };
                if magic != "accessWidener" || !matches!(version, "v1" | "v2") {
                    return Err(error(format!("invalid header `{line}`")));
                }
                if namespace != source {
                    if self.ignore_namespace_mismatch {
                        warn!(
                            "Access widener {path} is written for `{namespace}`, expected `{source}`; copying it unchanged"
                        );
                        return Ok(text.to_owned());
                    }
                    return Err(error(format!(
                        "written for namespace `{namespace}` but the input is in `{source}`"
                    )));
                }
                let header = [magic.to_owned(), version.to_owned(), target.to_owned()];
                out.push(rebuild(&header, "\t", comment));
                continue;
            }

            let remapped = Self::remap_entry(&tokens, resolver)
                .map_err(|message| error(format!("line {}: {message}", index + 1)))?;
            out.push(rebuild(&remapped, "\t", comment));
        }

        if !header_seen {
            return Err(error("missing header".to_owned()));
        }
        let mut result = out.join("\n");
        if text.ends_with('\n') {
            result.push('\n');
        }
        Ok(result)
    }
}

/// Remaps Forge-style access transformer files
#[derive(Debug, Clone, Default)]
pub struct AccessTransformerRemapper;

impl AccessTransformerRemapper {
    pub fn new() -> Self {
        Self
    }

    fn remap_line(tokens: &[&str], resolver: &SymbolResolver<'_>) -> Vec<String> {
        let mut remapped = vec![tokens[0].to_owned()];
        let Some(class) = tokens.get(1) else {
            return remapped;
        };
        let owner = class.cow_replace('.', "/");
        let mapped_owner = resolver.map_class(&owner);
        remapped.push(mapped_owner.cow_replace('/', ".").into_owned());

        if let Some(member) = tokens.get(2) {
            let member = if member.starts_with('*') {
                (*member).to_owned()
            } else if let Some(open) = member.find('(') {
                let (name, desc) = member.split_at(open);
                format!(
                    "{}{}",
                    resolver.map_method_name(&owner, name, desc),
                    resolver.map_desc(desc)
                )
            } else {
                resolver
                    .table()
                    .map_field_by_name(&owner, member)
                    .unwrap_or(*member)
                    .to_owned()
            };
            remapped.push(member);
        }
        remapped.extend(tokens.iter().skip(3).map(|token| (*token).to_owned()));
        remapped
    }
}

impl ResourceRemapper for AccessTransformerRemapper {
    fn can_transform(&self, path: &str) -> bool {
        let name = file_name(path);
        name == "accesstransformer.cfg" || name.ends_with("_at.cfg")
    }

    fn transform(
        &self,
        _path: &str,
        text: &str,
        resolver: &SymbolResolver<'_>,
    ) -> Result<String, EngineError> {
        let mut out: Vec<String> = Vec::new();
        for line in text.lines() {
            let (content, comment) = split_comment(line);
            let tokens: Vec<&str> = content.split_whitespace().collect();
            if tokens.is_empty() {
                out.push(line.to_owned());
                continue;
            }
            out.push(rebuild(&Self::remap_line(&tokens, resolver), " ", comment));
        }
        let mut result = out.join("\n");
        if text.ends_with('\n') {
            result.push('\n');
        }
        Ok(result)
    }
}
