//! Resolve phase: run deferred tasks against the class hierarchy.
//!
//! Soft tasks produce reference map entries, keyed by the symbol as written
//! in the annotation. Hard tasks produce member renames. A symbol that cannot
//! be resolved falls back to the class's previously known refmap entry, and
//! failing that is reported as a [`SymbolWarning`].

use cow_utils::CowUtils;
use log::trace;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::{
    annotations::{
        MixinOptions,
        collect::DeferredTask,
        refmap::ClassEntries,
    },
    descriptor::{MemberReference, is_class_name, parameters, return_type},
    engine::MemberRenames,
    error::{Diagnostics, SymbolWarning, WarningKind},
    mapping::{MemberRef, Resolution, ResolveFlags, SymbolResolver},
};

/// `Lowner;name:desc` or `pkg.Owner.name:desc`
static FIELD_TARGET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(L[^;]+;|[^.]+?\.)([^:]+):(.+)$").expect("field target regex must compile"));
/// `Lowner;name(desc)ret` or `pkg.Owner.name(desc)ret`
static METHOD_TARGET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(L[^;]+;|[^.]+?\.)([^(]+)\s*(\(.+)$").expect("method target regex must compile"));

/// Owner part of an `@At` target in internal form
fn owner_of(group: &str) -> String {
    match group.strip_prefix('L').and_then(|body| body.strip_suffix(';')) {
        Some(owner) => owner.to_owned(),
        None => group
            .trim_end_matches('.')
            .cow_replace('.', "/")
            .into_owned(),
    }
}

/// Everything a task needs to resolve one mixin class
#[derive(Debug)]
pub(crate) struct Scope<'a> {
    pub(crate) class: &'a str,
    pub(crate) targets: &'a [String],
    pub(crate) existing: Option<&'a ClassEntries>,
    pub(crate) resolver: &'a SymbolResolver<'a>,
    pub(crate) options: &'a MixinOptions,
    pub(crate) diagnostics: &'a Diagnostics,
}

impl Scope<'_> {
    fn warn(&self, annotation: &str, symbol: &str, kind: WarningKind) {
        self.diagnostics.report(SymbolWarning {
            class: self.class.to_owned(),
            annotation: annotation.to_owned(),
            symbol: symbol.to_owned(),
            kind,
        });
    }

    fn known(&self, key: &str) -> Option<&'_ str> {
        self.existing
            .and_then(|entries| entries.get(key))
            .map(String::as_str)
    }

    /// `L<owner>;` with one target class, nothing with several
    fn qualify(&self, owner: &str) -> String {
        if self.targets.len() > 1 {
            String::new()
        } else {
            format!("L{};", self.resolver.map_class(owner))
        }
    }

    /// Search `owners` in order for a method, then the known mapping
    fn find_method(
        &self,
        owners: &[&str],
        name: &str,
        desc: Option<&str>,
        flags: ResolveFlags,
        key: &str,
    ) -> Resolution<(String, MemberRef)> {
        let mut ambiguous: Option<Vec<MemberRef>> = None;
        for owner in owners {
            match self.resolver.resolve_method(owner, name, desc, flags) {
                Resolution::Found(member) => {
                    return Resolution::Found(((*owner).to_owned(), member));
                }
                Resolution::Ambiguous(candidates) => {
                    ambiguous.get_or_insert(candidates);
                }
                Resolution::NotFound => {}
            }
        }
        if let Some(known) = self.known(key)
            && let Some(found) = self.find_known_method(owners, known)
        {
            trace!("{}: {key} resolved through the existing refmap", self.class);
            return Resolution::Found(found);
        }
        match ambiguous {
            Some(candidates) => Resolution::Ambiguous(
                candidates
                    .into_iter()
                    .map(|member| (member.owner.clone(), member))
                    .collect(),
            ),
            None => Resolution::NotFound,
        }
    }

    fn find_known_method(&self, owners: &[&str], known: &str) -> Option<(String, MemberRef)> {
        let reference = MemberReference::parse_method(known.trim_end_matches('*'));
        let search: Vec<&str> = reference.owner.map_or_else(|| owners.to_vec(), |owner| vec![owner]);
        search.into_iter().find_map(|owner| {
            self.resolver
                .resolve_method(owner, reference.name, reference.desc, ResolveFlags::FIRST_RECURSIVE)
                .found()
                .map(|member| (owner.to_owned(), member))
        })
    }

    fn find_field(&self, owners: &[&str], name: &str, desc: Option<&str>, key: &str) -> Resolution<MemberRef> {
        let mut ambiguous: Option<Vec<MemberRef>> = None;
        for owner in owners {
            match self.resolver.resolve_field(owner, name, desc, ResolveFlags::UNIQUE_RECURSIVE) {
                Resolution::Found(member) => return Resolution::Found(member),
                Resolution::Ambiguous(candidates) => {
                    ambiguous.get_or_insert(candidates);
                }
                Resolution::NotFound => {}
            }
        }
        if let Some(known) = self.known(key) {
            let reference = MemberReference::parse_field(known);
            let search: Vec<&str> = reference.owner.map_or_else(|| owners.to_vec(), |owner| vec![owner]);
            if let Some(member) = search.into_iter().find_map(|owner| {
                self.resolver
                    .resolve_field(owner, reference.name, reference.desc, ResolveFlags::FIRST_RECURSIVE)
                    .found()
            }) {
                return Resolution::Found(member);
            }
        }
        ambiguous.map_or(Resolution::NotFound, Resolution::Ambiguous)
    }

    fn report_failure<T>(
        &self,
        annotation: &str,
        symbol: &str,
        resolution: Resolution<T>,
        describe: impl Fn(&T) -> String,
    ) {
        let kind = match resolution {
            Resolution::Ambiguous(candidates) => WarningKind::Ambiguous {
                candidates: candidates.iter().map(describe).collect(),
            },
            _ => WarningKind::Unresolved,
        };
        self.warn(annotation, symbol, kind);
    }
}

/// Run the target-extending tasks and return their refmap entries
pub(crate) fn resolve_targets(
    scope: &Scope<'_>,
    tasks: &[DeferredTask],
    targets: &mut Vec<String>,
    entries: &mut ClassEntries,
) {
    for task in tasks {
        let DeferredTask::MixinTargets { names } = task else {
            continue;
        };
        for name in names {
            let normalized = name.cow_replace('.', "/").into_owned();
            if scope.resolver.resolve_class(&normalized).is_some() {
                entries.insert(name.clone(), scope.resolver.map_class(&normalized));
            } else if let Some(known) = scope.known(name)
                && scope.resolver.resolve_class(known).is_some()
            {
                entries.insert(name.clone(), scope.resolver.map_class(known));
            } else {
                scope.warn("@Mixin", name, WarningKind::Unresolved);
            }
            if !targets.contains(&normalized) {
                targets.push(normalized);
            }
        }
    }
}

/// Run soft tasks, adding to `entries`
pub(crate) fn resolve_soft(scope: &Scope<'_>, tasks: &[DeferredTask], entries: &mut ClassEntries) {
    for task in tasks {
        match task {
            DeferredTask::MixinTargets { .. } => {}
            DeferredTask::MethodTargets {
                annotation,
                targets,
            } => {
                for target in targets {
                    resolve_method_target(scope, annotation, target, entries);
                }
            }
            DeferredTask::At {
                annotation,
                target,
                args,
            } => {
                if let Some(target) = target {
                    resolve_at_target(scope, annotation, target, entries);
                }
                for arg in args {
                    resolve_class_arg(scope, annotation, arg, entries);
                }
            }
            DeferredTask::Accessor { names, desc } => resolve_accessor(scope, names, desc, entries),
            DeferredTask::Invoker { names, desc } => resolve_invoker(scope, names, desc, entries),
            DeferredTask::Shadow { .. } | DeferredTask::Overwrite { .. } => {}
        }
    }
}

fn resolve_method_target(scope: &Scope<'_>, annotation: &str, target: &str, entries: &mut ClassEntries) {
    if matches!(target, "<init>" | "<clinit>" | "<init>*") {
        return;
    }
    let wildcard = target.ends_with('*');
    let reference = MemberReference::parse_method(target.trim_end_matches('*'));

    let owners: Vec<&str> = match reference.owner {
        Some(owner) => {
            if !scope.targets.iter().any(|target| target == owner) {
                scope.warn(annotation, target, WarningKind::ForeignOwner);
            }
            vec![owner]
        }
        None => scope.targets.iter().map(String::as_str).collect(),
    };
    let implicit = reference.desc.is_none() && scope.options.allow_implicit_wildcards;
    let flags = if wildcard || implicit {
        ResolveFlags::FIRST_RECURSIVE
    } else {
        ResolveFlags::UNIQUE_RECURSIVE
    };

    match scope.find_method(&owners, reference.name, reference.desc, flags, target) {
        Resolution::Found((owner, member)) => {
            let name = scope
                .resolver
                .map_method_name(&member.owner, &member.name, &member.desc);
            let desc = if wildcard && name != "<clinit>" {
                "*".to_owned()
            } else {
                scope.resolver.map_desc(&member.desc)
            };
            let value = format!("{}{name}{desc}", scope.qualify(&owner));
            trace!("{}: {target} -> {value}", scope.class);
            entries.insert(target.to_owned(), value);
        }
        failed => scope.report_failure(annotation, target, failed, |(_, member)| member.to_string()),
    }
}

fn resolve_at_target(scope: &Scope<'_>, annotation: &str, target: &str, entries: &mut ClassEntries) {
    let resolver = scope.resolver;
    if let Some(captures) = FIELD_TARGET.captures(target) {
        let owner = owner_of(&captures[1]);
        let (name, desc) = (&captures[2], &captures[3]);
        match scope.find_field(&[owner.as_str()], name, Some(desc), target) {
            Resolution::Found(member) => {
                entries.insert(
                    target.to_owned(),
                    format!(
                        "L{};{}:{}",
                        resolver.map_class(&owner),
                        resolver.map_field_name(&member.owner, &member.name, &member.desc),
                        resolver.map_desc(&member.desc)
                    ),
                );
            }
            failed => scope.report_failure(annotation, target, failed, ToString::to_string),
        }
    } else if let Some(captures) = METHOD_TARGET.captures(target) {
        let owner = owner_of(&captures[1]);
        let (name, desc) = (captures[2].trim(), &captures[3]);
        match scope.find_method(
            &[owner.as_str()],
            name,
            Some(desc),
            ResolveFlags::UNIQUE_RECURSIVE,
            target,
        ) {
            Resolution::Found((_, member)) => {
                entries.insert(
                    target.to_owned(),
                    format!(
                        "L{};{}{}",
                        resolver.map_class(&owner),
                        resolver.map_method_name(&member.owner, &member.name, &member.desc),
                        resolver.map_desc(&member.desc)
                    ),
                );
            }
            failed => scope.report_failure(annotation, target, failed, |(_, member)| member.to_string()),
        }
    } else if target.starts_with('(') {
        let mapped = resolver.map_desc(target);
        if mapped != target {
            entries.insert(target.to_owned(), mapped);
        }
    } else {
        let (class, wrapped) = match target.strip_prefix('L').and_then(|body| body.strip_suffix(';')) {
            Some(class) => (class.cow_replace('.', "/"), true),
            None => (target.cow_replace('.', "/"), false),
        };
        if is_class_name(&class) && resolver.resolve_class(&class).is_some() {
            let mapped = resolver.map_class(&class);
            let value = if wrapped { format!("L{mapped};") } else { mapped };
            entries.insert(target.to_owned(), value);
        } else if let Some(known) = scope.known(target) {
            entries.insert(target.to_owned(), known.to_owned());
        } else {
            scope.warn(annotation, target, WarningKind::Unresolved);
        }
    }
}

fn resolve_class_arg(scope: &Scope<'_>, annotation: &str, arg: &str, entries: &mut ClassEntries) {
    let Some(class) = arg.strip_prefix("class=") else {
        return;
    };
    let normalized = class.cow_replace('.', "/");
    if scope.resolver.resolve_class(&normalized).is_some() {
        entries.insert(class.to_owned(), scope.resolver.map_class(&normalized));
    } else if let Some(known) = scope.known(class) {
        entries.insert(class.to_owned(), known.to_owned());
    } else {
        scope.warn(annotation, arg, WarningKind::Unresolved);
    }
}

/// `()X` reads a field of type `X`, `(X)V` writes one
fn accessor_field_desc(method_desc: &str) -> Option<&str> {
    if method_desc.starts_with("()") {
        return_type(method_desc)
    } else {
        parameters(method_desc)
    }
}

fn resolve_accessor(scope: &Scope<'_>, names: &[String], method_desc: &str, entries: &mut ClassEntries) {
    let desc = accessor_field_desc(method_desc);
    let owners: Vec<&str> = scope.targets.iter().map(String::as_str).collect();
    let mut last = Resolution::NotFound;
    for name in names {
        match scope.find_field(&owners, name, desc, name) {
            Resolution::Found(member) => {
                let value = format!(
                    "{}:{}",
                    scope
                        .resolver
                        .map_field_name(&member.owner, &member.name, &member.desc),
                    scope.resolver.map_desc(&member.desc)
                );
                if name.chars().count() == 1 {
                    entries.insert(name.to_uppercase(), value.clone());
                }
                entries.insert(name.clone(), value);
                return;
            }
            other => last = other,
        }
    }
    let symbol = names.first().map_or("", String::as_str);
    scope.report_failure("@Accessor", symbol, last, ToString::to_string);
}

fn resolve_invoker(scope: &Scope<'_>, names: &[String], method_desc: &str, entries: &mut ClassEntries) {
    let owners: Vec<&str> = scope.targets.iter().map(String::as_str).collect();
    let mut last = Resolution::NotFound;
    for name in names {
        let desc = if name == "<init>" {
            parameters(method_desc).map_or_else(|| method_desc.to_owned(), |params| format!("({params})V"))
        } else {
            method_desc.to_owned()
        };
        match scope.find_method(&owners, name, Some(desc.as_str()), ResolveFlags::UNIQUE_RECURSIVE, name) {
            Resolution::Found((_, member)) => {
                let mapped = scope
                    .resolver
                    .map_method_name(&member.owner, &member.name, &member.desc);
                let mapped_desc = if mapped == "<init>" {
                    String::new()
                } else {
                    scope.resolver.map_desc(&member.desc)
                };
                entries.insert(name.clone(), format!("{mapped}{mapped_desc}"));
                return;
            }
            other => last = other,
        }
    }
    let symbol = names.first().map_or("", String::as_str);
    scope.report_failure("@Invoker", symbol, last, |(_, member)| member.to_string());
}

/// Run hard tasks, recording member renames for the mixin class itself
pub(crate) fn resolve_hard(scope: &Scope<'_>, tasks: &[DeferredTask], renames: &mut MemberRenames) {
    let owners: Vec<&str> = scope.targets.iter().map(String::as_str).collect();
    for task in tasks {
        match task {
            DeferredTask::Shadow {
                name,
                desc,
                is_method,
                prefix,
            } => {
                let (bare, prefixed) = match name.strip_prefix(prefix.as_str()) {
                    Some(bare) if !prefix.is_empty() => (bare, true),
                    _ => (name.as_str(), false),
                };
                let resolution = if *is_method {
                    match scope.find_method(&owners, bare, Some(desc.as_str()), ResolveFlags::UNIQUE_RECURSIVE, name) {
                        Resolution::Found((_, member)) => Resolution::Found(member),
                        Resolution::Ambiguous(found) => {
                            Resolution::Ambiguous(found.into_iter().map(|(_, member)| member).collect())
                        }
                        Resolution::NotFound => Resolution::NotFound,
                    }
                } else {
                    scope.find_field(&owners, bare, Some(desc.as_str()), name)
                };
                match resolution {
                    Resolution::Found(member) => {
                        let mapped = scope.resolver.map_member_name(&member, *is_method);
                        let renamed = if prefixed { format!("{prefix}{mapped}") } else { mapped };
                        trace!("{}: @Shadow {name} -> {renamed}", scope.class);
                        let shadow = MemberRef::new(scope.class, name.as_str(), desc.as_str());
                        if *is_method {
                            renames.rename_method(shadow, renamed);
                        } else {
                            renames.rename_field(shadow, renamed);
                        }
                    }
                    failed => scope.report_failure("@Shadow", name, failed, ToString::to_string),
                }
            }
            DeferredTask::Overwrite { name, desc } => {
                match scope.find_method(&owners, name, Some(desc.as_str()), ResolveFlags::UNIQUE_RECURSIVE, name) {
                    Resolution::Found((_, member)) => {
                        let mapped = scope.resolver.map_member_name(&member, true);
                        renames.rename_method(MemberRef::new(scope.class, name.as_str(), desc.as_str()), mapped);
                    }
                    failed => {
                        scope.report_failure("@Overwrite", name, failed, |(_, member)| member.to_string());
                    }
                }
            }
            _ => {}
        }
    }
}
