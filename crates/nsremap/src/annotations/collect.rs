//! Collect phase: turn a class's annotations into deferred resolution tasks.
//!
//! Nothing is resolved here. Collection only needs the class itself, so it
//! runs for every class in parallel; resolution waits until the whole input
//! has been seen.

use cow_utils::CowUtils;
use log::trace;

use crate::{
    annotations::{
        refmap::ClassEntries,
        registry::{AnnotationRegistry, Handler, Rule, Site},
    },
    classfile::{Annotation, AnnotationValue, ClassNode},
    descriptor::object_type,
};

/// Whether a task feeds the refmap or renames a member
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Soft,
    Hard,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DeferredTask {
    /// String targets of `@Mixin`; extends the target class list
    MixinTargets { names: Vec<String> },
    MethodTargets {
        annotation: &'static str,
        targets: Vec<String>,
    },
    At {
        annotation: &'static str,
        target: Option<String>,
        args: Vec<String>,
    },
    Accessor {
        /// Candidate field names, most likely first
        names: Vec<String>,
        desc: String,
    },
    Invoker {
        names: Vec<String>,
        desc: String,
    },
    Shadow {
        name: String,
        desc: String,
        is_method: bool,
        prefix: String,
    },
    Overwrite { name: String, desc: String },
}

impl DeferredTask {
    /// Lower runs first
    pub(crate) fn priority(&self) -> u8 {
        match self {
            Self::MixinTargets { .. } => 0,
            _ => 1,
        }
    }

    pub(crate) fn phase(&self) -> Phase {
        match self {
            Self::Shadow { .. } | Self::Overwrite { .. } => Phase::Hard,
            _ => Phase::Soft,
        }
    }
}

/// Per-class state between collection and resolution
#[derive(Debug, Clone)]
pub(crate) struct ClassContext {
    pub(crate) class: String,
    /// Target classes in the source namespace; string targets are added
    /// when their task runs
    pub(crate) targets: Vec<String>,
    pub(crate) tasks: Vec<DeferredTask>,
    /// Refmap entries resolved ahead of the class's own soft tasks
    pub(crate) entries: ClassEntries,
}

impl ClassContext {
    fn push(&mut self, task: DeferredTask) {
        trace!("{}: deferred {task:?}", self.class);
        self.tasks.push(task);
    }

    /// Remove and return the matching tasks, in priority order
    pub(crate) fn drain(&mut self, filter: impl Fn(&DeferredTask) -> bool) -> Vec<DeferredTask> {
        let (mut taken, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.tasks)
            .into_iter()
            .partition(|task| filter(task));
        self.tasks = kept;
        taken.sort_by_key(DeferredTask::priority);
        taken
    }
}

/// Build the context of a mixin class, or `None` for any other class.
///
/// A class is a mixin when one of its annotations is registered at
/// [`Site::Class`] as declaring mixin targets.
pub(crate) fn collect(registry: &AnnotationRegistry, class: &ClassNode) -> Option<ClassContext> {
    let mixin = class.annotations.iter().find(|annotation| {
        registry
            .lookup(Site::Class, annotation)
            .is_some_and(|rule| rule.handler == Handler::MixinTargets)
    })?;
    let remap = mixin.remap(true);

    let mut context = ClassContext {
        class: class.name.clone(),
        targets: mixin
            .get("value")
            .map(|value| {
                value
                    .elements()
                    .iter()
                    .filter_map(|element| match element {
                        AnnotationValue::Type(desc) => object_type(desc).map(str::to_owned),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default(),
        tasks: Vec::new(),
        entries: ClassEntries::new(),
    };

    let names: Vec<String> = mixin
        .strings("targets")
        .into_iter()
        .map(str::to_owned)
        .collect();
    if !names.is_empty() {
        if remap {
            context.push(DeferredTask::MixinTargets { names });
        } else {
            // still targets, just not remapped
            context
                .targets
                .extend(names.iter().map(|name| name.cow_replace('.', "/").into_owned()));
        }
    }

    for field in &class.fields {
        for annotation in &field.annotations {
            let Some(rule) = registry.lookup(Site::Field, annotation) else {
                continue;
            };
            let remap = annotation.remap(remap);
            collect_field(&mut context, rule, annotation, &field.name, &field.desc, remap);
        }
    }

    for method in &class.methods {
        for annotation in &method.annotations {
            let Some(rule) = registry.lookup(Site::Method, annotation) else {
                continue;
            };
            let remap = annotation.remap(remap);
            collect_method(&mut context, rule, annotation, &method.name, &method.desc, remap);
        }
    }
    Some(context)
}

fn shadow_prefix(annotation: &Annotation) -> String {
    annotation
        .get("prefix")
        .and_then(AnnotationValue::as_str)
        .unwrap_or("shadow$")
        .to_owned()
}

fn collect_field(
    context: &mut ClassContext,
    rule: &Rule,
    annotation: &Annotation,
    name: &str,
    desc: &str,
    remap: bool,
) {
    match rule.handler {
        Handler::Shadow if remap => context.push(DeferredTask::Shadow {
            name: name.to_owned(),
            desc: desc.to_owned(),
            is_method: false,
            prefix: shadow_prefix(annotation),
        }),
        Handler::Shadow => {}
        handler => trace!(
            "{}: {} on field {name} has no field handler ({handler:?})",
            context.class, rule.name
        ),
    }
}

fn collect_method(
    context: &mut ClassContext,
    rule: &Rule,
    annotation: &Annotation,
    name: &str,
    desc: &str,
    remap: bool,
) {
    match rule.handler {
        Handler::Injector => {
            if remap {
                push_method_targets(context, rule.name, annotation);
            }
            for at in annotation.annotations("at") {
                push_at(context, "@At", at, remap);
            }
            for slice in annotation.annotations("slice") {
                for at in slice
                    .annotations("from")
                    .into_iter()
                    .chain(slice.annotations("to"))
                {
                    push_at(context, "@Slice", at, slice.remap(remap));
                }
            }
        }
        Handler::MethodTarget if remap => push_method_targets(context, rule.name, annotation),
        Handler::Accessor if remap => context.push(DeferredTask::Accessor {
            names: accessor_names(annotation, name),
            desc: desc.to_owned(),
        }),
        Handler::Invoker if remap => context.push(DeferredTask::Invoker {
            names: invoker_names(annotation, name),
            desc: desc.to_owned(),
        }),
        Handler::Shadow if remap => context.push(DeferredTask::Shadow {
            name: name.to_owned(),
            desc: desc.to_owned(),
            is_method: true,
            prefix: shadow_prefix(annotation),
        }),
        Handler::Overwrite if remap => context.push(DeferredTask::Overwrite {
            name: name.to_owned(),
            desc: desc.to_owned(),
        }),
        _ => {}
    }
}

fn push_method_targets(context: &mut ClassContext, kind: &'static str, annotation: &Annotation) {
    let targets: Vec<String> = annotation
        .strings("method")
        .into_iter()
        .map(str::to_owned)
        .collect();
    if !targets.is_empty() {
        context.push(DeferredTask::MethodTargets {
            annotation: kind,
            targets,
        });
    }
}

fn push_at(context: &mut ClassContext, kind: &'static str, at: &Annotation, inherited: bool) {
    if !at.remap(inherited) {
        return;
    }
    let target = at
        .get("target")
        .and_then(AnnotationValue::as_str)
        .map(str::to_owned);
    let args: Vec<String> = at
        .strings("args")
        .into_iter()
        .filter(|arg| arg.starts_with("class="))
        .map(str::to_owned)
        .collect();
    if target.is_some() || !args.is_empty() {
        context.push(DeferredTask::At {
            annotation: kind,
            target,
            args,
        });
    }
}

/// `getFoo` -> `foo`, `Foo`; an explicit value wins
fn accessor_names(annotation: &Annotation, method: &str) -> Vec<String> {
    if let Some(value) = annotation.get("value").and_then(AnnotationValue::as_str)
        && !value.is_empty()
    {
        return vec![value.to_owned()];
    }
    let stem = ["get", "is", "set"]
        .iter()
        .find_map(|prefix| method.strip_prefix(prefix))
        .filter(|stem| !stem.is_empty())
        .unwrap_or(method);
    let mut names = vec![decapitalize(stem)];
    if names[0] != stem {
        names.push(stem.to_owned());
    }
    names
}

/// `callFoo` -> `foo`; `newFoo` and `createFoo` name the constructor
fn invoker_names(annotation: &Annotation, method: &str) -> Vec<String> {
    if let Some(value) = annotation.get("value").and_then(AnnotationValue::as_str)
        && !value.is_empty()
    {
        return vec![value.to_owned()];
    }
    if ["new", "create"]
        .iter()
        .any(|prefix| method.strip_prefix(prefix).is_some_and(|stem| !stem.is_empty()))
    {
        return vec!["<init>".to_owned()];
    }
    let stem = ["call", "invoke"]
        .iter()
        .find_map(|prefix| method.strip_prefix(prefix))
        .filter(|stem| !stem.is_empty())
        .unwrap_or(method);
    let mut names = vec![decapitalize(stem)];
    if names[0] != stem {
        names.push(stem.to_owned());
    }
    names
}

fn decapitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}
