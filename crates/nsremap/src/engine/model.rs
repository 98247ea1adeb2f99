//! Reference engine over the class-structure model

use std::{path::Path, sync::Arc};

use log::{debug, trace};
use rayon::prelude::*;

use crate::{
    classfile::{Annotation, AnnotationValue, Archive, ClassNode, Entry, FieldNode, MethodNode},
    descriptor::object_type,
    engine::{ClassExtension, MemberRenames, ResourceRemapper, RewriteEngine, RewriteSession},
    error::EngineError,
    mapping::{ClassHierarchy, MappingTable, SymbolResolver},
};

/// Rewrites [`Archive`]s, spreading per-class work over a rayon pool
#[derive(Debug, Clone, Default)]
pub struct ModelEngine {
    /// Worker threads per session; 0 uses one per available CPU
    threads: usize,
}

impl ModelEngine {
    pub fn new(threads: usize) -> Self {
        Self { threads }
    }
}

impl RewriteEngine for ModelEngine {
    fn open(&self, table: Arc<MappingTable>) -> Box<dyn RewriteSession + '_> {
        debug!(
            "Opening rewrite session {} -> {}",
            table.from_namespace(),
            table.to_namespace()
        );
        Box::new(ModelSession {
            threads: self.threads,
            table,
            extensions: Vec::new(),
            resources: Vec::new(),
            classpath: Vec::new(),
            inputs: Vec::new(),
        })
    }
}

#[derive(Debug)]
struct ModelSession {
    threads: usize,
    table: Arc<MappingTable>,
    extensions: Vec<Arc<dyn ClassExtension>>,
    resources: Vec<Box<dyn ResourceRemapper>>,
    classpath: Vec<Archive>,
    inputs: Vec<Archive>,
}

impl RewriteSession for ModelSession {
    fn attach_extension(&mut self, extension: Arc<dyn ClassExtension>) {
        self.extensions.push(extension);
    }

    fn attach_resource_remapper(&mut self, remapper: Box<dyn ResourceRemapper>) {
        self.resources.push(remapper);
    }

    fn read_classpath(&mut self, path: &Path) -> Result<(), EngineError> {
        self.classpath.push(Archive::read(path)?);
        Ok(())
    }

    fn read_input(&mut self, path: &Path) -> Result<(), EngineError> {
        self.inputs.push(Archive::read(path)?);
        Ok(())
    }

    fn apply(&mut self, output: &Path) -> Result<(), EngineError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .build()
            .map_err(|err| EngineError::ThreadPool {
                message: err.to_string(),
            })?;

        let hierarchy = ClassHierarchy::from_classes(
            self.inputs
                .iter()
                .chain(&self.classpath)
                .flat_map(Archive::classes),
        );
        let resolver = SymbolResolver::new(&self.table, &hierarchy);
        let classes: Vec<&ClassNode> = self.inputs.iter().flat_map(Archive::classes).collect();
        debug!(
            "Rewriting {} classes against a hierarchy of {} on {} threads",
            classes.len(),
            hierarchy.len(),
            pool.current_num_threads()
        );

        for extension in &self.extensions {
            extension.read_inputs(&self.inputs)?;
        }
        pool.install(|| {
            classes.par_iter().for_each(|class| {
                for extension in &self.extensions {
                    extension.analyze(class);
                }
            });
        });

        let mut renames = MemberRenames::new();
        for extension in &self.extensions {
            extension.process_state(&resolver, &mut renames);
        }
        if !renames.is_empty() {
            debug!("Applying {} explicit member renames", renames.len());
        }

        pool.install(|| {
            classes.par_iter().for_each(|class| {
                for extension in &self.extensions {
                    extension.pre_apply(class, &resolver);
                }
            });
        });

        let mut archive = Archive::new();
        for input in &self.inputs {
            let entries: Vec<(&String, &Entry)> = input.entries.iter().collect();
            let rewritten = pool.install(|| {
                entries
                    .par_iter()
                    .map(|(path, entry)| self.rewrite_entry(path, entry, &resolver, &renames))
                    .collect::<Result<Vec<_>, EngineError>>()
            })?;
            archive.entries.extend(rewritten);
        }

        for extension in &self.extensions {
            extension.insert_extra(&mut archive)?;
        }
        archive.write(output)
    }

    fn finish(self: Box<Self>) {
        trace!(
            "Closing rewrite session {} -> {}",
            self.table.from_namespace(),
            self.table.to_namespace()
        );
    }
}

impl ModelSession {
    fn rewrite_entry(
        &self,
        path: &str,
        entry: &Entry,
        resolver: &SymbolResolver<'_>,
        renames: &MemberRenames,
    ) -> Result<(String, Entry), EngineError> {
        match entry {
            Entry::Class(class) => {
                let rewritten = rewrite_class(class, resolver, renames);
                trace!("{} -> {}", class.name, rewritten.name);
                Ok((rewritten.entry_path(), Entry::Class(rewritten)))
            }
            Entry::Text(text) => {
                match self
                    .resources
                    .iter()
                    .find(|remapper| remapper.can_transform(path))
                {
                    Some(remapper) => Ok((
                        path.to_owned(),
                        Entry::Text(remapper.transform(path, text, resolver)?),
                    )),
                    None => Ok((path.to_owned(), entry.clone())),
                }
            }
            Entry::Binary(_) => Ok((path.to_owned(), entry.clone())),
        }
    }
}

fn rewrite_class(class: &ClassNode, resolver: &SymbolResolver<'_>, renames: &MemberRenames) -> ClassNode {
    let owner = class.name.as_str();
    ClassNode {
        name: resolver.map_class(owner),
        access: class.access,
        super_name: class.super_name.as_deref().map(|name| resolver.map_class(name)),
        interfaces: class
            .interfaces
            .iter()
            .map(|name| resolver.map_class(name))
            .collect(),
        annotations: rewrite_annotations(&class.annotations, resolver),
        fields: class
            .fields
            .iter()
            .map(|field| FieldNode {
                access: field.access,
                name: renames
                    .field(owner, &field.name, &field.desc)
                    .map_or_else(
                        || resolver.map_field_name(owner, &field.name, &field.desc),
                        str::to_owned,
                    ),
                desc: resolver.map_desc(&field.desc),
                annotations: rewrite_annotations(&field.annotations, resolver),
            })
            .collect(),
        methods: class
            .methods
            .iter()
            .map(|method| MethodNode {
                access: method.access,
                name: renames
                    .method(owner, &method.name, &method.desc)
                    .map_or_else(
                        || resolver.map_method_name(owner, &method.name, &method.desc),
                        str::to_owned,
                    ),
                desc: resolver.map_desc(&method.desc),
                annotations: rewrite_annotations(&method.annotations, resolver),
            })
            .collect(),
    }
}

fn rewrite_annotations(annotations: &[Annotation], resolver: &SymbolResolver<'_>) -> Vec<Annotation> {
    annotations
        .iter()
        .map(|annotation| rewrite_annotation(annotation, resolver))
        .collect()
}

/// Class literals and enum constants are rewritten; strings are left to the
/// reference map
fn rewrite_annotation(annotation: &Annotation, resolver: &SymbolResolver<'_>) -> Annotation {
    Annotation {
        desc: resolver.map_desc(&annotation.desc),
        values: annotation
            .values
            .iter()
            .map(|(name, value)| (name.clone(), rewrite_value(value, resolver)))
            .collect(),
    }
}

fn rewrite_value(value: &AnnotationValue, resolver: &SymbolResolver<'_>) -> AnnotationValue {
    match value {
        AnnotationValue::Type(desc) => AnnotationValue::Type(resolver.map_desc(desc)),
        AnnotationValue::Enum { desc, value } => AnnotationValue::Enum {
            desc: resolver.map_desc(desc),
            value: object_type(desc).map_or_else(
                || value.clone(),
                |owner| resolver.map_field_name(owner, value, desc),
            ),
        },
        AnnotationValue::Array(values) => AnnotationValue::Array(
            values
                .iter()
                .map(|value| rewrite_value(value, resolver))
                .collect(),
        ),
        AnnotationValue::Annotation(nested) => {
            AnnotationValue::Annotation(rewrite_annotation(nested, resolver))
        }
        other => other.clone(),
    }
}
