use std::{collections::BTreeMap, sync::Arc};

use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

use crate::{
    annotations::{
        MixinOptions,
        collect::{ClassContext, Phase, collect},
        metadata::MixinMetadata,
        refmap::{ClassEntries, RefmapStore, ReferenceMap},
        registry::AnnotationRegistry,
        resolve::{Scope, resolve_hard, resolve_soft, resolve_targets},
    },
    classfile::{Archive, ClassNode},
    engine::{ClassExtension, MemberRenames},
    error::{Diagnostics, EngineError, SymbolWarning, WarningKind},
    mapping::SymbolResolver,
};

/// Reference map builder and hard-target remapper for one hop
#[derive(Debug)]
pub struct MixinRemapExtension {
    registry: AnnotationRegistry,
    options: MixinOptions,
    diagnostics: Arc<Diagnostics>,
    metadata: RwLock<MixinMetadata>,
    contexts: Mutex<FxHashMap<String, ClassContext>>,
    refmaps: RefmapStore,
}

impl MixinRemapExtension {
    pub fn new(options: MixinOptions, diagnostics: Arc<Diagnostics>) -> Self {
        Self::with_registry(AnnotationRegistry::standard(options.extras), options, diagnostics)
    }

    pub fn with_registry(
        registry: AnnotationRegistry,
        options: MixinOptions,
        diagnostics: Arc<Diagnostics>,
    ) -> Self {
        Self {
            registry,
            metadata: RwLock::new(MixinMetadata::new(options.default_refmap.clone())),
            options,
            diagnostics,
            contexts: Mutex::new(FxHashMap::default()),
            refmaps: RefmapStore::new(),
        }
    }

    pub fn diagnostics(&self) -> &Arc<Diagnostics> {
        &self.diagnostics
    }

    /// Reference maps built so far, by file name
    pub fn reference_maps(&self) -> BTreeMap<String, ReferenceMap> {
        self.refmaps.snapshot()
    }

    fn extension_error(message: String) -> EngineError {
        EngineError::Extension {
            extension: "mixin",
            message,
        }
    }
}

impl ClassExtension for MixinRemapExtension {
    fn name(&self) -> &'static str {
        "mixin"
    }

    fn read_inputs(&self, inputs: &[Archive]) -> Result<(), EngineError> {
        *self.metadata.write() = MixinMetadata::read(self.options.default_refmap.clone(), inputs)?;
        self.contexts.lock().clear();
        self.refmaps.clear();
        Ok(())
    }

    fn analyze(&self, class: &ClassNode) {
        let Some(context) = collect(&self.registry, class) else {
            return;
        };
        if !self.metadata.read().contains(&class.name) {
            self.diagnostics.report(SymbolWarning {
                class: class.name.clone(),
                annotation: "@Mixin".to_owned(),
                symbol: class.name.clone(),
                kind: WarningKind::UnlistedMixin,
            });
        }
        debug!(
            "Found mixin {} with {} targets and {} deferred tasks",
            class.name,
            context.targets.len(),
            context.tasks.len()
        );
        self.contexts.lock().insert(class.name.clone(), context);
    }

    fn process_state(&self, resolver: &SymbolResolver<'_>, renames: &mut MemberRenames) {
        let metadata = self.metadata.read();
        let mut contexts = self.contexts.lock();
        let mut names: Vec<String> = contexts.keys().cloned().collect();
        names.sort_unstable();

        for name in names {
            let Some(context) = contexts.get_mut(&name) else {
                continue;
            };
            let early = context.drain(|task| task.priority() == 0);
            let hard = context.drain(|task| task.phase() == Phase::Hard);

            let mut targets = std::mem::take(&mut context.targets);
            let scope = Scope {
                class: &name,
                targets: &[],
                existing: metadata.existing(&name),
                resolver,
                options: &self.options,
                diagnostics: &self.diagnostics,
            };
            resolve_targets(&scope, &early, &mut targets, &mut context.entries);

            let scope = Scope {
                targets: &targets,
                ..scope
            };
            resolve_hard(&scope, &hard, renames);
            context.targets = targets;
        }
    }

    fn pre_apply(&self, class: &ClassNode, resolver: &SymbolResolver<'_>) {
        let Some(mut context) = self.contexts.lock().remove(&class.name) else {
            return;
        };
        let metadata = self.metadata.read();
        let tasks = context.drain(|_| true);
        let mut entries: ClassEntries = std::mem::take(&mut context.entries);
        let scope = Scope {
            class: &context.class,
            targets: &context.targets,
            existing: metadata.existing(&class.name),
            resolver,
            options: &self.options,
            diagnostics: &self.diagnostics,
        };
        resolve_soft(&scope, &tasks, &mut entries);

        if !entries.is_empty() {
            let file = metadata.refmap_for(&class.name);
            debug!("Adding {} refmap entries for {} to {file}", entries.len(), class.name);
            self.refmaps.add(file, &class.name, entries);
        }
    }

    fn insert_extra(&self, output: &mut Archive) -> Result<(), EngineError> {
        let metadata = self.metadata.read();
        for (path, config) in metadata.configs() {
            let text = serde_json::to_string_pretty(config)
                .map_err(|err| Self::extension_error(format!("cannot write {path}: {err}")))?;
            output.insert_text(path, text);
        }
        let mut written = self.refmaps.snapshot();
        for (file, stale) in metadata.existing_refmaps() {
            if !written.contains_key(file) {
                warn!(
                    "Refmap {file} had {} entries but none resolved in this hop; writing it empty",
                    stale.len()
                );
                written.insert(file.to_owned(), ReferenceMap::new());
            }
        }
        for (file, refmap) in written {
            info!("Writing refmap {file} with {} entries", refmap.len());
            let text = refmap
                .to_json()
                .map_err(|err| Self::extension_error(format!("cannot write {file}: {err}")))?;
            output.insert_text(file, text);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        annotations::registry::{
            ACCESSOR, AT, INJECT, INVOKER, MIXIN, MODIFY_ARGS, OVERWRITE, SHADOW, SLICE,
        },
        classfile::{Annotation, AnnotationValue, FieldNode, MethodNode},
        error::RemapError,
        mapping::{ClassHierarchy, MappingTable},
    };

    const LEVEL: &str = "net/minecraft/world/Level";
    const ENTITY: &str = "net/minecraft/world/Entity";
    const LEVEL_MIXIN: &str = "com/example/mixin/LevelMixin";
    const MULTI_MIXIN: &str = "com/example/mixin/MultiMixin";
    const SERVER: &str = "net/minecraft/server/Server";
    const SERVER_MIXIN: &str = "com/example/mixin/ServerMixin";
    const REFMAP: &str = "mod.mixins-refmap.json";

    fn string(value: &str) -> AnnotationValue {
        AnnotationValue::String(value.to_owned())
    }

    fn field(name: &str, desc: &str, annotations: Vec<Annotation>) -> FieldNode {
        FieldNode {
            name: name.to_owned(),
            desc: desc.to_owned(),
            annotations,
            ..FieldNode::default()
        }
    }

    fn method(name: &str, desc: &str, annotations: Vec<Annotation>) -> MethodNode {
        MethodNode {
            name: name.to_owned(),
            desc: desc.to_owned(),
            annotations,
            ..MethodNode::default()
        }
    }

    fn inject(target: &str) -> Annotation {
        Annotation::new(INJECT).with("method", string(target))
    }

    fn at(target: &str) -> AnnotationValue {
        AnnotationValue::Annotation(Annotation::new(AT).with("target", string(target)))
    }

    fn mixin(name: &str, targets: &[&str]) -> ClassNode {
        let mut class = ClassNode::new(name);
        class.annotations.push(Annotation::new(MIXIN).with(
            "value",
            AnnotationValue::Array(
                targets
                    .iter()
                    .map(|target| AnnotationValue::Type(format!("L{target};")))
                    .collect(),
            ),
        ));
        class
    }

    fn game_classes() -> Vec<ClassNode> {
        let mut level = ClassNode::new(LEVEL);
        level.fields.push(field("player", "Lnet/minecraft/world/Entity;", vec![]));
        level.methods.push(method("<init>", "(I)V", vec![]));
        level.methods.push(method("tick", "()V", vec![]));
        level.methods.push(method("addEntity", "(Lnet/minecraft/world/Entity;)V", vec![]));
        let mut entity = ClassNode::new(ENTITY);
        entity.fields.push(field("x", "I", vec![]));
        entity.methods.push(method("tick", "()V", vec![]));
        let mut server = ClassNode::new(SERVER);
        server.methods.push(method("spawn", "(I)V", vec![]));
        server.methods.push(method("spawn", "(Ljava/lang/String;)V", vec![]));
        vec![level, entity, server]
    }

    fn table() -> MappingTable {
        let mut table = MappingTable::new("named", "intermediary");
        table.insert_class(LEVEL, "net/minecraft/class_1");
        table.insert_class(ENTITY, "net/minecraft/class_2");
        table.insert_field(LEVEL, "player", "Lnet/minecraft/world/Entity;", "field_3");
        table.insert_method(LEVEL, "tick", "()V", "method_4");
        table.insert_method(LEVEL, "addEntity", "(Lnet/minecraft/world/Entity;)V", "method_5");
        table.insert_method(ENTITY, "tick", "()V", "method_6");
        table.insert_field(ENTITY, "x", "I", "field_8");
        table.insert_class(SERVER, "net/minecraft/class_10");
        table.insert_method(SERVER, "spawn", "(I)V", "method_11");
        table.insert_method(SERVER, "spawn", "(Ljava/lang/String;)V", "method_12");
        table
    }

    struct Run {
        extension: MixinRemapExtension,
        renames: MemberRenames,
        output: Archive,
    }

    fn run(mixins: Vec<ClassNode>, texts: &[(&str, &str)]) -> Run {
        run_with(MixinOptions::default(), mixins, texts)
    }

    /// Drive the extension hooks the way a session does
    fn run_with(options: MixinOptions, mixins: Vec<ClassNode>, texts: &[(&str, &str)]) -> Run {
        let mut input = Archive::new();
        for class in game_classes().into_iter().chain(mixins.iter().cloned()) {
            input.insert_class(class);
        }
        input.insert_text(
            "mod.mixins.json",
            r#"{"package": "com.example.mixin", "mixins": ["LevelMixin", "MultiMixin", "ServerMixin"]}"#,
        );
        for (path, text) in texts {
            input.insert_text(*path, *text);
        }

        let extension = MixinRemapExtension::new(options, Arc::new(Diagnostics::new()));
        let inputs = [input];
        extension.read_inputs(&inputs).unwrap();
        let hierarchy = ClassHierarchy::from_classes(inputs[0].classes());
        let table = table();
        let resolver = SymbolResolver::new(&table, &hierarchy);

        for class in &mixins {
            extension.analyze(class);
        }
        let mut renames = MemberRenames::new();
        extension.process_state(&resolver, &mut renames);
        for class in &mixins {
            extension.pre_apply(class, &resolver);
        }
        let mut output = Archive::new();
        extension.insert_extra(&mut output).unwrap();
        Run {
            extension,
            renames,
            output,
        }
    }

    fn entries(run: &Run, class: &str) -> ClassEntries {
        run.extension.reference_maps()[REFMAP]
            .class(class)
            .cloned()
            .unwrap_or_default()
    }

    #[test]
    fn test_single_target_entries_are_qualified() {
        let mut class = mixin(LEVEL_MIXIN, &[LEVEL]);
        class.methods.push(method(
            "onTick",
            "()V",
            vec![inject("tick").with(
                "at",
                AnnotationValue::Annotation(Annotation::new(AT).with(
                    "target",
                    string("Lnet/minecraft/world/Level;addEntity(Lnet/minecraft/world/Entity;)V"),
                )),
            )],
        ));
        class.methods.push(method("onAdd", "()V", vec![inject("addEntity*")]));
        class.methods.push(method(
            "getPlayer",
            "()Lnet/minecraft/world/Entity;",
            vec![Annotation::new(ACCESSOR)],
        ));
        class.methods.push(method(
            "callAddEntity",
            "(Lnet/minecraft/world/Entity;)V",
            vec![Annotation::new(INVOKER)],
        ));
        class.methods.push(method(
            "create",
            "(I)Lnet/minecraft/world/Level;",
            vec![Annotation::new(INVOKER).with("value", string("<init>"))],
        ));

        let run = run(vec![class], &[]);
        assert!(run.extension.diagnostics().is_empty());
        let expected: ClassEntries = [
            ("<init>", "<init>"),
            ("addEntity", "method_5(Lnet/minecraft/class_2;)V"),
            ("addEntity*", "Lnet/minecraft/class_1;method_5*"),
            (
                "Lnet/minecraft/world/Level;addEntity(Lnet/minecraft/world/Entity;)V",
                "Lnet/minecraft/class_1;method_5(Lnet/minecraft/class_2;)V",
            ),
            ("player", "field_3:Lnet/minecraft/class_2;"),
            ("tick", "Lnet/minecraft/class_1;method_4()V"),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_owned(), value.to_owned()))
        .collect();
        assert_eq!(entries(&run, LEVEL_MIXIN), expected);

        let written = ReferenceMap::parse(run.output.text(REFMAP).unwrap()).unwrap();
        assert_eq!(written.class(LEVEL_MIXIN), Some(&expected));
        let config: serde_json::Value =
            serde_json::from_str(run.output.text("mod.mixins.json").unwrap()).unwrap();
        assert_eq!(config["refmap"], REFMAP);
    }

    #[test]
    fn test_multiple_targets_drop_the_owner() {
        let mut class = mixin(MULTI_MIXIN, &[LEVEL, ENTITY]);
        class.methods.push(method("onTick", "()V", vec![inject("tick()V")]));
        class.methods.push(method("getX", "()I", vec![Annotation::new(ACCESSOR)]));

        let run = run(vec![class], &[]);
        let entries = entries(&run, MULTI_MIXIN);
        assert_eq!(entries["tick()V"], "method_4()V");
        assert_eq!(entries["x"], "field_8:I");
        assert_eq!(entries["X"], "field_8:I");
    }

    #[test]
    fn test_unresolved_target_warns_without_entry() {
        let mut class = mixin(LEVEL_MIXIN, &[LEVEL]);
        class.methods.push(method("onMissing", "()V", vec![inject("missing")]));

        let run = run(vec![class], &[]);
        assert!(run.extension.reference_maps().is_empty());
        assert!(run.output.text(REFMAP).is_none());
        assert_eq!(
            run.extension.diagnostics().take(),
            vec![SymbolWarning {
                class: LEVEL_MIXIN.to_owned(),
                annotation: "@Inject".to_owned(),
                symbol: "missing".to_owned(),
                kind: WarningKind::Unresolved,
            }]
        );
    }

    #[test]
    fn test_existing_refmap_entry_is_the_fallback() {
        let mut class = mixin(LEVEL_MIXIN, &[LEVEL]);
        class.methods.push(method("onTick", "()V", vec![inject("oldTick")]));
        let existing = r#"{"mappings": {"com/example/mixin/LevelMixin": {"oldTick": "Lnet/minecraft/world/Level;tick()V"}}}"#;

        let run = run(vec![class], &[(REFMAP, existing)]);
        assert!(run.extension.diagnostics().is_empty());
        assert_eq!(
            entries(&run, LEVEL_MIXIN)["oldTick"],
            "Lnet/minecraft/class_1;method_4()V"
        );
    }

    #[test]
    fn test_hard_targets_rename_members() {
        let mut class = mixin(LEVEL_MIXIN, &[LEVEL]);
        class.fields.push(field(
            "shadow$player",
            "Lnet/minecraft/world/Entity;",
            vec![Annotation::new(SHADOW)],
        ));
        class.fields.push(field(
            "player",
            "Lnet/minecraft/world/Entity;",
            vec![Annotation::new(SHADOW)],
        ));
        class.methods.push(method("tick", "()V", vec![Annotation::new(OVERWRITE)]));
        class.methods.push(method(
            "mine$addEntity",
            "(Lnet/minecraft/world/Entity;)V",
            vec![Annotation::new(SHADOW).with("prefix", string("mine$"))],
        ));

        let run = run(vec![class], &[]);
        let renames = &run.renames;
        assert_eq!(
            renames.field(LEVEL_MIXIN, "shadow$player", "Lnet/minecraft/world/Entity;"),
            Some("shadow$field_3")
        );
        assert_eq!(
            renames.field(LEVEL_MIXIN, "player", "Lnet/minecraft/world/Entity;"),
            Some("field_3")
        );
        assert_eq!(renames.method(LEVEL_MIXIN, "tick", "()V"), Some("method_4"));
        assert_eq!(
            renames.method(LEVEL_MIXIN, "mine$addEntity", "(Lnet/minecraft/world/Entity;)V"),
            Some("mine$method_5")
        );
        // hard targets never reach the refmap
        assert!(run.extension.reference_maps().is_empty());
    }

    #[test]
    fn test_string_targets_and_unlisted_mixins() {
        let mut class = ClassNode::new("com/example/other/StrayMixin");
        class.annotations.push(
            Annotation::new(MIXIN).with("targets", string("net.minecraft.world.Level")),
        );
        class.methods.push(method("onTick", "()V", vec![inject("tick")]));

        let run = run(vec![class], &[]);
        let maps = run.extension.reference_maps();
        let entries = maps[REFMAP].class("com/example/other/StrayMixin").unwrap();
        assert_eq!(entries["net.minecraft.world.Level"], "net/minecraft/class_1");
        assert_eq!(entries["tick"], "Lnet/minecraft/class_1;method_4()V");
        let warnings = run.extension.diagnostics().take();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, WarningKind::UnlistedMixin);
    }

    fn server_mixin(annotation: Annotation) -> ClassNode {
        let mut class = mixin(SERVER_MIXIN, &[SERVER]);
        class.methods.push(method("onSpawn", "()V", vec![annotation]));
        class
    }

    #[test]
    fn test_overloads_are_ambiguous_and_become_errors() {
        let run = run(vec![server_mixin(inject("spawn"))], &[]);
        assert!(run.extension.reference_maps().is_empty());

        let warnings = run.extension.diagnostics().take();
        assert_eq!(
            warnings,
            vec![SymbolWarning {
                class: SERVER_MIXIN.to_owned(),
                annotation: "@Inject".to_owned(),
                symbol: "spawn".to_owned(),
                kind: WarningKind::Ambiguous {
                    candidates: vec![
                        "Lnet/minecraft/server/Server;spawn(I)V".to_owned(),
                        "Lnet/minecraft/server/Server;spawn(Ljava/lang/String;)V".to_owned(),
                    ],
                },
            }]
        );
        match warnings[0].as_error() {
            Some(RemapError::AmbiguousTarget { symbol, candidates }) => {
                assert_eq!(symbol, "@Inject spawn in com/example/mixin/ServerMixin");
                assert_eq!(candidates.len(), 2);
            }
            other => panic!("expected an ambiguity error, got {other:?}"),
        }
    }

    #[test]
    fn test_implicit_wildcards_take_the_first_overload() {
        let options = MixinOptions {
            allow_implicit_wildcards: true,
            ..MixinOptions::default()
        };
        let run = run_with(options, vec![server_mixin(inject("spawn"))], &[]);
        assert!(run.extension.diagnostics().is_empty());
        assert_eq!(
            entries(&run, SERVER_MIXIN)["spawn"],
            "Lnet/minecraft/class_10;method_11(I)V"
        );
    }

    #[test]
    fn test_at_targets_as_classes_descriptors_and_fields() {
        let targets = [
            "Lnet/minecraft/world/Entity;",
            "net.minecraft.world.Entity",
            "(Lnet/minecraft/world/Entity;)V",
            "Lnet/minecraft/world/Level;player:Lnet/minecraft/world/Entity;",
        ];
        let annotation = inject("tick").with(
            "at",
            AnnotationValue::Array(targets.into_iter().map(at).collect()),
        );
        let mut class = mixin(LEVEL_MIXIN, &[LEVEL]);
        class.methods.push(method("onTick", "()V", vec![annotation]));

        let run = run(vec![class], &[]);
        assert!(run.extension.diagnostics().is_empty());
        let entries = entries(&run, LEVEL_MIXIN);
        assert_eq!(entries[targets[0]], "Lnet/minecraft/class_2;");
        assert_eq!(entries[targets[1]], "net/minecraft/class_2");
        assert_eq!(entries[targets[2]], "(Lnet/minecraft/class_2;)V");
        assert_eq!(
            entries[targets[3]],
            "Lnet/minecraft/class_1;field_3:Lnet/minecraft/class_2;"
        );
    }

    #[test]
    fn test_slice_bounds_are_resolved() {
        let from = "Lnet/minecraft/world/Level;tick()V";
        let to = "Lnet/minecraft/world/Level;addEntity(Lnet/minecraft/world/Entity;)V";
        let slice = Annotation::new(SLICE).with("from", at(from)).with("to", at(to));
        let annotation = inject("tick").with("slice", AnnotationValue::Annotation(slice));
        let mut class = mixin(LEVEL_MIXIN, &[LEVEL]);
        class.methods.push(method("onTick", "()V", vec![annotation]));

        let run = run(vec![class], &[]);
        assert!(run.extension.diagnostics().is_empty());
        let entries = entries(&run, LEVEL_MIXIN);
        assert_eq!(entries[from], "Lnet/minecraft/class_1;method_4()V");
        assert_eq!(
            entries[to],
            "Lnet/minecraft/class_1;method_5(Lnet/minecraft/class_2;)V"
        );
    }

    #[test]
    fn test_modify_args_resolves_method_and_injection_point() {
        let annotation = Annotation::new(MODIFY_ARGS)
            .with("method", string("addEntity"))
            .with("at", at("Lnet/minecraft/world/Entity;tick()V"));
        let mut class = mixin(LEVEL_MIXIN, &[LEVEL]);
        class.methods.push(method(
            "adjust",
            "(Lorg/spongepowered/asm/mixin/injection/invoke/arg/Args;)V",
            vec![annotation],
        ));

        let run = run(vec![class], &[]);
        assert!(run.extension.diagnostics().is_empty());
        let entries = entries(&run, LEVEL_MIXIN);
        assert_eq!(
            entries["addEntity"],
            "Lnet/minecraft/class_1;method_5(Lnet/minecraft/class_2;)V"
        );
        assert_eq!(
            entries["Lnet/minecraft/world/Entity;tick()V"],
            "Lnet/minecraft/class_2;method_6()V"
        );
    }

    #[test]
    fn test_stale_refmap_is_written_empty() {
        let stale = r#"{"mappings": {"com/example/mixin/GoneMixin": {"tick": "La;a()V"}}}"#;
        let run = run(vec![], &[("old.refmap.json", stale)]);
        assert!(run.extension.reference_maps().is_empty());
        let written = ReferenceMap::parse(run.output.text("old.refmap.json").unwrap()).unwrap();
        assert!(written.is_empty());
    }
}
