//! Dispatch tables from annotation descriptor to handler.
//!
//! Each annotation site (class, method, field) has its own table. A rule
//! pairs a [`Handler`] variant with a predicate over the annotation, so
//! additional annotation schemes only add rows.

use indexmap::IndexMap;

use crate::classfile::Annotation;

pub const MIXIN: &str = "Lorg/spongepowered/asm/mixin/Mixin;";
pub const SHADOW: &str = "Lorg/spongepowered/asm/mixin/Shadow;";
pub const OVERWRITE: &str = "Lorg/spongepowered/asm/mixin/Overwrite;";
pub const ACCESSOR: &str = "Lorg/spongepowered/asm/mixin/gen/Accessor;";
pub const INVOKER: &str = "Lorg/spongepowered/asm/mixin/gen/Invoker;";
pub const INJECT: &str = "Lorg/spongepowered/asm/mixin/injection/Inject;";
pub const REDIRECT: &str = "Lorg/spongepowered/asm/mixin/injection/Redirect;";
pub const MODIFY_ARG: &str = "Lorg/spongepowered/asm/mixin/injection/ModifyArg;";
pub const MODIFY_ARGS: &str = "Lorg/spongepowered/asm/mixin/injection/ModifyArgs;";
pub const MODIFY_VARIABLE: &str = "Lorg/spongepowered/asm/mixin/injection/ModifyVariable;";
pub const MODIFY_CONSTANT: &str = "Lorg/spongepowered/asm/mixin/injection/ModifyConstant;";
pub const AT: &str = "Lorg/spongepowered/asm/mixin/injection/At;";
pub const SLICE: &str = "Lorg/spongepowered/asm/mixin/injection/Slice;";

pub const WRAP_OPERATION: &str =
    "Lcom/llamalad7/mixinextras/injector/wrapoperation/WrapOperation;";
pub const WRAP_WITH_CONDITION: &str = "Lcom/llamalad7/mixinextras/injector/WrapWithCondition;";
pub const MODIFY_EXPRESSION_VALUE: &str =
    "Lcom/llamalad7/mixinextras/injector/ModifyExpressionValue;";
pub const MODIFY_RETURN_VALUE: &str = "Lcom/llamalad7/mixinextras/injector/ModifyReturnValue;";
pub const MODIFY_RECEIVER: &str = "Lcom/llamalad7/mixinextras/injector/ModifyReceiver;";
pub const WRAP_METHOD: &str = "Lcom/llamalad7/mixinextras/injector/wrapmethod/WrapMethod;";

/// Where an annotation is declared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Site {
    Class,
    Method,
    Field,
}

/// What to do with a matched annotation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handler {
    /// Declares the target classes of a mixin
    MixinTargets,
    /// `method` targets plus `@At` and `@Slice` injection points
    Injector,
    /// `method` targets only
    MethodTarget,
    Accessor,
    Invoker,
    /// Hard target: the annotated member takes the target member's name
    Shadow,
    /// Hard target: the annotated method replaces the target method
    Overwrite,
}

pub type Predicate = fn(&Annotation) -> bool;

#[derive(Debug, Clone, Copy)]
pub struct Rule {
    /// Display name used in diagnostics, e.g. `@Inject`
    pub name: &'static str,
    pub handler: Handler,
    pub predicate: Predicate,
}

fn always(_: &Annotation) -> bool {
    true
}

/// Annotation dispatch tables, one per site
#[derive(Debug, Clone, Default)]
pub struct AnnotationRegistry {
    class: IndexMap<&'static str, Rule>,
    method: IndexMap<&'static str, Rule>,
    field: IndexMap<&'static str, Rule>,
}

impl AnnotationRegistry {
    /// A registry without any rules
    pub fn empty() -> Self {
        Self::default()
    }

    /// The Mixin rules, optionally with MixinExtras injectors
    pub fn standard(extras: bool) -> Self {
        let mut registry = Self::empty();
        registry.install_mixin();
        if extras {
            registry.install_mixin_extras();
        }
        registry
    }

    pub fn register(
        &mut self,
        site: Site,
        desc: &'static str,
        name: &'static str,
        handler: Handler,
    ) -> &mut Self {
        self.register_with(site, desc, name, handler, always)
    }

    pub fn register_with(
        &mut self,
        site: Site,
        desc: &'static str,
        name: &'static str,
        handler: Handler,
        predicate: Predicate,
    ) -> &mut Self {
        self.table_mut(site).insert(
            desc,
            Rule {
                name,
                handler,
                predicate,
            },
        );
        self
    }

    pub fn install_mixin(&mut self) -> &mut Self {
        self.register(Site::Class, MIXIN, "@Mixin", Handler::MixinTargets)
            .register(Site::Field, SHADOW, "@Shadow", Handler::Shadow)
            .register(Site::Method, SHADOW, "@Shadow", Handler::Shadow)
            .register(Site::Method, OVERWRITE, "@Overwrite", Handler::Overwrite)
            .register(Site::Method, ACCESSOR, "@Accessor", Handler::Accessor)
            .register(Site::Method, INVOKER, "@Invoker", Handler::Invoker)
            .register(Site::Method, INJECT, "@Inject", Handler::Injector)
            .register(Site::Method, REDIRECT, "@Redirect", Handler::Injector)
            .register(Site::Method, MODIFY_ARG, "@ModifyArg", Handler::Injector)
            .register(Site::Method, MODIFY_ARGS, "@ModifyArgs", Handler::Injector)
            .register(Site::Method, MODIFY_VARIABLE, "@ModifyVariable", Handler::Injector)
            .register(Site::Method, MODIFY_CONSTANT, "@ModifyConstant", Handler::Injector)
    }

    pub fn install_mixin_extras(&mut self) -> &mut Self {
        self.register(Site::Method, WRAP_OPERATION, "@WrapOperation", Handler::Injector)
            .register(Site::Method, WRAP_WITH_CONDITION, "@WrapWithCondition", Handler::Injector)
            .register(
                Site::Method,
                MODIFY_EXPRESSION_VALUE,
                "@ModifyExpressionValue",
                Handler::Injector,
            )
            .register(Site::Method, MODIFY_RETURN_VALUE, "@ModifyReturnValue", Handler::Injector)
            .register(Site::Method, MODIFY_RECEIVER, "@ModifyReceiver", Handler::Injector)
            .register(Site::Method, WRAP_METHOD, "@WrapMethod", Handler::MethodTarget)
    }

    /// The rule for `annotation` at `site`, if one is registered and its
    /// predicate accepts the annotation
    pub fn lookup(&self, site: Site, annotation: &Annotation) -> Option<&Rule> {
        self.table(site)
            .get(annotation.desc.as_str())
            .filter(|rule| (rule.predicate)(annotation))
    }

    pub fn len(&self) -> usize {
        self.class.len() + self.method.len() + self.field.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn table(&self, site: Site) -> &IndexMap<&'static str, Rule> {
        match site {
            Site::Class => &self.class,
            Site::Method => &self.method,
            Site::Field => &self.field,
        }
    }

    fn table_mut(&mut self, site: Site) -> &mut IndexMap<&'static str, Rule> {
        match site {
            Site::Class => &mut self.class,
            Site::Method => &mut self.method,
            Site::Field => &mut self.field,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_per_site() {
        let registry = AnnotationRegistry::standard(false);
        let shadow = Annotation::new(SHADOW);
        assert_eq!(
            registry.lookup(Site::Field, &shadow).map(|rule| rule.handler),
            Some(Handler::Shadow)
        );
        assert!(registry.lookup(Site::Class, &shadow).is_none());
        assert!(
            registry
                .lookup(Site::Method, &Annotation::new(WRAP_OPERATION))
                .is_none()
        );
    }

    #[test]
    fn test_extras_scheme_adds_rows() {
        let base = AnnotationRegistry::standard(false);
        let extended = AnnotationRegistry::standard(true);
        assert_eq!(extended.len(), base.len() + 6);
        assert_eq!(
            extended
                .lookup(Site::Method, &Annotation::new(WRAP_METHOD))
                .map(|rule| rule.name),
            Some("@WrapMethod")
        );
    }

    #[test]
    fn test_predicate_filters_matches() {
        let mut registry = AnnotationRegistry::empty();
        registry.register_with(
            Site::Method,
            INJECT,
            "@Inject",
            Handler::Injector,
            |annotation| annotation.get("method").is_some(),
        );
        assert!(registry.lookup(Site::Method, &Annotation::new(INJECT)).is_none());
        let with_method = Annotation::new(INJECT).with(
            "method",
            crate::classfile::AnnotationValue::String("tick".to_owned()),
        );
        assert!(registry.lookup(Site::Method, &with_method).is_some());
    }
}
