//! Staged, cached remapping of archives across namespaces.
//!
//! A request is answered in four stages:
//!
//! 1. resolve the remap path through the namespace graph
//! 2. copy the input when the path is empty
//! 3. run one hop per path edge, each against the cache first
//! 4. publish the last hop's artifact to the requested output
//!
//! Hops are strictly sequential; each one consumes the artifact of the one
//! before it. Work inside a hop is parallelized by the engine.

pub mod artifact;

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Result;
use log::{debug, info};

pub use artifact::{
    ArtifactCoordinate, ArtifactKey, ArtifactStore, HopKind, content_hash, copy_atomic,
};

use crate::{
    access::{AccessTransformerRemapper, AccessWidenerRemapper},
    annotations::{MixinOptions, MixinRemapExtension, ReferenceMap},
    classfile::Archive,
    config::{ClasspathConfig, Config},
    engine::{ClassExtension, RewriteEngine},
    error::{Diagnostics, EngineError, RemapError, SymbolWarning},
    mapping::MappingTableProvider,
    namespace::{NamespaceGraph, NamespaceId},
    remap_path::{RemapPathCache, RemapRequest},
};

#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    pub cache_dir: PathBuf,
    pub patch_state: Option<String>,
    pub mixin: MixinOptions,
    pub ignore_namespace_mismatch: bool,
    pub classpath: ClasspathConfig,
}

impl PipelineOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            cache_dir: config.cache_dir(),
            patch_state: config.patch_state.clone(),
            mixin: config.mixin.clone(),
            ignore_namespace_mismatch: config.access_widener.ignore_namespace_mismatch,
            classpath: config.classpath.clone(),
        }
    }

    /// Identity of the settings that shape a hop of `kind`.
    ///
    /// Classpath hops run without extensions or resource remappers, so only
    /// input hops depend on them.
    pub fn settings_fingerprint(&self, kind: HopKind) -> String {
        match kind {
            HopKind::Input => {
                let mixin = &self.mixin;
                artifact::digest_parts([
                    bool_part(mixin.enabled),
                    bool_part(mixin.allow_implicit_wildcards),
                    mixin.default_refmap.as_str(),
                    bool_part(mixin.extras),
                    bool_part(self.ignore_namespace_mismatch),
                ])
            }
            HopKind::Classpath => String::new(),
        }
    }
}

const fn bool_part(value: bool) -> &'static str {
    if value { "1" } else { "0" }
}

/// Result of one hop
#[derive(Debug, Clone)]
pub struct HopReport {
    pub from: String,
    pub to: String,
    /// The published artifact in the store
    pub artifact: PathBuf,
    pub cache_hit: bool,
    /// Symbols that could not be resolved; always empty on a cache hit
    pub warnings: Vec<SymbolWarning>,
    /// Reference maps in the artifact, by file name
    pub reference_maps: BTreeMap<String, ReferenceMap>,
}

#[derive(Debug, Clone)]
pub struct RemapOutcome {
    /// Namespaces hopped through, excluding the source
    pub path: Vec<String>,
    pub output: PathBuf,
    pub hops: Vec<HopReport>,
}

impl RemapOutcome {
    pub fn warnings(&self) -> impl Iterator<Item = &SymbolWarning> {
        self.hops.iter().flat_map(|hop| &hop.warnings)
    }
}

#[derive(Debug)]
pub struct RemapPipeline<E> {
    graph: Arc<NamespaceGraph>,
    provider: MappingTableProvider,
    paths: RemapPathCache,
    store: ArtifactStore,
    engine: E,
    options: PipelineOptions,
}

impl<E: RewriteEngine> RemapPipeline<E> {
    pub fn new(provider: MappingTableProvider, engine: E, options: PipelineOptions) -> Self {
        Self {
            graph: Arc::clone(provider.graph()),
            provider,
            paths: RemapPathCache::new(),
            store: ArtifactStore::new(options.cache_dir.clone()),
            engine,
            options,
        }
    }

    /// Build the graph and load the mappings named by `config`
    pub fn from_config(config: &Config, engine: E) -> Result<Self> {
        let graph = Arc::new(config.build_graph()?);
        let provider = MappingTableProvider::from_files(graph, &config.mappings)?;
        Ok(Self::new(provider, engine, PipelineOptions::from_config(config)))
    }

    pub fn graph(&self) -> &NamespaceGraph {
        &self.graph
    }

    pub fn provider(&self) -> &MappingTableProvider {
        &self.provider
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Swap in a new graph and mapping data, dropping every derived cache.
    ///
    /// Stored artifacts stay on disk; their keys carry the old mapping
    /// fingerprint, so they are not hit again.
    pub fn reconfigure(&mut self, provider: MappingTableProvider) {
        info!(
            "Reconfiguring pipeline: {} namespaces, mappings {}",
            provider.graph().len(),
            provider.fingerprint()
        );
        self.graph = Arc::clone(provider.graph());
        self.provider = provider;
        self.paths.invalidate();
    }

    pub fn remap_path(&self, request: &RemapRequest) -> Result<Arc<[NamespaceId]>, RemapError> {
        self.paths.get_or_compute(&self.graph, request)
    }

    /// Remap `input` according to `request` and publish the result to `output`
    pub fn remap(
        &self,
        request: &RemapRequest,
        input: &Path,
        output: &Path,
    ) -> Result<RemapOutcome, RemapError> {
        let src = self.graph.name(request.src);
        let dst = self.graph.name(request.dst);
        info!("Remapping {} from {src} to {dst}", input.display());

        debug!("Stage 1: resolving remap path");
        let path = self.remap_path(request)?;
        let names: Vec<String> = path
            .iter()
            .map(|&id| self.graph.name(id).to_owned())
            .collect();
        debug!("Remap path: {src} -> {}", names.join(" -> "));

        if path.is_empty() {
            debug!("Stage 2: empty path, copying input");
            copy_atomic(input, output).map_err(|source| self.engine_io(request.src, request.dst, source))?;
            info!("Copied {} to {}", input.display(), output.display());
            return Ok(RemapOutcome {
                path: names,
                output: output.to_path_buf(),
                hops: Vec::new(),
            });
        }

        debug!("Stage 3: running {} hops", path.len());
        let mut hops = Vec::with_capacity(path.len());
        let mut current = input.to_path_buf();
        let mut from = request.src;
        for &to in path.iter() {
            let hop = self.run_hop(HopKind::Input, &current, from, to)?;
            current.clone_from(&hop.artifact);
            from = to;
            hops.push(hop);
        }

        debug!("Stage 4: publishing {}", output.display());
        copy_atomic(&current, output).map_err(|source| self.engine_io(request.src, request.dst, source))?;

        let warnings: usize = hops.iter().map(|hop| hop.warnings.len()).sum();
        let hits = hops.iter().filter(|hop| hop.cache_hit).count();
        info!(
            "Remapped {} to {dst} in {} hops ({hits} cached, {warnings} warnings)",
            input.display(),
            hops.len()
        );
        Ok(RemapOutcome {
            path: names,
            output: output.to_path_buf(),
            hops,
        })
    }

    fn engine_io(&self, from: NamespaceId, to: NamespaceId, source: EngineError) -> RemapError {
        RemapError::EngineIo {
            from: self.graph.name(from).to_owned(),
            to: self.graph.name(to).to_owned(),
            source,
        }
    }

    fn artifact_key(
        &self,
        kind: HopKind,
        input: &Path,
        from: NamespaceId,
        to: NamespaceId,
    ) -> Result<ArtifactKey, EngineError> {
        Ok(ArtifactKey {
            coordinate: ArtifactCoordinate {
                to: self.graph.name(to).to_owned(),
                from: self.graph.name(from).to_owned(),
                patch_state: self.options.patch_state.clone(),
            },
            input_hash: content_hash(input)?,
            mapping_fingerprint: self.provider.fingerprint().to_owned(),
            classpath_fingerprint: self.classpath_fingerprint(kind)?,
            settings_fingerprint: self.options.settings_fingerprint(kind),
            kind,
        })
    }

    /// Identity of the classpath a hop of `kind` would see, without deriving it
    fn classpath_fingerprint(&self, kind: HopKind) -> Result<String, EngineError> {
        let classpath = &self.options.classpath;
        let mut parts: Vec<String> = Vec::new();
        if kind == HopKind::Input {
            parts.push(classpath.namespace.clone().unwrap_or_default());
            for archive in &classpath.archives {
                parts.push(content_hash(archive)?);
            }
        }
        parts.push(String::new());
        for library in &classpath.libraries {
            parts.push(content_hash(library)?);
        }
        Ok(artifact::digest_parts(parts.iter().map(String::as_str)))
    }

    fn run_hop(
        &self,
        kind: HopKind,
        input: &Path,
        from: NamespaceId,
        to: NamespaceId,
    ) -> Result<HopReport, RemapError> {
        let from_name = self.graph.name(from);
        let to_name = self.graph.name(to);
        debug!("Hop {from_name} -> {to_name} ({kind}) for {}", input.display());

        let key = self
            .artifact_key(kind, input, from, to)
            .map_err(|source| self.engine_io(from, to, source))?;
        if let Some(artifact) = self.store.lookup(&key) {
            debug!("Cache hit: {}", artifact.display());
            let reference_maps =
                read_reference_maps(&artifact).map_err(|source| self.engine_io(from, to, source))?;
            return Ok(HopReport {
                from: from_name.to_owned(),
                to: to_name.to_owned(),
                artifact,
                cache_hit: true,
                warnings: Vec::new(),
                reference_maps,
            });
        }

        let table = self.provider.table(from, to)?;
        let classpath = match kind {
            HopKind::Input => self.classpath_in(from)?,
            HopKind::Classpath => self.options.classpath.libraries.clone(),
        };

        let diagnostics = Arc::new(Diagnostics::new());
        let mixin = (kind == HopKind::Input && self.options.mixin.enabled).then(|| {
            Arc::new(MixinRemapExtension::new(
                self.options.mixin.clone(),
                Arc::clone(&diagnostics),
            ))
        });

        let artifact = self
            .store
            .publish(&key, |target| {
                let mut session = self.engine.open(table);
                if let Some(mixin) = &mixin {
                    let extension: Arc<dyn ClassExtension> = mixin.clone();
                    session.attach_extension(extension);
                }
                if kind == HopKind::Input {
                    session.attach_resource_remapper(Box::new(AccessWidenerRemapper::new(
                        self.options.ignore_namespace_mismatch,
                    )));
                    session.attach_resource_remapper(Box::new(AccessTransformerRemapper::new()));
                }
                for path in &classpath {
                    session.read_classpath(path)?;
                }
                session.read_input(input)?;
                session.apply(target)?;
                session.finish();
                Ok(())
            })
            .map_err(|source| self.engine_io(from, to, source))?;

        let warnings = diagnostics.take();
        let reference_maps = mixin
            .map(|mixin| mixin.reference_maps())
            .unwrap_or_default();
        info!(
            "Hop {from_name} -> {to_name}: {} reference maps, {} warnings",
            reference_maps.len(),
            warnings.len()
        );
        Ok(HopReport {
            from: from_name.to_owned(),
            to: to_name.to_owned(),
            artifact,
            cache_hit: false,
            warnings,
            reference_maps,
        })
    }

    /// The classpath in `namespace`: the baseline archives remapped from their
    /// own namespace through cached classpath hops, then the libraries
    fn classpath_in(&self, namespace: NamespaceId) -> Result<Vec<PathBuf>, RemapError> {
        let classpath = &self.options.classpath;
        let base = match classpath.namespace.as_deref() {
            Some(name) => self.graph.require(name)?,
            None => self.graph.root(),
        };

        let mut paths = Vec::with_capacity(classpath.archives.len() + classpath.libraries.len());
        if base == namespace {
            paths.extend(classpath.archives.iter().cloned());
        } else if !classpath.archives.is_empty() {
            let route = self.remap_path(&RemapRequest::direct(base, namespace))?;
            debug!(
                "Deriving classpath in {} through {} hops",
                self.graph.name(namespace),
                route.len()
            );
            for archive in &classpath.archives {
                let mut current = archive.clone();
                let mut from = base;
                for &to in route.iter() {
                    current = self.run_hop(HopKind::Classpath, &current, from, to)?.artifact;
                    from = to;
                }
                paths.push(current);
            }
        }
        paths.extend(classpath.libraries.iter().cloned());
        Ok(paths)
    }
}

/// Non-empty reference maps stored in an archive
fn read_reference_maps(path: &Path) -> Result<BTreeMap<String, ReferenceMap>, EngineError> {
    let archive = Archive::read(path)?;
    let mut maps = BTreeMap::new();
    for (entry, text) in
        archive.texts_matching(|name| name.contains("refmap") && name.ends_with(".json"))
    {
        let refmap = ReferenceMap::parse(text).map_err(|source| EngineError::Format {
            path: path.join(entry),
            source,
        })?;
        if !refmap.is_empty() {
            maps.insert(entry.to_owned(), refmap);
        }
    }
    Ok(maps)
}
