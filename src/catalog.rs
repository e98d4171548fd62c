//! Resource catalog: compiled definitions per declared name.
//!
//! Compiling a document resolves every type and resource it declares,
//! every reference reachable from them, and every link and relation of its
//! resources. A document is only registered once all of that succeeds.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use crate::document::SchemaDocument;
use crate::error::{LoadError, ResolutionError};
use crate::link::{CompiledLink, PathTemplate};
use crate::relation::CompiledRelation;
use crate::resolver::{Documents, Resolver};
use crate::schema::{SchemaRef, TypeDef, TypeSlot};
use crate::types::SELF_LINK;
use crate::validator::{render_def, render_slot, Shape};

/// A resource: a definition with a canonical path and compiled operations.
#[derive(Debug)]
pub struct ResourceDef {
    document: Arc<SchemaDocument>,
    name: String,
    def: Arc<TypeDef>,
    self_path: Option<PathTemplate>,
    self_params: BTreeSet<String>,
    shape: Shape,
    links: BTreeMap<String, Arc<CompiledLink>>,
    relations: BTreeMap<String, Arc<CompiledRelation>>,
}

impl ResourceDef {
    pub fn id(&self) -> &SchemaRef {
        &self.def.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn document(&self) -> &Arc<SchemaDocument> {
        &self.document
    }

    pub fn def(&self) -> &Arc<TypeDef> {
        &self.def
    }

    /// Canonical path template, from the `self` link.
    pub fn self_path(&self) -> Option<&PathTemplate> {
        self.self_path.as_ref()
    }

    /// Query parameters declared on the `self` link.
    pub fn self_params(&self) -> &BTreeSet<String> {
        &self.self_params
    }

    /// Shape of the resource's own data.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn link(&self, name: &str) -> Result<&Arc<CompiledLink>, ResolutionError> {
        self.links.get(name).ok_or_else(|| ResolutionError::NoSuchLink {
            resource: self.id().to_string(),
            link: name.to_string(),
        })
    }

    pub fn links(&self) -> impl Iterator<Item = &Arc<CompiledLink>> {
        self.links.values()
    }

    pub fn relation(&self, name: &str) -> Option<&Arc<CompiledRelation>> {
        self.relations.get(name)
    }

    pub fn relations(&self) -> impl Iterator<Item = &Arc<CompiledRelation>> {
        self.relations.values()
    }
}

/// Compiled definitions and resources, keyed by reference.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    definitions: HashMap<SchemaRef, Arc<TypeDef>>,
    resources: HashMap<SchemaRef, Arc<ResourceDef>>,
}

impl Catalog {
    pub fn definition(&self, reference: &SchemaRef) -> Option<Arc<TypeDef>> {
        self.definitions.get(reference).cloned()
    }

    pub fn resource(&self, reference: &SchemaRef) -> Option<Arc<ResourceDef>> {
        self.resources.get(reference).cloned()
    }

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    pub(crate) fn insert_definition(&mut self, def: Arc<TypeDef>) {
        self.definitions.insert(def.id.clone(), def);
    }

    pub(crate) fn extend(&mut self, other: Catalog) {
        self.definitions.extend(other.definitions);
        self.resources.extend(other.resources);
    }

    /// Compile `document` against the already registered `documents`.
    ///
    /// `documents` must already contain `document` itself.
    ///
    /// # Errors
    ///
    /// Returns the first resolution or compilation failure.
    pub fn compile(
        documents: &Documents,
        existing: &Catalog,
        document: &Arc<SchemaDocument>,
    ) -> Result<Catalog, LoadError> {
        let mut compiler = Compiler {
            resolver: Resolver::new(documents),
            existing,
            definitions: HashMap::new(),
        };

        let id = document.id();
        let mut queue = Vec::new();
        for name in document.type_names() {
            queue.push(compiler.definition(&SchemaRef::type_(id, &name))?);
        }
        let mut roots = Vec::new();
        for name in document.resource_names() {
            let def = compiler.definition(&SchemaRef::resource(id, &name))?;
            roots.push((name, def.clone()));
            queue.push(def);
        }

        while let Some(def) = queue.pop() {
            let mut refs = Vec::new();
            let mut targets = Vec::new();
            walk(&def, &mut refs, &mut targets);
            for reference in refs {
                if !compiler.knows(&reference) {
                    queue.push(compiler.definition(&reference)?);
                }
            }
            for (at, target) in targets {
                check_relation_target(documents, existing, document, &at, &target)?;
            }
        }

        let mut resources = HashMap::new();
        for (name, def) in roots {
            let resource = compile_resource(document, &name, def, &mut compiler)?;
            resources.insert(resource.id().clone(), Arc::new(resource));
        }

        Ok(Catalog {
            definitions: compiler.definitions,
            resources,
        })
    }
}

struct Compiler<'a> {
    resolver: Resolver<'a>,
    existing: &'a Catalog,
    definitions: HashMap<SchemaRef, Arc<TypeDef>>,
}

impl Compiler<'_> {
    fn knows(&self, reference: &SchemaRef) -> bool {
        self.definitions.contains_key(reference) || self.existing.definitions.contains_key(reference)
    }

    fn definition(&mut self, reference: &SchemaRef) -> Result<Arc<TypeDef>, LoadError> {
        if let Some(def) = self
            .definitions
            .get(reference)
            .or_else(|| self.existing.definitions.get(reference))
        {
            return Ok(def.clone());
        }
        let def = Arc::new(self.resolver.resolve(reference)?);
        self.definitions.insert(reference.clone(), def.clone());
        Ok(def)
    }

    fn shape(&mut self, slot: Option<&TypeSlot>, at: &SchemaRef) -> Result<Shape, LoadError> {
        let Some(slot) = slot else {
            return Ok(Shape::any());
        };
        let schema = render_slot(slot, &mut |r| self.definition(r))?;
        Shape::compile(schema).map_err(|message| LoadError::malformed(at.document(), at.pointer(), message))
    }
}

/// Collect nested references and relation targets, descending inline
/// definitions.
fn walk(def: &TypeDef, refs: &mut Vec<SchemaRef>, targets: &mut Vec<(SchemaRef, SchemaRef)>) {
    let mut slots: Vec<&TypeSlot> = def.properties.values().map(|p| &p.schema).collect();
    slots.extend(def.items.as_deref());
    for link in def.links.values() {
        slots.extend(link.request.as_ref());
        slots.extend(link.response.as_ref());
    }

    for slot in slots {
        match slot {
            TypeSlot::Ref { reference } => refs.push(reference.clone()),
            TypeSlot::Inline(inner) => walk(inner, refs, targets),
        }
    }

    for relation in def.relations.values() {
        let at = def.id.nested(&format!("/relations/{}", relation.name));
        targets.push((at, relation.resource.clone()));
    }
}

fn check_relation_target(
    documents: &Documents,
    existing: &Catalog,
    document: &SchemaDocument,
    at: &SchemaRef,
    target: &SchemaRef,
) -> Result<(), LoadError> {
    let Some(name) = target.resource_name() else {
        return Err(LoadError::malformed(
            at.document(),
            format!("{}/resource", at.pointer()),
            format!("{} is not a resource", target),
        ));
    };
    let found = if target.document() == document.id() {
        document.has_resource(name)
    } else if documents.contains_key(target.document()) {
        existing.resources.contains_key(target)
    } else {
        return Err(LoadError::UnresolvedDocument {
            id: target.document().to_string(),
            reference: target.to_string(),
        });
    };
    if found {
        Ok(())
    } else {
        Err(LoadError::UnresolvedReference {
            reference: target.to_string(),
        })
    }
}

fn compile_resource(
    document: &Arc<SchemaDocument>,
    name: &str,
    def: Arc<TypeDef>,
    compiler: &mut Compiler<'_>,
) -> Result<ResourceDef, LoadError> {
    let id = def.id.clone();
    let template = |raw: &str, at: &SchemaRef| {
        PathTemplate::parse(raw)
            .map_err(|message| LoadError::malformed(at.document(), format!("{}/path", at.pointer()), message))
    };

    let self_link = def.link(SELF_LINK);
    let self_path = match self_link {
        Some(link) => {
            let at = id.nested("/links/self");
            let Some(raw) = link.path.as_deref() else {
                return Err(LoadError::malformed(id.document(), at.pointer(), "self link needs a path"));
            };
            Some(template(raw, &at)?)
        }
        None => None,
    };
    let self_params = self_link
        .map(|link| link.params.keys().cloned().collect())
        .unwrap_or_default();

    let mut links = BTreeMap::new();
    for (link_name, link) in &def.links {
        let at = id.nested(&format!("/links/{}", link_name));
        let path = match (&link.path, &self_path) {
            (Some(raw), _) => template(raw, &at)?,
            (None, Some(path)) => path.clone(),
            (None, None) => {
                return Err(LoadError::malformed(
                    id.document(),
                    at.pointer(),
                    "link has no path and the resource has no self link",
                ))
            }
        };
        let request = compiler.shape(link.request.as_ref(), &at.nested("/request"))?;
        let response = compiler.shape(link.response.as_ref(), &at.nested("/response"))?;
        links.insert(link_name.clone(), Arc::new(CompiledLink::new(link, path, request, response)));
    }

    let relations = def
        .relations
        .iter()
        .map(|(k, v)| (k.clone(), Arc::new(CompiledRelation::compile(v))))
        .collect();

    let schema = render_def(&def, &mut |r| compiler.definition(r))?;
    let shape = Shape::compile(schema).map_err(|message| LoadError::malformed(id.document(), id.pointer(), message))?;

    Ok(ResourceDef {
        document: document.clone(),
        name: name.to_string(),
        def,
        self_path,
        self_params,
        shape,
        links,
        relations,
    })
}
