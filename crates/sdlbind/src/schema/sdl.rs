//! Registration of SDL type definitions.
//!
//! Each named definition of a parsed document becomes one factory in a
//! [`TypeRegistry`]. Object and interface fields are deferred, so SDL types
//! may reference each other freely. Every raw configuration is passed
//! through the endpoint's [`ResolverBindingRegistry`] before it is stored.

use std::sync::Arc;

use async_graphql::{Name, Value};
use async_graphql_parser::types::{
    ConstDirective, FieldDefinition, InputValueDefinition, ServiceDocument, TypeDefinition, TypeKind as AstKind,
    TypeSystemDefinition,
};
use async_graphql_parser::Positioned;
use indexmap::IndexMap;
use tracing::{debug, trace};

use super::assembler::RootTypes;
use crate::binding::ResolverBindingRegistry;
use crate::error::SchemaError;
use crate::registry::TypeRegistry;
use crate::types::{
    ArgumentConfig, EnumValueConfig, FieldConfig, FieldList, TypeConfig, WireType, is_builtin_scalar,
};

const DEPRECATED_DIRECTIVE: &str = "deprecated";
const DEFAULT_DEPRECATION_REASON: &str = "No longer supported";

/// Root operation types and all type names declared by a document.
#[derive(Debug, Clone)]
pub struct SdlTypes {
    pub roots: RootTypes,
    pub type_names: Vec<String>,
}

/// Registers every type definition of `document` in `registry`.
///
/// Type extensions are merged into their base definition. Directive
/// definitions are not represented in the registry.
///
/// # Errors
///
/// - [`SchemaError::Build`] for an extension without a base definition or
///   of a different kind
/// - [`SchemaError::Configuration`] when the document declares no query root
pub fn register_document(
    endpoint: &str,
    document: &ServiceDocument,
    registry: &TypeRegistry,
    bindings: &Arc<ResolverBindingRegistry>,
) -> Result<SdlTypes, SchemaError> {
    let mut definitions: IndexMap<String, TypeDefinition> = IndexMap::new();
    let mut extensions: Vec<&TypeDefinition> = Vec::new();
    let mut declared_roots = None;

    for definition in &document.definitions {
        match definition {
            TypeSystemDefinition::Type(def) if def.node.extend => extensions.push(&def.node),
            TypeSystemDefinition::Type(def) => {
                definitions.insert(def.node.name.node.to_string(), def.node.clone());
            }
            TypeSystemDefinition::Schema(schema) => {
                let schema = &schema.node;
                let name = |n: &Option<Positioned<Name>>| n.as_ref().map(|n| n.node.to_string());
                declared_roots = Some((name(&schema.query), name(&schema.mutation), name(&schema.subscription)));
            }
            TypeSystemDefinition::Directive(directive) => {
                debug!(directive = %directive.node.name.node, "Ignoring directive definition");
            }
        }
    }

    for extension in extensions {
        let name = extension.name.node.as_str();
        let base = definitions
            .get_mut(name)
            .ok_or_else(|| SchemaError::Build(format!("Cannot extend undefined type \"{name}\"")))?;
        merge_extension(base, extension)?;
    }

    let roots = root_types(endpoint, declared_roots, &definitions)?;

    for (name, definition) in &definitions {
        let definition = Arc::new(definition.clone());
        let bindings = Arc::clone(bindings);
        registry.register(name.clone(), move |_| Ok(bindings.decorate(raw_config(&definition))));
    }

    trace!(endpoint = %endpoint, types = definitions.len(), "Registered SDL types");
    Ok(SdlTypes {
        roots,
        type_names: definitions.keys().cloned().collect(),
    })
}

type DeclaredRoots = (Option<String>, Option<String>, Option<String>);

fn root_types(
    endpoint: &str,
    declared: Option<DeclaredRoots>,
    definitions: &IndexMap<String, TypeDefinition>,
) -> Result<RootTypes, SchemaError> {
    let (query, mutation, subscription) = declared.unwrap_or_else(|| {
        let defined = |name: &str| definitions.contains_key(name).then(|| name.to_string());
        (defined("Query"), defined("Mutation"), defined("Subscription"))
    });

    let query = query.ok_or_else(|| SchemaError::configuration(endpoint, "schema has no root query type"))?;
    Ok(RootTypes {
        query,
        mutation,
        subscription,
    })
}

fn merge_extension(base: &mut TypeDefinition, extension: &TypeDefinition) -> Result<(), SchemaError> {
    match (&mut base.kind, &extension.kind) {
        (AstKind::Object(base), AstKind::Object(ext)) => {
            base.implements.extend(ext.implements.iter().cloned());
            base.fields.extend(ext.fields.iter().cloned());
        }
        (AstKind::Interface(base), AstKind::Interface(ext)) => {
            base.implements.extend(ext.implements.iter().cloned());
            base.fields.extend(ext.fields.iter().cloned());
        }
        (AstKind::Union(base), AstKind::Union(ext)) => {
            base.members.extend(ext.members.iter().cloned());
        }
        (AstKind::Enum(base), AstKind::Enum(ext)) => {
            base.values.extend(ext.values.iter().cloned());
        }
        (AstKind::InputObject(base), AstKind::InputObject(ext)) => {
            base.fields.extend(ext.fields.iter().cloned());
        }
        (AstKind::Scalar, AstKind::Scalar) => {}
        _ => {
            return Err(SchemaError::Build(format!(
                "Extension of \"{}\" does not match the kind of its definition",
                extension.name.node
            )));
        }
    }
    Ok(())
}

/// Converts a definition into an undecorated type configuration.
fn raw_config(definition: &Arc<TypeDefinition>) -> TypeConfig {
    let name = definition.name.node.to_string();
    let mut config = match &definition.kind {
        AstKind::Scalar => TypeConfig::scalar(name),
        AstKind::Object(object) => {
            let mut config = TypeConfig::object(name, deferred_fields(definition));
            config.interfaces = object.implements.iter().map(|i| i.node.to_string()).collect();
            config
        }
        AstKind::Interface(_) => TypeConfig::interface(name, deferred_fields(definition)),
        AstKind::Union(union) => TypeConfig::union(name, union.members.iter().map(|m| m.node.to_string())),
        AstKind::Enum(enumeration) => TypeConfig::enumeration(
            name,
            enumeration
                .values
                .iter()
                .map(|v| {
                    let mut value = EnumValueConfig::named(v.node.value.node.to_string());
                    value.description = v.node.description.as_ref().map(|d| d.node.clone());
                    value.deprecation = deprecation(&v.node.directives);
                    value
                })
                .collect(),
        ),
        AstKind::InputObject(input) => {
            TypeConfig::input_object(name, input.fields.iter().map(|f| argument_config(&f.node)).collect())
        }
    };
    config.description = definition.description.as_ref().map(|d| d.node.clone());
    config
}

/// Fields evaluated after the owning type is stored, so that they may refer
/// to it.
fn deferred_fields(definition: &Arc<TypeDefinition>) -> FieldList {
    let definition = Arc::clone(definition);
    FieldList::deferred(move |registry| {
        let fields = match &definition.kind {
            AstKind::Object(object) => &object.fields,
            AstKind::Interface(interface) => &interface.fields,
            _ => return Ok(Vec::new()),
        };
        fields
            .iter()
            .map(|field| field_config(&field.node, registry))
            .collect()
    })
}

fn field_config(field: &FieldDefinition, registry: &TypeRegistry) -> Result<FieldConfig, SchemaError> {
    let ty = WireType::from_ast(&field.ty.node);
    if !is_builtin_scalar(ty.base_name()) {
        registry.get(ty.base_name())?;
    }
    let mut config = FieldConfig::new(field.name.node.to_string(), ty);
    config.description = field.description.as_ref().map(|d| d.node.clone());
    config.deprecation = deprecation(&field.directives);
    config.args = field.arguments.iter().map(|a| argument_config(&a.node)).collect();
    Ok(config)
}

/// Reason given by a `@deprecated` directive, if present.
fn deprecation(directives: &[Positioned<ConstDirective>]) -> Option<String> {
    let directive = directives
        .iter()
        .find(|d| d.node.name.node == DEPRECATED_DIRECTIVE)?;
    let reason = match directive.node.get_argument("reason").map(|v| &v.node) {
        Some(Value::String(reason)) => reason.clone(),
        _ => DEFAULT_DEPRECATION_REASON.to_string(),
    };
    Some(reason)
}

fn argument_config(input: &InputValueDefinition) -> ArgumentConfig {
    ArgumentConfig {
        name: input.name.node.to_string(),
        ty: WireType::from_ast(&input.ty.node),
        description: input.description.as_ref().map(|d| d.node.clone()),
        default_value: input.default_value.as_ref().map(|v| v.node.clone()),
    }
}
