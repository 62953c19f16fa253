//! Entity catalog
//!
//! Static table mapping each entity kind to its source collection, identity
//! field, reference policies, and the upsert procedure with its positional
//! parameters. Declaration order is dependency order: parents come before
//! the children that reference them, and collections are fetched in this
//! order.
//!
//! The table is validated once at startup; nothing about a procedure call is
//! assembled per record.

use crate::error::SetupError;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

/// Entity kinds ingested from the source backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Profile,
    Workspace,
    Page,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Profile => "profile",
            EntityKind::Workspace => "workspace",
            EntityKind::Page => "page",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do when a reference field is blank
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingReference {
    /// Record cannot be written; skip it
    Required,
    /// Fill with the first identity of the parent's fallback pool
    Fallback,
    /// Pass NULL through to the procedure
    Nullable,
}

/// Foreign-key field of an entity and how a gap in it is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferencePolicy {
    pub field: &'static str,
    pub parent: EntityKind,
    pub on_missing: MissingReference,
}

/// SQL type a text parameter is cast to in the procedure call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Uuid,
    Text,
    Jsonb,
}

impl SqlType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SqlType::Uuid => "uuid",
            SqlType::Text => "text",
            SqlType::Jsonb => "jsonb",
        }
    }
}

/// One positional procedure parameter, read from a record field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    pub field: &'static str,
    pub sql_type: SqlType,
}

const fn param(field: &'static str, sql_type: SqlType) -> ParamSpec {
    ParamSpec { field, sql_type }
}

/// Everything needed to read, repair and write one entity kind
#[derive(Debug, Clone)]
pub struct EntitySpec {
    pub kind: EntityKind,
    /// Collection name at the source
    pub collection: &'static str,
    /// Primary key field; upserts are keyed on it
    pub identity: &'static str,
    /// Field used to name a record in log lines
    pub label: &'static str,
    /// Schema-qualified upsert procedure
    pub procedure: &'static str,
    /// Positional parameters, identity first
    pub params: &'static [ParamSpec],
    pub references: &'static [ReferencePolicy],
}

impl EntitySpec {
    /// SQL text invoking the procedure with typed positional placeholders
    ///
    /// `public.handle_profile_upsert` with (uuid, text) becomes
    /// `SELECT * FROM public.handle_profile_upsert($1::uuid, $2::text)`.
    pub fn call_sql(&self) -> String {
        let placeholders: Vec<String> = self
            .params
            .iter()
            .enumerate()
            .map(|(i, p)| format!("${}::{}", i + 1, p.sql_type.as_str()))
            .collect();
        format!("SELECT * FROM {}({})", self.procedure, placeholders.join(", "))
    }

    /// (schema, name) halves of the procedure name
    pub fn procedure_parts(&self) -> Option<(&'static str, &'static str)> {
        self.procedure.split_once('.')
    }
}

/// Entities of the workspace application, in dependency order
pub static ENTITIES: &[EntitySpec] = &[
    EntitySpec {
        kind: EntityKind::Profile,
        collection: "profiles",
        identity: "id",
        label: "email",
        procedure: "public.handle_profile_upsert",
        params: &[param("id", SqlType::Uuid), param("email", SqlType::Text)],
        references: &[],
    },
    EntitySpec {
        kind: EntityKind::Workspace,
        collection: "workspaces",
        identity: "id",
        label: "name",
        procedure: "public.handle_workspace_upsert",
        params: &[
            param("id", SqlType::Uuid),
            param("user_id", SqlType::Uuid),
            param("name", SqlType::Text),
        ],
        references: &[ReferencePolicy {
            field: "user_id",
            parent: EntityKind::Profile,
            on_missing: MissingReference::Fallback,
        }],
    },
    EntitySpec {
        kind: EntityKind::Page,
        collection: "pages",
        identity: "id",
        label: "title",
        procedure: "public.handle_page_upsert",
        params: &[
            param("id", SqlType::Uuid),
            param("workspace_id", SqlType::Uuid),
            param("user_id", SqlType::Uuid),
            param("title", SqlType::Text),
            param("content", SqlType::Jsonb),
        ],
        references: &[
            ReferencePolicy {
                field: "user_id",
                parent: EntityKind::Profile,
                on_missing: MissingReference::Fallback,
            },
            ReferencePolicy {
                field: "workspace_id",
                parent: EntityKind::Workspace,
                on_missing: MissingReference::Nullable,
            },
        ],
    },
];

/// Validated, ordered set of entity specs
#[derive(Debug, Clone)]
pub struct Catalog {
    entities: Vec<EntitySpec>,
}

impl Catalog {
    /// Validate and wrap a list of entity specs
    pub fn new(entities: Vec<EntitySpec>) -> Result<Self, SetupError> {
        validate(&entities)?;
        Ok(Self { entities })
    }

    /// Catalog of the workspace application
    pub fn standard() -> Result<Self, SetupError> {
        Self::new(ENTITIES.to_vec())
    }

    /// Specs in fetch order
    pub fn entities(&self) -> &[EntitySpec] {
        &self.entities
    }

    pub fn get(&self, kind: EntityKind) -> Option<&EntitySpec> {
        self.entities.iter().find(|e| e.kind == kind)
    }
}

fn validate(entities: &[EntitySpec]) -> Result<(), SetupError> {
    let fail = |msg: String| Err(SetupError::Catalog(msg));

    if entities.is_empty() {
        return fail("catalog declares no entities".to_string());
    }

    let mut kinds = HashSet::new();
    let mut collections = HashSet::new();
    let mut procedures = HashSet::new();

    for spec in entities {
        if !kinds.insert(spec.kind) {
            return fail(format!("{} declared twice", spec.kind));
        }
        if !collections.insert(spec.collection) {
            return fail(format!("collection '{}' declared twice", spec.collection));
        }
        if !procedures.insert(spec.procedure) {
            return fail(format!("procedure {} declared twice", spec.procedure));
        }
        if !is_identifier(spec.collection) {
            return fail(format!("collection name '{}' is not a plain identifier", spec.collection));
        }

        match spec.procedure_parts() {
            Some((schema, name)) if is_identifier(schema) && is_identifier(name) => {}
            _ => {
                return fail(format!(
                    "procedure '{}' must be a schema-qualified identifier",
                    spec.procedure
                ))
            }
        }

        match spec.params.first() {
            Some(first) if first.field == spec.identity => {}
            _ => {
                return fail(format!(
                    "{}: identity field '{}' must be the first parameter",
                    spec.kind, spec.identity
                ))
            }
        }

        let mut fields = HashSet::new();
        for p in spec.params {
            if !fields.insert(p.field) {
                return fail(format!("{}: parameter '{}' repeated", spec.kind, p.field));
            }
        }

        for reference in spec.references {
            if !fields.contains(reference.field) {
                return fail(format!(
                    "{}: reference field '{}' is not a procedure parameter",
                    spec.kind, reference.field
                ));
            }
            if reference.parent == spec.kind {
                return fail(format!(
                    "{}: reference '{}' points at its own kind",
                    spec.kind, reference.field
                ));
            }
            // Parent must already be in `kinds`, i.e. declared earlier
            if !kinds.contains(&reference.parent) {
                return fail(format!(
                    "{}: parent {} of '{}' must be declared before it",
                    spec.kind, reference.parent, reference.field
                ));
            }
        }
    }

    Ok(())
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
