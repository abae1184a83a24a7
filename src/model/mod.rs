//! The declarative model registry: collections, fields, and the relations
//! between them. Built once at process start (see [`registry::REGISTRY`])
//! and treated as an immutable value for the rest of the process's life,
//! the way the reference codebase treats its schema/config as an
//! immutable, process-wide singleton once the engine is built.
//!
//! Every relation is declared on *both* ends explicitly (the forward field
//! on the owning collection and the corresponding field on the related
//! collection). The reference codebase stores one field descriptor per
//! relation and recomputes the "reverse" cardinality and related name at
//! resolution time; here both sides are named, stable registry entries, so
//! the resolver can look up the other side directly instead of flipping
//! flags at runtime. See `DESIGN.md` for the rationale.

pub mod registry;

use crate::patterns::Collection;
use crate::value::FieldValue;

/// One of the four relation cardinalities from the owning field's point of
/// view.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RelationType {
    OneToOne,
    OneToMany,
    ManyToOne,
    ManyToMany,
}

impl RelationType {
    /// True if this field holds at most one related id (the field's own
    /// value is single-valued, not a list).
    pub fn is_single_valued(self) -> bool {
        matches!(self, RelationType::OneToOne | RelationType::ManyToOne)
    }
}

/// What happens to the *other* side of a relation when the object this
/// field points at is deleted.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OnDelete {
    SetNull,
    Protect,
    Cascade,
}

impl Default for OnDelete {
    fn default() -> OnDelete {
        OnDelete::SetNull
    }
}

/// A placeholder position in a template field's name, e.g. `group_$_ids`
/// splits into `prefix = "group_"` and `suffix = "_ids"`; a concrete
/// instantiation for meeting 7 is `group_7_ids`.
#[derive(Clone, Debug)]
pub struct TemplateInfo {
    pub prefix: &'static str,
    pub suffix: &'static str,
}

impl TemplateInfo {
    /// Builds the concrete field name for one token, e.g. token `"7"` with
    /// this template produces `group_7_ids`.
    pub fn instantiate(&self, token: &str) -> String {
        format!("{}{}{}", self.prefix, token, self.suffix)
    }

    /// If `candidate` is a concrete instantiation of this template, returns
    /// the token that was substituted in. The token must be non-empty and
    /// consist only of digits, matching the reference codebase's `\d+`
    /// matcher.
    pub fn extract_token<'a>(&self, candidate: &'a str) -> Option<&'a str> {
        let rest = candidate.strip_prefix(self.prefix)?;
        let token = rest.strip_suffix(self.suffix)?;
        if !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit()) {
            Some(token)
        } else {
            None
        }
    }
}

/// Relation-specific metadata carried by a [`Field`].
#[derive(Clone, Debug)]
pub struct RelationField {
    pub relation_type: RelationType,
    /// Possible target collections. More than one element means this is a
    /// generic relation and `generic` is true.
    pub to: Vec<Collection>,
    pub own_field_name: &'static str,
    pub related_name: &'static str,
    pub on_delete: OnDelete,
    pub equal_fields: &'static [&'static str],
    /// True if this field's own value is one or more [`crate::value::FieldValue::Fqid`]
    /// rather than plain ids, because it may point into more than one
    /// collection.
    pub generic: bool,
    /// A chain of field names to walk, starting from the owning instance,
    /// to compute a runtime token substituted into `related_name`.
    pub structured_relation: Option<&'static [&'static str]>,
    pub template: Option<TemplateInfo>,
}

impl RelationField {
    pub fn single_target(&self) -> Option<&Collection> {
        if self.to.len() == 1 {
            self.to.first()
        } else {
            None
        }
    }
}

/// One field on a [`Model`].
#[derive(Clone, Debug)]
pub struct Field {
    pub name: &'static str,
    pub list: bool,
    pub default: Option<FieldValue>,
    pub read_only: bool,
    pub relation: Option<RelationField>,
}

impl Field {
    pub fn is_relation(&self) -> bool {
        self.relation.is_some()
    }

    pub fn is_template(&self) -> bool {
        self.relation.as_ref().map_or(false, |r| r.template.is_some())
    }
}

/// A named collection's full set of fields.
#[derive(Clone, Debug)]
pub struct Model {
    pub collection: Collection,
    pub fields: Vec<Field>,
}

impl Model {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn relation_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| f.is_relation())
    }

    /// If `candidate` is a concrete instantiation of one of this model's
    /// template relation fields, returns `(field, token)`.
    pub fn match_template_field<'a>(&'a self, candidate: &'a str) -> Option<(&'a Field, &'a str)> {
        self.relation_fields().filter(|f| f.is_template()).find_map(|f| {
            f.relation
                .as_ref()
                .and_then(|r| r.template.as_ref())
                .and_then(|t| t.extract_token(candidate))
                .map(|token| (f, token))
        })
    }
}
