use std::collections::HashMap;

use graphql_parser::query::{
    Definition, Directive, Document, Field, FragmentDefinition, OperationDefinition,
    Selection as GqlSelection, SelectionSet, TypeCondition, Value as GqlValue, VariableDefinition,
};
use indexmap::IndexMap;
use serde_json::{Map as JsonMap, Number as JsonNumber, Value as JsonValue};
use tracing::{debug, instrument};

use crate::{
    ast::{
        error::LoweringError,
        selection::{
            Filter, MutationAction, Operation, OperationKind, RootAction, RootSelection,
            RootTypename, ScalarSelection, Selection, SelectionNode,
        },
        value::ScalarValue,
    },
    schema::{EntityType, RootFieldKind, ScalarKind, SchemaRegistry},
};

pub type QueryDocument = Document<'static, String>;
pub type Variables = HashMap<String, JsonValue>;

type GqlField = Field<'static, String>;
type GqlSelectionSet = SelectionSet<'static, String>;
type Arguments = IndexMap<String, JsonValue>;

const TYPENAME_FIELD_NAME: &str = "__typename";

/// Turns a parsed GraphQL document into the selection tree the planner works on,
/// resolving root fields and relation edges against the registry.
#[instrument(level = "debug", skip_all, fields(operation_name = ?operation_name))]
pub fn lower_operation(
    registry: &SchemaRegistry,
    document: &QueryDocument,
    operation_name: Option<&str>,
    variables: Option<&Variables>,
) -> Result<Operation, LoweringError> {
    let operation = find_operation(document, operation_name)?;
    let no_variables: &[VariableDefinition<'static, String>] = &[];

    let (kind, name, variable_definitions, selection_set) = match operation {
        OperationDefinition::SelectionSet(selection_set) => {
            (OperationKind::Query, None, no_variables, selection_set)
        }
        OperationDefinition::Query(query) => (
            OperationKind::Query,
            query.name.clone(),
            query.variable_definitions.as_slice(),
            &query.selection_set,
        ),
        OperationDefinition::Mutation(mutation) => (
            OperationKind::Mutation,
            mutation.name.clone(),
            mutation.variable_definitions.as_slice(),
            &mutation.selection_set,
        ),
        OperationDefinition::Subscription(_) => return Err(LoweringError::UnsupportedOperation),
    };

    let mut lowering = OperationLowering {
        registry,
        fragments: document
            .definitions
            .iter()
            .filter_map(|definition| match definition {
                Definition::Fragment(fragment) => Some((fragment.name.as_str(), fragment)),
                _ => None,
            })
            .collect(),
        variables: variables.cloned().unwrap_or_default(),
    };
    lowering.apply_variable_defaults(variable_definitions)?;

    let mut fields = Vec::new();
    lowering.collect_fields(selection_set, kind.root_type_name(), &mut fields, &mut Vec::new())?;

    let mut roots: Vec<RootSelection> = Vec::with_capacity(fields.len());
    let mut root_typenames: Vec<RootTypename> = Vec::new();
    for field in fields {
        let response_key = field.alias.as_ref().unwrap_or(&field.name);
        if field.name == TYPENAME_FIELD_NAME {
            if roots.iter().any(|root| &root.node.response_key == response_key) {
                return Err(LoweringError::FieldConflict(response_key.clone()));
            }
            if !root_typenames
                .iter()
                .any(|typename| &typename.response_key == response_key)
            {
                root_typenames.push(RootTypename {
                    response_key: response_key.clone(),
                    position: roots.len() + root_typenames.len(),
                });
            }
            continue;
        }
        if root_typenames
            .iter()
            .any(|typename| &typename.response_key == response_key)
        {
            return Err(LoweringError::FieldConflict(response_key.clone()));
        }

        let root = lowering.lower_root(kind, field)?;
        push_root(&mut roots, root)?;
    }

    debug!(kind = %kind, roots = roots.len(), "operation lowered");

    Ok(Operation {
        kind,
        name,
        roots,
        root_typenames,
    })
}

fn find_operation<'a>(
    document: &'a QueryDocument,
    operation_name: Option<&str>,
) -> Result<&'a OperationDefinition<'static, String>, LoweringError> {
    let mut operations = document
        .definitions
        .iter()
        .filter_map(|definition| match definition {
            Definition::Operation(operation) => Some(operation),
            _ => None,
        });

    match operation_name {
        Some(name) => operations
            .find(|operation| name_of(operation) == Some(name))
            .ok_or_else(|| LoweringError::SpecifiedOperationNotFound(name.to_string())),
        None => {
            let first = operations.next().ok_or(LoweringError::OperationNotFound)?;
            match operations.next() {
                Some(_) => Err(LoweringError::MultipleMatchingOperationsFound),
                None => Ok(first),
            }
        }
    }
}

fn name_of<'a>(operation: &'a OperationDefinition<'static, String>) -> Option<&'a str> {
    match operation {
        OperationDefinition::SelectionSet(_) => None,
        OperationDefinition::Query(query) => query.name.as_deref(),
        OperationDefinition::Mutation(mutation) => mutation.name.as_deref(),
        OperationDefinition::Subscription(subscription) => subscription.name.as_deref(),
    }
}

fn type_condition_matches(condition: Option<&TypeCondition<'static, String>>, type_name: &str) -> bool {
    match condition {
        Some(TypeCondition::On(name)) => name == type_name,
        None => true,
    }
}

fn push_root(roots: &mut Vec<RootSelection>, root: RootSelection) -> Result<(), LoweringError> {
    let position = roots
        .iter()
        .position(|existing| existing.node.response_key == root.node.response_key);

    match position {
        None => {
            roots.push(root);
            Ok(())
        }
        Some(index) => {
            let existing = &mut roots[index];
            if existing.node.field != root.node.field
                || existing.node.filter != root.node.filter
                || existing.action != root.action
            {
                return Err(LoweringError::FieldConflict(root.node.response_key));
            }
            merge_nodes(&mut existing.node, root.node)
        }
    }
}

fn push_selection(selections: &mut Vec<Selection>, selection: Selection) -> Result<(), LoweringError> {
    let position = selections
        .iter()
        .position(|existing| existing.response_key() == selection.response_key());

    let Some(index) = position else {
        selections.push(selection);
        return Ok(());
    };

    match (&mut selections[index], selection) {
        (Selection::Scalar(existing), Selection::Scalar(incoming))
            if existing.field == incoming.field =>
        {
            Ok(())
        }
        (Selection::Typename(_), Selection::Typename(_)) => Ok(()),
        (Selection::Relation(existing), Selection::Relation(incoming))
            if existing.field == incoming.field && existing.filter == incoming.filter =>
        {
            merge_nodes(existing, incoming)
        }
        (_, incoming) => Err(LoweringError::FieldConflict(
            incoming.response_key().to_string(),
        )),
    }
}

fn merge_nodes(target: &mut SelectionNode, source: SelectionNode) -> Result<(), LoweringError> {
    for selection in source.selections {
        push_selection(&mut target.selections, selection)?;
    }
    Ok(())
}

struct OperationLowering<'a> {
    registry: &'a SchemaRegistry,
    fragments: HashMap<&'a str, &'a FragmentDefinition<'static, String>>,
    variables: Variables,
}

impl<'a> OperationLowering<'a> {
    fn apply_variable_defaults(
        &mut self,
        definitions: &[VariableDefinition<'static, String>],
    ) -> Result<(), LoweringError> {
        for definition in definitions {
            if self.variables.contains_key(&definition.name) {
                continue;
            }
            if let Some(default_value) = &definition.default_value {
                let value = self.literal_to_json(&definition.name, default_value)?;
                self.variables.insert(definition.name.clone(), value);
            }
        }
        Ok(())
    }

    /// Flattens fragments and drops `@skip`/`@include`-excluded fields, keeping document order.
    fn collect_fields(
        &self,
        selection_set: &'a GqlSelectionSet,
        type_name: &str,
        out: &mut Vec<&'a GqlField>,
        visiting: &mut Vec<&'a str>,
    ) -> Result<(), LoweringError> {
        for item in &selection_set.items {
            match item {
                GqlSelection::Field(field) => {
                    if self.is_included(&field.directives)? {
                        out.push(field);
                    }
                }
                GqlSelection::InlineFragment(fragment) => {
                    if !self.is_included(&fragment.directives)?
                        || !type_condition_matches(fragment.type_condition.as_ref(), type_name)
                    {
                        continue;
                    }
                    self.collect_fields(&fragment.selection_set, type_name, out, visiting)?;
                }
                GqlSelection::FragmentSpread(spread) => {
                    if !self.is_included(&spread.directives)? {
                        continue;
                    }
                    let name = spread.fragment_name.as_str();
                    let fragment = *self
                        .fragments
                        .get(name)
                        .ok_or_else(|| LoweringError::UnknownFragment(name.to_string()))?;
                    if visiting.contains(&fragment.name.as_str()) {
                        return Err(LoweringError::FragmentCycle(name.to_string()));
                    }
                    if !type_condition_matches(Some(&fragment.type_condition), type_name) {
                        continue;
                    }
                    visiting.push(fragment.name.as_str());
                    self.collect_fields(&fragment.selection_set, type_name, out, visiting)?;
                    visiting.pop();
                }
            }
        }
        Ok(())
    }

    fn is_included(&self, directives: &[Directive<'static, String>]) -> Result<bool, LoweringError> {
        for directive in directives {
            let expected = match directive.name.as_str() {
                "skip" => false,
                "include" => true,
                _ => continue,
            };
            let condition = directive
                .arguments
                .iter()
                .find(|(name, _)| name == "if")
                .map(|(_, value)| self.literal_to_json("if", value))
                .transpose()?;
            match condition {
                Some(JsonValue::Bool(value)) if value != expected => return Ok(false),
                Some(JsonValue::Bool(_)) => {}
                _ => {
                    return Err(LoweringError::InvalidValue {
                        argument: format!("@{}(if:)", directive.name),
                        reason: "expected a boolean".to_string(),
                    })
                }
            }
        }
        Ok(true)
    }

    fn arguments(&self, field: &GqlField) -> Result<Arguments, LoweringError> {
        field
            .arguments
            .iter()
            .map(|(name, value)| Ok((name.clone(), self.literal_to_json(name, value)?)))
            .collect()
    }

    fn literal_to_json(
        &self,
        argument: &str,
        value: &GqlValue<'static, String>,
    ) -> Result<JsonValue, LoweringError> {
        let invalid = |reason: &str| LoweringError::InvalidValue {
            argument: argument.to_string(),
            reason: reason.to_string(),
        };

        Ok(match value {
            GqlValue::Variable(name) => self
                .variables
                .get(name)
                .cloned()
                .ok_or_else(|| LoweringError::MissingVariable(name.clone()))?,
            GqlValue::Int(number) => number
                .as_i64()
                .map(JsonValue::from)
                .ok_or_else(|| invalid("integer out of range"))?,
            GqlValue::Float(number) => JsonNumber::from_f64(*number)
                .map(JsonValue::Number)
                .ok_or_else(|| invalid("float is not finite"))?,
            GqlValue::String(s) => JsonValue::String(s.clone()),
            GqlValue::Boolean(b) => JsonValue::Bool(*b),
            GqlValue::Null => JsonValue::Null,
            GqlValue::Enum(name) => JsonValue::String(name.clone()),
            GqlValue::List(items) => JsonValue::Array(
                items
                    .iter()
                    .map(|item| self.literal_to_json(argument, item))
                    .collect::<Result<_, _>>()?,
            ),
            GqlValue::Object(fields) => JsonValue::Object(
                fields
                    .iter()
                    .map(|(name, value)| Ok((name.clone(), self.literal_to_json(argument, value)?)))
                    .collect::<Result<JsonMap<_, _>, LoweringError>>()?,
            ),
        })
    }

    fn lower_root(
        &self,
        kind: OperationKind,
        field: &'a GqlField,
    ) -> Result<RootSelection, LoweringError> {
        let root_field = self.registry.root_field(kind, &field.name)?;
        let entity = self.registry.entity_type(&root_field.entity)?;
        let mut arguments = self.arguments(field)?;

        let mut node = SelectionNode::new(&field.name, &entity.name, root_field.cardinality());
        if let Some(alias) = &field.alias {
            node.response_key = alias.clone();
        }

        let action = match &root_field.kind {
            RootFieldKind::FindOne => {
                let id = take_id(&field.name, &mut arguments, "id")?;
                node.filter = Some(Filter::eq(&entity.primary_key, id));
                RootAction::Read
            }
            RootFieldKind::FindMany => RootAction::Read,
            RootFieldKind::Create => {
                let dto = take_required(&field.name, &mut arguments, "dto")?;
                RootAction::Mutate(MutationAction::Create {
                    values: input_values(entity, dto)?,
                })
            }
            RootFieldKind::Update => {
                let id = take_id(&field.name, &mut arguments, "id")?;
                let dto = take_required(&field.name, &mut arguments, "dto")?;
                RootAction::Mutate(MutationAction::Update {
                    id,
                    values: input_values(entity, dto)?,
                })
            }
            RootFieldKind::Delete => RootAction::Mutate(MutationAction::Delete {
                id: take_id(&field.name, &mut arguments, "id")?,
            }),
            RootFieldKind::Link {
                edge,
                parent_argument,
                child_argument,
            } => RootAction::Mutate(MutationAction::Link {
                edge: edge.clone(),
                parent: take_id(&field.name, &mut arguments, parent_argument)?,
                child: take_id(&field.name, &mut arguments, child_argument)?,
            }),
            RootFieldKind::Unlink {
                edge,
                parent_argument,
                child_argument,
            } => RootAction::Mutate(MutationAction::Unlink {
                edge: edge.clone(),
                parent: take_id(&field.name, &mut arguments, parent_argument)?,
                child: take_id(&field.name, &mut arguments, child_argument)?,
            }),
        };

        reject_leftovers(&field.name, arguments)?;

        if root_field.kind.returns_entity() {
            node.selections = self.lower_selection_set(field, entity)?;
        } else if !field.selection_set.items.is_empty() {
            return Err(LoweringError::UnexpectedSelectionSet {
                field: field.name.clone(),
            });
        }

        Ok(RootSelection { node, action })
    }

    fn lower_selection_set(
        &self,
        field: &'a GqlField,
        entity: &EntityType,
    ) -> Result<Vec<Selection>, LoweringError> {
        if field.selection_set.items.is_empty() {
            return Err(LoweringError::MissingSelectionSet {
                type_name: entity.name.clone(),
                field: field.name.clone(),
            });
        }

        let mut fields = Vec::new();
        self.collect_fields(&field.selection_set, &entity.name, &mut fields, &mut Vec::new())?;

        let mut selections = Vec::with_capacity(fields.len());
        for child in fields {
            let response_key = child.alias.as_ref().unwrap_or(&child.name).clone();

            let selection = if child.name == TYPENAME_FIELD_NAME {
                Selection::Typename(response_key)
            } else if entity.field(&child.name).is_some() {
                if !child.selection_set.items.is_empty() {
                    return Err(LoweringError::UnexpectedSelectionSet {
                        field: child.name.clone(),
                    });
                }
                reject_leftovers(&child.name, self.arguments(child)?)?;
                Selection::Scalar(ScalarSelection {
                    response_key,
                    field: child.name.clone(),
                })
            } else if let Some(edge) = entity.edge(&child.name) {
                let target = self.registry.entity_type(&edge.target)?;
                let mut arguments = self.arguments(child)?;
                let mut node = SelectionNode::new(&child.name, &target.name, edge.cardinality)
                    .with_alias(&response_key);
                if let Some(id) = arguments.shift_remove("id") {
                    node.filter = Some(Filter::eq(
                        &target.primary_key,
                        to_id(&child.name, "id", &id)?,
                    ));
                }
                reject_leftovers(&child.name, arguments)?;
                node.selections = self.lower_selection_set(child, target)?;
                Selection::Relation(node)
            } else {
                return Err(LoweringError::UnknownField {
                    type_name: entity.name.clone(),
                    field: child.name.clone(),
                });
            };

            push_selection(&mut selections, selection)?;
        }

        Ok(selections)
    }
}

fn take_required(
    field: &str,
    arguments: &mut Arguments,
    argument: &str,
) -> Result<JsonValue, LoweringError> {
    match arguments.shift_remove(argument) {
        Some(JsonValue::Null) | None => Err(LoweringError::MissingArgument {
            field: field.to_string(),
            argument: argument.to_string(),
        }),
        Some(value) => Ok(value),
    }
}

fn take_id(
    field: &str,
    arguments: &mut Arguments,
    argument: &str,
) -> Result<ScalarValue, LoweringError> {
    let value = take_required(field, arguments, argument)?;
    to_id(field, argument, &value)
}

fn to_id(field: &str, argument: &str, value: &JsonValue) -> Result<ScalarValue, LoweringError> {
    ScalarValue::from_json(value)
        .and_then(|value| value.coerce(ScalarKind::Id))
        .ok_or_else(|| LoweringError::InvalidValue {
            argument: format!("{field}.{argument}"),
            reason: "expected an ID".to_string(),
        })
}

fn reject_leftovers(field: &str, arguments: Arguments) -> Result<(), LoweringError> {
    match arguments.into_keys().next() {
        Some(argument) => Err(LoweringError::UnknownArgument {
            field: field.to_string(),
            argument,
        }),
        None => Ok(()),
    }
}

/// Checks an input object against the entity's scalar columns.
fn input_values(
    entity: &EntityType,
    input: JsonValue,
) -> Result<Vec<(String, ScalarValue)>, LoweringError> {
    let JsonValue::Object(fields) = input else {
        return Err(LoweringError::InvalidValue {
            argument: "dto".to_string(),
            reason: "expected an input object".to_string(),
        });
    };

    fields
        .into_iter()
        .map(|(name, value)| {
            let invalid = |reason: String| LoweringError::InvalidValue {
                argument: format!("dto.{name}"),
                reason,
            };
            let column = entity
                .field(&name)
                .ok_or_else(|| invalid(format!("\"{}\" has no field \"{}\"", entity.name, name)))?;
            if column.name == entity.primary_key {
                return Err(invalid("the primary key cannot be set".to_string()));
            }
            let value = ScalarValue::from_json(&value)
                .and_then(|value| value.coerce(column.kind))
                .ok_or_else(|| invalid(format!("expected a value of kind {:?}", column.kind)))?;
            Ok((name, value))
        })
        .collect()
}
