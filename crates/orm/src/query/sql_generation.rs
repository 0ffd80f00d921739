//! Query rendering - SELECT lists, joins, WHERE, ORDER BY and paging

use std::collections::HashMap;

use tracing::debug;

use super::alias::AliasContext;
use super::association::AssociationProcessor;
use super::builder::{Condition, Junction, PredicateBuilder};
use super::joins::Root;
use super::types::*;
use crate::converter::ALIAS_SEPARATOR;
use crate::entity::{EntityDescriptor, EntityRegistry};
use crate::error::{ModelError, ModelResult};
use crate::naming::{self, ID_COLUMN};
use crate::schema::Schema;
use crate::security::{is_expression_keyword, is_keyword, quote_identifier};

/// Renders filters into SQL for one schema
pub struct QueryProcessor<'a> {
    schema: &'a Schema,
    registry: &'a EntityRegistry,
}

/// A table reachable from WHERE and ORDER BY
#[derive(Debug, Clone)]
struct ScopeEntry<'a> {
    alias: String,
    entity: &'a EntityDescriptor,
}

/// Qualifiers known to one render: `this`, aliases, association paths and
/// table names
#[derive(Debug)]
struct Scope<'a> {
    root: ScopeEntry<'a>,
    names: HashMap<String, ScopeEntry<'a>>,
}

impl<'a> Scope<'a> {
    fn lookup(&self, qualifier: &str) -> Option<&ScopeEntry<'a>> {
        if qualifier == "this" {
            Some(&self.root)
        } else {
            self.names.get(qualifier)
        }
    }

    fn register(&mut self, name: &str, entry: &ScopeEntry<'a>) {
        self.names
            .entry(name.to_string())
            .or_insert_with(|| entry.clone());
    }
}

/// FROM/JOIN part of a render
struct SelectPlan<'a> {
    table: String,
    scope: Scope<'a>,
    select: Vec<String>,
    joins: Vec<String>,
}

impl<'a> QueryProcessor<'a> {
    pub fn new(schema: &'a Schema, registry: &'a EntityRegistry) -> Self {
        Self { schema, registry }
    }

    /// Run `filter` against a fresh join tree and predicate builder, then render
    pub fn create_query<F>(&self, entity: &str, filter: F) -> ModelResult<Query>
    where
        F: FnOnce(&mut Root, &mut PredicateBuilder),
    {
        let mut root = Root::new();
        let mut predicates = PredicateBuilder::new();
        filter(&mut root, &mut predicates);
        self.render(entity, &root, &predicates)
    }

    /// Render a SELECT over `entity`
    pub fn render(&self, entity: &str, root: &Root, predicates: &PredicateBuilder) -> ModelResult<Query> {
        let plan = self.plan(entity, root)?;
        let mut sql = format!(
            "SELECT {} FROM {} {}",
            plan.select.join(", "),
            quote_identifier(&plan.table),
            plan.scope.root.alias
        );
        let mut args = Vec::new();
        self.build_joins(&plan, &mut sql);
        self.build_where_clause(&plan.scope, predicates, &mut sql, &mut args)?;
        self.build_order_limit_clause(&plan.scope, predicates, &mut sql)?;

        debug!("Rendered query: {}", sql);
        Ok(Query::new(sql, args))
    }

    /// `SELECT COUNT(DISTINCT <root>._id)` over the filtered rows
    pub fn count_query<F>(&self, entity: &str, filter: F) -> ModelResult<Query>
    where
        F: FnOnce(&mut Root, &mut PredicateBuilder),
    {
        let mut root = Root::new();
        let mut predicates = PredicateBuilder::new();
        filter(&mut root, &mut predicates);

        let plan = self.plan(entity, &root)?;
        let mut sql = format!(
            "SELECT COUNT(DISTINCT {}.{}) AS count FROM {} {}",
            plan.scope.root.alias,
            ID_COLUMN,
            quote_identifier(&plan.table),
            plan.scope.root.alias
        );
        let mut args = Vec::new();
        self.build_joins(&plan, &mut sql);
        self.build_where_clause(&plan.scope, &predicates, &mut sql, &mut args)?;
        Ok(Query::new(sql, args))
    }

    /// `SELECT DISTINCT <root>._id` over the filtered rows
    pub fn id_query<F>(&self, entity: &str, filter: F) -> ModelResult<Query>
    where
        F: FnOnce(&mut Root, &mut PredicateBuilder),
    {
        let mut root = Root::new();
        let mut predicates = PredicateBuilder::new();
        filter(&mut root, &mut predicates);

        let plan = self.plan(entity, &root)?;
        let mut sql = format!(
            "SELECT DISTINCT {}.{} AS {} FROM {} {}",
            plan.scope.root.alias,
            ID_COLUMN,
            ID_COLUMN,
            quote_identifier(&plan.table),
            plan.scope.root.alias
        );
        let mut args = Vec::new();
        self.build_joins(&plan, &mut sql);
        self.build_where_clause(&plan.scope, &predicates, &mut sql, &mut args)?;
        self.build_order_limit_clause(&plan.scope, &predicates, &mut sql)?;
        Ok(Query::new(sql, args))
    }

    /// Targets of a many-to-many for one parent row
    pub fn many_to_many_query(
        &self,
        target: &EntityDescriptor,
        join_table: &str,
        parent_column: &str,
        target_column: &str,
        parent_id: i64,
    ) -> ModelResult<Query> {
        let table = naming::table_name(target).map_err(|e| ModelError::QueryBuild(e.to_string()))?;
        let mut ctx = AliasContext::new();
        let alias = ctx.assign(&table, None)?;
        let join_alias = ctx.assign(join_table, None)?;

        let sql = format!(
            "SELECT {} FROM {} {} JOIN {} {} ON {}.{} = {}.{} WHERE {}.{} = ?",
            self.select_columns(&table, &alias, None)?.join(", "),
            quote_identifier(&table),
            alias,
            quote_identifier(join_table),
            join_alias,
            alias,
            ID_COLUMN,
            join_alias,
            quote_identifier(target_column),
            join_alias,
            quote_identifier(parent_column)
        );
        Ok(Query::new(sql, vec![parent_id.to_string()]))
    }

    fn plan(&self, entity: &str, root: &Root) -> ModelResult<SelectPlan<'a>> {
        let descriptor = self
            .registry
            .descriptor(entity)
            .map_err(|e| ModelError::QueryBuild(e.to_string()))?;
        let table = naming::table_name(descriptor).map_err(|e| ModelError::QueryBuild(e.to_string()))?;

        let mut ctx = AliasContext::new();
        let alias = ctx.assign(&table, root.alias_name())?;
        let entry = ScopeEntry {
            alias: alias.clone(),
            entity: descriptor,
        };
        let mut plan = SelectPlan {
            select: self.select_columns(&table, &alias, None)?,
            table: table.clone(),
            scope: Scope {
                root: entry.clone(),
                names: HashMap::new(),
            },
            joins: Vec::new(),
        };
        plan.scope.register(&alias, &entry);
        plan.scope.register(&table, &entry);

        self.plan_joins(descriptor, &alias, "", root, &mut ctx, &mut plan)?;
        Ok(plan)
    }

    fn plan_joins(
        &self,
        parent: &'a EntityDescriptor,
        parent_alias: &str,
        parent_path: &str,
        node: &Root,
        ctx: &mut AliasContext,
        plan: &mut SelectPlan<'a>,
    ) -> ModelResult<()> {
        let processor = AssociationProcessor::new(self.schema, self.registry);
        for child in node.children() {
            let resolution = processor.resolve(parent, parent_alias, child, ctx)?;
            let path = if parent_path.is_empty() {
                child.path().to_string()
            } else {
                format!("{}.{}", parent_path, child.path())
            };

            let entry = ScopeEntry {
                alias: resolution.alias.clone(),
                entity: resolution.target,
            };
            plan.scope.register(&resolution.alias, &entry);
            plan.scope.register(&path, &entry);
            plan.scope.register(&resolution.table, &entry);
            plan.joins.extend(resolution.clauses);

            if child.is_fetch() {
                let columns = self.select_columns(&resolution.table, &resolution.alias, Some(&resolution.alias))?;
                plan.select.extend(columns);
            }

            self.plan_joins(resolution.target, &resolution.alias, &path, child, ctx, plan)?;
        }
        Ok(())
    }

    /// `alias.col AS col` for every column of `table`
    fn select_columns(&self, table: &str, alias: &str, prefix: Option<&str>) -> ModelResult<Vec<String>> {
        let node = self.schema.table(table).ok_or_else(|| {
            ModelError::QueryBuild(format!("table '{}' is not part of the schema", table))
        })?;
        Ok(node
            .columns()
            .iter()
            .map(|column| {
                let label = match prefix {
                    Some(prefix) => format!("{}{}{}", prefix, ALIAS_SEPARATOR, column.name),
                    None => column.name.clone(),
                };
                format!(
                    "{}.{} AS {}",
                    alias,
                    quote_identifier(&column.name),
                    quote_identifier(&label)
                )
            })
            .collect())
    }

    fn build_joins(&self, plan: &SelectPlan<'_>, sql: &mut String) {
        for join in &plan.joins {
            sql.push(' ');
            sql.push_str(join);
        }
    }

    fn build_where_clause(
        &self,
        scope: &Scope<'_>,
        predicates: &PredicateBuilder,
        sql: &mut String,
        args: &mut Vec<String>,
    ) -> ModelResult<()> {
        let rendered = self.render_conditions(scope, predicates.conditions(), JunctionKind::And, args)?;
        if !rendered.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&rendered);
        }
        Ok(())
    }

    fn render_conditions(
        &self,
        scope: &Scope<'_>,
        conditions: &[Condition],
        kind: JunctionKind,
        args: &mut Vec<String>,
    ) -> ModelResult<String> {
        let mut parts = Vec::with_capacity(conditions.len());
        for condition in conditions {
            match condition {
                Condition::Predicate(predicate) => {
                    parts.push(self.render_clause(scope, predicate.clause())?);
                    args.extend(predicate.args().iter().cloned());
                }
                Condition::Junction(Junction { kind, conditions }) => {
                    let nested = self.render_conditions(scope, conditions, *kind, args)?;
                    if !nested.is_empty() {
                        parts.push(format!("({})", nested));
                    }
                }
            }
        }
        Ok(parts.join(&format!(" {} ", kind)))
    }

    fn build_order_limit_clause(
        &self,
        scope: &Scope<'_>,
        predicates: &PredicateBuilder,
        sql: &mut String,
    ) -> ModelResult<()> {
        let ordering = predicates.ordering();
        if !ordering.is_empty() {
            let mut parts = Vec::with_capacity(ordering.len());
            for (column, direction) in ordering {
                parts.push(format!("{} {}", self.render_clause(scope, column)?, direction));
            }
            sql.push_str(" ORDER BY ");
            sql.push_str(&parts.join(", "));
        }
        if let Some((limit, offset)) = predicates.limit_offset() {
            sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset));
        }
        Ok(())
    }

    /// Substitute aliases and column names into a clause template
    fn render_clause(&self, scope: &Scope<'_>, clause: &str) -> ModelResult<String> {
        let chars: Vec<char> = clause.chars().collect();
        let mut out = String::with_capacity(clause.len() + 8);
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            if c == '\'' || c == '"' {
                let start = i;
                i += 1;
                while i < chars.len() {
                    if chars[i] == c {
                        if i + 1 < chars.len() && chars[i + 1] == c {
                            i += 2;
                            continue;
                        }
                        break;
                    }
                    i += 1;
                }
                i = (i + 1).min(chars.len());
                out.extend(&chars[start..i]);
            } else if c.is_ascii_digit() {
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '.') {
                    out.push(chars[i]);
                    i += 1;
                }
            } else if is_ident_start(c) {
                let mut segments = vec![read_ident(&chars, &mut i)];
                while i + 1 < chars.len() && chars[i] == '.' && is_ident_start(chars[i + 1]) {
                    i += 1;
                    segments.push(read_ident(&chars, &mut i));
                }
                out.push_str(&self.resolve_reference(scope, &segments, followed_by_paren(&chars, i))?);
            } else {
                out.push(c);
                i += 1;
            }
        }
        Ok(out)
    }

    fn resolve_reference(&self, scope: &Scope<'_>, segments: &[String], call: bool) -> ModelResult<String> {
        if let [word] = segments {
            let bare = word.as_str();
            if call || is_expression_keyword(bare) {
                return Ok(bare.to_string());
            }
            let known = bare == "id" || scope.root.entity.get_field(bare).is_some();
            if !known && is_keyword(bare) {
                return Ok(bare.to_string());
            }
            return Ok(format!(
                "{}.{}",
                scope.root.alias,
                quote_identifier(&column_for(scope.root.entity, bare))
            ));
        }

        let (column, qualifier) = match segments.split_last() {
            Some((column, qualifier)) => (column, qualifier.join(".")),
            None => return Ok(String::new()),
        };
        let entry = scope.lookup(&qualifier).ok_or_else(|| {
            ModelError::QueryBuild(format!("unknown alias or association '{}'", qualifier))
        })?;
        Ok(format!(
            "{}.{}",
            entry.alias,
            quote_identifier(&column_for(entry.entity, column))
        ))
    }
}

/// Column for a field name; `id` and the identifier field map to `_id`
fn column_for(entity: &EntityDescriptor, name: &str) -> String {
    match entity.get_field(name) {
        Some(field) => naming::column_name(field),
        None if name == "id" => ID_COLUMN.to_string(),
        None => name.to_string(),
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn read_ident(chars: &[char], i: &mut usize) -> String {
    let start = *i;
    while *i < chars.len() && (chars[*i].is_ascii_alphanumeric() || chars[*i] == '_') {
        *i += 1;
    }
    chars[start..*i].iter().collect()
}

fn followed_by_paren(chars: &[char], mut i: usize) -> bool {
    while i < chars.len() && chars[i].is_whitespace() {
        i += 1;
    }
    i < chars.len() && chars[i] == '('
}
