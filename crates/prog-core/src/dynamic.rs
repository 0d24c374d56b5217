//! Per-character, per-history-index variable tables.
//!
//! Each row starts as a copy of the previous one. Only the owner of the entry
//! at an index gets a new row; everyone else shares the previous `Arc`.
//!
//! At an owned index three pools of operations run: constants from every
//! category the character participates in, templates of the owning entry's
//! category for every live entry in that category's rolling window, and the
//! entry's own operations. Pools are
//! split into an assignment queue and a mutation queue and resolved to a
//! fixed point. An operation waits while any of its references is still the
//! target of another pending operation.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::category::Category;
use crate::config::EngineConfig;
use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::entry::Entry;
use crate::error::{ProgError, ProgResult};
use crate::expr::{self, ExprError};
use crate::history::HistoryIndex;
use crate::id::{CategoryId, CharacterId, EntryId};
use crate::interpolate;
use crate::operation::{OperationKind, OperationSpec};
use crate::snapshot::Snapshot;
use crate::store::EntityStore;
use crate::value::Value;

/// The derived variable tables for every character.
#[derive(Debug, Clone, Default)]
pub struct DynamicData {
    rows: HashMap<CharacterId, Vec<Arc<Snapshot>>>,
    len: usize,
    diagnostics: Vec<Diagnostic>,
}

/// The entry whose fields an operation can see.
#[derive(Debug, Clone, Copy)]
struct Scope<'a> {
    entry: &'a Entry,
    category: &'a Category,
}

impl Scope<'_> {
    fn field(&self, name: &str) -> Option<Value> {
        self.entry.field_value(self.category, name)
    }

    fn field_text(&self, name: &str) -> Option<String> {
        self.entry.field(self.category, name).map(str::to_string)
    }

    fn is_field(&self, name: &str) -> bool {
        self.category.field_index(name).is_some()
    }
}

#[derive(Debug, Clone)]
struct Pending<'a> {
    key: String,
    spec: &'a OperationSpec,
    scope: Option<Scope<'a>>,
    dependencies: Vec<String>,
}

impl<'a> Pending<'a> {
    fn new(key: &str, spec: &'a OperationSpec, scope: Option<Scope<'a>>, missing: &str) -> Self {
        let key = match scope {
            Some(scope) => interpolate::translate_with(key, |name| scope.field_text(name), missing),
            None => key.to_string(),
        };
        let dependencies = interpolate::references(&spec.expression)
            .into_iter()
            .filter(|name| !scope.is_some_and(|s| s.is_field(name)))
            .collect();
        Self {
            key,
            spec,
            scope,
            dependencies,
        }
    }

    fn entry(&self) -> Option<EntryId> {
        self.scope.map(|s| s.entry.id)
    }

    fn lookup(&self, snapshot: &Snapshot, name: &str) -> Option<Value> {
        self.scope
            .and_then(|s| s.field(name))
            .or_else(|| snapshot.get(name).cloned())
    }

    /// Dependencies still produced by some other pending operation.
    fn blocked_on(&self, queues: [&VecDeque<Pending<'a>>; 2]) -> Vec<String> {
        self.dependencies
            .iter()
            .filter(|dep| {
                queues
                    .iter()
                    .flat_map(|q| q.iter())
                    .any(|other| &other.key == *dep)
            })
            .cloned()
            .collect()
    }
}

/// State for the operations run at one history index.
struct IndexRun<'c> {
    index: usize,
    character: CharacterId,
    config: &'c EngineConfig,
    diagnostics: &'c mut Vec<Diagnostic>,
}

impl IndexRun<'_> {
    fn resolve(&mut self, pool: Vec<Pending<'_>>, snapshot: &mut Snapshot) {
        let (mut assign, mut mutate): (VecDeque<_>, VecDeque<_>) =
            pool.into_iter().partition(|op| op.spec.kind.is_assignment());

        loop {
            let before = (assign.len(), mutate.len());
            while !assign.is_empty() && self.pass(&mut assign, &mutate, snapshot) > 0 {}
            self.pass(&mut mutate, &assign, snapshot);
            if (assign.len(), mutate.len()) == before {
                break;
            }
        }

        for op in assign.iter().chain(mutate.iter()) {
            let waiting_on = op.blocked_on([&assign, &mutate]);
            let message = format!(
                "{} on \"{}\" never ran; still waiting on {}",
                op.spec.kind,
                op.key,
                waiting_on.join(", ")
            );
            self.report(Diagnostic::error(
                DiagnosticKind::Unresolved {
                    index: self.index,
                    character: self.character,
                    entry: op.entry(),
                    key: op.key.clone(),
                    expression: op.spec.expression.clone(),
                    waiting_on,
                },
                message,
            ));
        }
    }

    /// One pass over `queue`: run every eligible operation, requeue the rest.
    /// Returns how many ran.
    fn pass<'a>(
        &mut self,
        queue: &mut VecDeque<Pending<'a>>,
        other: &VecDeque<Pending<'a>>,
        snapshot: &mut Snapshot,
    ) -> usize {
        let mut ran = 0;
        for _ in 0..queue.len() {
            let Some(op) = queue.pop_front() else {
                break;
            };
            if op.blocked_on([&*queue, other]).is_empty() {
                self.run(&op, snapshot);
                ran += 1;
            } else {
                queue.push_back(op);
            }
        }
        ran
    }

    fn run(&mut self, op: &Pending<'_>, snapshot: &mut Snapshot) {
        let expression = op.spec.expression.as_str();
        let operand = {
            let current: &Snapshot = snapshot;
            let lookup = |name: &str| op.lookup(current, name);
            match expr::parse_expression(expression) {
                Ok(tree) => expr::eval::evaluate(&tree, &lookup),
                Err(_)
                    if op.spec.kind == OperationKind::AssignString
                        && self.config.literal_string_fallback =>
                {
                    Ok(Value::String(interpolate::translate_with(
                        expression,
                        |name| lookup(name).map(|v| v.to_string()),
                        &self.config.missing_value_text,
                    )))
                }
                Err(e) => Err(e),
            }
        };

        match operand.and_then(|v| op.spec.kind.apply(snapshot.get(&op.key), &v)) {
            Ok(value) => {
                snapshot.insert(op.key.clone(), value);
            }
            Err(e) => self.fail(op, snapshot, e),
        }
    }

    fn fail(&mut self, op: &Pending<'_>, snapshot: &Snapshot, error: ExprError) {
        let interpolated = interpolate::translate_with(
            &op.spec.expression,
            |name| op.lookup(snapshot, name).map(|v| v.to_string()),
            &self.config.missing_value_text,
        );
        let message = format!(
            "{} on \"{}\" failed: {error} (evaluating `{interpolated}`)",
            op.spec.kind, op.key
        );
        self.report(Diagnostic::error(
            DiagnosticKind::OperationFailed {
                index: self.index,
                character: self.character,
                entry: op.entry(),
                key: op.key.clone(),
                expression: op.spec.expression.clone(),
                span: error.span,
            },
            message,
        ));
    }

    fn report(&mut self, diagnostic: Diagnostic) {
        if self.config.trace_failures {
            match &diagnostic.kind {
                DiagnosticKind::OperationFailed {
                    index,
                    character,
                    entry,
                    key,
                    expression,
                    ..
                }
                | DiagnosticKind::Unresolved {
                    index,
                    character,
                    entry,
                    key,
                    expression,
                    ..
                } => tracing::warn!(
                    %key,
                    entry = ?entry,
                    %character,
                    index,
                    %expression,
                    "{}",
                    diagnostic.message
                ),
                other => tracing::warn!(kind = ?other, "{}", diagnostic.message),
            }
        }
        self.diagnostics.push(diagnostic);
    }
}

impl DynamicData {
    /// Create an empty engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Recompute every row from scratch.
    ///
    /// Call after every history rebuild. Operation failures are recorded as
    /// diagnostics and never abort the recompute.
    pub fn recompute(&mut self, history: &HistoryIndex, store: &EntityStore, config: &EngineConfig) {
        self.rows.clear();
        self.diagnostics.clear();
        self.len = history.len();

        let empty = Arc::new(Snapshot::new());
        let characters: Vec<CharacterId> = store.characters().map(|c| c.id).collect();
        for character in &characters {
            self.rows
                .insert(*character, Vec::with_capacity(history.len()));
        }

        let mut constants: HashMap<CharacterId, Vec<Pending<'_>>> = HashMap::new();
        let mut windows: HashMap<(CharacterId, CategoryId), Vec<EntryId>> = HashMap::new();

        for (index, id) in history.entries().iter().enumerate() {
            let owned = store.entry(*id).and_then(|entry| {
                let category = store.category(entry.category)?;
                store
                    .character(entry.character)
                    .map(|_| Scope { entry, category })
            });

            for character in &characters {
                let Some(row) = self.rows.get_mut(character) else {
                    continue;
                };
                let previous = row.last().cloned().unwrap_or_else(|| Arc::clone(&empty));

                let Some(scope) = owned.filter(|s| s.entry.character == *character) else {
                    row.push(previous);
                    continue;
                };

                let window = windows
                    .entry((*character, scope.entry.category))
                    .or_default();
                let series = history.root_of(scope.entry.id).unwrap_or(scope.entry.id);
                window.retain(|member| history.root_of(*member).unwrap_or(*member) != series);
                if !scope.entry.disabled {
                    window.push(scope.entry.id);
                }

                let mut pool = constants
                    .entry(*character)
                    .or_insert_with(|| constant_pool(store, *character, config))
                    .clone();
                pool.extend(template_pool(store, window, config));
                if !scope.entry.disabled {
                    pool.extend(
                        scope
                            .entry
                            .dynamic_data_operations
                            .iter()
                            .map(|(key, spec)| {
                                Pending::new(key, spec, Some(scope), &config.missing_value_text)
                            }),
                    );
                }

                let mut snapshot = (*previous).clone();
                IndexRun {
                    index,
                    character: *character,
                    config,
                    diagnostics: &mut self.diagnostics,
                }
                .resolve(pool, &mut snapshot);
                row.push(Arc::new(snapshot));
            }
        }

        tracing::debug!(
            indices = self.len,
            characters = characters.len(),
            diagnostics = self.diagnostics.len(),
            "recomputed dynamic data"
        );
    }

    /// The variable state of a character right after history index `index`.
    pub fn snapshot(&self, character: CharacterId, index: usize) -> ProgResult<&Snapshot> {
        let row = self
            .rows
            .get(&character)
            .ok_or(ProgError::CharacterNotFound(character))?;
        row.get(index)
            .map(Arc::as_ref)
            .ok_or(ProgError::IndexOutOfRange {
                index,
                len: row.len(),
            })
    }

    /// Number of history indices covered by the last recompute.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True if the last recompute saw an empty history.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Problems found during the last recompute, in processing order.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }
}

fn constant_pool<'a>(
    store: &'a EntityStore,
    character: CharacterId,
    config: &EngineConfig,
) -> Vec<Pending<'a>> {
    let Some(character) = store.character(character) else {
        return Vec::new();
    };
    character
        .categories
        .iter()
        .filter_map(|id| store.category(*id))
        .flat_map(|category| {
            category
                .dynamic_data_operations
                .iter()
                .map(move |(key, spec)| Pending::new(key, spec, None, &config.missing_value_text))
        })
        .collect()
}

fn template_pool<'a>(
    store: &'a EntityStore,
    window: &[EntryId],
    config: &EngineConfig,
) -> Vec<Pending<'a>> {
    window
        .iter()
        .filter_map(|id| {
            let entry = store.entry(*id)?;
            let category = store.category(entry.category)?;
            Some(Scope { entry, category })
        })
        .flat_map(|scope| {
            scope
                .category
                .dynamic_data_operation_templates
                .iter()
                .map(move |(key, spec)| {
                    Pending::new(key, spec, Some(scope), &config.missing_value_text)
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::Field;
    use crate::character::Character;
    use crate::operation::OperationKind::*;

    struct Fixture {
        store: EntityStore,
        history: HistoryIndex,
        data: DynamicData,
        aria: CharacterId,
    }

    impl Fixture {
        fn new(category: Category) -> (Self, crate::id::CategoryId) {
            let mut store = EntityStore::new();
            let cat = store.add_category(category);
            let aria = store
                .add_character(Character::new("Aria").with_category(cat))
                .unwrap();
            (
                Self {
                    store,
                    history: HistoryIndex::default(),
                    data: DynamicData::new(),
                    aria,
                },
                cat,
            )
        }

        fn push(&mut self, entry: Entry) -> EntryId {
            let id = self.store.add_entry(entry).unwrap();
            self.history.insert_at_head(id);
            id
        }

        fn recompute(&mut self) {
            self.recompute_with(&EngineConfig::default());
        }

        fn recompute_with(&mut self, config: &EngineConfig) {
            self.history.rebuild(&mut self.store, config);
            self.data.recompute(&self.history, &self.store, config);
        }

        fn get(&self, index: usize, key: &str) -> Option<Value> {
            self.data.snapshot(self.aria, index).unwrap().get(key).cloned()
        }
    }

    #[test]
    fn same_index_operations_resolve_regardless_of_order() {
        let (mut fx, cat) = Fixture::new(Category::new("Stats"));
        let aria = fx.aria;
        fx.push(
            Entry::new(aria, cat)
                .with_operation("a_total", AssignInteger, "!${z_base}$! * 2")
                .with_operation("z_base", AssignInteger, "5"),
        );
        fx.recompute();
        assert_eq!(fx.get(0, "a_total"), Some(Value::Integer(10)));
        assert!(fx.data.diagnostics().is_empty());
    }

    #[test]
    fn assignments_run_before_mutations() {
        let (mut fx, cat) = Fixture::new(Category::new("Stats"));
        let aria = fx.aria;
        fx.push(
            Entry::new(aria, cat)
                .with_operation("a", AddInteger, "1")
                .with_operation("b", AssignInteger, "!${a}$!"),
        );
        fx.recompute();
        // `b` waits for `a`, whose ADD fails on a missing key, so `b` then
        // fails on an unknown reference.
        assert_eq!(fx.get(0, "b"), None);
        assert_eq!(fx.data.diagnostics().len(), 2);
    }

    #[test]
    fn mutually_dependent_operations_are_unresolved() {
        let (mut fx, cat) = Fixture::new(Category::new("Stats"));
        let aria = fx.aria;
        fx.push(
            Entry::new(aria, cat)
                .with_operation("x", AssignInteger, "!${y}$! + 1")
                .with_operation("y", AssignInteger, "!${x}$! + 1")
                .with_operation("z", AssignInteger, "3"),
        );
        fx.recompute();
        assert_eq!(fx.get(0, "z"), Some(Value::Integer(3)));
        let unresolved: Vec<_> = fx
            .data
            .diagnostics()
            .iter()
            .filter_map(|d| match &d.kind {
                DiagnosticKind::Unresolved { key, waiting_on, .. } => {
                    Some((key.clone(), waiting_on.clone()))
                }
                _ => None,
            })
            .collect();
        assert_eq!(unresolved.len(), 2);
        assert!(unresolved.contains(&("x".into(), vec!["y".into()])));
    }

    #[test]
    fn failures_are_recorded_and_skipped() {
        let (mut fx, cat) = Fixture::new(Category::new("Stats"));
        let aria = fx.aria;
        fx.push(
            Entry::new(aria, cat)
                .with_operation("bad", AssignInteger, "1 +")
                .with_operation("good", AssignInteger, "2"),
        );
        fx.recompute();
        assert_eq!(fx.get(0, "good"), Some(Value::Integer(2)));
        let failure = &fx.data.diagnostics()[0];
        assert!(matches!(
            &failure.kind,
            DiagnosticKind::OperationFailed { key, index: 0, .. } if key == "bad"
        ));
    }

    #[test]
    fn assign_string_falls_back_to_literal_text() {
        let (mut fx, cat) = Fixture::new(Category::new("Bio"));
        let aria = fx.aria;
        fx.push(
            Entry::new(aria, cat)
                .with_operation("name", AssignString, "'Aria'")
                .with_operation("title", AssignString, "!${name}$! the Bold"),
        );
        fx.recompute();
        assert_eq!(fx.get(0, "title"), Some(Value::from("Aria the Bold")));
    }

    #[test]
    fn constants_run_at_every_owned_index() {
        let category = Category::new("Stats").with_constant("level_cap", AssignInteger, "20");
        let (mut fx, cat) = Fixture::new(category);
        let aria = fx.aria;
        fx.push(Entry::new(aria, cat));
        fx.push(Entry::new(aria, cat).with_operation("level_cap", AddInteger, "5"));
        fx.recompute();
        assert_eq!(fx.get(0, "level_cap"), Some(Value::Integer(20)));
        assert_eq!(fx.get(1, "level_cap"), Some(Value::Integer(25)));
    }

    #[test]
    fn templates_see_their_entry_fields() {
        let category = Category::new("Skills")
            .with_field(Field::new("Skill"))
            .with_field(Field::new("Rank"))
            .with_template("skill_!${Skill}$!", AssignInteger, "!${Rank}$!");
        let (mut fx, cat) = Fixture::new(category);
        let aria = fx.aria;
        fx.push(Entry::new(aria, cat).with_values(["Archery", "2"]));
        fx.push(Entry::new(aria, cat).with_values(["Stealth", "1"]));
        fx.recompute();
        assert_eq!(fx.get(1, "skill_Archery"), Some(Value::Integer(2)));
        assert_eq!(fx.get(1, "skill_Stealth"), Some(Value::Integer(1)));
    }

    #[test]
    fn superseded_revisions_leave_the_window() {
        let category = Category::new("Skills")
            .with_field(Field::new("Rank"))
            .with_template("rank_total", AssignInteger, "!${Rank}$!");
        let (mut fx, cat) = Fixture::new(category);
        let aria = fx.aria;
        let first = fx.push(Entry::new(aria, cat).with_values(["1"]));
        let second = fx.push(Entry::new(aria, cat).with_values(["4"]));
        fx.store.entry_mut(first).unwrap().child = Some(second);
        fx.store.entry_mut(second).unwrap().parent = Some(first);
        fx.recompute();
        assert_eq!(fx.get(0, "rank_total"), Some(Value::Integer(1)));
        assert_eq!(fx.get(1, "rank_total"), Some(Value::Integer(4)));
    }

    #[test]
    fn templates_only_rerun_for_their_own_category() {
        let stats = Category::new("Stats").with_constant("total", AssignInteger, "0");
        let (mut fx, stats) = Fixture::new(stats);
        let loot = fx.store.add_category(
            Category::new("Loot")
                .with_field(Field::new("Gold"))
                .with_template("total", AddInteger, "!${Gold}$!"),
        );
        let aria = fx.aria;
        fx.store.character_mut(aria).unwrap().assign(loot);

        fx.push(Entry::new(aria, loot).with_values(["5"]));
        fx.push(Entry::new(aria, stats));
        fx.push(Entry::new(aria, loot).with_values(["3"]));
        fx.recompute();

        assert_eq!(fx.get(0, "total"), Some(Value::Integer(5)));
        assert_eq!(fx.get(1, "total"), Some(Value::Integer(0)));
        assert_eq!(fx.get(2, "total"), Some(Value::Integer(8)));
        assert!(fx.data.diagnostics().is_empty());
    }

    #[test]
    fn template_keys_use_configured_missing_text() {
        let category = Category::new("Skills")
            .with_field(Field::new("Rank"))
            .with_template("bonus_!${Skill}$!", AssignInteger, "!${Rank}$!");
        let (mut fx, cat) = Fixture::new(category);
        let aria = fx.aria;
        fx.push(Entry::new(aria, cat).with_values(["2"]));
        fx.recompute_with(&EngineConfig::default().with_missing_value_text("unknown"));
        assert_eq!(fx.get(0, "bonus_unknown"), Some(Value::Integer(2)));
        assert_eq!(fx.get(0, "bonus_<value not found>"), None);
    }

    #[test]
    fn oversized_string_repetition_is_recorded() {
        let (mut fx, cat) = Fixture::new(Category::new("Bio"));
        let aria = fx.aria;
        fx.push(
            Entry::new(aria, cat)
                .with_operation("x", AssignString, "'ab' * 9223372036854775807")
                .with_operation("y", AssignInteger, "1"),
        );
        fx.recompute();
        assert_eq!(fx.get(0, "x"), None);
        assert_eq!(fx.get(0, "y"), Some(Value::Integer(1)));
        assert!(matches!(
            &fx.data.diagnostics()[0].kind,
            DiagnosticKind::OperationFailed { key, .. } if key == "x"
        ));
    }

    #[test]
    fn disabled_entry_contributes_nothing() {
        let (mut fx, cat) = Fixture::new(Category::new("Stats"));
        let aria = fx.aria;
        let mut entry = Entry::new(aria, cat).with_operation("hp", AssignInteger, "10");
        entry.disabled = true;
        fx.push(entry);
        fx.recompute();
        assert_eq!(fx.get(0, "hp"), None);
    }

    #[test]
    fn other_characters_share_the_previous_row() {
        let (mut fx, cat) = Fixture::new(Category::new("Stats"));
        let bram = fx
            .store
            .add_character(Character::new("Bram").with_category(cat))
            .unwrap();
        let aria = fx.aria;
        fx.push(Entry::new(bram, cat).with_operation("hp", AssignInteger, "8"));
        fx.push(Entry::new(aria, cat).with_operation("hp", AssignInteger, "10"));
        fx.recompute();

        let rows = &fx.data.rows[&bram];
        assert!(Arc::ptr_eq(&rows[0], &rows[1]));
        assert_eq!(fx.get(0, "hp"), None);
        assert_eq!(fx.get(1, "hp"), Some(Value::Integer(10)));
    }

    #[test]
    fn snapshot_errors() {
        let (mut fx, _) = Fixture::new(Category::new("Stats"));
        fx.recompute();
        assert!(matches!(
            fx.data.snapshot(fx.aria, 0),
            Err(ProgError::IndexOutOfRange { index: 0, len: 0 })
        ));
        assert!(matches!(
            fx.data.snapshot(CharacterId::new(), 0),
            Err(ProgError::CharacterNotFound(_))
        ));
    }
}
