//! Formula evaluator: owns a definition set, resolves dependencies per
//! target, composes a chained program, compiles and runs it.
//!
//! Grounded on `bingo-core::calculator_cache` for the per-identifier cache
//! shape (a `DashMap` keyed by identifier, at-least-once compilation
//! semantics) and on `bingo-core::calculator::mod` for the overall
//! compile-then-run control flow.

use crate::adapter::ExpressionAdapter;
use crate::context::Context;
use crate::definition::{FormulaDefinition, RoundingOptions};
use crate::diagnostics::{has_error, FormulaDiagnostic};
use crate::dsl::ast::Expression;
use crate::error::{FormulaError, FormulaResult};
use crate::evaluation::{EvaluationState, EvaluationVariable};
use crate::fragment::{Declaration, Fragment};
use crate::identifier::Identifier;
use crate::value::Value;
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use tracing::{debug, instrument, warn};

/// Host-supplied rewrite applied to the just-composed composite before
/// denied-name enforcement and compilation. Identity by default.
pub type FragmentHook = Box<dyn Fn(Fragment) -> Fragment + Send + Sync>;

/// A composite fragment together with every non-fatal diagnostic raised
/// while composing it and everything it transitively depends on.
type Composed = (Fragment, Vec<FormulaDiagnostic>);

/// The core engine: a definitions set plus the shared adapter policy and an
/// on-demand, memoised per-identifier fragment cache.
pub struct FormulaEvaluator {
    definitions_by_name: HashMap<String, FormulaDefinition>,
    known_formula_names: HashSet<String>,
    adapter: ExpressionAdapter,
    rounding_options: Option<RoundingOptions>,
    fragment_cache: DashMap<String, Composed>,
    on_fragment_created: Option<FragmentHook>,
}

impl FormulaEvaluator {
    pub fn new(
        definitions: Vec<FormulaDefinition>,
        adapter: ExpressionAdapter,
        rounding_options: Option<RoundingOptions>,
    ) -> Self {
        let known_formula_names = definitions.iter().map(|d| d.identifier.clone()).collect();
        let definitions_by_name = definitions.into_iter().map(|d| (d.identifier.clone(), d)).collect();
        Self {
            definitions_by_name,
            known_formula_names,
            adapter,
            rounding_options,
            fragment_cache: DashMap::new(),
            on_fragment_created: None,
        }
    }

    /// Install a host rewrite applied to every freshly composed composite.
    pub fn with_on_fragment_created(mut self, hook: FragmentHook) -> Self {
        self.on_fragment_created = Some(hook);
        self
    }

    /// Compile and execute the composite for `target`, returning the full
    /// evaluation record.
    #[instrument(skip(self, context), fields(target = %target))]
    pub fn run(&self, context: &dyn Context, target: &str) -> FormulaResult<EvaluationState> {
        if target.is_empty() {
            return Err(FormulaError::ArgumentMissing { param: "target".to_string() });
        }
        let (composite, diagnostics) = self.composite_for(target)?;
        let lookup = |name: &str| context.get(name);
        let (ran_variables, _return_value) = self.adapter.run(&composite, &lookup)?;

        let variables: Vec<EvaluationVariable> = ran_variables
            .into_iter()
            .map(|(name, value, decl)| self.to_evaluation_variable(name, value, decl))
            .collect();

        debug!(variable_count = variables.len(), "run complete");
        Ok(EvaluationState::new(target, variables, diagnostics))
    }

    /// Convenience: run, then project `returnValue` through `extract`,
    /// surfacing a type mismatch as `Evaluation`.
    pub fn evaluate<T>(
        &self,
        context: &dyn Context,
        target: &str,
        extract: impl FnOnce(&Value) -> Option<T>,
    ) -> FormulaResult<T> {
        let state = self.run(context, target)?;
        let value = state.return_value()?;
        extract(value).ok_or_else(|| {
            FormulaError::evaluation(format!("return value of '{target}' did not match the requested type"))
        })
    }

    /// Every identifier referenced anywhere in `target`'s composite, sorted
    /// ascending by name, annotated with its backing definition if known.
    pub fn contained_identifiers(&self, target: &str) -> FormulaResult<Vec<Identifier>> {
        let (composite, _diagnostics) = self.composite_for(target)?;
        let mut names: HashSet<String> = HashSet::new();
        for decl in composite.declarations() {
            for reference in crate::dsl::ast::identifier_references(&decl.expr) {
                names.insert(reference);
            }
        }
        let mut identifiers: Vec<Identifier> = names
            .into_iter()
            .map(|name| {
                let definition = self.definitions_by_name.get(&name).cloned();
                Identifier::new(name, definition)
            })
            .collect();
        identifiers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(identifiers)
    }

    fn to_evaluation_variable(&self, name: String, value: Value, decl: Declaration) -> EvaluationVariable {
        let formula_expression = self.definitions_by_name.get(&name).map(|d| d.expression.clone());
        EvaluationVariable {
            name,
            var_type: decl.data_type,
            is_read_only: true,
            value,
            formula_expression,
            is_rounded: decl.is_rounded,
        }
    }

    /// Obtain (composing on miss) the composite fragment for `target`, plus
    /// every non-error diagnostic raised composing it and its dependencies.
    fn composite_for(&self, target: &str) -> FormulaResult<Composed> {
        if let Some(cached) = self.fragment_cache.get(target) {
            return Ok(cached.clone());
        }
        let mut in_progress: HashSet<String> = HashSet::new();
        let composed = self.build(target, &mut in_progress)?;
        // At-least-once: a racing thread may have inserted first; either
        // composite is valid since composition is a pure function of
        // (definitions, options, target).
        self.fragment_cache.entry(target.to_string()).or_insert_with(|| composed.clone());
        Ok(composed)
    }

    /// `composite_for`, but reachable from inside a composition already in
    /// progress: a name still being built further up `in_progress` is a
    /// dependency cycle, so its reference is left unresolved here (`None`)
    /// rather than recursed into again — the caller's own `compile` check
    /// then reports it as the undefined symbol it is.
    fn resolve(&self, name: &str, in_progress: &mut HashSet<String>) -> FormulaResult<Option<Composed>> {
        if let Some(cached) = self.fragment_cache.get(name) {
            return Ok(Some(cached.clone()));
        }
        if in_progress.contains(name) {
            return Ok(None);
        }
        let composed = self.build(name, in_progress)?;
        self.fragment_cache.entry(name.to_string()).or_insert_with(|| composed.clone());
        Ok(Some(composed))
    }

    /// Build `name`'s own standalone composite: every transitive dependency
    /// spliced in, `name`'s declaration appended last, then the host hook,
    /// denied-name enforcement and compilation run exactly once against the
    /// *complete* result (§4.E.1 steps 5-10) — never against a partial
    /// fragment still missing declarations an ancestor call already
    /// resolved.
    fn build(&self, name: &str, in_progress: &mut HashSet<String>) -> FormulaResult<Composed> {
        in_progress.insert(name.to_string());
        let result = self.build_inner(name, in_progress);
        in_progress.remove(name);
        result
    }

    fn build_inner(&self, name: &str, in_progress: &mut HashSet<String>) -> FormulaResult<Composed> {
        let def = self
            .definitions_by_name
            .get(name)
            .ok_or_else(|| FormulaError::NoFormulaForIdentifier { name: name.to_string() })?
            .clone();

        let pre_parse = self.adapter.create_fragment(&def.expression)?;
        let refs = self.adapter.identifier_references(&pre_parse);

        let mut composite: Option<Fragment> = None;
        let mut resolved: HashSet<String> = HashSet::new();
        let mut diagnostics: Vec<FormulaDiagnostic> = Vec::new();
        for reference in refs {
            if !self.definitions_by_name.contains_key(&reference) {
                continue; // assumed context member or built-in
            }
            if resolved.contains(&reference) {
                continue; // already spliced in from an earlier reference
            }
            if let Some((dependency_fragment, dependency_diagnostics)) = self.resolve(&reference, in_progress)? {
                composite = splice(composite, &dependency_fragment, &mut resolved);
                diagnostics.extend(dependency_diagnostics);
            }
            // `None` means `reference` is a dependency cycle back onto a
            // composition already in progress; leave it unresolved so the
            // compile check below reports the undefined symbol.
        }

        let final_expr = self.final_expression(&def);
        let declaration = Declaration { name: def.identifier.clone(), data_type: def.data_type, expr: final_expr, is_rounded: self.should_round(&def) };
        let own_fragment = Fragment::declare(def.expression.clone(), declaration);
        let mut composite = append(composite, own_fragment);

        if let Some(hook) = &self.on_fragment_created {
            composite = hook(composite);
        }

        self.adapter.enforce_denied_names(&composite)?;

        let own_diagnostics = self.adapter.compile(&composite, &self.known_formula_names);
        if has_error(&own_diagnostics) {
            return Err(FormulaError::compilation(own_diagnostics));
        }
        if !own_diagnostics.is_empty() {
            warn!(count = own_diagnostics.len(), "non-fatal diagnostics during composition");
        }
        diagnostics.extend(own_diagnostics);
        dedup_diagnostics(&mut diagnostics);

        Ok((composite, diagnostics))
    }

    fn should_round(&self, def: &FormulaDefinition) -> bool {
        self.rounding_options.as_ref().is_some_and(|opts| opts.applies_to(def))
    }

    /// `def.expression`, parsed, and wrapped in the hidden rounding call
    /// when this formula qualifies — "emit `Round(<expr>, N, mode)`" per
    /// §4.E.1 step 6, expressed here as a `FunctionCall` to
    /// `ROUND_DECIMAL_FN` rather than a dedicated AST node, so the
    /// evaluator needs no new case to honour it.
    fn final_expression(&self, def: &FormulaDefinition) -> Expression {
        let raw = crate::dsl::parser::parse_expression(&def.expression)
            .expect("expression already validated during create_fragment");
        match self.rounding_options {
            Some(opts) if self.should_round(def) => Expression::call(
                crate::dsl::functions::ROUND_DECIMAL_FN,
                vec![raw, Expression::int(opts.rounded_decimals_count as i64), Expression::string(mode_name(opts.midpoint_rounding))],
            ),
            _ => raw,
        }
    }
}

/// Append `addition` after everything already in `onto`, preserving the
/// order both sides were built in.
fn append(onto: Option<Fragment>, addition: Fragment) -> Fragment {
    match onto {
        Some(existing) => addition.chain(existing),
        None => addition,
    }
}

/// Chain `complete`'s declarations onto `onto`, skipping any name already in
/// `resolved` and marking every name actually spliced in. `source` on the
/// rebuilt fragment nodes carries the declared name rather than the
/// original expression text — composed fragments are never re-split back
/// into per-formula source, so nothing downstream reads it.
fn splice(onto: Option<Fragment>, complete: &Fragment, resolved: &mut HashSet<String>) -> Option<Fragment> {
    let mut result = onto;
    for decl in complete.declarations() {
        if resolved.contains(&decl.name) {
            continue;
        }
        resolved.insert(decl.name.clone());
        let fragment = Fragment::declare(decl.name.clone(), decl.clone());
        result = Some(append(result, fragment));
    }
    result
}

/// Drop repeats of a diagnostic already collected, preserving first-seen
/// order — a diamond-shaped dependency graph resolves its shared ancestor
/// more than once, and each resolution contributes the same diagnostics.
fn dedup_diagnostics(diagnostics: &mut Vec<FormulaDiagnostic>) {
    let mut seen: Vec<FormulaDiagnostic> = Vec::with_capacity(diagnostics.len());
    diagnostics.retain(|d| {
        if seen.contains(d) {
            false
        } else {
            seen.push(d.clone());
            true
        }
    });
}

fn mode_name(mode: crate::definition::MidpointRounding) -> String {
    match mode {
        crate::definition::MidpointRounding::ToEven => "to_even".to_string(),
        crate::definition::MidpointRounding::AwayFromZero => "away_from_zero".to_string(),
    }
}
