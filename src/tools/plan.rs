//! Tool plans: an arena of steps with typed result bindings.
//!
//! Steps are addressed by [`StepId`], an index into the plan. A step's input is
//! a sequence of [`InputPart`]s, either literal text or the result of another
//! step; every binding is also a dependency. Plans written by a model use the
//! textual `{{step.result}}` form and name-based `depends_on` lists, which
//! [`ToolPlan::from_specs`] resolves into the arena form.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::PlanError;

/// Index of a step inside its [`ToolPlan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StepId(usize);

impl StepId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// One segment of a step input.
#[derive(Debug, Clone, PartialEq)]
pub enum InputPart {
    Literal(String),
    ResultOf(StepId),
}

/// Step input: literal text interleaved with bound results.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StepInput {
    parts: Vec<InputPart>,
}

impl StepInput {
    /// Input consisting of literal text only.
    pub fn literal(text: impl Into<String>) -> Self {
        Self {
            parts: vec![InputPart::Literal(text.into())],
        }
    }

    /// Input that is exactly the result of another step.
    pub fn result_of(step: StepId) -> Self {
        Self {
            parts: vec![InputPart::ResultOf(step)],
        }
    }

    pub fn then_literal(mut self, text: impl Into<String>) -> Self {
        self.parts.push(InputPart::Literal(text.into()));
        self
    }

    pub fn then_result(mut self, step: StepId) -> Self {
        self.parts.push(InputPart::ResultOf(step));
        self
    }

    pub fn parts(&self) -> &[InputPart] {
        &self.parts
    }

    /// Steps whose results this input binds.
    pub fn references(&self) -> impl Iterator<Item = StepId> + '_ {
        self.parts.iter().filter_map(|part| match part {
            InputPart::ResultOf(id) => Some(*id),
            InputPart::Literal(_) => None,
        })
    }

    /// Renders the input, asking `lookup` for each bound result.
    ///
    /// A binding `lookup` cannot resolve renders as an empty string.
    pub fn render<F>(&self, lookup: F) -> String
    where
        F: Fn(StepId) -> Option<String>,
    {
        let mut rendered = String::new();
        for part in &self.parts {
            match part {
                InputPart::Literal(text) => rendered.push_str(text),
                InputPart::ResultOf(id) => {
                    if let Some(value) = lookup(*id) {
                        rendered.push_str(&value);
                    }
                }
            }
        }
        rendered
    }
}

/// A step in a plan.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanStep {
    pub name: String,
    pub tool: String,
    pub input: StepInput,
    /// Every step that must run first, including those bound in `input`.
    pub depends_on: BTreeSet<StepId>,
}

/// Name-based step description, as produced by a planning model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSpec {
    pub id: String,
    pub tool: String,
    /// Raw input; `{{other.result}}` binds another step's result.
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

/// An arena of tool steps.
#[derive(Debug, Clone, Default)]
pub struct ToolPlan {
    steps: Vec<PlanStep>,
}

fn binding_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z0-9_\-]+)\.result\s*\}\}").expect("binding pattern is valid")
    })
}

/// Replaces `{{name.result}}` in `template` with `lookup(name)`. Bindings
/// `lookup` cannot resolve are left as written.
pub fn substitute_results<F>(template: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    binding_pattern()
        .replace_all(template, |caps: &regex::Captures<'_>| {
            caps.get(1)
                .and_then(|name| lookup(name.as_str()))
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

impl ToolPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a step. Bindings may only reference steps already in the plan.
    ///
    /// # Errors
    ///
    /// `DuplicateStep` for a reused name, `InvalidBinding` for a binding to a
    /// step that does not exist yet.
    pub fn add_step(
        &mut self,
        name: impl Into<String>,
        tool: impl Into<String>,
        input: StepInput,
    ) -> Result<StepId, PlanError> {
        let name = name.into();
        if self.id_of(&name).is_some() {
            return Err(PlanError::DuplicateStep(name));
        }

        let mut depends_on = BTreeSet::new();
        for reference in input.references() {
            if reference.0 >= self.steps.len() {
                return Err(PlanError::InvalidBinding {
                    step: name,
                    reason: format!("step #{} does not exist", reference.0),
                });
            }
            depends_on.insert(reference);
        }

        let id = StepId(self.steps.len());
        self.steps.push(PlanStep {
            name,
            tool: tool.into(),
            input,
            depends_on,
        });
        Ok(id)
    }

    /// Declares that `step` must run after `on`. May introduce a cycle, which
    /// [`ToolPlan::topological_order`] reports.
    pub fn add_dependency(&mut self, step: StepId, on: StepId) -> Result<(), PlanError> {
        let len = self.steps.len();
        if on.0 >= len || step.0 >= len {
            let missing = if step.0 >= len { step } else { on };
            return Err(PlanError::UnknownDependency {
                step: self
                    .steps
                    .get(step.0)
                    .map(|s| s.name.clone())
                    .unwrap_or_else(|| format!("#{}", step.0)),
                dependency: format!("#{}", missing.0),
            });
        }
        self.steps[step.0].depends_on.insert(on);
        Ok(())
    }

    /// Builds a plan from name-based specs, resolving `{{name.result}}`
    /// bindings and `depends_on` names. Forward references are allowed.
    pub fn from_specs(specs: &[StepSpec]) -> Result<Self, PlanError> {
        let mut index: HashMap<&str, StepId> = HashMap::with_capacity(specs.len());
        for (i, spec) in specs.iter().enumerate() {
            if index.insert(spec.id.as_str(), StepId(i)).is_some() {
                return Err(PlanError::DuplicateStep(spec.id.clone()));
            }
        }

        let resolve = |step: &str, name: &str| {
            index
                .get(name)
                .copied()
                .ok_or_else(|| PlanError::UnknownDependency {
                    step: step.to_string(),
                    dependency: name.to_string(),
                })
        };

        let mut steps = Vec::with_capacity(specs.len());
        for spec in specs {
            let mut input = StepInput::default();
            let mut depends_on = BTreeSet::new();
            let mut last = 0;

            for captures in binding_pattern().captures_iter(&spec.input) {
                let (Some(whole), Some(name)) = (captures.get(0), captures.get(1)) else {
                    continue;
                };
                if whole.start() > last {
                    input = input.then_literal(&spec.input[last..whole.start()]);
                }
                let target = resolve(&spec.id, name.as_str())?;
                input = input.then_result(target);
                depends_on.insert(target);
                last = whole.end();
            }
            if last < spec.input.len() {
                input = input.then_literal(&spec.input[last..]);
            }

            for dependency in &spec.depends_on {
                depends_on.insert(resolve(&spec.id, dependency)?);
            }

            steps.push(PlanStep {
                name: spec.id.clone(),
                tool: spec.tool.clone(),
                input,
                depends_on,
            });
        }

        Ok(Self { steps })
    }

    /// Kahn's algorithm. Ready steps are taken in arena order, so the result
    /// is deterministic.
    ///
    /// # Errors
    ///
    /// `CircularDependency` naming the steps left unordered when the graph has
    /// a cycle.
    pub fn topological_order(&self) -> Result<Vec<StepId>, PlanError> {
        let n = self.steps.len();
        let mut in_degree = vec![0usize; n];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];

        for (i, step) in self.steps.iter().enumerate() {
            for dependency in &step.depends_on {
                in_degree[i] += 1;
                dependents[dependency.0].push(i);
            }
        }

        let mut ready: VecDeque<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);

        while let Some(i) = ready.pop_front() {
            order.push(StepId(i));
            for &dependent in &dependents[i] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.push_back(dependent);
                }
            }
        }

        if order.len() != n {
            let stuck: Vec<&str> = (0..n)
                .filter(|&i| in_degree[i] > 0)
                .map(|i| self.steps[i].name.as_str())
                .collect();
            return Err(PlanError::CircularDependency(stuck.join(", ")));
        }

        Ok(order)
    }

    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    pub fn step(&self, id: StepId) -> Option<&PlanStep> {
        self.steps.get(id.0)
    }

    pub fn id_of(&self, name: &str) -> Option<StepId> {
        self.steps.iter().position(|s| s.name == name).map(StepId)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(id: &str, input: &str, depends_on: &[&str]) -> StepSpec {
        StepSpec {
            id: id.to_string(),
            tool: "echo".to_string(),
            input: input.to_string(),
            depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_from_specs_parses_bindings() {
        let plan = ToolPlan::from_specs(&[
            spec("a", "seed", &[]),
            spec("b", "x={{a.result}} y={{ a.result }}!", &[]),
        ])
        .expect("valid plan");

        let b = plan.step(StepId(1)).expect("step b");
        assert_eq!(
            b.input.parts(),
            &[
                InputPart::Literal("x=".to_string()),
                InputPart::ResultOf(StepId(0)),
                InputPart::Literal(" y=".to_string()),
                InputPart::ResultOf(StepId(0)),
                InputPart::Literal("!".to_string()),
            ]
        );
        assert_eq!(b.depends_on, BTreeSet::from([StepId(0)]));

        let rendered = b.input.render(|_| Some("7".to_string()));
        assert_eq!(rendered, "x=7 y=7!");
    }

    #[test]
    fn test_from_specs_rejects_unknown_reference() {
        let err = ToolPlan::from_specs(&[spec("a", "{{ghost.result}}", &[])])
            .expect_err("ghost is not a step");
        assert!(matches!(err, PlanError::UnknownDependency { ref dependency, .. } if dependency == "ghost"));

        let err = ToolPlan::from_specs(&[spec("a", "", &["ghost"])]).expect_err("unknown dep");
        assert!(matches!(err, PlanError::UnknownDependency { .. }));
    }

    #[test]
    fn test_from_specs_rejects_duplicates() {
        let err = ToolPlan::from_specs(&[spec("a", "", &[]), spec("a", "", &[])])
            .expect_err("duplicate ids");
        assert!(matches!(err, PlanError::DuplicateStep(ref name) if name == "a"));
    }

    #[test]
    fn test_topological_order_respects_dependencies() {
        // Declared out of order: c needs b, b needs a.
        let plan = ToolPlan::from_specs(&[
            spec("c", "{{b.result}}", &[]),
            spec("b", "", &["a"]),
            spec("a", "", &[]),
            spec("d", "", &[]),
        ])
        .expect("valid plan");

        let order = plan.topological_order().expect("acyclic");
        assert_eq!(order.len(), 4);
        let position = |name: &str| {
            let id = plan.id_of(name).expect("known step");
            order.iter().position(|&o| o == id).expect("ordered")
        };
        assert!(position("a") < position("b"));
        assert!(position("b") < position("c"));
    }

    #[test]
    fn test_cycle_is_detected() {
        let plan = ToolPlan::from_specs(&[spec("a", "{{b.result}}", &[]), spec("b", "", &["a"])])
            .expect("structurally valid");
        let err = plan.topological_order().expect_err("cycle");
        match err {
            PlanError::CircularDependency(names) => {
                assert!(names.contains('a') && names.contains('b'));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let plan = ToolPlan::from_specs(&[spec("a", "", &["a"])]).expect("structurally valid");
        assert!(plan.topological_order().is_err());
    }

    #[test]
    fn test_substitute_results() {
        let rendered = substitute_results("sum={{ a.result }}, missing={{b.result}}", |name| {
            (name == "a").then(|| "3".to_string())
        });
        assert_eq!(rendered, "sum=3, missing={{b.result}}");
    }

    #[test]
    fn test_arena_builder() {
        let mut plan = ToolPlan::new();
        let a = plan
            .add_step("a", "echo", StepInput::literal("one"))
            .expect("add a");
        let b = plan
            .add_step("b", "echo", StepInput::literal("got ").then_result(a))
            .expect("add b");
        assert_eq!(plan.topological_order().expect("acyclic"), vec![a, b]);

        assert!(matches!(
            plan.add_step("a", "echo", StepInput::default()),
            Err(PlanError::DuplicateStep(_))
        ));
        assert!(matches!(
            plan.add_step("c", "echo", StepInput::result_of(StepId(9))),
            Err(PlanError::InvalidBinding { .. })
        ));

        plan.add_dependency(a, b).expect("ids exist");
        assert!(matches!(
            plan.topological_order(),
            Err(PlanError::CircularDependency(_))
        ));
    }
}
