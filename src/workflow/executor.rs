//! Graph executor: drives a context through named steps until one finishes.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::step::{END, Step, StepError, Transition};

/// Errors detected while assembling a graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    DuplicateStep(&'static str),
    MissingEntry(&'static str),
    UnknownSuccessor { from: &'static str, to: &'static str },
    UnknownReentrant(&'static str),
    /// A cycle that does not pass through a declared re-entrant step.
    Cycle(Vec<&'static str>),
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphError::DuplicateStep(name) => write!(f, "step '{name}' registered twice"),
            GraphError::MissingEntry(name) => write!(f, "entry step '{name}' is not registered"),
            GraphError::UnknownSuccessor { from, to } => {
                write!(f, "step '{from}' declares unknown successor '{to}'")
            }
            GraphError::UnknownReentrant(name) => {
                write!(f, "re-entrant step '{name}' is not registered")
            }
            GraphError::Cycle(path) => write!(f, "undeclared cycle: {}", path.join(" -> ")),
        }
    }
}

impl std::error::Error for GraphError {}

/// Errors that abort a run.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionError {
    UnknownStep(&'static str),
    UndeclaredTransition { from: &'static str, to: &'static str },
    ReentryLimit { step: &'static str, limit: usize },
    Step { step: &'static str, source: StepError },
    Timeout(Duration),
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionError::UnknownStep(name) => write!(f, "unknown step '{name}'"),
            ExecutionError::UndeclaredTransition { from, to } => {
                write!(f, "step '{from}' moved to undeclared successor '{to}'")
            }
            ExecutionError::ReentryLimit { step, limit } => {
                write!(f, "step '{step}' entered more than {limit} time(s)")
            }
            ExecutionError::Step { step, source } => write!(f, "step '{step}': {source}"),
            ExecutionError::Timeout(limit) => write!(f, "run exceeded {} ms", limit.as_millis()),
        }
    }
}

impl std::error::Error for ExecutionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExecutionError::Step { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Builder that validates topology before a [`Workflow`] can run.
pub struct WorkflowBuilder<C> {
    entry: &'static str,
    steps: Vec<Box<dyn Step<C>>>,
    reentrant: HashMap<&'static str, usize>,
    timeout: Option<Duration>,
}

impl<C> WorkflowBuilder<C> {
    pub fn step(mut self, step: impl Step<C> + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    /// Allow `name` to be entered up to `max_visits` times in one run.
    pub fn reentrant(mut self, name: &'static str, max_visits: usize) -> Self {
        self.reentrant.insert(name, max_visits.max(1));
        self
    }

    pub fn timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    pub fn build(self) -> Result<Workflow<C>, GraphError> {
        let mut order = Vec::with_capacity(self.steps.len());
        let mut steps: HashMap<&'static str, Box<dyn Step<C>>> = HashMap::new();
        for step in self.steps {
            let name = step.name();
            if steps.contains_key(name) {
                return Err(GraphError::DuplicateStep(name));
            }
            order.push(name);
            steps.insert(name, step);
        }

        if !steps.contains_key(self.entry) {
            return Err(GraphError::MissingEntry(self.entry));
        }
        for name in self.reentrant.keys() {
            if !steps.contains_key(name) {
                return Err(GraphError::UnknownReentrant(name));
            }
        }
        for name in &order {
            for &to in steps[name].successors() {
                if to != END && !steps.contains_key(to) {
                    return Err(GraphError::UnknownSuccessor { from: name, to });
                }
            }
        }

        let workflow = Workflow {
            steps,
            order,
            entry: self.entry,
            reentrant: self.reentrant,
            timeout: self.timeout,
        };
        if let Some(cycle) = workflow.find_cycle() {
            return Err(GraphError::Cycle(cycle));
        }
        Ok(workflow)
    }
}

/// A validated, immutable step graph. One instance serves every run.
pub struct Workflow<C> {
    steps: HashMap<&'static str, Box<dyn Step<C>>>,
    order: Vec<&'static str>,
    entry: &'static str,
    reentrant: HashMap<&'static str, usize>,
    timeout: Option<Duration>,
}

impl<C: Send> Workflow<C> {
    /// Run from the entry step until a step finishes, fails, or the run times out.
    pub async fn run(&self, ctx: &mut C) -> Result<String, ExecutionError> {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.drive(ctx))
                .await
                .map_err(|_| ExecutionError::Timeout(limit))?,
            None => self.drive(ctx).await,
        }
    }

    async fn drive(&self, ctx: &mut C) -> Result<String, ExecutionError> {
        let started = Instant::now();
        let mut visits: HashMap<&'static str, usize> = HashMap::new();
        let mut current = self.entry;

        loop {
            let step = self
                .steps
                .get(current)
                .ok_or(ExecutionError::UnknownStep(current))?;

            let limit = self.reentrant.get(current).copied().unwrap_or(1);
            let count = visits.entry(current).or_insert(0);
            *count += 1;
            if *count > limit {
                return Err(ExecutionError::ReentryLimit { step: current, limit });
            }
            debug!("▶ {} (visit {})", current, count);

            let step_started = Instant::now();
            let transition = step
                .run(ctx)
                .await
                .map_err(|source| ExecutionError::Step { step: current, source })?;
            let elapsed = step_started.elapsed().as_millis();

            match transition {
                Transition::Next(next) => {
                    if !step.successors().contains(&next) {
                        return Err(ExecutionError::UndeclaredTransition { from: current, to: next });
                    }
                    info!("{} → {} ({} ms)", current, next, elapsed);
                    current = next;
                }
                Transition::Finish(payload) => {
                    if !step.successors().contains(&END) {
                        return Err(ExecutionError::UndeclaredTransition { from: current, to: END });
                    }
                    info!(
                        "{} → {} ({} ms, run total {} ms)",
                        current,
                        END,
                        elapsed,
                        started.elapsed().as_millis()
                    );
                    return Ok(payload);
                }
            }
        }
    }
}

impl<C> Workflow<C> {
    pub fn builder(entry: &'static str) -> WorkflowBuilder<C> {
        WorkflowBuilder {
            entry,
            steps: Vec::new(),
            reentrant: HashMap::new(),
            timeout: None,
        }
    }

    pub fn entry(&self) -> &'static str {
        self.entry
    }

    /// Render the graph as a Mermaid state diagram.
    pub fn to_mermaid(&self) -> String {
        let mut out = String::from("stateDiagram-v2\n");
        out.push_str(&format!("    [*] --> {}\n", self.entry));
        for name in &self.order {
            for &to in self.steps[name].successors() {
                let target = if to == END { "[*]" } else { to };
                out.push_str(&format!("    {name} --> {target}\n"));
            }
        }
        out
    }

    /// Depth-first search ignoring edges into re-entrant steps.
    fn find_cycle(&self) -> Option<Vec<&'static str>> {
        fn visit<C>(
            wf: &Workflow<C>,
            node: &'static str,
            path: &mut Vec<&'static str>,
            on_path: &mut HashSet<&'static str>,
            done: &mut HashSet<&'static str>,
        ) -> Option<Vec<&'static str>> {
            path.push(node);
            on_path.insert(node);
            for &next in wf.steps[node].successors() {
                if next == END || wf.reentrant.contains_key(next) {
                    continue;
                }
                if on_path.contains(next) {
                    let start = path.iter().position(|n| *n == next).unwrap_or(0);
                    let mut cycle = path[start..].to_vec();
                    cycle.push(next);
                    return Some(cycle);
                }
                if !done.contains(next)
                    && let Some(cycle) = visit(wf, next, path, on_path, done)
                {
                    return Some(cycle);
                }
            }
            path.pop();
            on_path.remove(node);
            done.insert(node);
            None
        }

        let mut done = HashSet::new();
        for &name in &self.order {
            if done.contains(name) {
                continue;
            }
            let mut path = Vec::new();
            let mut on_path = HashSet::new();
            if let Some(cycle) = visit(self, name, &mut path, &mut on_path, &mut done) {
                return Some(cycle);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::BoxFuture;

    /// Test context: the trace of visited steps.
    type Trace = Vec<&'static str>;

    struct Scripted {
        name: &'static str,
        successors: &'static [&'static str],
        decide: fn(&Trace) -> Transition,
    }

    impl Step<Trace> for Scripted {
        fn name(&self) -> &'static str {
            self.name
        }

        fn successors(&self) -> &'static [&'static str] {
            self.successors
        }

        fn run<'a>(&'a self, ctx: &'a mut Trace) -> BoxFuture<'a, Result<Transition, StepError>> {
            Box::pin(async move {
                ctx.push(self.name);
                Ok((self.decide)(ctx))
            })
        }
    }

    struct Failing;

    impl Step<Trace> for Failing {
        fn name(&self) -> &'static str {
            "Fail"
        }

        fn successors(&self) -> &'static [&'static str] {
            &[END]
        }

        fn run<'a>(&'a self, _ctx: &'a mut Trace) -> BoxFuture<'a, Result<Transition, StepError>> {
            Box::pin(async { Err(StepError::MissingInput("nothing")) })
        }
    }

    struct Sleepy;

    impl Step<Trace> for Sleepy {
        fn name(&self) -> &'static str {
            "Sleepy"
        }

        fn successors(&self) -> &'static [&'static str] {
            &[END]
        }

        fn run<'a>(&'a self, _ctx: &'a mut Trace) -> BoxFuture<'a, Result<Transition, StepError>> {
            Box::pin(async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                Ok(Transition::Finish("late".into()))
            })
        }
    }

    fn step(
        name: &'static str,
        successors: &'static [&'static str],
        decide: fn(&Trace) -> Transition,
    ) -> Scripted {
        Scripted { name, successors, decide }
    }

    #[tokio::test]
    async fn test_linear_run_finishes_with_payload() {
        let wf = Workflow::builder("A")
            .step(step("A", &["B"], |_| Transition::Next("B")))
            .step(step("B", &[END], |_| Transition::Finish("done".into())))
            .build()
            .unwrap();

        let mut trace = Trace::new();
        assert_eq!(wf.run(&mut trace).await.unwrap(), "done");
        assert_eq!(trace, vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_reentrant_step_runs_twice() {
        // A is entered at the start and again after B, finishing on the second visit.
        let wf = Workflow::builder("A")
            .step(step("A", &["B", END], |t| {
                if t.len() > 1 {
                    Transition::Finish("stored".into())
                } else {
                    Transition::Next("B")
                }
            }))
            .step(step("B", &["A"], |_| Transition::Next("A")))
            .reentrant("A", 2)
            .build()
            .unwrap();

        let mut trace = Trace::new();
        assert_eq!(wf.run(&mut trace).await.unwrap(), "stored");
        assert_eq!(trace, vec!["A", "B", "A"]);
    }

    #[tokio::test]
    async fn test_reentry_limit_aborts_loop() {
        let wf = Workflow::builder("A")
            .step(step("A", &["B"], |_| Transition::Next("B")))
            .step(step("B", &["A"], |_| Transition::Next("A")))
            .reentrant("A", 2)
            .reentrant("B", 3)
            .build()
            .unwrap();

        let err = wf.run(&mut Trace::new()).await.unwrap_err();
        assert!(matches!(err, ExecutionError::ReentryLimit { step: "A", limit: 2 }));
    }

    #[tokio::test]
    async fn test_undeclared_transition_is_rejected() {
        let wf = Workflow::builder("A")
            .step(step("A", &["B"], |_| Transition::Next("C")))
            .step(step("B", &[END], |_| Transition::Finish(String::new())))
            .step(step("C", &[END], |_| Transition::Finish(String::new())))
            .build()
            .unwrap();

        let err = wf.run(&mut Trace::new()).await.unwrap_err();
        assert_eq!(err, ExecutionError::UndeclaredTransition { from: "A", to: "C" });
    }

    #[tokio::test]
    async fn test_finish_requires_declared_end() {
        let wf = Workflow::builder("A")
            .step(step("A", &["B"], |_| Transition::Finish("early".into())))
            .step(step("B", &[END], |_| Transition::Finish(String::new())))
            .build()
            .unwrap();

        let err = wf.run(&mut Trace::new()).await.unwrap_err();
        assert_eq!(err, ExecutionError::UndeclaredTransition { from: "A", to: END });
    }

    #[tokio::test]
    async fn test_step_error_names_the_step() {
        let wf = Workflow::builder("Fail").step(Failing).build().unwrap();
        let err = wf.run(&mut Trace::new()).await.unwrap_err();
        assert_eq!(
            err,
            ExecutionError::Step { step: "Fail", source: StepError::MissingInput("nothing") }
        );
        assert!(err.to_string().contains("Fail"));
    }

    #[tokio::test]
    async fn test_timeout_aborts_run() {
        let wf = Workflow::builder("Sleepy")
            .step(Sleepy)
            .timeout(Duration::from_millis(20))
            .build()
            .unwrap();

        let err = wf.run(&mut Trace::new()).await.unwrap_err();
        assert!(matches!(err, ExecutionError::Timeout(_)));
    }

    #[test]
    fn test_build_rejects_unknown_successor() {
        let result = Workflow::<Trace>::builder("A")
            .step(step("A", &["Missing"], |_| Transition::Next("Missing")))
            .build();
        assert!(matches!(result, Err(GraphError::UnknownSuccessor { from: "A", to: "Missing" })));
    }

    #[test]
    fn test_build_rejects_missing_entry_and_duplicates() {
        let result = Workflow::<Trace>::builder("Nope")
            .step(step("A", &[END], |_| Transition::Finish(String::new())))
            .build();
        assert!(matches!(result, Err(GraphError::MissingEntry("Nope"))));

        let result = Workflow::<Trace>::builder("A")
            .step(step("A", &[END], |_| Transition::Finish(String::new())))
            .step(step("A", &[END], |_| Transition::Finish(String::new())))
            .build();
        assert!(matches!(result, Err(GraphError::DuplicateStep("A"))));
    }

    #[test]
    fn test_build_rejects_undeclared_cycle() {
        let result = Workflow::<Trace>::builder("A")
            .step(step("A", &["B"], |_| Transition::Next("B")))
            .step(step("B", &["C"], |_| Transition::Next("C")))
            .step(step("C", &["B", END], |_| Transition::Next("B")))
            .build();
        match result {
            Err(GraphError::Cycle(path)) => assert_eq!(path, vec!["B", "C", "B"]),
            other => panic!("expected cycle, got {:?}", other.err()),
        }
    }

    /// Validation and rendering are available for any context type, not
    /// only the ones a run can be driven with.
    fn validate_and_render<C>(builder: WorkflowBuilder<C>) -> Result<String, GraphError> {
        let wf = builder.build()?;
        Ok(format!("{} {}", wf.entry(), wf.to_mermaid()))
    }

    #[test]
    fn test_build_needs_no_runtime_bounds() {
        let rendered = validate_and_render(
            Workflow::<Trace>::builder("A").step(step("A", &[END], |_| Transition::Finish(String::new()))),
        )
        .unwrap();
        assert!(rendered.starts_with("A stateDiagram-v2"));

        let cyclic = Workflow::<Trace>::builder("A")
            .step(step("A", &["B"], |_| Transition::Next("B")))
            .step(step("B", &["A"], |_| Transition::Next("A")));
        assert!(matches!(validate_and_render(cyclic), Err(GraphError::Cycle(_))));
    }

    #[test]
    fn test_mermaid_lists_every_edge() {
        let wf = Workflow::<Trace>::builder("A")
            .step(step("A", &["B"], |_| Transition::Next("B")))
            .step(step("B", &[END], |_| Transition::Finish(String::new())))
            .build()
            .unwrap();

        let diagram = wf.to_mermaid();
        assert!(diagram.starts_with("stateDiagram-v2"));
        assert!(diagram.contains("[*] --> A"));
        assert!(diagram.contains("A --> B"));
        assert!(diagram.contains("B --> [*]"));
    }
}
