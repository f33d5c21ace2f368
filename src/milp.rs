//! MILP model representation and the narrow solver interface.
//!
//! The engine is parametric over a backend: anything that can solve an LP
//! with an objective and decide MILP feasibility over this model type. The
//! model itself is a plain list of bounded variables plus constraints
//! addressable by handle, so a probe can remove a single input equality and
//! later re-add it without rebuilding anything. Cloning the model clones
//! the full constraint store; clones never share state.

use thiserror::Error;

/// Handle of a model variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarId(pub(crate) usize);

/// Handle of a constraint. Stays valid until the constraint is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstraintId(pub(crate) usize);

/// Variable kind: continuous within its bounds, or a 0/1 gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    /// Continuous variable.
    Continuous,
    /// Binary variable; LP relaxations treat it as continuous in `[0, 1]`.
    Binary,
}

#[derive(Debug, Clone)]
struct VarDef {
    name: String,
    lo: f64,
    hi: f64,
    kind: VarKind,
}

/// A linear expression: weighted variables plus a constant offset.
#[derive(Debug, Clone, Default)]
pub struct LinExpr {
    /// `(variable, coefficient)` terms.
    pub terms: Vec<(VarId, f64)>,
    /// Constant offset.
    pub constant: f64,
}

impl LinExpr {
    /// The empty expression.
    pub fn new() -> Self {
        Self::default()
    }

    /// Single-term expression `coefficient * var`.
    pub fn term(var: VarId, coefficient: f64) -> Self {
        Self {
            terms: vec![(var, coefficient)],
            constant: 0.0,
        }
    }

    /// Builder: append a term.
    pub fn with(mut self, var: VarId, coefficient: f64) -> Self {
        self.terms.push((var, coefficient));
        self
    }

    /// Builder: set the constant offset.
    pub fn offset(mut self, constant: f64) -> Self {
        self.constant = constant;
        self
    }

    /// Append a term in place.
    pub fn add(&mut self, var: VarId, coefficient: f64) {
        self.terms.push((var, coefficient));
    }

    /// Evaluate against a full assignment of model variables.
    pub fn eval(&self, values: &[f64]) -> f64 {
        self.constant
            + self
                .terms
                .iter()
                .map(|(var, coefficient)| coefficient * values[var.0])
                .sum::<f64>()
    }
}

/// Direction of a linear constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sense {
    /// `expr <= rhs`
    Le,
    /// `expr >= rhs`
    Ge,
    /// `expr == rhs`
    Eq,
}

/// A linear constraint `expr <sense> rhs`.
#[derive(Debug, Clone)]
pub struct Constraint {
    /// Left-hand side.
    pub expr: LinExpr,
    /// Comparison direction.
    pub sense: Sense,
    /// Right-hand side constant.
    pub rhs: f64,
}

impl Constraint {
    /// `expr <= rhs`
    pub fn le(expr: LinExpr, rhs: f64) -> Self {
        Self {
            expr,
            sense: Sense::Le,
            rhs,
        }
    }

    /// `expr >= rhs`
    pub fn ge(expr: LinExpr, rhs: f64) -> Self {
        Self {
            expr,
            sense: Sense::Ge,
            rhs,
        }
    }

    /// `expr == rhs`
    pub fn eq(expr: LinExpr, rhs: f64) -> Self {
        Self {
            expr,
            sense: Sense::Eq,
            rhs,
        }
    }

    /// Whether an assignment satisfies the constraint within `tol`.
    pub fn satisfied(&self, values: &[f64], tol: f64) -> bool {
        let lhs = self.expr.eval(values);
        match self.sense {
            Sense::Le => lhs <= self.rhs + tol,
            Sense::Ge => lhs >= self.rhs - tol,
            Sense::Eq => (lhs - self.rhs).abs() <= tol,
        }
    }
}

/// A mixed-integer linear model: bounded variables plus a constraint store.
///
/// All variable bounds must be finite; the encoder always has finite box
/// bounds available, and finiteness is what makes the backend's relaxations
/// bounded.
#[derive(Debug, Clone)]
pub struct Model {
    name: String,
    vars: Vec<VarDef>,
    constraints: Vec<Option<Constraint>>,
}

impl Model {
    /// Create an empty model.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vars: Vec::new(),
            constraints: Vec::new(),
        }
    }

    /// Model name, used in log lines.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a continuous variable with finite bounds.
    ///
    /// # Panics
    ///
    /// Panics if the bounds are not finite or are crossed.
    pub fn continuous(&mut self, name: impl Into<String>, lo: f64, hi: f64) -> VarId {
        self.push_var(name.into(), lo, hi, VarKind::Continuous)
    }

    /// Add a binary variable.
    pub fn binary(&mut self, name: impl Into<String>) -> VarId {
        self.push_var(name.into(), 0.0, 1.0, VarKind::Binary)
    }

    fn push_var(&mut self, name: String, lo: f64, hi: f64, kind: VarKind) -> VarId {
        assert!(
            lo.is_finite() && hi.is_finite() && lo <= hi,
            "variable {name} needs finite ordered bounds, got [{lo}, {hi}]"
        );
        self.vars.push(VarDef { name, lo, hi, kind });
        VarId(self.vars.len() - 1)
    }

    /// Tighten or fix a variable's bounds.
    pub fn set_bounds(&mut self, var: VarId, lo: f64, hi: f64) {
        assert!(lo.is_finite() && hi.is_finite() && lo <= hi);
        self.vars[var.0].lo = lo;
        self.vars[var.0].hi = hi;
    }

    /// Current bounds of a variable.
    pub fn bounds(&self, var: VarId) -> (f64, f64) {
        (self.vars[var.0].lo, self.vars[var.0].hi)
    }

    /// Kind of a variable.
    pub fn kind(&self, var: VarId) -> VarKind {
        self.vars[var.0].kind
    }

    /// Name of a variable.
    pub fn var_name(&self, var: VarId) -> &str {
        &self.vars[var.0].name
    }

    /// Total number of variables.
    pub fn num_vars(&self) -> usize {
        self.vars.len()
    }

    /// Number of binary variables.
    pub fn num_binary(&self) -> usize {
        self.vars
            .iter()
            .filter(|v| v.kind == VarKind::Binary)
            .count()
    }

    /// Number of continuous variables.
    pub fn num_continuous(&self) -> usize {
        self.num_vars() - self.num_binary()
    }

    /// Indices of binary variables, in creation order.
    pub(crate) fn binary_indices(&self) -> Vec<usize> {
        self.vars
            .iter()
            .enumerate()
            .filter(|(_, v)| v.kind == VarKind::Binary)
            .map(|(i, _)| i)
            .collect()
    }

    /// Bounds of every variable, in creation order.
    pub(crate) fn all_bounds(&self) -> Vec<(f64, f64)> {
        self.vars.iter().map(|v| (v.lo, v.hi)).collect()
    }

    /// Add a constraint, returning its handle.
    pub fn add(&mut self, constraint: Constraint) -> ConstraintId {
        self.constraints.push(Some(constraint));
        ConstraintId(self.constraints.len() - 1)
    }

    /// Remove a constraint by handle, returning it for later re-adding.
    ///
    /// # Panics
    ///
    /// Panics if the handle was already removed; handles are never reused,
    /// so this is a caller bug.
    pub fn remove(&mut self, id: ConstraintId) -> Constraint {
        match self.constraints[id.0].take() {
            Some(constraint) => constraint,
            None => panic!("constraint {} was already removed", id.0),
        }
    }

    /// Active constraints, in insertion order.
    pub fn constraints(&self) -> impl Iterator<Item = &Constraint> {
        self.constraints.iter().filter_map(Option::as_ref)
    }

    /// Number of active constraints.
    pub fn num_constraints(&self) -> usize {
        self.constraints.iter().filter(|c| c.is_some()).count()
    }
}

/// Outcome of an LP solve.
#[derive(Debug, Clone)]
pub enum LpOutcome {
    /// An optimum was found.
    Optimal {
        /// Objective value at the optimum.
        objective: f64,
        /// Value of every model variable.
        values: Vec<f64>,
    },
    /// No assignment satisfies the constraints.
    Infeasible,
    /// The objective is unbounded in the requested direction.
    Unbounded,
}

/// Outcome of a MILP feasibility solve.
#[derive(Debug, Clone)]
pub enum MilpOutcome {
    /// A satisfying assignment exists; values for every model variable.
    Feasible(Vec<f64>),
    /// Proven infeasible.
    Infeasible,
}

/// Optimization direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Goal {
    /// Minimize the objective.
    Minimize,
    /// Maximize the objective.
    Maximize,
}

/// Unexpected solver breakdowns. Plain infeasibility is an outcome, not a
/// failure.
#[derive(Debug, Clone, Error)]
pub enum SolverFailure {
    /// The simplex did not converge within the iteration budget.
    #[error("simplex iteration limit reached ({0})")]
    IterationLimit(usize),
    /// Branch and bound exhausted its node budget.
    #[error("branch-and-bound node limit reached ({0})")]
    NodeLimit(usize),
    /// Numerical breakdown.
    #[error("numerical trouble: {0}")]
    Numerical(String),
}

/// The capability set the engine needs from a MILP backend.
///
/// Binary variables are relaxed to `[0, 1]` for [`Solver::solve_lp`]; only
/// [`Solver::solve_milp`] enforces integrality.
pub trait Solver {
    /// Optimize a linear objective over the model's LP relaxation.
    fn solve_lp(
        &self,
        model: &Model,
        objective: &LinExpr,
        goal: Goal,
    ) -> Result<LpOutcome, SolverFailure>;

    /// Decide feasibility of the model with integrality enforced.
    fn solve_milp(&self, model: &Model) -> Result<MilpOutcome, SolverFailure>;
}
