//! Self-contained LP and MILP backend.
//!
//! A dense two-phase tableau simplex plus depth-first branch and bound over
//! the binary variables. Every model variable carries finite bounds, so the
//! relaxations are always bounded; lower bounds are shifted out so the
//! tableau works on nonnegative variables, and upper bounds become explicit
//! rows. Bland's rule keeps the pivot loop from cycling, with an iteration
//! budget as the final backstop.
//!
//! This is not a competitive solver; it is exact on the small models the
//! encoder produces and keeps the crate free of external solver processes.

#![forbid(unsafe_code)]

use crate::milp::{
    Goal, LinExpr, LpOutcome, MilpOutcome, Model, Sense, Solver, SolverFailure,
};

/// Feasibility threshold for the phase-1 artificial sum.
const FEAS_TOL: f64 = 1e-7;

/// Tunables for the simplex backend.
#[derive(Debug, Clone)]
pub struct SimplexConfig {
    /// Pivot iteration budget per LP solve.
    pub max_iterations: usize,
    /// Pivot and ratio-test tolerance.
    pub tolerance: f64,
    /// How far from 0/1 a binary may sit and still count as integral.
    pub integrality_tolerance: f64,
    /// Branch-and-bound node budget per MILP solve.
    pub max_nodes: usize,
}

impl Default for SimplexConfig {
    fn default() -> Self {
        Self {
            max_iterations: 20_000,
            tolerance: 1e-9,
            integrality_tolerance: 1e-6,
            max_nodes: 100_000,
        }
    }
}

/// The bundled solver backend.
#[derive(Debug, Clone, Default)]
pub struct SimplexSolver {
    /// Solver tunables.
    pub config: SimplexConfig,
}

impl SimplexSolver {
    /// Create a backend with explicit tunables.
    pub fn new(config: SimplexConfig) -> Self {
        Self { config }
    }
}

enum Resolution {
    Optimal(Vec<f64>),
    Infeasible,
    Unbounded,
}

enum PivotEnd {
    Optimal,
    Unbounded,
}

struct Tableau {
    /// `m x (ncols + 1)`; the last column is the right-hand side.
    rows: Vec<Vec<f64>>,
    /// Basic column per row.
    basis: Vec<usize>,
    /// Reduced-cost row, `ncols + 1` wide.
    obj: Vec<f64>,
    ncols: usize,
    /// First artificial column; `ncols` when there are none.
    art_start: usize,
}

impl SimplexSolver {
    /// Minimize `c . x` over the model's constraints with the given bounds.
    /// Binary variables are treated as continuous within their bounds, which
    /// is exactly the LP relaxation branch and bound needs.
    fn resolve(
        &self,
        model: &Model,
        c: &[f64],
        bounds: &[(f64, f64)],
    ) -> Result<Resolution, SolverFailure> {
        let n = model.num_vars();
        if n == 0 {
            return Ok(Resolution::Optimal(Vec::new()));
        }
        let tol = self.config.tolerance;

        // Densify constraints, shifting each variable by its lower bound.
        struct Row {
            coeffs: Vec<f64>,
            sense: Sense,
            rhs: f64,
        }
        let mut staged: Vec<Row> = Vec::new();
        for constraint in model.constraints() {
            let mut coeffs = vec![0.0; n];
            for (var, coefficient) in &constraint.expr.terms {
                coeffs[var.0] += coefficient;
            }
            let shift: f64 = coeffs
                .iter()
                .zip(bounds)
                .map(|(a, (lo, _))| a * lo)
                .sum();
            staged.push(Row {
                coeffs,
                sense: constraint.sense,
                rhs: constraint.rhs - constraint.expr.constant - shift,
            });
        }
        // Upper bounds become explicit rows over the shifted variables.
        for (j, (lo, hi)) in bounds.iter().enumerate() {
            let mut coeffs = vec![0.0; n];
            coeffs[j] = 1.0;
            staged.push(Row {
                coeffs,
                sense: Sense::Le,
                rhs: hi - lo,
            });
        }
        // Nonnegative right-hand sides.
        for row in &mut staged {
            if row.rhs < 0.0 {
                for a in &mut row.coeffs {
                    *a = -*a;
                }
                row.rhs = -row.rhs;
                row.sense = match row.sense {
                    Sense::Le => Sense::Ge,
                    Sense::Ge => Sense::Le,
                    Sense::Eq => Sense::Eq,
                };
            }
        }

        let m = staged.len();
        let nslack = staged
            .iter()
            .filter(|r| matches!(r.sense, Sense::Le | Sense::Ge))
            .count();
        let nart = staged
            .iter()
            .filter(|r| matches!(r.sense, Sense::Ge | Sense::Eq))
            .count();
        let ncols = n + nslack + nart;
        let art_start = n + nslack;

        let mut tableau = Tableau {
            rows: Vec::with_capacity(m),
            basis: Vec::with_capacity(m),
            obj: vec![0.0; ncols + 1],
            ncols,
            art_start,
        };

        let mut next_slack = n;
        let mut next_art = art_start;
        for row in &staged {
            let mut full = vec![0.0; ncols + 1];
            full[..n].copy_from_slice(&row.coeffs);
            full[ncols] = row.rhs;
            let basic = match row.sense {
                Sense::Le => {
                    full[next_slack] = 1.0;
                    next_slack += 1;
                    next_slack - 1
                }
                Sense::Ge => {
                    full[next_slack] = -1.0;
                    next_slack += 1;
                    full[next_art] = 1.0;
                    next_art += 1;
                    next_art - 1
                }
                Sense::Eq => {
                    full[next_art] = 1.0;
                    next_art += 1;
                    next_art - 1
                }
            };
            tableau.rows.push(full);
            tableau.basis.push(basic);
        }

        let mut banned = vec![false; ncols];

        // Phase 1: drive the artificials to zero.
        if nart > 0 {
            for col in art_start..ncols {
                tableau.obj[col] = 1.0;
            }
            for i in 0..m {
                if tableau.basis[i] >= art_start {
                    let row = tableau.rows[i].clone();
                    for k in 0..=ncols {
                        tableau.obj[k] -= row[k];
                    }
                }
            }
            match self.pivot_loop(&mut tableau, &banned)? {
                PivotEnd::Optimal => {}
                // Phase 1 minimizes a sum of nonnegatives; it cannot be
                // unbounded, so treat it as a breakdown.
                PivotEnd::Unbounded => {
                    return Err(SolverFailure::Numerical(
                        "phase 1 reported unbounded".into(),
                    ))
                }
            }
            let infeasibility: f64 = (0..m)
                .filter(|&i| tableau.basis[i] >= art_start)
                .map(|i| tableau.rows[i][ncols])
                .sum();
            if infeasibility > FEAS_TOL {
                return Ok(Resolution::Infeasible);
            }
            for col in art_start..ncols {
                banned[col] = true;
            }
            // Kick zero-level artificials out of the basis where possible.
            for i in 0..m {
                if tableau.basis[i] >= art_start {
                    if let Some(col) =
                        (0..art_start).find(|&j| tableau.rows[i][j].abs() > tol)
                    {
                        pivot(&mut tableau, i, col);
                    }
                    // An all-zero row is redundant; its artificial stays
                    // basic at level zero and never moves again.
                }
            }
        }

        // Phase 2: the real objective.
        tableau.obj = vec![0.0; ncols + 1];
        tableau.obj[..n].copy_from_slice(c);
        for i in 0..m {
            let cost = tableau.obj[tableau.basis[i]];
            if cost != 0.0 {
                let row = tableau.rows[i].clone();
                for k in 0..=ncols {
                    tableau.obj[k] -= cost * row[k];
                }
                tableau.obj[tableau.basis[i]] = 0.0;
            }
        }
        match self.pivot_loop(&mut tableau, &banned)? {
            PivotEnd::Optimal => {}
            PivotEnd::Unbounded => return Ok(Resolution::Unbounded),
        }

        // Read the solution back, undoing the lower-bound shift.
        let mut shifted = vec![0.0; n];
        for i in 0..m {
            if tableau.basis[i] < n {
                shifted[tableau.basis[i]] = tableau.rows[i][ncols].max(0.0);
            }
        }
        let values: Vec<f64> = shifted
            .iter()
            .zip(bounds)
            .map(|(v, (lo, hi))| (v + lo).clamp(*lo, *hi))
            .collect();
        Ok(Resolution::Optimal(values))
    }

    fn pivot_loop(
        &self,
        tableau: &mut Tableau,
        banned: &[bool],
    ) -> Result<PivotEnd, SolverFailure> {
        let tol = self.config.tolerance;
        let m = tableau.rows.len();
        let ncols = tableau.ncols;
        for _ in 0..self.config.max_iterations {
            // Bland: smallest improving column.
            let entering = (0..ncols).find(|&j| !banned[j] && tableau.obj[j] < -tol);
            let Some(col) = entering else {
                return Ok(PivotEnd::Optimal);
            };

            let mut leave: Option<(usize, f64)> = None;
            for i in 0..m {
                let a = tableau.rows[i][col];
                let rhs = tableau.rows[i][ncols];
                let ratio = if a > tol {
                    Some(rhs / a)
                } else if tableau.basis[i] >= tableau.art_start
                    && a.abs() > tol
                    && rhs.abs() <= tol
                {
                    // Degenerate pivot that expels a zero-level artificial.
                    Some(0.0)
                } else {
                    None
                };
                if let Some(r) = ratio {
                    let better = match leave {
                        None => true,
                        Some((best_i, best_r)) => {
                            r < best_r - tol
                                || ((r - best_r).abs() <= tol
                                    && tableau.basis[i] < tableau.basis[best_i])
                        }
                    };
                    if better {
                        leave = Some((i, r));
                    }
                }
            }
            let Some((row, _)) = leave else {
                return Ok(PivotEnd::Unbounded);
            };
            pivot(tableau, row, col);
        }
        Err(SolverFailure::IterationLimit(self.config.max_iterations))
    }
}

fn pivot(tableau: &mut Tableau, row: usize, col: usize) {
    let ncols = tableau.ncols;
    let inv = 1.0 / tableau.rows[row][col];
    for v in &mut tableau.rows[row] {
        *v *= inv;
    }
    tableau.rows[row][col] = 1.0;
    let pivot_row = tableau.rows[row].clone();
    for i in 0..tableau.rows.len() {
        if i == row {
            continue;
        }
        let factor = tableau.rows[i][col];
        if factor != 0.0 {
            for k in 0..=ncols {
                tableau.rows[i][k] -= factor * pivot_row[k];
            }
            tableau.rows[i][col] = 0.0;
        }
    }
    let factor = tableau.obj[col];
    if factor != 0.0 {
        for k in 0..=ncols {
            tableau.obj[k] -= factor * pivot_row[k];
        }
        tableau.obj[col] = 0.0;
    }
    tableau.basis[row] = col;
}

impl Solver for SimplexSolver {
    fn solve_lp(
        &self,
        model: &Model,
        objective: &LinExpr,
        goal: Goal,
    ) -> Result<LpOutcome, SolverFailure> {
        let n = model.num_vars();
        let mut c = vec![0.0; n];
        for (var, coefficient) in &objective.terms {
            c[var.0] += coefficient;
        }
        if goal == Goal::Maximize {
            for v in &mut c {
                *v = -*v;
            }
        }
        match self.resolve(model, &c, &model.all_bounds())? {
            Resolution::Optimal(values) => Ok(LpOutcome::Optimal {
                objective: objective.eval(&values),
                values,
            }),
            Resolution::Infeasible => Ok(LpOutcome::Infeasible),
            Resolution::Unbounded => Ok(LpOutcome::Unbounded),
        }
    }

    fn solve_milp(&self, model: &Model) -> Result<MilpOutcome, SolverFailure> {
        let n = model.num_vars();
        let binaries = model.binary_indices();
        let zero = vec![0.0; n];
        let int_tol = self.config.integrality_tolerance;

        let mut stack = vec![model.all_bounds()];
        let mut nodes = 0usize;
        while let Some(bounds) = stack.pop() {
            nodes += 1;
            if nodes > self.config.max_nodes {
                return Err(SolverFailure::NodeLimit(self.config.max_nodes));
            }
            let values = match self.resolve(model, &zero, &bounds)? {
                Resolution::Infeasible => continue,
                Resolution::Unbounded => {
                    // All variables carry finite bounds; a feasibility
                    // relaxation cannot be unbounded.
                    return Err(SolverFailure::Numerical(
                        "unbounded feasibility relaxation".into(),
                    ));
                }
                Resolution::Optimal(values) => values,
            };

            // Branch on the most fractional unfixed binary.
            let mut branch: Option<(usize, f64)> = None;
            let mut worst = int_tol;
            for &j in &binaries {
                let (lo, hi) = bounds[j];
                if lo < hi {
                    let fraction = (values[j] - values[j].round()).abs();
                    if fraction > worst {
                        worst = fraction;
                        branch = Some((j, values[j]));
                    }
                }
            }
            match branch {
                None => {
                    let mut solution = values;
                    for &j in &binaries {
                        solution[j] = solution[j].round();
                    }
                    return Ok(MilpOutcome::Feasible(solution));
                }
                Some((j, value)) => {
                    let near = if value >= 0.5 { 1.0 } else { 0.0 };
                    let mut far_bounds = bounds.clone();
                    far_bounds[j] = (1.0 - near, 1.0 - near);
                    stack.push(far_bounds);
                    let mut near_bounds = bounds;
                    near_bounds[j] = (near, near);
                    stack.push(near_bounds);
                }
            }
        }
        Ok(MilpOutcome::Infeasible)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::milp::Constraint;
    use approx::assert_relative_eq;

    fn optimal(outcome: LpOutcome) -> (f64, Vec<f64>) {
        match outcome {
            LpOutcome::Optimal { objective, values } => (objective, values),
            other => panic!("expected an optimum, got {other:?}"),
        }
    }

    #[test]
    fn test_lp_box_corners() {
        let mut model = Model::new("box");
        let x = model.continuous("x", -1.0, 2.0);
        let objective = LinExpr::term(x, 1.0);
        let solver = SimplexSolver::default();

        let (lo, _) = optimal(solver.solve_lp(&model, &objective, Goal::Minimize).unwrap());
        let (hi, _) = optimal(solver.solve_lp(&model, &objective, Goal::Maximize).unwrap());
        assert_relative_eq!(lo, -1.0, epsilon = 1e-7);
        assert_relative_eq!(hi, 2.0, epsilon = 1e-7);
    }

    #[test]
    fn test_lp_classic_optimum() {
        // max 3x + 2y subject to x + y <= 4 and x + 3y <= 6.
        let mut model = Model::new("classic");
        let x = model.continuous("x", 0.0, 10.0);
        let y = model.continuous("y", 0.0, 10.0);
        model.add(Constraint::le(LinExpr::term(x, 1.0).with(y, 1.0), 4.0));
        model.add(Constraint::le(LinExpr::term(x, 1.0).with(y, 3.0), 6.0));

        let solver = SimplexSolver::default();
        let objective = LinExpr::term(x, 3.0).with(y, 2.0);
        let (value, solution) =
            optimal(solver.solve_lp(&model, &objective, Goal::Maximize).unwrap());
        assert_relative_eq!(value, 12.0, epsilon = 1e-6);
        assert_relative_eq!(solution[x.0], 4.0, epsilon = 1e-6);
        assert_relative_eq!(solution[y.0], 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_lp_equality_constraint() {
        // x + y == 3 with x, y in [0, 2].
        let mut model = Model::new("eq");
        let x = model.continuous("x", 0.0, 2.0);
        let y = model.continuous("y", 0.0, 2.0);
        model.add(Constraint::eq(LinExpr::term(x, 1.0).with(y, 1.0), 3.0));

        let solver = SimplexSolver::default();
        let objective = LinExpr::term(x, 1.0);
        let (lo, values) =
            optimal(solver.solve_lp(&model, &objective, Goal::Minimize).unwrap());
        assert_relative_eq!(lo, 1.0, epsilon = 1e-6);
        assert_relative_eq!(values[x.0] + values[y.0], 3.0, epsilon = 1e-6);

        let (hi, _) = optimal(solver.solve_lp(&model, &objective, Goal::Maximize).unwrap());
        assert_relative_eq!(hi, 2.0, epsilon = 1e-6);
    }

    #[test]
    fn test_lp_infeasible() {
        let mut model = Model::new("conflict");
        let x = model.continuous("x", 0.0, 10.0);
        model.add(Constraint::ge(LinExpr::term(x, 1.0), 2.0));
        model.add(Constraint::le(LinExpr::term(x, 1.0), 1.0));

        let solver = SimplexSolver::default();
        let outcome = solver
            .solve_lp(&model, &LinExpr::term(x, 1.0), Goal::Minimize)
            .unwrap();
        assert!(matches!(outcome, LpOutcome::Infeasible));
    }

    #[test]
    fn test_lp_relaxes_binaries() {
        let mut model = Model::new("relaxed");
        let z = model.binary("z");
        model.add(Constraint::eq(LinExpr::term(z, 2.0), 1.0));

        // Integrally infeasible, but the LP relaxation has z = 0.5.
        let solver = SimplexSolver::default();
        let (value, _) = optimal(
            solver
                .solve_lp(&model, &LinExpr::term(z, 1.0), Goal::Minimize)
                .unwrap(),
        );
        assert_relative_eq!(value, 0.5, epsilon = 1e-7);
    }

    #[test]
    fn test_milp_feasible_with_branching() {
        // y <= 10 z and y >= 5 force z = 1.
        let mut model = Model::new("gate");
        let z = model.binary("z");
        let y = model.continuous("y", 0.0, 10.0);
        model.add(Constraint::le(LinExpr::term(y, 1.0).with(z, -10.0), 0.0));
        model.add(Constraint::ge(LinExpr::term(y, 1.0), 5.0));

        let solver = SimplexSolver::default();
        match solver.solve_milp(&model).unwrap() {
            MilpOutcome::Feasible(values) => {
                assert_relative_eq!(values[z.0], 1.0, epsilon = 1e-9);
                assert!(values[y.0] >= 5.0 - 1e-6);
            }
            MilpOutcome::Infeasible => panic!("expected a feasible gate"),
        }
    }

    #[test]
    fn test_milp_integrally_infeasible() {
        // z1 + z2 == 1 and z1 - z2 == 0 admit only z1 = z2 = 0.5.
        let mut model = Model::new("half");
        let z1 = model.binary("z1");
        let z2 = model.binary("z2");
        model.add(Constraint::eq(LinExpr::term(z1, 1.0).with(z2, 1.0), 1.0));
        model.add(Constraint::eq(LinExpr::term(z1, 1.0).with(z2, -1.0), 0.0));

        let solver = SimplexSolver::default();
        assert!(matches!(
            solver.solve_milp(&model).unwrap(),
            MilpOutcome::Infeasible
        ));
    }

    #[test]
    fn test_milp_no_binaries_is_plain_lp() {
        let mut model = Model::new("plain");
        let x = model.continuous("x", 0.0, 1.0);
        model.add(Constraint::ge(LinExpr::term(x, 1.0), 0.25));

        let solver = SimplexSolver::default();
        match solver.solve_milp(&model).unwrap() {
            MilpOutcome::Feasible(values) => assert!(values[x.0] >= 0.25 - 1e-6),
            MilpOutcome::Infeasible => panic!("expected feasible"),
        }
    }
}
