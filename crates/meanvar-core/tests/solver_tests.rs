use meanvar_core::optimizer::{build_program, optimize_weights, OptimizerSettings};
use meanvar_core::solver::{
    ActiveSetSolver, ProjectedGradientSolver, QpSolver, QuadraticProgram, SolverKind,
    SolverSettings, SolverStatus,
};
use meanvar_core::statistics::ReturnStatistics;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn correlated_stats() -> ReturnStatistics {
    ReturnStatistics::from_parts(
        vec!["EQ".into(), "CREDIT".into(), "RATES".into(), "GOLD".into()],
        vec![dec!(0.0008), dec!(0.0005), dec!(0.0002), dec!(0.0003)],
        vec![
            vec![dec!(0.00020), dec!(0.00008), dec!(-0.00001), dec!(0.00001)],
            vec![dec!(0.00008), dec!(0.00006), dec!(0.00001), dec!(0.000005)],
            vec![dec!(-0.00001), dec!(0.00001), dec!(0.00003), dec!(0.000004)],
            vec![dec!(0.00001), dec!(0.000005), dec!(0.000004), dec!(0.00009)],
        ],
    )
    .unwrap()
}

// ---------------------------------------------------------------------------
// Backend agreement
// ---------------------------------------------------------------------------

#[test]
fn test_backends_agree_on_max_sharpe_weights() {
    let stats = correlated_stats();
    let settings = OptimizerSettings::default();

    let active = optimize_weights(&stats, dec!(0), &settings, &ActiveSetSolver::default()).unwrap();
    let gradient =
        optimize_weights(&stats, dec!(0), &settings, &ProjectedGradientSolver::default()).unwrap();

    for (a, g) in active.weights().iter().zip(gradient.weights().iter()) {
        assert!((*a - *g).abs() < dec!(0.00001), "active-set {} vs projected-gradient {}", a, g);
    }
}

#[test]
fn test_backends_agree_with_binding_bounds() {
    // A dominated, highly correlated asset ends up at exactly zero
    let stats = ReturnStatistics::from_parts(
        vec!["A".into(), "B".into(), "C".into()],
        vec![dec!(0.001), dec!(0.0004), dec!(0.0006)],
        vec![
            vec![dec!(0.0001), dec!(0.000095), dec!(0)],
            vec![dec!(0.000095), dec!(0.0001), dec!(0)],
            vec![dec!(0), dec!(0), dec!(0.0001)],
        ],
    )
    .unwrap();
    let settings = OptimizerSettings::default();

    let active = optimize_weights(&stats, dec!(0), &settings, &ActiveSetSolver::default()).unwrap();
    let gradient =
        optimize_weights(&stats, dec!(0), &settings, &ProjectedGradientSolver::default()).unwrap();

    assert_eq!(active.weights()[1], Decimal::ZERO);
    assert!(gradient.weights()[1] < dec!(0.00001));
    for (a, g) in active.weights().iter().zip(gradient.weights().iter()) {
        assert!((*a - *g).abs() < dec!(0.00001), "{} vs {}", a, g);
    }
}

#[test]
fn test_raw_solution_satisfies_equality() {
    let stats = correlated_stats();
    let qp = build_program(&stats, dec!(0.0001), &OptimizerSettings::default()).unwrap();

    for kind in [SolverKind::ActiveSet, SolverKind::ProjectedGradient] {
        let solution = kind.build(SolverSettings::default()).solve(&qp);
        assert_eq!(solution.status, SolverStatus::Optimal, "{}", kind);
        let x = solution.x.unwrap();
        let lhs: Decimal = x.iter().zip(qp.equality.iter()).map(|(a, b)| *a * *b).sum();
        assert!((lhs - qp.rhs).abs() < dec!(0.000001), "{}: a'x = {}", kind, lhs);
        assert!(x.iter().all(|v| *v >= Decimal::ZERO));
        assert!(solution.objective.unwrap() > Decimal::ZERO);
    }
}

// ---------------------------------------------------------------------------
// Status reporting
// ---------------------------------------------------------------------------

#[test]
fn test_both_backends_report_infeasible() {
    let qp = QuadraticProgram {
        hessian: vec![vec![dec!(1), dec!(0)], vec![dec!(0), dec!(1)]],
        equality: vec![dec!(-0.01), dec!(-0.02)],
        rhs: dec!(1),
    };
    for kind in [SolverKind::ActiveSet, SolverKind::ProjectedGradient] {
        let solution = kind.build(SolverSettings::default()).solve(&qp);
        assert_eq!(solution.status, SolverStatus::Infeasible, "{}", kind);
        assert!(solution.x.is_none());
    }
}

#[test]
fn test_indefinite_hessian_is_unbounded_for_projected_gradient() {
    // The feasible set x0 = 1 + x1 is a ray along which -|x|² falls forever
    let qp = QuadraticProgram {
        hessian: vec![vec![dec!(-1), dec!(0)], vec![dec!(0), dec!(-1)]],
        equality: vec![dec!(1), dec!(-1)],
        rhs: dec!(1),
    };
    let solution = ProjectedGradientSolver::default().solve(&qp);
    assert_eq!(solution.status, SolverStatus::Unbounded);
}

// ---------------------------------------------------------------------------
// Solvers are shareable
// ---------------------------------------------------------------------------

#[test]
fn test_solver_shared_across_threads() {
    let stats = correlated_stats();
    let settings = OptimizerSettings::default();
    let solver: Box<dyn QpSolver> = SolverKind::ActiveSet.build(SolverSettings::default());
    let reference = optimize_weights(&stats, dec!(0), &settings, solver.as_ref()).unwrap();

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| scope.spawn(|| optimize_weights(&stats, dec!(0), &settings, solver.as_ref())))
            .collect();
        for handle in handles {
            let w = handle.join().unwrap().unwrap();
            assert_eq!(w, reference);
        }
    });
}
