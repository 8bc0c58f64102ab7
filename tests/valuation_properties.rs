use approx::assert_relative_eq;
use capval::calibration::{
    CalibrationWarningFlag, EquityCalibrator, LevenbergMarquardt, LmOptions, MultiStart,
    SPOT_BOUNDS, VOL_BOUNDS,
};
use capval::captable::{ClaimClass, ClaimsTable, ValidationError, is_valid, validate};
use capval::config::RunConfig;
use capval::mc::{IMMEDIATE_EXIT_HORIZON, NormalSample, effective_horizon, simulate_terminal};
use capval::pricing::VestingRule;
use capval::valuation::{ValuationInputs, run_valuation, run_valuation_with};

fn stock_price_inputs(price: f64, vol: f64, rate: f64, horizon: f64, n: usize) -> ValuationInputs {
    ValuationInputs {
        target_stock_price: price,
        target_volatility: vol,
        target_equity_value: 0.0,
        risk_free_rate: rate,
        horizon,
        sample_size: n,
        seed: 42,
    }
}

fn mixed_table() -> ClaimsTable {
    ClaimsTable::new(vec![
        ClaimClass::common(10_000.0).with_label("Common"),
        ClaimClass::time_option(1_500.0, 8.0).with_label("ESOP 2021"),
        ClaimClass::threshold(400.0, 0.0, 20.0).with_label("PSU step"),
        ClaimClass::ramp(300.0, 2.0, 12.0, 30.0).with_label("PSU ramp"),
        ClaimClass::cliff(200.0, 0.0, 10.0, 25.0).with_label("PSU cliff"),
    ])
}

#[test]
fn valid_table_is_accepted() {
    assert!(validate(&mixed_table()).is_ok());
    assert!(is_valid(&mixed_table()));
}

#[test]
fn each_invariant_family_has_a_rejected_counterexample() {
    let mut negative = mixed_table();
    negative.classes[2].shares = -1.0;
    assert!(matches!(
        validate(&negative),
        Err(ValidationError::NegativeField { row: 2, field: "shares" })
    ));

    let mut common = mixed_table();
    common.classes[0].strike = 1.0;
    assert!(matches!(validate(&common), Err(ValidationError::CommonRow(_))));

    let mut window = mixed_table();
    window.classes[1].vstart = 3.0;
    assert!(matches!(
        validate(&window),
        Err(ValidationError::TimeVestingWindow { row: 1 })
    ));

    let mut checkpoints = mixed_table();
    checkpoints.classes[3].v_cnt = 1;
    assert!(matches!(
        validate(&checkpoints),
        Err(ValidationError::CheckpointCount {
            row: 3,
            expected: 2,
            found: 1
        })
    ));
}

#[test]
fn vesting_fractions_follow_their_regimes() {
    let grid: Vec<f64> = (0..400).map(|i| i as f64 * 0.1).collect();
    let table = mixed_table();

    for (row, class) in table.classes.iter().enumerate() {
        let rule = VestingRule::from_class(row, class).unwrap();
        let fractions: Vec<f64> = grid.iter().map(|s| rule.fraction(*s)).collect();
        assert!(fractions.windows(2).all(|w| w[1] >= w[0]), "row {row}");

        match rule {
            VestingRule::Time => assert!(fractions.iter().all(|f| *f == 1.0)),
            VestingRule::Threshold { .. } => {
                assert!(fractions.iter().all(|f| *f == 0.0 || *f == 1.0))
            }
            VestingRule::Cliff { end, .. } => {
                assert!(
                    fractions
                        .iter()
                        .all(|f| [0.0, 1.0 / 3.0, 2.0 / 3.0, 1.0].contains(f))
                );
                assert_eq!(rule.fraction(end), 1.0);
            }
            VestingRule::Ramp { .. } => {
                assert!(fractions.iter().all(|f| (0.0..=1.0).contains(f)))
            }
        }
    }
}

#[test]
fn fair_values_are_non_negative() {
    let report = run_valuation(&mixed_table(), &stock_price_inputs(10.0, 0.5, 0.05, 4.0, 8_000));
    assert!(report.status, "{}", report.message);
    assert_eq!(report.fair_value_per_share.len(), 5);
    assert!(report.fair_value_per_share.iter().all(|v| *v >= 0.0));
    assert_eq!(report.labels[1], "ESOP 2021");
    assert_eq!(report.is_cliff, vec![false, false, false, false, true]);
}

#[test]
fn common_only_calibration_reproduces_target_price() {
    let table = ClaimsTable::new(vec![ClaimClass::common(1_000_000.0)]);
    let report = run_valuation(&table, &stock_price_inputs(100.0, 0.45, 0.05, 5.0, 20_000));
    assert!(report.status, "{}", report.message);
    assert_relative_eq!(report.fair_value_per_share[0], 100.0, max_relative = 1e-3);
    assert_relative_eq!(report.voleq, 0.45, max_relative = 1e-3);
    assert_relative_eq!(report.dilution, 1.0, epsilon = 1e-12);
    assert!(report.calibration.as_ref().is_some_and(|d| d.success));
}

#[test]
fn far_out_of_the_money_option_at_immediate_exit_is_worthless() {
    let table = ClaimsTable::new(vec![
        ClaimClass::common(10_000.0),
        ClaimClass::time_option(5_000.0, 1.0e6),
    ]);
    let report = run_valuation(&table, &stock_price_inputs(10.0, 0.45, 0.05, 0.005, 1));
    assert!(report.status, "{}", report.message);
    assert!(report.immediate_exit);
    assert_eq!(report.horizon, IMMEDIATE_EXIT_HORIZON);
    assert_eq!(report.fair_value_per_share[1], 0.0);
    assert_relative_eq!(report.fair_value_per_share[0], 10.0, max_relative = 1e-3);
    // common holds all of the equity value; the option's share is nil
    assert_relative_eq!(report.dilution, 1.0, epsilon = 1e-12);
}

#[test]
fn discount_check_matches_the_discount_identity() {
    let table = mixed_table();

    let undiscounted = run_valuation(&table, &stock_price_inputs(10.0, 0.45, 0.0, 3.0, 6_000));
    assert!(undiscounted.status, "{}", undiscounted.message);
    let check = undiscounted.check.unwrap();
    assert_relative_eq!(check.discount, 1.0, epsilon = 1e-9);

    let report = run_valuation(&table, &stock_price_inputs(10.0, 0.45, 0.04, 3.0, 6_000));
    let check = report.check.unwrap();
    assert_relative_eq!(check.discount, (-0.04_f64 * 3.0).exp(), max_relative = 1e-9);
    assert_relative_eq!(check.volatility, report.voleq, max_relative = 1e-12);
}

#[test]
fn single_draw_at_floored_horizon_is_deterministic() {
    let horizon = effective_horizon(0.0);
    assert_eq!(horizon, IMMEDIATE_EXIT_HORIZON);

    let sample = NormalSample::from_seed(1, 42).unwrap();
    let first = simulate_terminal(25.0, 0.6, 0.05, horizon, &sample);
    let second = simulate_terminal(25.0, 0.6, 0.05, horizon, &sample);
    assert_eq!(first, second);
    assert_eq!(first.len(), 1);
    assert_relative_eq!(first[0], 25.0, max_relative = 1e-2);

    let table = ClaimsTable::new(vec![ClaimClass::common(100.0)]);
    let report = run_valuation(&table, &stock_price_inputs(25.0, 0.6, 0.05, 0.01, 1));
    assert!(report.status, "{}", report.message);
    assert_eq!(report.voleq, 0.0);
    assert_eq!(report.sim_tev.len(), 1);
}

#[test]
fn same_seed_is_bit_identical() {
    let inputs = stock_price_inputs(10.0, 0.5, 0.03, 2.5, 4_000);
    let a = run_valuation(&mixed_table(), &inputs);
    let b = run_valuation(&mixed_table(), &inputs);
    assert!(a.status, "{}", a.message);
    assert_eq!(a, b);

    let reseeded = run_valuation(&mixed_table(), &ValuationInputs { seed: 7, ..inputs });
    assert_ne!(a.sim_tev, reseeded.sim_tev);
}

#[test]
fn zero_width_ramp_is_reported_not_raised() {
    let table = ClaimsTable::new(vec![
        ClaimClass::common(1_000.0),
        ClaimClass::ramp(100.0, 0.0, 15.0, 15.0),
    ]);
    assert!(is_valid(&table));
    let report = run_valuation(&table, &stock_price_inputs(10.0, 0.4, 0.02, 2.0, 500));
    assert!(!report.status);
    assert!(report.message.starts_with("numerical error"));
    assert!(report.fair_value_per_share.is_empty());
}

#[test]
fn equity_value_mode_reproduces_target_equity() {
    let inputs = ValuationInputs {
        target_stock_price: 0.0,
        target_volatility: 0.5,
        target_equity_value: 150_000.0,
        risk_free_rate: 0.03,
        horizon: 3.0,
        sample_size: 20_000,
        seed: 42,
    };
    let report = run_valuation(&mixed_table(), &inputs);
    assert!(report.status, "{}", report.message);
    assert_relative_eq!(report.tev0, 150_000.0, max_relative = 1e-3);
    assert_relative_eq!(report.voleq, 0.5, max_relative = 1e-3);
}

#[test]
fn restart_policy_reaches_the_same_price() {
    let table = ClaimsTable::new(vec![
        ClaimClass::common(10_000.0),
        ClaimClass::time_option(1_000.0, 10.0),
    ]);
    let calibrator = EquityCalibrator::with_minimizer(MultiStart::new(
        LevenbergMarquardt::default(),
        vec![0.7, 1.4],
    ));
    let report = run_valuation_with(
        &table,
        &stock_price_inputs(12.0, 0.4, 0.02, 2.0, 4_000),
        &calibrator,
    );
    assert!(report.status, "{}", report.message);
    assert_relative_eq!(report.fair_value_per_share[0], 12.0, max_relative = 1e-3);
}

#[test]
fn non_convergence_is_a_soft_failure() {
    let table = ClaimsTable::new(vec![
        ClaimClass::common(10_000.0),
        ClaimClass::time_option(1_500.0, 8.0),
    ]);
    let calibrator = EquityCalibrator::with_minimizer(LevenbergMarquardt::new(LmOptions {
        max_iterations: 1,
        initial_damping: 1e6,
        ..LmOptions::default()
    }));
    let report = run_valuation_with(
        &table,
        &stock_price_inputs(30.0, 0.45, 0.05, 5.0, 2_000),
        &calibrator,
    );

    assert!(report.status, "{}", report.message);
    let calibration = report.calibration.as_ref().expect("diagnostics present");
    assert!(!calibration.success);
    assert!(calibration.warnings.contains(&CalibrationWarningFlag::NonConvergent));
    assert_eq!(calibration.optimal_values, vec![report.s0, report.volcm]);
    assert!(report.s0 >= SPOT_BOUNDS.0 && report.s0 <= SPOT_BOUNDS.1);
    assert!(report.volcm >= VOL_BOUNDS.0 && report.volcm <= VOL_BOUNDS.1);
    assert!(report.fair_value_per_share.iter().all(|v| v.is_finite()));
}

#[test]
fn restart_recovers_a_heavily_damped_first_run() {
    let table = ClaimsTable::new(vec![
        ClaimClass::common(10_000.0),
        ClaimClass::time_option(1_500.0, 8.0),
    ]);
    let damped = LevenbergMarquardt::new(LmOptions {
        max_iterations: 1,
        initial_damping: 1e6,
        ..LmOptions::default()
    });
    let inputs = stock_price_inputs(30.0, 0.45, 0.05, 5.0, 2_000);
    let single = run_valuation_with(&table, &inputs, &EquityCalibrator::with_minimizer(damped));
    let restarted = run_valuation_with(
        &table,
        &inputs,
        &EquityCalibrator::with_minimizer(MultiStart::new(damped, vec![0.9, 1.1])),
    );

    assert!(restarted.status, "{}", restarted.message);
    assert_eq!(restarted.iterations, 3);
    assert!(restarted.iterations > single.iterations);
}

#[test]
fn zero_share_common_with_underwater_options_fails_the_report() {
    // Any draw that leaves the option out of the money has zero total equity.
    let table = ClaimsTable::new(vec![
        ClaimClass::common(0.0),
        ClaimClass::time_option(100.0, 5.0),
    ]);
    let report = run_valuation(&table, &stock_price_inputs(10.0, 0.45, 0.05, 2.0, 2_000));

    assert!(!report.status);
    assert!(report.message.contains("convergence failure"), "{}", report.message);
    assert!(report.calibration.is_none());
}

#[test]
fn immediate_exit_is_not_flagged_as_a_poor_fit() {
    let table = ClaimsTable::new(vec![
        ClaimClass::common(10_000.0),
        ClaimClass::time_option(1_000.0, 5.0),
    ]);
    let report = run_valuation(&table, &stock_price_inputs(10.0, 0.45, 0.05, 0.0, 1));

    assert!(report.status, "{}", report.message);
    assert!(report.immediate_exit);
    assert!(report.message.contains("single draw"));
    let calibration = report.calibration.as_ref().expect("diagnostics present");
    assert!(!calibration.warnings.contains(&CalibrationWarningFlag::PoorFit));
    assert_relative_eq!(report.fair_value_per_share[0], 10.0, max_relative = 1e-6);
}

#[test]
fn config_document_drives_a_full_run() {
    let json = r#"{
        "stock_price": 100.0,
        "equity_volatility": 0.45,
        "time_to_exit": 0.01,
        "risk_free_rate": 0.05,
        "matrix": [
            [1000, 0, 0, 0, 1, 0, 0, 0],
            [200, 150, 0, 0, 1, 0, 0, 0]
        ],
        "labels": ["Common", "Underwater options"]
    }"#;
    let cfg = RunConfig::from_json(json).unwrap();
    cfg.validate().unwrap();
    let inputs = cfg.to_inputs();
    assert_eq!(inputs.sample_size, 1);

    let report = run_valuation(&cfg.claims_table().unwrap(), &inputs);
    assert!(report.status, "{}", report.message);
    assert_eq!(report.labels, vec!["Common", "Underwater options"]);
    assert_eq!(report.fair_value_per_share[1], 0.0);

    let json = capval::core::to_json_pretty(&report).unwrap();
    assert!(json.contains("\"check\": ["));
    assert!(!json.contains("sim_tev"));
}
