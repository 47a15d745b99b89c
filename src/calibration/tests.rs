use approx::assert_abs_diff_eq;
use indoc::indoc;

use super::*;

fn sweep_axis() -> Vec<u64> {
    (0..11).map(|i| 1_000_000 + i * 100_000).collect()
}

/// Systematic errors of a made-up instrument at `freq`: directivity, port
/// match and reflection tracking.
fn instrument_errors(freq: u64) -> (Complex64, Complex64, Complex64) {
    let f = freq as f64 / 1e6;
    (
        Complex64::new(0.05 * f, -0.02),
        Complex64::new(0.1, 0.03 * f),
        Complex64::new(0.9, -0.1 * f),
    )
}

/// What the instrument reports for a device with reflection `gamma`.
fn measure(freq: u64, gamma: Complex64) -> Datapoint {
    let (e00, e11, e10e01) = instrument_errors(freq);
    let measured = e00 + e10e01 * gamma / (1.0 - e11 * gamma);
    Datapoint::from_complex(freq, measured)
}

fn calibrated(config: StandardsConfig) -> Calibration {
    let axis = sweep_axis();
    let measured = |model: &dyn Fn(u64) -> Complex64| -> Vec<Datapoint> {
        axis.iter().map(|&f| measure(f, model(f))).collect()
    };

    let mut cal = Calibration::new(config);
    cal.set_standard(Standard::Short, measured(&|f| config.short.gamma(f)));
    cal.set_standard(Standard::Open, measured(&|f| config.open.gamma(f)));
    cal.set_standard(Standard::Load, measured(&|f| config.load.gamma(f)));
    cal
}

fn ideal_standards(axis: &[u64]) -> Calibration {
    let mut cal = Calibration::new(StandardsConfig::default());
    for (standard, re) in [
        (Standard::Short, -1.0),
        (Standard::Open, 1.0),
        (Standard::Load, 0.0),
    ] {
        cal.set_standard(
            standard,
            axis.iter().map(|&f| Datapoint::new(f, re, 0.0)).collect(),
        );
    }
    cal
}

#[test]
fn test_uncalculated_is_passthrough() {
    let cal = Calibration::default();
    let dp = Datapoint::new(1_000_000, 0.3, -0.4);
    assert!(!cal.is_calculated());
    assert_eq!(cal.correct11(&dp), dp);
    assert_eq!(cal.correct21(&dp), dp);
}

#[test]
fn test_incomplete_standards() {
    let mut cal = Calibration::default();
    cal.set_standard(Standard::Short, vec![Datapoint::new(1, -1.0, 0.0)]);
    match cal.calculate() {
        Err(CalibrationError::IncompleteStandards { missing }) => {
            assert_eq!(missing, "open, load")
        }
        other => panic!("unexpected result {other:?}"),
    }
    assert!(!cal.is_calculated());
}

#[test]
fn test_mismatched_standards() {
    let axis = sweep_axis();
    let mut cal = ideal_standards(&axis);
    cal.set_standard(Standard::Load, vec![Datapoint::new(1_000_000, 0.0, 0.0)]);
    assert!(matches!(
        cal.calculate(),
        Err(CalibrationError::MismatchedStandards {
            standard: Standard::Load,
            expected: 11,
            got: 1
        })
    ));
}

#[test]
fn test_degenerate_standards() {
    let axis = sweep_axis();
    let mut cal = ideal_standards(&axis);
    let short = cal.standard(Standard::Short).to_vec();
    cal.set_standard(Standard::Open, short);
    assert!(matches!(
        cal.calculate(),
        Err(CalibrationError::DegenerateStandards { freq: 1_000_000 })
    ));
    assert!(!cal.is_calculated());
}

#[test]
fn test_tiny_denominator_is_not_degenerate() {
    // Standards read at 1e-170 of their ideal values: the denominator is
    // about 2e-170, whose squared magnitude underflows to zero.
    let axis = sweep_axis();
    let mut cal = Calibration::default();
    for (standard, gamma) in [
        (Standard::Short, -1.0),
        (Standard::Open, 1.0),
        (Standard::Load, 0.0),
    ] {
        let data = axis
            .iter()
            .map(|&f| Datapoint::new(f, gamma * 1e-170, 0.0))
            .collect();
        cal.set_standard(standard, data);
    }
    cal.calculate().unwrap();
    let terms = cal.terms().unwrap();
    assert!(terms.e11.iter().all(|e| e.re.is_finite() && e.im.is_finite()));
}

#[test]
fn test_failed_calculation_discards_old_terms() {
    let axis = sweep_axis();
    let mut cal = ideal_standards(&axis);
    cal.calculate().unwrap();
    assert!(cal.is_calculated());

    let short = cal.standard(Standard::Short).to_vec();
    cal.set_standard(Standard::Open, short);
    assert!(cal.is_calculated());
    assert!(cal.calculate().is_err());
    assert!(!cal.is_calculated());
}

#[test]
fn test_ideal_data_is_identity() {
    let axis = sweep_axis();
    let mut cal = ideal_standards(&axis);
    cal.calculate().unwrap();

    let terms = cal.terms().unwrap();
    assert_eq!(terms.frequencies, axis);
    assert_abs_diff_eq!(terms.e00[0].norm(), 0.0);
    assert_abs_diff_eq!(terms.e11[0].norm(), 0.0);
    assert_abs_diff_eq!(terms.delta_e[0].re, -1.0);

    for (re, im) in [(-1.0, 0.0), (1.0, 0.0), (0.0, 0.0), (0.3, -0.45)] {
        let dp = Datapoint::new(1_500_000, re, im);
        let corrected = cal.correct11(&dp);
        assert_abs_diff_eq!(corrected.re, re, epsilon = 1e-12);
        assert_abs_diff_eq!(corrected.im, im, epsilon = 1e-12);
        assert_eq!(corrected.freq, dp.freq);
    }
}

#[test]
fn test_parametric_self_consistent_is_identity() {
    let config = StandardsConfig {
        short: ShortStandard::TYPICAL,
        open: OpenStandard::TYPICAL,
        load: LoadStandard::TYPICAL,
    };
    let axis = sweep_axis();
    let mut cal = Calibration::new(config);
    cal.set_standard(
        Standard::Short,
        axis.iter().map(|&f| Datapoint::from_complex(f, config.short.gamma(f))).collect(),
    );
    cal.set_standard(
        Standard::Open,
        axis.iter().map(|&f| Datapoint::from_complex(f, config.open.gamma(f))).collect(),
    );
    cal.set_standard(
        Standard::Load,
        axis.iter().map(|&f| Datapoint::from_complex(f, config.load.gamma(f))).collect(),
    );
    cal.calculate().unwrap();

    for &f in &axis {
        let response = Datapoint::from_complex(f, config.open.gamma(f));
        let corrected = cal.correct11(&response);
        assert_abs_diff_eq!(corrected.re, response.re, epsilon = 1e-9);
        assert_abs_diff_eq!(corrected.im, response.im, epsilon = 1e-9);
    }
}

#[test]
fn test_removes_systematic_errors() {
    for config in [
        StandardsConfig::default(),
        StandardsConfig {
            short: ShortStandard::TYPICAL,
            open: OpenStandard::TYPICAL,
            load: LoadStandard::TYPICAL,
        },
    ] {
        let mut cal = calibrated(config);
        cal.calculate().unwrap();
        assert!(cal.is_calculated());

        let dut = Complex64::new(0.2, -0.6);
        for &f in &sweep_axis() {
            let corrected = cal.correct11(&measure(f, dut));
            assert_abs_diff_eq!(corrected.re, dut.re, epsilon = 1e-9);
            assert_abs_diff_eq!(corrected.im, dut.im, epsilon = 1e-9);
        }
    }
}

#[test]
fn test_nearest_frequency_ties_to_lowest() {
    assert_eq!(nearest_index(&[100, 200, 300], 149), 0);
    assert_eq!(nearest_index(&[100, 200, 300], 150), 0);
    assert_eq!(nearest_index(&[100, 200, 300], 151), 1);
    assert_eq!(nearest_index(&[100, 200, 300], 10_000), 2);
    assert_eq!(nearest_index(&[100, 200, 300], 0), 0);
}

#[test]
fn test_correct_uses_nearest_bin() {
    let axis = [1_000_000, 2_000_000];
    let mut cal = Calibration::default();
    // Directivity differs per bin, so the chosen bin shows in the result.
    cal.set_standard(
        Standard::Short,
        vec![Datapoint::new(axis[0], -0.9, 0.0), Datapoint::new(axis[1], -0.8, 0.0)],
    );
    cal.set_standard(
        Standard::Open,
        vec![Datapoint::new(axis[0], 1.1, 0.0), Datapoint::new(axis[1], 1.2, 0.0)],
    );
    cal.set_standard(
        Standard::Load,
        vec![Datapoint::new(axis[0], 0.1, 0.0), Datapoint::new(axis[1], 0.2, 0.0)],
    );
    cal.calculate().unwrap();

    // e00 equals the measured load with ideal standards, so a sample equal
    // to the load of the chosen bin corrects to zero.
    let low = cal.correct11(&Datapoint::new(1_000_000, 0.1, 0.0));
    assert_abs_diff_eq!(low.re, 0.0, epsilon = 1e-12);
    let high = cal.correct11(&Datapoint::new(1_600_000, 0.2, 0.0));
    assert_abs_diff_eq!(high.re, 0.0, epsilon = 1e-12);
    let tie = cal.correct11(&Datapoint::new(1_500_000, 0.1, 0.0));
    assert_abs_diff_eq!(tie.re, 0.0, epsilon = 1e-12);
    assert_eq!(tie.freq, 1_500_000);
}

#[test]
fn test_two_port_correction() {
    let axis = sweep_axis();
    let mut cal = ideal_standards(&axis);
    let isolation = Complex64::new(0.01, -0.005);
    let tracking = Complex64::new(0.7, 0.2);
    cal.set_standard(
        Standard::Isolation,
        axis.iter().map(|&f| Datapoint::from_complex(f, isolation)).collect(),
    );
    cal.set_standard(
        Standard::Through,
        axis.iter()
            .map(|&f| Datapoint::from_complex(f, isolation + tracking))
            .collect(),
    );
    assert!(cal.is_valid_2port());
    cal.calculate().unwrap();
    assert!(cal.terms().unwrap().is_two_port());

    // Port match is zero for ideal data, so e10e32 is the through response
    // minus isolation.
    let dut = Complex64::new(0.25, 0.5);
    let measured = Datapoint::from_complex(1_300_000, isolation + tracking * dut);
    let corrected = cal.correct21(&measured);
    assert_abs_diff_eq!(corrected.re, dut.re, epsilon = 1e-12);
    assert_abs_diff_eq!(corrected.im, dut.im, epsilon = 1e-12);
}

#[test]
fn test_one_port_leaves_s21_alone() {
    let axis = sweep_axis();
    let mut cal = ideal_standards(&axis);
    cal.calculate().unwrap();
    let dp = Datapoint::new(1_000_000, 0.5, 0.5);
    assert_eq!(cal.correct21(&dp), dp);
}

#[test]
fn test_reset() {
    let axis = sweep_axis();
    let mut cal = ideal_standards(&axis);
    cal.calculate().unwrap();
    cal.reset();
    assert!(!cal.is_calculated());
    assert!(!cal.is_valid_1port());
    for standard in Standard::iter() {
        assert!(cal.standard(standard).is_empty());
    }
}

#[test]
fn test_save_load_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cal.txt");

    let mut cal = calibrated(StandardsConfig::default());
    let axis = sweep_axis();
    cal.set_standard(
        Standard::Isolation,
        axis.iter().map(|&f| Datapoint::new(f, 1e-3, -2e-3)).collect(),
    );
    cal.set_standard(
        Standard::Through,
        axis.iter().map(|&f| Datapoint::new(f, 0.8, 0.1)).collect(),
    );
    cal.save(&path).unwrap();

    let mut loaded = Calibration::default();
    assert_eq!(loaded.load(&path).unwrap(), axis.len());
    for standard in Standard::iter() {
        assert_eq!(loaded.standard(standard), cal.standard(standard));
    }
    assert!(!loaded.is_calculated());
    loaded.calculate().unwrap();
    assert!(loaded.is_calculated());
}

#[test]
fn test_save_requires_one_port() {
    let dir = tempfile::tempdir().unwrap();
    let cal = Calibration::default();
    assert!(matches!(
        cal.save(dir.path().join("cal.txt")),
        Err(CalibrationError::IncompleteStandards { .. })
    ));
}

#[test]
fn test_load_skips_malformed_lines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cal.txt");
    std::fs::write(
        &path,
        indoc! {"
            # Calibration data
            ! a comment
            1000 -1 0 1 0 0 0
            # Hz ShortR ShortI OpenR OpenI LoadR LoadI ThroughR ThroughI IsolationR IsolationI
            1000000 -1 0 1 0 0 0
            2000000 -1 0 1 0 0
            3000000 -1 0 1 0 zero 0
            4000000  -1 0 1 0 0 0
            5000000 -0.9 0.1 0.9 -0.1 0.01 0.02
        "},
    )
    .unwrap();

    let mut cal = Calibration::default();
    cal.set_standard(Standard::Through, vec![Datapoint::new(1, 1.0, 0.0)]);
    assert_eq!(cal.load(&path).unwrap(), 2);
    assert_eq!(cal.standard(Standard::Short)[1], Datapoint::new(5_000_000, -0.9, 0.1));
    assert_eq!(cal.standard(Standard::Load)[1], Datapoint::new(5_000_000, 0.01, 0.02));
    assert!(cal.standard(Standard::Through).is_empty());
    assert!(cal.is_valid_1port());
    assert!(!cal.is_valid_2port());
}

#[test]
fn test_load_without_header_has_no_data() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cal.txt");
    std::fs::write(&path, "# something else\n1000000 -1 0 1 0 0 0\n").unwrap();

    let mut cal = ideal_standards(&sweep_axis());
    assert_eq!(cal.load(&path).unwrap(), 0);
    assert!(!cal.is_valid_1port());
}

#[test]
fn test_load_missing_file() {
    let mut cal = Calibration::default();
    assert!(matches!(
        cal.load("/nonexistent/calibration.cal"),
        Err(CalibrationError::Io(_))
    ));
}
