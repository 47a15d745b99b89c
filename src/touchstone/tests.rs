use approx::assert_abs_diff_eq;
use indoc::indoc;

use super::*;

#[test]
fn test_option_defaults() {
    let opts = Options::parse("#").unwrap();
    assert_eq!(opts, Options::default());
    assert_eq!(opts.unit, FrequencyUnit::GHz);
    assert_eq!(opts.format, ValueFormat::Ma);
    assert_eq!(opts.resistance, 50.0);
}

#[test]
fn test_option_tokens_unordered() {
    let opts = Options::parse("# RI R 75 MHz z").unwrap();
    assert_eq!(opts.unit, FrequencyUnit::MHz);
    assert_eq!(opts.parameter, Parameter::Z);
    assert_eq!(opts.format, ValueFormat::Ri);
    assert_eq!(opts.resistance, 75.0);
    assert_eq!(opts.to_string(), "# MHZ Z RI R 75");
}

#[test]
fn test_option_line_errors() {
    assert!(matches!(
        Options::parse("HZ S RI"),
        Err(TouchstoneError::NotAnOptionLine(_))
    ));
    for line in [
        "# HZ KHZ",
        "# S Y",
        "# RI MA",
        "# R 50 R 75",
        "# R",
        "# R fifty",
        "# HZ S RI foo",
    ] {
        assert!(
            matches!(Options::parse(line), Err(TouchstoneError::IllegalOption(_))),
            "{line} should be rejected"
        );
    }
}

#[test]
fn test_loads_one_port_ri() {
    let ts = Touchstone::loads(indoc! {"
        ! Created by a test
        ! second comment
        # HZ S RI R 50
        1000000 0.5 -0.25
        2000000 0.25 0.125 ! trailing comment

        3000000 -0.1 0.0
    "})
    .unwrap();
    assert_eq!(ts.comments.len(), 2);
    assert_eq!(ts.s11().len(), 3);
    assert!(ts.s21().is_empty());
    assert_eq!(ts.s11()[1], Datapoint::new(2_000_000, 0.25, 0.125));
}

#[test]
fn test_loads_two_port_ma_scaled() {
    let ts = Touchstone::loads(indoc! {"
        # MHz S MA R 50
        1 1.0 90.0 0.5 0.0 0.0 0.0 0.0 0.0
        1.5 1.0 180.0 0.5 -90.0 0.0 0.0 0.0 0.0
    "})
    .unwrap();
    assert_eq!(ts.s11().len(), 2);
    assert_eq!(ts.s21().len(), 2);
    assert_eq!(ts.s12().len(), 2);
    assert_eq!(ts.s22().len(), 2);
    assert_eq!(ts.s11()[1].freq, 1_500_000);
    assert_abs_diff_eq!(ts.s11()[0].re, 0.0, epsilon = 1e-12);
    assert_abs_diff_eq!(ts.s11()[0].im, 1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(ts.s11()[1].re, -1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(ts.s21()[1].im, -0.5, epsilon = 1e-12);
}

#[test]
fn test_loads_db() {
    let ts = Touchstone::loads("# KHZ DB\n100 -20 0\n").unwrap();
    assert_eq!(ts.s11()[0].freq, 100_000);
    assert_abs_diff_eq!(ts.s11()[0].re, 0.1, epsilon = 1e-12);
    assert_abs_diff_eq!(ts.s11()[0].im, 0.0, epsilon = 1e-12);
}

#[test]
fn test_frequency_must_ascend() {
    let repeated = "# HZ RI\n100 0 0\n100 0 0\n";
    assert!(matches!(
        Touchstone::loads(repeated),
        Err(TouchstoneError::NotAscending(_))
    ));
    let decreasing = "# HZ RI\n200 0 0\n100 0 0\n";
    assert!(matches!(
        Touchstone::loads(decreasing),
        Err(TouchstoneError::NotAscending(_))
    ));
}

#[test]
fn test_pair_count_checks() {
    assert!(matches!(
        Touchstone::loads("# HZ RI\n100 0 0 1\n"),
        Err(TouchstoneError::OddValues(_))
    ));
    assert!(matches!(
        Touchstone::loads("# HZ RI\n100 0 0\n200 0 0 1 1\n"),
        Err(TouchstoneError::InconsistentPairs(_))
    ));
    assert!(matches!(
        Touchstone::loads("# HZ RI\n100 0 0 0 0 0 0 0 0 0 0\n"),
        Err(TouchstoneError::TooManyPairs(_))
    ));
    assert!(matches!(
        Touchstone::loads("# HZ RI\n100 0 zero\n"),
        Err(TouchstoneError::BadNumber { .. })
    ));
    assert!(matches!(
        Touchstone::loads("! only comments\n"),
        Err(TouchstoneError::MissingOptionLine)
    ));
}

#[test]
fn test_non_finite_frequency_rejected() {
    for freq in ["nan", "inf", "-inf"] {
        let contents = format!("# HZ S RI\n200 0.1 0.2\n{freq} 0.1 0.2\n100 0.1 0.2\n");
        assert!(
            matches!(
                Touchstone::loads(&contents),
                Err(TouchstoneError::BadNumber { .. })
            ),
            "{freq}"
        );
    }
}

#[test]
fn test_frequency_without_values_rejected() {
    assert!(matches!(
        Touchstone::loads("# HZ RI\n100\n200 0 0\n"),
        Err(TouchstoneError::OddValues(_))
    ));
    // The first data line sets the pair count even after a comment line.
    assert!(matches!(
        Touchstone::loads("# HZ RI\n! note\n100 0 0 1 1\n200 0 0\n"),
        Err(TouchstoneError::InconsistentPairs(_))
    ));
}

#[test]
fn test_write_then_parse_is_exact() {
    let s11: Vec<Datapoint> = (0..101)
        .map(|i| {
            let f = 1_000_000 + i * 10_000;
            let phase = i as f64 * 0.0731;
            Datapoint::new(f, 0.3 * phase.cos() / 7.0, -phase.sin() / 3.0)
        })
        .collect();
    let s21: Vec<Datapoint> = s11
        .iter()
        .map(|d| Datapoint::new(d.freq, d.im * 1e-3, d.re + 1e-17))
        .collect();

    let mut buf = Vec::new();
    let mut ts = Touchstone::two_port(&s11, &s21);
    ts.comments.push("exported".to_string());
    ts.write(&mut buf).unwrap();

    let text = String::from_utf8(buf).unwrap();
    assert!(text.starts_with("! exported\n# HZ S RI R 50\n"));

    let parsed = Touchstone::loads(&text).unwrap();
    assert_eq!(parsed.s11(), s11.as_slice());
    assert_eq!(parsed.s21(), s21.as_slice());
    assert!(parsed.s12().iter().all(|d| d.re == 0.0 && d.im == 0.0));
}

#[test]
fn test_save_and_load_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dut.s1p");
    let data = vec![
        Datapoint::new(1_000_000, 0.1, 0.2),
        Datapoint::new(2_000_000, -0.3, 0.4),
    ];
    Touchstone::one_port(&data).save(&path).unwrap();
    let ts = Touchstone::load(&path).unwrap();
    assert_eq!(ts.s11(), data.as_slice());
    assert_eq!(ts.opts.unit, FrequencyUnit::Hz);
}
