//! Integration tests: agreement between the solve strategies, weighting and
//! truncation behavior on assembled systems.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use velgrid::{
    Coefficients, ErrorCategory, FitOutcome, GridError, Gridder, GridderConfig,
    NormalizationMode, Observation, Solver, SpectrumKind, SpectrumRequest, SvdCutoff,
    SvdSettings, WeightPolicy,
};

fn coefficients(config: GridderConfig, obs: &[Observation]) -> anyhow::Result<Coefficients> {
    match Gridder::new(config)?.fit(obs)? {
        FitOutcome::Fitted { field, .. } => Ok(field.coefficients().clone()),
        FitOutcome::SpectrumOnly(_) => anyhow::bail!("fit stopped after the spectrum report"),
    }
}

fn assert_close(a: &Coefficients, b: &Coefficients, rel: f64) {
    assert_eq!(a.len(), b.len());
    let scale = a
        .as_slice()
        .iter()
        .fold(1.0_f64, |m, x| m.max(x.abs()));
    for (k, (x, y)) in a.as_slice().iter().zip(b.as_slice()).enumerate() {
        assert!(
            (x - y).abs() <= rel * scale,
            "coefficient {k}: {x} vs {y} (scale {scale})"
        );
    }
}

/// Scattered observations of a smooth field with noise.
fn synthetic(n: usize, seed: u64) -> Vec<Observation> {
    let mut rng = StdRng::seed_from_u64(seed);
    let noise = Normal::new(0.0, 0.05).unwrap();
    (0..n)
        .map(|_| {
            let x: f64 = rng.random_range(-10.0..10.0);
            let y: f64 = rng.random_range(-10.0..10.0);
            let u = (0.3 * x).sin() + 0.05 * y;
            let v = (0.2 * y).cos() - 0.02 * x * y / 10.0;
            Observation::new(x, y, u + noise.sample(&mut rng), v + noise.sample(&mut rng))
        })
        .collect()
}

#[test]
fn test_gauss_jordan_matches_full_rank_svd() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt().with_env_filter("info").try_init();

    let obs = [
        Observation::new(0.0, 0.0, 1.0, 2.0),
        Observation::new(3.0, 1.0, -1.0, 0.5),
        Observation::new(1.0, 4.0, 0.3, -0.7),
    ];
    let base = GridderConfig {
        normalization: NormalizationMode::MEAN_ONLY,
        ..Default::default()
    };
    let direct = coefficients(base.clone(), &obs)?;
    let svd = coefficients(
        GridderConfig {
            solver: Solver::svd(SvdCutoff::Ratio(0.0)),
            ..base
        },
        &obs,
    )?;
    assert_eq!(direct.len(), 3);
    assert_close(&direct, &svd, 1e-9);
    Ok(())
}

#[test]
fn test_uniform_weights_leave_coefficients_unchanged() -> anyhow::Result<()> {
    let plain = synthetic(12, 3);
    let with_weight = |w: f64| -> Vec<Observation> {
        plain
            .iter()
            .map(|o| Observation::with_weights(o.x, o.y, o.u, o.v, w, w))
            .collect()
    };

    for solver in [Solver::GaussJordan, Solver::svd(SvdCutoff::Variance(90.0))] {
        let config = GridderConfig {
            solver,
            weights: WeightPolicy::Weights,
            ..Default::default()
        };
        let one = coefficients(config.clone(), &with_weight(1.0))?;
        let two = coefficients(config, &with_weight(2.0))?;
        assert_close(&one, &two, 1e-9);

        let unweighted = coefficients(
            GridderConfig {
                solver,
                ..Default::default()
            },
            &plain,
        )?;
        assert_close(&one, &unweighted, 1e-12);
    }
    Ok(())
}

#[test]
fn test_sigmas_are_reciprocal_weights() -> anyhow::Result<()> {
    let plain = synthetic(10, 11);
    let weighted: Vec<Observation> = plain
        .iter()
        .enumerate()
        .map(|(k, o)| {
            let w = 1.0 + k as f64;
            Observation::with_weights(o.x, o.y, o.u, o.v, w, 2.0 * w)
        })
        .collect();
    let sigmas: Vec<Observation> = weighted
        .iter()
        .map(|o| {
            let [wu, wv] = o.weights.unwrap();
            Observation::with_weights(o.x, o.y, o.u, o.v, 1.0 / wu, 1.0 / wv)
        })
        .collect();

    let solver = Solver::svd(SvdCutoff::Count(12));
    let a = coefficients(
        GridderConfig {
            solver,
            weights: WeightPolicy::Weights,
            ..Default::default()
        },
        &weighted,
    )?;
    let b = coefficients(
        GridderConfig {
            solver,
            weights: WeightPolicy::Sigmas,
            ..Default::default()
        },
        &sigmas,
    )?;
    assert_close(&a, &b, 1e-9);
    Ok(())
}

#[test]
fn test_variance_cutoff_monotone_on_real_system() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt().with_env_filter("warn").try_init();
    let obs = synthetic(25, 42);

    let mut last = 0;
    for pct in [10.0, 50.0, 80.0, 90.0, 95.0, 99.0, 99.9, 100.0] {
        let gridder = Gridder::new(GridderConfig {
            solver: Solver::svd(SvdCutoff::Variance(pct)),
            ..Default::default()
        })?;
        let FitOutcome::Fitted { report, .. } = gridder.fit(&obs)? else {
            anyhow::bail!("expected a fitted field");
        };
        let svd = report.svd.expect("SVD report");
        assert_eq!(svd.total, 50);
        assert!(
            svd.used >= last,
            "{pct} % kept {} values, fewer than {last} at a lower cutoff",
            svd.used
        );
        assert!(
            svd.variance_explained + 1e-9 >= pct,
            "{pct} % requested but {:.4} % explained",
            svd.variance_explained
        );
        last = svd.used;
    }
    Ok(())
}

#[test]
fn test_spectrum_report_only() -> anyhow::Result<()> {
    let mut obs = synthetic(8, 5);
    // A conflicting duplicate does not stop a report-only run
    let first = obs[0];
    obs.push(Observation::new(first.x, first.y, first.u + 1.0, first.v));

    let gridder = Gridder::new(GridderConfig {
        solver: Solver::TruncatedSvd(SvdSettings {
            cutoff: SvdCutoff::Ratio(0.0),
            spectrum: SpectrumRequest::ReportOnly,
        }),
        ..Default::default()
    })?;
    let FitOutcome::SpectrumOnly(spectrum) = gridder.fit(&obs)? else {
        anyhow::bail!("report-only must not solve");
    };
    assert_eq!(spectrum.kind, SpectrumKind::RatioToLargest);
    assert_eq!(spectrum.len(), 18);
    assert_eq!(spectrum.entries[0].rank, 1);
    assert!((spectrum.entries[0].value - 1.0).abs() < 1e-15);
    for pair in spectrum.entries.windows(2) {
        assert!(pair[0].value >= pair[1].value, "spectrum not descending");
        assert_eq!(pair[1].rank, pair[0].rank + 1);
    }
    Ok(())
}

#[test]
fn test_spectrum_reported_alongside_solution() -> anyhow::Result<()> {
    let obs = synthetic(6, 9);
    let gridder = Gridder::new(GridderConfig {
        solver: Solver::TruncatedSvd(SvdSettings {
            cutoff: SvdCutoff::Variance(99.0),
            spectrum: SpectrumRequest::Report,
        }),
        ..Default::default()
    })?;
    let FitOutcome::Fitted { report, .. } = gridder.fit(&obs)? else {
        anyhow::bail!("expected a fitted field");
    };
    let spectrum = report.spectrum.expect("spectrum requested");
    assert_eq!(spectrum.kind, SpectrumKind::SingularValues);
    assert_eq!(spectrum.len(), 12);
    assert!(spectrum.entries[0].value > 1.0);
    Ok(())
}

#[test]
fn test_configuration_errors() {
    let bad = [
        Solver::svd(SvdCutoff::Variance(100.5)),
        Solver::svd(SvdCutoff::Variance(0.0)),
        Solver::svd(SvdCutoff::Ratio(-0.5)),
        Solver::svd(SvdCutoff::Count(0)),
    ];
    for solver in bad {
        let err = Gridder::new(GridderConfig {
            solver,
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, GridError::InvalidCutoff(_)), "{solver:?}: {err}");
        assert_eq!(err.category(), ErrorCategory::Configuration);
    }
}

#[test]
fn test_matrix_cap_rejects_before_allocation() -> anyhow::Result<()> {
    let gridder = Gridder::new(GridderConfig {
        max_matrix_bytes: Some(10 * 1024),
        ..Default::default()
    })?;
    // 2n = 40 → 40² doubles = 12 800 bytes
    let err = gridder.fit(&synthetic(20, 1)).unwrap_err();
    assert!(matches!(
        err,
        GridError::MatrixTooLarge {
            constraints: 20,
            bytes: 12_800,
            ..
        }
    ));
    assert_eq!(err.category(), ErrorCategory::Resource);

    // Just under the cap
    assert!(gridder.fit(&synthetic(17, 1)).is_ok());
    Ok(())
}

#[test]
fn test_sub_tolerance_offset_counts_as_duplicate() -> anyhow::Result<()> {
    let mut obs = synthetic(5, 2);
    let first = obs[0];
    // Closer than the coincidence tolerance, so the duplicate check sees the same location
    obs.push(Observation::new(first.x + 1e-9, first.y, first.u, first.v + 0.3));
    let gridder = Gridder::new(GridderConfig::default())?;
    let err = gridder.fit(&obs).unwrap_err();
    assert!(
        matches!(err, GridError::ConflictingDuplicates { .. }),
        "unexpected error: {err}"
    );
    Ok(())
}
