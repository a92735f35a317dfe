use faer::Mat;
use ordered_beta_models::{
    Cutpoints, FitOptions, ModelInput, OrderedBeta, OutcomeBounds, average_marginal_effects,
    fit_ordbeta_input_with_draws, information_criteria, predictive_check, render_fit_table,
    render_predictive_check,
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logger();

    let input = build_slider_input(800, 2_026)?;
    let options = FitOptions {
        true_bounds: Some(OutcomeBounds::new(0.0, 100.0)?),
        draws: 1_000,
        seed: 7,
        ..FitOptions::default()
    };
    let (model, report, draws) = fit_ordbeta_input_with_draws(&input, options)?;

    println!(
        "Ordered beta fit: iterations={}, converged={}, observations={} (low={}, interior={}, high={})",
        report.iterations,
        report.converged,
        report.n_obs,
        report.n_low,
        report.n_interior,
        report.n_high
    );
    println!("\n{}", render_fit_table(&model, &report));

    let ic = information_criteria(&model, &report);
    println!(
        "\nlog-likelihood={:.2}, AIC={:.2}, BIC={:.2}",
        ic.loglik, ic.aic, ic.bic
    );

    let effects = average_marginal_effects(&model, &draws, &input, 0.05)?;
    println!("\nAverage marginal effects (0-100 scale)");
    for effect in &effects {
        if let Some(summary) = effect.summary {
            println!(
                "column {} ({:?}): {:.2}, 95% interval [{:.2}, {:.2}]",
                effect.column, effect.kind, effect.estimate, summary.lower, summary.upper
            );
        }
    }

    let check = predictive_check(&model, &draws, &input, 11)?;
    println!("\nPredictive check\n\n{}", render_predictive_check(&check));
    Ok(())
}

fn init_logger() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ordered_beta_models=info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .compact(),
        )
        .init();
}

/// Slider responses: a randomized treatment and a standardized age covariate.
fn build_slider_input(n: usize, seed: u64) -> Result<ModelInput, Box<dyn std::error::Error>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let cutpoints = Cutpoints::new(-1.5, 2.0)?;
    let design_matrix = Mat::from_fn(n, 3, |i, j| match j {
        0 => 1.0,
        1 => f64::from(u8::from(i % 3 == 0)),
        _ => idx_to_f64(i % 40) / 20.0 - 1.0,
    });
    let mut outcome = Mat::<f64>::zeros(n, 1);
    for i in 0..n {
        let eta = 0.8f64.mul_add(design_matrix[(i, 1)], 0.3 * design_matrix[(i, 2)]);
        outcome[(i, 0)] =
            100.0 * OrderedBeta::from_linear_predictor(eta, 4.0, cutpoints)?.sample(&mut rng);
    }
    Ok(ModelInput::new(design_matrix, outcome))
}

fn idx_to_f64(idx: usize) -> f64 {
    f64::from(u32::try_from(idx).unwrap_or(u32::MAX))
}
