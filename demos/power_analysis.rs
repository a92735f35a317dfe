use ordered_beta_models::{
    CovariateType, FitOptions, OutcomeBounds, SimulationOptions, render_power_table,
    run_power_simulation,
};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ordered_beta_models=info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false).compact())
        .init();

    let workers = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
    let options = SimulationOptions {
        sample_sizes: vec![100, 250, 500],
        n_covariates: 2,
        replications: 50,
        beta_coef: vec![0.4, 0.1],
        phi: 2.0,
        covariate_type: CovariateType::Binary,
        workers,
        fit_options: FitOptions {
            true_bounds: Some(OutcomeBounds::default()),
            draws: 300,
            ..FitOptions::default()
        },
        ..SimulationOptions::default()
    };

    let result = run_power_simulation(&options)?;
    println!(
        "Power analysis: {} replications per sample size, {} workers\n\n{}",
        options.replications,
        workers,
        render_power_table(&result.summaries)
    );
    Ok(())
}
