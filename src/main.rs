use anyhow::Result;
use fiber_common::{PackingConfig, PlacementMethod};
use fiber_packing::generator::DEFAULT_FVF;
use fiber_packing::{
    contour_from_config, io, DiagnosticLog, FiberCount, FiberType, Placement, Population, PopulationSource,
    StatFitOptions, StatModel, StatSource,
};
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::Instant;

fn fiber_count(config: &PackingConfig) -> FiberCount {
    let pop = &config.population;
    match (pop.fill_area, pop.fvf) {
        (Some(area), fvf) => FiberCount::FillArea { area, fvf: fvf.unwrap_or(DEFAULT_FVF) },
        (None, Some(fvf)) => FiberCount::Fvf(fvf),
        (None, None) => FiberCount::Exact(pop.n_fibers),
    }
}

fn main() -> Result<()> {
    // Initialize the logger
    env_logger::init();

    info!("Starting fiber population generation...");

    // --- Load Configuration ---
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".to_string());
    let config = PackingConfig::load(&config_path)?;
    debug!("Configuration: {:#?}", config);
    info!("Using {} Rayon threads.", rayon::current_num_threads());

    let mut rng = StdRng::seed_from_u64(config.population.seed);
    let mut diagnostics = DiagnosticLog::new();

    // --- Fit Statistics ---
    let options = StatFitOptions { one_gamma: config.population.one_gamma, ..Default::default() };
    let myelinated = StatModel::from_csv(&config.population.myelinated_stat, FiberType::Myelinated, options)?;
    let unmyelinated = StatModel::from_csv(&config.population.unmyelinated_stat, FiberType::Unmyelinated, options)?;
    info!(
        "Fitted '{}' ({} lobe(s)) and '{}' ({} lobe(s)).",
        myelinated.name,
        myelinated.lobes.len(),
        unmyelinated.name,
        unmyelinated.lobes.len()
    );

    // --- Generate Population ---
    let contour = contour_from_config(&config.contour)?;
    info!("Contour area: {:.1} um^2", contour.area());
    let mut population = Population::with_geometry(contour);
    let source = PopulationSource::Stat(StatSource {
        count: fiber_count(&config),
        myelinated: &myelinated,
        unmyelinated: &unmyelinated,
        params: config.generator_params(),
    });
    population.create_population(source, true, &mut rng, &mut diagnostics)?;
    if config.population.with_node_shift {
        population.generate_node_shift(&mut rng);
    }
    info!("Population of {} fibers generated.", population.count());

    // --- Place Population ---
    let placement = match config.placement.method {
        PlacementMethod::Placer => Placement::Placer(config.placer_params()),
        PlacementMethod::Packer => Placement::Packer(config.packer_params()),
    };
    let start_time = Instant::now();
    population.place_population(placement, true, &mut rng, &mut diagnostics)?;
    info!(
        "Placed {} of {} fibers in {:.3} seconds.",
        population.n_placed(),
        population.count(),
        start_time.elapsed().as_secs_f64()
    );
    let removed = population.remove_collisions(0.0, &mut diagnostics);
    if removed > 0 {
        warn!("{} colliding fibers unplaced after placement.", removed);
    }
    let report = population.to_report();
    info!(
        "FVF {:.3} with {} myelinated and {} unmyelinated fibers.",
        report.fiber_volume_fraction, report.n_myelinated, report.n_unmyelinated
    );
    if let Some(packing) = &report.packing {
        info!(
            "Gaps: min {:.3} um, average nearest {:.3} um, max nearest {:.3} um.",
            packing.min_dist, packing.avg_min_dist, packing.max_min_dist
        );
    }
    if !diagnostics.is_empty() {
        warn!("Run finished with {} diagnostic(s).", diagnostics.records().len());
    }

    // --- Save Results ---
    let base = &config.output.base_filename;
    if config.output.save_population {
        let filename = format!("{}_population.csv", base);
        let comment = format!("fibers generated from {} and {}", myelinated.name, unmyelinated.name);
        if let Err(e) = io::save_population(Path::new(&filename), &population.to_data(), Some(&comment)) {
            error!("Error saving population to '{}': {}", filename, e);
        }
    } else {
        info!("Skipping saving the population as per config.");
    }

    if config.output.save_report {
        let filename = format!("{}_report.json", base);
        match File::create(&filename) {
            Ok(mut file) => match serde_json::to_string_pretty(&report) {
                Ok(json_string) => {
                    if let Err(e) = file.write_all(json_string.as_bytes()) {
                        error!("Error writing report to file '{}': {}", filename, e);
                    } else {
                        info!("Report saved to {}", filename);
                    }
                }
                Err(e) => error!("Error serializing report to JSON: {}", e),
            },
            Err(e) => error!("Error creating report file '{}': {}", filename, e),
        }
    } else {
        info!("Skipping saving the report as per config.");
    }

    info!("Generation Complete.");
    Ok(())
}
