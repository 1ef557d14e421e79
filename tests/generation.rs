use fiber_common::{GeneratorParams, PackerParams, Vec2};
use fiber_packing::generator::{self, split_counts};
use fiber_packing::postprocess;
use fiber_packing::{
    Circle, DiagnosticKind, DiagnosticLog, FiberCount, FiberType, Histogram, Placement, Population,
    PopulationSource, StatFitOptions, StatModel, StatSource,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::f64::consts::PI;
use std::path::PathBuf;
use std::sync::Arc;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

fn models() -> (StatModel, StatModel) {
    let m = StatModel::from_csv(fixture("myelinated_bimodal.csv"), FiberType::Myelinated, StatFitOptions::default()).unwrap();
    let u = StatModel::from_csv(fixture("unmyelinated.csv"), FiberType::Unmyelinated, StatFitOptions::default()).unwrap();
    (m, u)
}

fn sorted(mut v: Vec<f64>) -> Vec<f64> {
    v.sort_by(f64::total_cmp);
    v
}

#[test]
fn fixture_histograms_fit() {
    let (m, u) = models();
    assert_eq!(m.name, "myelinated_bimodal");
    assert!(m.is_two_lobe());
    assert!(!u.is_two_lobe());
    assert_eq!((m.d_min, m.d_max), (1.0, 16.0));
    let hist = Histogram::from_csv(fixture("unmyelinated.csv")).unwrap();
    assert!((u.expected_diameter - hist.expected()).abs() < 1e-12);
}

#[test]
fn split_is_exact_and_arrays_are_a_permutation() {
    let (m, u) = models();
    for &(n, p) in &[(100usize, 0.7), (37, 0.5), (250, 0.0), (12, 1.0)] {
        let mut rng = StdRng::seed_from_u64(n as u64);
        let pop = generator::create_from_stat(n, p, &m, &u, 500, &mut rng).unwrap();
        let (n_u, n_m) = split_counts(n, p);
        assert_eq!(pop.len(), n);
        assert_eq!(pop.count_of(FiberType::Unmyelinated), n_u);
        assert_eq!(pop.count_of(FiberType::Myelinated), n_m);

        // Same draws, before the shuffle.
        let mut replay = StdRng::seed_from_u64(n as u64);
        let m_draws = m.sample(n_m, 500, &mut replay).unwrap();
        let u_draws = u.sample(n_u, 500, &mut replay).unwrap();
        let of_type = |t: FiberType| -> Vec<f64> {
            pop.types.iter().zip(&pop.diameters).filter(|(ty, _)| **ty == t).map(|(_, d)| *d).collect()
        };
        assert_eq!(sorted(of_type(FiberType::Myelinated)), sorted(m_draws));
        assert_eq!(sorted(of_type(FiberType::Unmyelinated)), sorted(u_draws));
    }
}

#[test]
fn area_fill_stops_within_one_fiber_of_target() {
    let (m, u) = models();
    let largest = PI * (m.rvs_cutoff().max(u.rvs_cutoff()) / 2.0).powi(2);
    for (seed, &(area, fvf)) in [(2000.0, 0.55), (15000.0, 0.3), (500.0, 1.0)].iter().enumerate() {
        let mut rng = StdRng::seed_from_u64(seed as u64);
        let fill = generator::fill_area_with_fibers(area, 0.6, fvf, &m, &u, 500, &mut rng).unwrap();
        let total: f64 = fill.population.diameters.iter().map(|d| PI * (d / 2.0).powi(2) / fvf).sum();
        assert!((total - fill.filled_area).abs() < 1e-6 * total);
        assert!(fill.filled_area >= area);
        assert!(fill.filled_area < area + largest / fvf);
        assert!(fill.population.diameters.iter().all(|&d| d <= m.rvs_cutoff().max(u.rvs_cutoff())));
    }
}

#[test]
fn fvf_count_uses_contour_area() {
    let (m, u) = models();
    let mut pop = Population::with_geometry(Arc::new(Circle::new(Vec2::zero(), 200.0).unwrap()));
    let params = GeneratorParams::default();
    let expected = generator::fvf_fiber_count(
        0.4,
        PI * 200.0 * 200.0,
        params.percent_unmyelinated,
        m.expected_diameter,
        u.expected_diameter,
        true,
    );
    let source = PopulationSource::Stat(StatSource { count: FiberCount::Fvf(0.4), myelinated: &m, unmyelinated: &u, params });
    let mut rng = StdRng::seed_from_u64(0);
    pop.create_population(source, false, &mut rng, &mut DiagnosticLog::new()).unwrap();
    assert_eq!(pop.count(), expected);
    assert!(expected > 0);
}

#[test]
fn fvf_without_geometry_is_a_configuration_error() {
    let (m, u) = models();
    let mut pop = Population::new();
    let source = PopulationSource::Stat(StatSource {
        count: FiberCount::Fvf(0.4),
        myelinated: &m,
        unmyelinated: &u,
        params: GeneratorParams::default(),
    });
    let mut rng = StdRng::seed_from_u64(0);
    let res = pop.create_population(source, false, &mut rng, &mut DiagnosticLog::new());
    assert!(matches!(res, Err(fiber_packing::PackingError::Configuration(_))));
}

#[test]
fn packed_population_has_no_residual_collisions() {
    let (m, u) = models();
    let mut rng = StdRng::seed_from_u64(2024);
    let generated = generator::create_from_stat(250, 0.0, &m, &u, 500, &mut rng).unwrap();

    let mut pop = Population::with_geometry(Arc::new(Circle::new(Vec2::zero(), 1000.0).unwrap()));
    let source = PopulationSource::Data(fiber_packing::PopulationData {
        types: generated.types.clone(),
        diameters: generated.diameters.clone(),
        ..Default::default()
    });
    let mut log = DiagnosticLog::new();
    pop.create_population(source, false, &mut rng, &mut log).unwrap();
    let params = PackerParams { delta: 5.0, n_iter: 15_000, ..Default::default() };
    pop.place_population(Placement::Packer(params), false, &mut rng, &mut log).unwrap();

    assert_eq!(pop.n_placed(), 250);
    let positions: Vec<Vec2> = pop.positions().into_iter().flatten().collect();
    let mask = postprocess::collision_mask(&pop.diameters(), &positions, 0.0, &mut log);
    assert!(mask.iter().all(|&ok| ok));
    assert!(!log.has(DiagnosticKind::CollisionsRemoved));
}

#[test]
fn population_file_round_trip_keeps_placement() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("placed.csv");
    let (m, u) = models();
    let mut rng = StdRng::seed_from_u64(4);
    let mut log = DiagnosticLog::new();

    let mut pop = Population::with_geometry(Arc::new(Circle::new(Vec2::zero(), 150.0).unwrap()));
    let source = PopulationSource::Stat(StatSource {
        count: FiberCount::Exact(40),
        myelinated: &m,
        unmyelinated: &u,
        params: GeneratorParams::default(),
    });
    pop.create_population(source, false, &mut rng, &mut log).unwrap();
    pop.generate_node_shift(&mut rng);
    pop.place_population(Placement::Placer(Default::default()), false, &mut rng, &mut log).unwrap();
    fiber_packing::io::save_population(&path, &pop.to_data(), Some("round trip")).unwrap();

    let mut loaded = Population::with_geometry(Arc::new(Circle::new(Vec2::zero(), 150.0).unwrap()));
    loaded.create_population(PopulationSource::File(path), false, &mut rng, &mut log).unwrap();
    assert_eq!(loaded.count(), 40);
    assert_eq!(loaded.placed_mask(), pop.placed_mask());
    assert_eq!(loaded.types(), pop.types());
    for (a, b) in loaded.fibers().iter().zip(pop.fibers()) {
        assert!((a.diameter - b.diameter).abs() < 1e-9);
        if let (Some(pa), Some(pb)) = (a.position, b.position) {
            assert!(pa.distance(pb) < 1e-9);
        }
        assert!((a.node_shift.unwrap() - b.node_shift.unwrap()).abs() < 1e-9);
    }
}
