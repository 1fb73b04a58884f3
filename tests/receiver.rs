use anyhow::Result;
use rand::{Rng, SeedableRng};

use sigutils::blocks::{
    BlockConfig, ClockDetectorParams, CostasKind, CostasParams, SofttunerParams, VectorSink,
    VectorSource, build_chain,
};
use sigutils::context::Context;
use sigutils::graph::{Graph, GraphRunner};
use sigutils::{Complex, Float};

const PI: Float = std::f64::consts::PI as Float;

fn init() {
    // Fails harmlessly if another test in this binary got there first.
    let _ = stderrlog::new()
        .module(module_path!())
        .module("sigutils")
        .quiet(false)
        .verbosity(2usize)
        .init();
    Context::new(log::LevelFilter::Info).init();
}

fn bpsk(n: usize, sps: usize, freq: Float, seed: u64) -> Vec<Complex> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let mut sym = 1.0;
    (0..n)
        .map(|i| {
            if i % sps == 0 {
                sym = if rng.random::<bool>() { 1.0 } else { -1.0 };
            }
            Complex::from_polar(sym, PI * freq * i as Float + 0.4)
        })
        .collect()
}

#[test]
fn carrier_then_clock() -> Result<()> {
    init();
    let n = 8000;
    let sps = 8;
    let bnor = 1.0 / sps as Float;
    let (src, prev) = VectorSource::new(bpsk(n, sps, 0.1, 7), 4096)?;
    let (blocks, prev) = build_chain(
        &[
            BlockConfig::Costas(CostasParams {
                kind: CostasKind::Bpsk,
                fhint: 0.1,
                ..Default::default()
            }),
            BlockConfig::ClockDetector(ClockDetectorParams {
                bhint: bnor,
                bmin: bnor * 0.9,
                bmax: bnor * 1.1,
                ..Default::default()
            }),
        ],
        prev,
    )?;
    let sink = VectorSink::new(prev, 10 * n);
    let hook = sink.hook();
    let mut g = Graph::new();
    g.add(Box::new(src));
    for b in blocks {
        g.add(b);
    }
    g.add(Box::new(sink));
    g.run()?;

    let got = hook.data().len() as Float;
    let want = n as Float * bnor;
    assert!(
        (want * 0.8..=want * 1.2).contains(&got),
        "got {got} symbols, want about {want}"
    );
    assert!(hook.data().iter().all(|x| x.re.is_finite() && x.im.is_finite()));
    Ok(())
}

#[test]
fn tune_and_decimate() -> Result<()> {
    init();
    let samp_rate = 48000.0;
    let fc = -9000.0;
    let input: Vec<_> = (0..24000)
        .map(|i| {
            let t = i as Float / samp_rate;
            Complex::from_polar(1.0, 2.0 * PI * (fc - 200.0) * t)
                + Complex::from_polar(0.5, 2.0 * PI * 15000.0 * t)
        })
        .collect();
    let (src, prev) = VectorSource::new(input, 8192)?;
    let (tuner, prev) = BlockConfig::Softtuner(SofttunerParams {
        samp_rate,
        decimation: 12,
        fc,
        bw: 2000.0,
        ..Default::default()
    })
    .build(prev)?;

    // Two independent readers of the same narrowband stream.
    let a = VectorSink::new(prev.clone(), 10000);
    let b = VectorSink::new(prev, 10000);
    let (ha, hb) = (a.hook(), b.hook());
    let mut g = Graph::new();
    g.add(Box::new(src));
    g.add(tuner);
    g.add(Box::new(a));
    g.add(Box::new(b));
    g.run()?;

    assert_eq!(ha.data().len(), 2000);
    assert_eq!(*ha.data(), *hb.data());

    let out = ha.data();
    let rot: Complex = out[1000..].windows(2).map(|w| w[1] * w[0].conj()).sum();
    let f = rot.arg() / (2.0 * PI) * samp_rate / 12.0;
    assert!((f + 200.0).abs() < 2.0, "got {f}Hz");
    for x in &out[1000..] {
        assert!((x.norm() - 1.0).abs() < 0.05, "{x}");
    }
    Ok(())
}

#[test]
fn chain_from_json() -> Result<()> {
    init();
    let configs = BlockConfig::chain_from_json(
        r#"[
            {"block": "softtuner", "samp_rate": 8000, "decimation": 4, "fc": 1000, "bw": 1000},
            {"block": "pll", "fhint": 0.05, "fc": 0.02}
        ]"#,
    )?;
    assert_eq!(configs.len(), 2);
    let input: Vec<_> = (0..4000)
        .map(|i| Complex::from_polar(1.0, 2.0 * PI * 1050.0 * i as Float / 8000.0))
        .collect();
    let (src, prev) = VectorSource::new(input, 1024)?;
    let (blocks, prev) = build_chain(&configs, prev)?;
    let sink = VectorSink::new(prev, 10000);
    let hook = sink.hook();
    let mut g = Graph::new();
    g.add(Box::new(src));
    for b in blocks {
        g.add(b);
    }
    g.add(Box::new(sink));
    g.run()?;
    assert_eq!(hook.data().len(), 1000);
    assert!(g.generate_stats().is_some());
    Ok(())
}

#[test]
fn bad_chain_names_block() {
    let e = BlockConfig::chain_from_json(
        r#"[
            {"block": "pll"},
            {"block": "clock_detector", "bmin": 0.5, "bmax": 0.2}
        ]"#,
    )
    .unwrap_err();
    let s = e.to_string();
    assert!(s.starts_with("block 1 (ClockDetector): "), "{s}");
}
