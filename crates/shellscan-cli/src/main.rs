use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use shellscan_core::{Aabb, Cloud, Extents};
use shellscan_sampler::{CylinderParams, SampleConfig};

// ---------- helpers ----------

fn t0() -> std::time::Instant { std::time::Instant::now() }
fn lap(t: std::time::Instant, label: &str) {
    let ms = t.elapsed().as_secs_f64() * 1000.0;
    log::info!("[{label}] {ms:.1} ms");
}

/// Config file (if any) first, then explicit flags on top.
fn resolve_config(config: Option<&str>, along: Option<usize>, around: Option<usize>) -> Result<SampleConfig> {
    let mut cfg = match config {
        Some(path) => {
            let text = std::fs::read_to_string(path).with_context(|| format!("open {}", path))?;
            serde_json::from_str::<SampleConfig>(&text).with_context(|| format!("parse {}", path))?
        }
        None => SampleConfig::default(),
    };
    if let Some(n) = along { cfg.sample_along = n; }
    if let Some(n) = around { cfg.sample_around = n; }
    cfg.validate()?;
    Ok(cfg)
}

// ---------- CLI ----------

#[derive(Parser)]
#[command(name = "shellscan", version, about = "Boundary shell sampling for closed 3D point clouds")]
struct Args { #[command(subcommand)] cmd: Cmd }

#[derive(clap::Args)]
struct Sampling {
    /// Rings along z (default 30)
    #[arg(long)] along: Option<usize>,
    /// Probes per ring (default 30)
    #[arg(long)] around: Option<usize>,
    /// JSON file with `sample_along` / `sample_around`; flags win over it
    #[arg(long)] config: Option<String>,
}

#[derive(Subcommand)]
enum Cmd {
    /// Snap a cylindrical probe scaffold onto the cloud and write the hits (CSV or PLY)
    Sample {
        input: String, output: String,
        #[command(flatten)] sampling: Sampling,
    },

    /// Print bounds, extents and the derived scaffold
    Info {
        input: String,
        #[command(flatten)] sampling: Sampling,
        #[arg(long)] json: bool,
    },

    /// Write the scaffold probes themselves, for inspection next to the cloud
    Probes {
        input: String, output: String,
        #[command(flatten)] sampling: Sampling,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    match args.cmd {
        Cmd::Sample { input, output, sampling } => cmd_sample(&input, &output, &sampling),
        Cmd::Info { input, sampling, json } => cmd_info(&input, &sampling, json),
        Cmd::Probes { input, output, sampling } => cmd_probes(&input, &output, &sampling),
    }
}

impl Sampling {
    fn resolve(&self) -> Result<SampleConfig> {
        resolve_config(self.config.as_deref(), self.along, self.around)
    }
}

// ---------- commands ----------

fn cmd_sample(input: &str, output: &str, sampling: &Sampling) -> Result<()> {
    let cfg = sampling.resolve()?;

    let t_read = t0();
    let cloud = shellscan_io::read_auto(input)?;
    lap(t_read, "read");

    let t_sample = t0();
    let out = shellscan_sampler::sample_boundary(&cloud, &cfg)
        .with_context(|| format!("sample {}", input))?;
    lap(t_sample, "sample");

    let t_write = t0();
    shellscan_io::write_auto(output, &out.points)?;
    lap(t_write, "write");

    println!(
        "sample: {} pts -> {} ({} rings x {} probes, r={:.3})",
        cloud.len(), output, cfg.sample_along, cfg.sample_around, out.cylinder.radius
    );
    Ok(())
}

#[derive(Serialize)]
struct InfoReport {
    points: usize,
    bounds: Aabb,
    extents: Extents,
    config: SampleConfig,
    cylinder: CylinderParams,
}

fn cmd_info(input: &str, sampling: &Sampling, json: bool) -> Result<()> {
    let cfg = sampling.resolve()?;
    let cloud: Cloud = shellscan_io::read_auto(input)?;
    let bounds = Aabb::from_cloud(&cloud)?;
    let cylinder = CylinderParams::from_aabb(&bounds, &cfg)?;
    let report = InfoReport { points: cloud.len(), bounds, extents: bounds.extents(), config: cfg, cylinder };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    let e = report.extents;
    println!("points: {}", report.points);
    println!("bounds: min={:?} max={:?}", bounds.min, bounds.max);
    println!("extents: dx={:.6} dy={:.6} dz={:.6}", e.dx, e.dy, e.dz);
    println!(
        "scaffold: center=({:.6}, {:.6}) radius={:.6} ring_step={:.6} probes={}",
        cylinder.center[0], cylinder.center[1], cylinder.radius, cylinder.element_height, cfg.probe_count()
    );
    Ok(())
}

fn cmd_probes(input: &str, output: &str, sampling: &Sampling) -> Result<()> {
    let cfg = sampling.resolve()?;
    let cloud = shellscan_io::read_auto(input)?;
    let lattice = shellscan_sampler::scaffold_for(&cloud, &cfg)?;
    let mut probes = Cloud::with_capacity(lattice.len());
    for p in lattice.probes() { probes.push(p.x, p.y, p.z); }
    shellscan_io::write_auto(output, &probes)?;
    println!("probes: wrote {} -> {}", probes.len(), output);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }

    #[test]
    fn flags_override_defaults() {
        let args = Args::try_parse_from(["shellscan", "sample", "in.csv", "out.csv", "--around", "32"]).unwrap();
        let Cmd::Sample { sampling, .. } = args.cmd else { panic!("expected sample") };
        assert_eq!(sampling.resolve().unwrap(), SampleConfig { sample_along: 30, sample_around: 32 });
    }

    #[test]
    fn flags_override_config_file() {
        let path = std::env::temp_dir().join(format!("shellscan-cli-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"sample_along": 5, "sample_around": 32}"#).unwrap();
        let path = path.to_string_lossy().into_owned();
        let cfg = resolve_config(Some(&path), None, Some(8)).unwrap();
        assert_eq!(cfg, SampleConfig { sample_along: 5, sample_around: 8 });
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn zero_counts_are_rejected() {
        assert!(resolve_config(None, Some(0), None).is_err());
    }
}
